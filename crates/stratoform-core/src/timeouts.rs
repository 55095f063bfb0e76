//! Per-operation timeout budgets

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The five lifecycle verbs the engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationVerb {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl std::fmt::Display for OperationVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationVerb::Create => write!(f, "create"),
            OperationVerb::Read => write!(f, "read"),
            OperationVerb::Update => write!(f, "update"),
            OperationVerb::Delete => write!(f, "delete"),
            OperationVerb::Import => write!(f, "import"),
        }
    }
}

/// Independent budgets for create, read, update and delete.
///
/// Read has no deadline by default; import shares the read budget since it
/// ends in a Read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Option<Duration>,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(600),
            read: None,
            update: Duration::from_secs(600),
            delete: Duration::from_secs(600),
        }
    }
}

impl Timeouts {
    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = d;
        self
    }

    pub fn with_read(mut self, d: Duration) -> Self {
        self.read = Some(d);
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = d;
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = d;
        self
    }

    /// The budget for one verb; `None` means unbounded.
    pub fn budget(&self, verb: OperationVerb) -> Option<Duration> {
        match verb {
            OperationVerb::Create => Some(self.create),
            OperationVerb::Read | OperationVerb::Import => self.read,
            OperationVerb::Update => Some(self.update),
            OperationVerb::Delete => Some(self.delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ten_minutes_except_read() {
        let t = Timeouts::default();
        assert_eq!(t.budget(OperationVerb::Create), Some(Duration::from_secs(600)));
        assert_eq!(t.budget(OperationVerb::Update), Some(Duration::from_secs(600)));
        assert_eq!(t.budget(OperationVerb::Delete), Some(Duration::from_secs(600)));
        assert_eq!(t.budget(OperationVerb::Read), None);
    }

    #[test]
    fn builders_override() {
        let t = Timeouts::default().with_create(Duration::from_secs(30));
        assert_eq!(t.budget(OperationVerb::Create), Some(Duration::from_secs(30)));
    }
}
