//! Provider credentials

use std::fmt;

/// Bearer-token credentials with an optional project scope.
///
/// The engine consumes an already-issued token; refresh belongs to the
/// caller. The Debug impl redacts the token so contexts can be logged.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub project_id: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}
