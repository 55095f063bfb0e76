//! Runtime resource instances

use std::collections::HashMap;
use stratoform_core::{AttributeMap, Timeouts};

/// One resource instance as the engine sees it during an operation.
///
/// An empty `id` means the resource does not exist remotely. `private` is
/// engine-only scratch the host persists opaquely across plan/apply.
#[derive(Debug, Clone, Default)]
pub struct ResourceInstance {
    pub type_name: String,
    pub id: String,
    pub attributes: AttributeMap,
    pub private: HashMap<String, String>,
    pub timeouts: Timeouts,
}

impl ResourceInstance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
        // Mirror into the attribute map when the schema declares the field
        if self.attributes.contains("id") {
            let id = self.id.clone();
            self.attributes.set("id", id);
        }
    }

    pub fn clear_id(&mut self) {
        self.id.clear();
        if self.attributes.contains("id") {
            self.attributes.set("id", "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_mirrors_into_attributes() {
        let mut attrs = AttributeMap::new();
        attrs.set_absent("id", stratoform_core::AttrValue::String(String::new()));
        let mut instance = ResourceInstance::new("test").with_attributes(attrs);

        assert!(!instance.exists());
        instance.set_id("ID-1");
        assert!(instance.exists());
        assert_eq!(instance.attributes.get_str("id"), Some("ID-1"));

        instance.clear_id();
        assert!(!instance.exists());
    }
}
