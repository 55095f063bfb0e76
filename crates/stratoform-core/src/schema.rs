//! Field specifications and resource schemas
//!
//! A [`Schema`] is an ordered mapping from field name to [`FieldSpec`].
//! Schemas are validated once when the provider registry is built; a
//! malformed spec is a configuration error, never a runtime failure.

use crate::diagnostics::Diagnostic;
use crate::error::{CoreError, Result};
use crate::value::AttrValue;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Per-field validator, run after coercion. May emit both errors and
/// warnings; the field path is supplied by the coercion driver.
pub type Validator = Arc<dyn Fn(&str, &AttrValue) -> Vec<Diagnostic> + Send + Sync>;

/// Custom equality for diffing; returning `true` suppresses the change.
pub type DiffSuppress = Arc<dyn Fn(&AttrValue, &AttrValue) -> bool + Send + Sync>;

/// The kind of a schema field.
#[derive(Clone)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    Map(Box<FieldKind>),
    Block(Schema),
}

impl FieldKind {
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            FieldKind::List(_) | FieldKind::Set(_) | FieldKind::Map(_) | FieldKind::Block(_)
        )
    }

    /// The typed zero value for this kind, used for unset optional fields.
    pub fn zero(&self) -> AttrValue {
        match self {
            FieldKind::String => AttrValue::String(String::new()),
            FieldKind::Int => AttrValue::Int(0),
            FieldKind::Bool => AttrValue::Bool(false),
            FieldKind::List(_) => AttrValue::List(Vec::new()),
            FieldKind::Set(_) => AttrValue::Set(Vec::new()),
            FieldKind::Map(_) => AttrValue::Map(BTreeMap::new()),
            FieldKind::Block(_) => AttrValue::Block(Default::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Bool => "bool",
            FieldKind::List(_) => "list",
            FieldKind::Set(_) => "set",
            FieldKind::Map(_) => "map",
            FieldKind::Block(_) => "block",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::List(e) => write!(f, "list<{:?}>", e),
            FieldKind::Set(e) => write!(f, "set<{:?}>", e),
            FieldKind::Map(e) => write!(f, "map<string,{:?}>", e),
            FieldKind::Block(_) => write!(f, "block"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Declarative description of one resource field.
#[derive(Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<AttrValue>,
    pub validator: Option<Validator>,
    pub diff_suppress: Option<DiffSuppress>,
    pub max_items: Option<usize>,
    pub description: String,
}

impl FieldSpec {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            validator: None,
            diff_suppress: None,
            max_items: None,
            description: String::new(),
        }
    }

    pub fn string() -> Self {
        Self::of_kind(FieldKind::String)
    }

    pub fn int() -> Self {
        Self::of_kind(FieldKind::Int)
    }

    pub fn bool() -> Self {
        Self::of_kind(FieldKind::Bool)
    }

    pub fn list(element: FieldKind) -> Self {
        Self::of_kind(FieldKind::List(Box::new(element)))
    }

    pub fn set(element: FieldKind) -> Self {
        Self::of_kind(FieldKind::Set(Box::new(element)))
    }

    pub fn map(element: FieldKind) -> Self {
        Self::of_kind(FieldKind::Map(Box::new(element)))
    }

    pub fn block(schema: Schema) -> Self {
        Self::of_kind(FieldKind::Block(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Any change to this field forces destroy-then-create.
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Never logged, excluded from diff output, hashed for comparison.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn validate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &AttrValue) -> Vec<Diagnostic> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    pub fn suppress_diff<F>(mut self, f: F) -> Self
    where
        F: Fn(&AttrValue, &AttrValue) -> bool + Send + Sync + 'static,
    {
        self.diff_suppress = Some(Arc::new(f));
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Output-only: written by Read/Create, never part of desired state.
    pub fn is_output_only(&self) -> bool {
        self.computed && !self.optional
    }

    fn check(&self, type_name: &str, field: &str) -> Result<()> {
        let fail = |reason: &str| {
            Err(CoreError::InvalidFieldSpec {
                type_name: type_name.to_string(),
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.required && self.computed {
            return fail("`required` and `computed` are mutually exclusive");
        }
        if self.required && self.optional {
            return fail("`required` and `optional` are mutually exclusive");
        }
        if !self.required && !self.optional && !self.computed {
            return fail("one of `required`, `optional`, `computed` must be set");
        }
        if self.default.is_some() && self.required {
            return fail("a `required` field cannot carry a default");
        }
        if self.default.is_some() && self.is_output_only() {
            return fail("an output-only field cannot carry a default");
        }
        if self.max_items.is_some() && !self.kind.is_collection() {
            return fail("`max_items` only applies to collection kinds");
        }
        if let Some(0) = self.max_items {
            return fail("`max_items` must be at least 1");
        }
        if let FieldKind::Block(schema) = &self.kind {
            schema.check(type_name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("default", &self.default)
            .field("max_items", &self.max_items)
            .finish()
    }
}

/// Ordered field specifications for one resource type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Declaration order is preserved.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of every sensitive field, in declaration order.
    pub fn sensitive_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, s)| s.sensitive)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Validate every field spec. Called once at registry build time.
    pub fn check(&self, type_name: &str) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CoreError::InvalidSchema {
                type_name: type_name.to_string(),
                reason: "schema declares no fields".to_string(),
            });
        }
        for (name, spec) in &self.fields {
            if name.is_empty() || name.contains('/') {
                return Err(CoreError::InvalidSchema {
                    type_name: type_name.to_string(),
                    reason: format!("illegal field name `{}`", name),
                });
            }
            spec.check(type_name, name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_schema() -> Schema {
        Schema::new()
            .field("name", FieldSpec::string().required())
            .field("region", FieldSpec::string().optional().force_new())
            .field("id", FieldSpec::string().computed())
    }

    #[test]
    fn valid_schema_passes() {
        assert!(simple_schema().check("test_resource").is_ok());
    }

    #[test]
    fn required_computed_rejected() {
        let schema = Schema::new().field("bad", FieldSpec::string().required().computed());
        let err = schema.check("test_resource").unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn missing_mode_rejected() {
        let schema = Schema::new().field("bad", FieldSpec::string());
        assert!(schema.check("test_resource").is_err());
    }

    #[test]
    fn default_on_required_rejected() {
        let schema =
            Schema::new().field("bad", FieldSpec::string().required().default_value("x"));
        assert!(schema.check("test_resource").is_err());
    }

    #[test]
    fn max_items_on_scalar_rejected() {
        let schema = Schema::new().field("bad", FieldSpec::string().optional().max_items(3));
        assert!(schema.check("test_resource").is_err());
    }

    #[test]
    fn empty_schema_rejected() {
        assert!(Schema::new().check("test_resource").is_err());
    }

    #[test]
    fn nested_block_is_checked() {
        let inner = Schema::new().field("bad", FieldSpec::string().required().computed());
        let schema = Schema::new().field("block", FieldSpec::block(inner).optional());
        assert!(schema.check("test_resource").is_err());
    }

    #[test]
    fn zero_values_match_kinds() {
        assert_eq!(FieldKind::String.zero(), AttrValue::String(String::new()));
        assert_eq!(FieldKind::Int.zero(), AttrValue::Int(0));
        assert_eq!(FieldKind::Bool.zero(), AttrValue::Bool(false));
    }
}
