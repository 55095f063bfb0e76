//! Composite resource identifier codec
//!
//! Out-of-band adoption parses a caller-provided string into an initial
//! attribute map, then Reads. Two codecs cover the catalog: the whole
//! input as the remote id, or a `/`-separated path mapped onto a fixed
//! sequence of attribute names.

use stratoform_core::{AttributeMap, Diagnostic};

/// How a resource type's import string maps onto attributes.
#[derive(Debug, Clone)]
pub enum ImportSpec {
    /// The entire input is the value of one field (almost always `id`).
    Simple { field: &'static str },
    /// `p1/p2/…/pn` mapped positionally onto the listed fields. Embedded
    /// `/` characters are disallowed in segments.
    PathIndexed { fields: Vec<&'static str> },
}

impl ImportSpec {
    pub fn simple() -> Self {
        ImportSpec::Simple { field: "id" }
    }

    pub fn simple_field(field: &'static str) -> Self {
        ImportSpec::Simple { field }
    }

    pub fn path(fields: Vec<&'static str>) -> Self {
        ImportSpec::PathIndexed { fields }
    }

    /// Parse `input` into `(field, segment)` pairs.
    pub fn parse(&self, input: &str) -> Result<Vec<(String, String)>, Diagnostic> {
        if input.is_empty() {
            return Err(Diagnostic::error("Import identifier is empty"));
        }
        match self {
            ImportSpec::Simple { field } => {
                Ok(vec![(field.to_string(), input.to_string())])
            }
            ImportSpec::PathIndexed { fields } => {
                let segments: Vec<&str> = input.split('/').collect();
                if segments.len() != fields.len() {
                    return Err(Diagnostic::error(format!(
                        "Import identifier has {} segments, expected {}",
                        segments.len(),
                        fields.len()
                    ))
                    .with_detail(format!("expected format: {}", fields.join("/"))));
                }
                if segments.iter().any(|s| s.is_empty()) {
                    return Err(Diagnostic::error(
                        "Import identifier contains an empty path segment",
                    )
                    .with_detail(format!("expected format: {}", fields.join("/"))));
                }
                Ok(fields
                    .iter()
                    .zip(segments)
                    .map(|(f, s)| (f.to_string(), s.to_string()))
                    .collect())
            }
        }
    }

    /// Render the composite id for an attribute map; `None` when a segment
    /// is missing or would embed the separator.
    pub fn format(&self, attrs: &AttributeMap) -> Option<String> {
        match self {
            ImportSpec::Simple { field } => attrs.get_str(field).map(str::to_string),
            ImportSpec::PathIndexed { fields } => {
                let mut segments = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = attrs.get_str(field)?;
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    segments.push(value.to_string());
                }
                Some(segments.join("/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_takes_whole_input() {
        let spec = ImportSpec::simple();
        let parsed = spec.parse("ID-9").unwrap();
        assert_eq!(parsed, vec![("id".to_string(), "ID-9".to_string())]);
    }

    #[test]
    fn path_maps_positionally() {
        let spec = ImportSpec::path(vec!["policy_id", "id"]);
        let parsed = spec.parse("pol-1/rule-2").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("policy_id".to_string(), "pol-1".to_string()),
                ("id".to_string(), "rule-2".to_string()),
            ]
        );
    }

    #[test]
    fn cardinality_mismatch_is_fatal() {
        let spec = ImportSpec::path(vec!["policy_id", "id"]);
        let err = spec.parse("only-one").unwrap_err();
        assert!(err.detail.contains("policy_id/id"));
    }

    #[test]
    fn empty_segment_rejected() {
        let spec = ImportSpec::path(vec!["policy_id", "id"]);
        assert!(spec.parse("pol-1/").is_err());
        assert!(spec.parse("/rule-2").is_err());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(ImportSpec::simple().parse("").is_err());
    }

    #[test]
    fn format_round_trips() {
        let spec = ImportSpec::path(vec!["policy_id", "id"]);
        let mut attrs = AttributeMap::new();
        attrs.set("policy_id", "pol-1");
        attrs.set("id", "rule-2");
        let formatted = spec.format(&attrs).unwrap();
        assert_eq!(formatted, "pol-1/rule-2");
        assert_eq!(spec.parse(&formatted).unwrap().len(), 2);
    }

    #[test]
    fn format_refuses_embedded_separator() {
        let spec = ImportSpec::path(vec!["policy_id", "id"]);
        let mut attrs = AttributeMap::new();
        attrs.set("policy_id", "pol/1");
        attrs.set("id", "rule-2");
        assert!(spec.format(&attrs).is_none());
    }
}
