//! Coercion from the host's untyped attribute tree
//!
//! Converts a raw `serde_json::Value` object into a typed [`AttributeMap`]
//! driven by the resource schema. Every mismatch becomes a diagnostic at the
//! offending field path; coercion never panics on host input.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{FieldKind, FieldSpec, Schema};
use crate::value::{AttrValue, Attribute, AttributeMap};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Coerce `raw` against `schema`.
///
/// Output-only (computed, non-optional) fields are skipped; they are never
/// part of desired state and get written by Read/Create instead. Validators
/// run after coercion and may add errors and warnings.
pub fn coerce(schema: &Schema, raw: &Json) -> (AttributeMap, Diagnostics) {
    let mut attrs = AttributeMap::new();
    let mut diags = Diagnostics::new();

    let empty = serde_json::Map::new();
    let obj = match raw {
        Json::Object(obj) => obj,
        // Null is an empty configuration; required-field checks below
        // produce the per-field diagnostics.
        Json::Null => &empty,
        other => {
            diags.push(
                Diagnostic::error("Configuration must be an object")
                    .with_detail(format!("got {}", json_type_name(other))),
            );
            return (attrs, diags);
        }
    };

    for (name, spec) in schema.iter() {
        if spec.is_output_only() {
            // Seed the slot so Read has a stable place to merge into.
            attrs.set_absent(name.clone(), spec.kind.zero());
            continue;
        }

        let raw_value = obj.get(name.as_str()).filter(|v| !v.is_null());
        match raw_value {
            Some(value) => {
                let coerced = coerce_value(&spec.kind, spec, value, name, &mut diags);
                attrs.insert(name.clone(), Attribute::set(coerced));
            }
            None if spec.required => {
                diags.push(
                    Diagnostic::error(format!("Missing required field `{}`", name))
                        .with_field(name.clone()),
                );
                attrs.set_absent(name.clone(), spec.kind.zero());
            }
            None => match &spec.default {
                Some(default) => attrs.insert(name.clone(), Attribute::set(default.clone())),
                None => attrs.set_absent(name.clone(), spec.kind.zero()),
            },
        }
    }

    for name in obj.keys() {
        if schema.get(name).is_none() {
            tracing::debug!(field = %name, "discarding unknown field from configuration");
        }
    }

    // Validators see the coerced value
    for (name, spec) in schema.iter() {
        if let (Some(validator), Some(value)) = (&spec.validator, attrs.get_present(name)) {
            diags.extend_from(validator(name, value));
        }
    }

    (attrs, diags)
}

/// Lenient single-value coercion without diagnostics.
///
/// Used to hydrate computed fields from persisted prior state or a remote
/// payload, where a mismatch means "leave the slot unset" rather than
/// "reject the configuration".
pub fn coerce_loose(kind: &FieldKind, raw: &Json) -> Option<AttrValue> {
    match (kind, raw) {
        (FieldKind::String, Json::String(s)) => Some(AttrValue::String(s.clone())),
        (FieldKind::Int, value) => value.as_i64().map(AttrValue::Int),
        (FieldKind::Bool, Json::Bool(b)) => Some(AttrValue::Bool(*b)),
        (FieldKind::List(elem), Json::Array(items)) => Some(AttrValue::List(
            items.iter().filter_map(|i| coerce_loose(elem, i)).collect(),
        )),
        (FieldKind::Set(elem), Json::Array(items)) => {
            let mut coerced: Vec<AttrValue> =
                items.iter().filter_map(|i| coerce_loose(elem, i)).collect();
            dedup_by_hash(&mut coerced);
            Some(AttrValue::Set(coerced))
        }
        (FieldKind::Map(elem), Json::Object(obj)) => Some(AttrValue::Map(
            obj.iter()
                .filter_map(|(k, v)| coerce_loose(elem, v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        (FieldKind::Block(schema), Json::Object(_)) => {
            let (inner, diags) = coerce(schema, raw);
            if diags.has_errors() {
                None
            } else {
                Some(AttrValue::Block(inner))
            }
        }
        _ => None,
    }
}

fn coerce_value(
    kind: &FieldKind,
    spec: &FieldSpec,
    raw: &Json,
    path: &str,
    diags: &mut Diagnostics,
) -> AttrValue {
    match kind {
        FieldKind::String => match raw {
            Json::String(s) => AttrValue::String(s.clone()),
            other => {
                mismatch(path, "string", other, diags);
                AttrValue::String(String::new())
            }
        },
        FieldKind::Int => match raw.as_i64() {
            Some(n) => AttrValue::Int(n),
            None => {
                mismatch(path, "int", raw, diags);
                AttrValue::Int(0)
            }
        },
        FieldKind::Bool => match raw {
            Json::Bool(b) => AttrValue::Bool(*b),
            other => {
                mismatch(path, "bool", other, diags);
                AttrValue::Bool(false)
            }
        },
        FieldKind::List(elem) => {
            let items = coerce_items(elem, spec, raw, path, diags);
            AttrValue::List(items)
        }
        FieldKind::Set(elem) => {
            let mut items = coerce_items(elem, spec, raw, path, diags);
            dedup_by_hash(&mut items);
            AttrValue::Set(items)
        }
        FieldKind::Map(elem) => match raw {
            Json::Object(obj) => {
                let mut map = BTreeMap::new();
                for (key, value) in obj {
                    let item_path = format!("{}.{}", path, key);
                    map.insert(
                        key.clone(),
                        coerce_value(elem, spec, value, &item_path, diags),
                    );
                }
                AttrValue::Map(map)
            }
            other => {
                mismatch(path, "map", other, diags);
                AttrValue::Map(BTreeMap::new())
            }
        },
        FieldKind::Block(schema) => match raw {
            Json::Object(_) => {
                let (inner, inner_diags) = coerce(schema, raw);
                for diag in inner_diags {
                    diags.push(prefix_field(diag, path));
                }
                AttrValue::Block(inner)
            }
            other => {
                mismatch(path, "block", other, diags);
                AttrValue::Block(Default::default())
            }
        },
    }
}

fn coerce_items(
    elem: &FieldKind,
    spec: &FieldSpec,
    raw: &Json,
    path: &str,
    diags: &mut Diagnostics,
) -> Vec<AttrValue> {
    let array = match raw {
        Json::Array(items) => items,
        other => {
            mismatch(path, "list", other, diags);
            return Vec::new();
        }
    };

    if let Some(max) = spec.max_items {
        if array.len() > max {
            diags.push(
                Diagnostic::error(format!(
                    "Too many items in `{}`: {} given, at most {} allowed",
                    path,
                    array.len(),
                    max
                ))
                .with_field(path.to_string()),
            );
        }
    }

    array
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = format!("{}.{}", path, i);
            coerce_value(elem, spec, item, &item_path, diags)
        })
        .collect()
}

fn dedup_by_hash(items: &mut Vec<AttrValue>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.hash_hex()));
}

fn mismatch(path: &str, expected: &str, got: &Json, diags: &mut Diagnostics) {
    diags.push(
        Diagnostic::error(format!("Expected {} for `{}`", expected, path))
            .with_detail(format!("got {}", json_type_name(got)))
            .with_field(path.to_string()),
    );
}

fn prefix_field(mut diag: Diagnostic, prefix: &str) -> Diagnostic {
    diag.field_path = Some(match diag.field_path.take() {
        Some(inner) => format!("{}.{}", prefix, inner),
        None => prefix.to_string(),
    });
    diag
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldSpec::string().required())
            .field("size", FieldSpec::int().optional().default_value(10))
            .field("enabled", FieldSpec::bool().optional())
            .field("tags", FieldSpec::map(FieldKind::String).optional())
            .field("id", FieldSpec::string().computed())
    }

    #[test]
    fn required_present_coerces() {
        let (attrs, diags) = coerce(&schema(), &json!({"name": "g1"}));
        assert!(!diags.has_errors());
        assert_eq!(attrs.get_str("name"), Some("g1"));
    }

    #[test]
    fn required_missing_is_error_at_path() {
        let (_, diags) = coerce(&schema(), &json!({}));
        assert!(diags.has_errors());
        let err = diags.errors().next().unwrap();
        assert_eq!(err.field_path.as_deref(), Some("name"));
    }

    #[test]
    fn optional_default_applies() {
        let (attrs, _) = coerce(&schema(), &json!({"name": "g1"}));
        assert_eq!(attrs.get_int("size"), Some(10));
    }

    #[test]
    fn optional_without_default_gets_not_set_marker() {
        let (attrs, _) = coerce(&schema(), &json!({"name": "g1"}));
        let attr = attrs.get("enabled").unwrap();
        assert!(!attr.present);
        assert_eq!(attr.value, AttrValue::Bool(false));
    }

    #[test]
    fn computed_field_is_seeded_but_absent() {
        let (attrs, _) = coerce(&schema(), &json!({"name": "g1", "id": "should-be-ignored"}));
        assert!(attrs.get("id").is_some());
        assert_eq!(attrs.get_str("id"), None);
    }

    #[test]
    fn type_mismatch_produces_field_diag() {
        let (_, diags) = coerce(&schema(), &json!({"name": 42}));
        assert!(diags.has_errors());
        let err = diags.errors().next().unwrap();
        assert_eq!(err.field_path.as_deref(), Some("name"));
        assert!(err.detail.contains("number"));
    }

    #[test]
    fn unknown_fields_are_discarded() {
        let (attrs, diags) = coerce(&schema(), &json!({"name": "g1", "bogus": true}));
        assert!(!diags.has_errors());
        assert!(!attrs.contains("bogus"));
    }

    #[test]
    fn set_deduplicates_by_hash() {
        let schema = Schema::new()
            .field("zones", FieldSpec::set(FieldKind::String).required());
        let (attrs, diags) = coerce(&schema, &json!({"zones": ["a", "b", "a"]}));
        assert!(!diags.has_errors());
        let items = attrs.get_present("zones").unwrap().as_items().unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn max_items_enforced() {
        let schema = Schema::new()
            .field("zones", FieldSpec::list(FieldKind::String).required().max_items(1));
        let (_, diags) = coerce(&schema, &json!({"zones": ["a", "b"]}));
        assert!(diags.has_errors());
    }

    #[test]
    fn nested_block_errors_carry_prefixed_path() {
        let inner = Schema::new().field("interval", FieldSpec::int().required());
        let schema = Schema::new().field("billing", FieldSpec::block(inner).optional());
        let (_, diags) = coerce(&schema, &json!({"billing": {}}));
        assert!(diags.has_errors());
        let err = diags.errors().next().unwrap();
        assert_eq!(err.field_path.as_deref(), Some("billing.interval"));
    }

    #[test]
    fn validator_runs_after_coercion() {
        let schema = Schema::new().field(
            "name",
            FieldSpec::string().required().validate_with(|path, value| {
                match value.as_str() {
                    Some(s) if s.len() > 3 => vec![],
                    _ => vec![Diagnostic::error("name too short").with_field(path.to_string())],
                }
            }),
        );
        let (_, diags) = coerce(&schema, &json!({"name": "ok"}));
        assert!(diags.has_errors());

        let (_, diags) = coerce(&schema, &json!({"name": "long-enough"}));
        assert!(!diags.has_errors());
    }
}
