//! Per-field change sets
//!
//! Classifies every field present in prior or desired state as unchanged,
//! added, removed or modified, and aggregates `force_new` flags into the
//! replace decision. Sensitive values appear in display output only as
//! truncated hashes.

use crate::schema::Schema;
use crate::value::{AttrValue, AttributeMap};
use std::fmt;

/// One modified field with its old and new values.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub path: String,
    pub old: AttrValue,
    pub new: AttrValue,
    /// Display as hash, never raw
    pub sensitive: bool,
}

/// The delta between prior and desired state for one resource instance.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<FieldChange>,
    pub requires_replace: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Every field touched by this change set, in schema order.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.added
            .iter()
            .map(String::as_str)
            .chain(self.removed.iter().map(String::as_str))
            .chain(self.modified.iter().map(|c| c.path.as_str()))
            .collect()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.changed_fields().contains(&field)
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified{}",
            self.added.len(),
            self.removed.len(),
            self.modified.len(),
            if self.requires_replace {
                " (requires replace)"
            } else {
                ""
            }
        )?;
        for change in &self.modified {
            if change.sensitive {
                write!(
                    f,
                    "\n  ~ {}: (sensitive, hash {} -> {})",
                    change.path,
                    &change.old.hash_hex()[..12],
                    &change.new.hash_hex()[..12]
                )?;
            } else {
                write!(
                    f,
                    "\n  ~ {}: {:?} -> {:?}",
                    change.path, change.old, change.new
                )?;
            }
        }
        Ok(())
    }
}

/// Compute the change set between `prior` and `desired` under `schema`.
///
/// Output-only fields never participate. A field with a `diff_suppress`
/// predicate delegates equality to it.
pub fn diff(schema: &Schema, prior: &AttributeMap, desired: &AttributeMap) -> ChangeSet {
    let mut change_set = ChangeSet::default();

    for (name, spec) in schema.iter() {
        if spec.is_output_only() {
            continue;
        }

        let old = prior.get(name).filter(|a| a.present);
        let new = desired.get(name).filter(|a| a.present);

        let changed = match (old, new) {
            (None, None) => false,
            (None, Some(_)) => {
                change_set.added.push(name.clone());
                true
            }
            (Some(_), None) => {
                change_set.removed.push(name.clone());
                true
            }
            (Some(old), Some(new)) => {
                let equal = match &spec.diff_suppress {
                    Some(suppress) => suppress(&old.value, &new.value),
                    None => old.value == new.value,
                };
                if !equal {
                    change_set.modified.push(FieldChange {
                        path: name.clone(),
                        old: old.value.clone(),
                        new: new.value.clone(),
                        sensitive: spec.sensitive,
                    });
                }
                !equal
            }
        };

        if changed && spec.force_new {
            change_set.requires_replace = true;
        }
    }

    change_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldSpec::string().required())
            .field("type", FieldSpec::string().optional().force_new())
            .field("size", FieldSpec::int().optional())
            .field("password", FieldSpec::string().optional().sensitive())
            .field("tags", FieldSpec::map(FieldKind::String).optional())
            .field("id", FieldSpec::string().computed())
    }

    fn attrs(pairs: &[(&str, AttrValue)]) -> AttributeMap {
        let mut map = AttributeMap::new();
        for (name, value) in pairs {
            map.set(*name, value.clone());
        }
        map
    }

    #[test]
    fn unchanged_fields_produce_empty_set() {
        let a = attrs(&[("name", "g1".into()), ("size", 4.into())]);
        let change_set = diff(&schema(), &a, &a.clone());
        assert!(change_set.is_empty());
        assert!(!change_set.requires_replace);
    }

    #[test]
    fn modified_field_is_classified() {
        let prior = attrs(&[("name", "g1".into())]);
        let desired = attrs(&[("name", "g2".into())]);
        let change_set = diff(&schema(), &prior, &desired);
        assert_eq!(change_set.modified.len(), 1);
        assert_eq!(change_set.modified[0].path, "name");
        assert!(!change_set.requires_replace);
    }

    #[test]
    fn force_new_sets_requires_replace() {
        let prior = attrs(&[("name", "g1".into()), ("type", "a".into())]);
        let desired = attrs(&[("name", "g1".into()), ("type", "b".into())]);
        let change_set = diff(&schema(), &prior, &desired);
        assert!(change_set.requires_replace);
    }

    #[test]
    fn force_new_on_added_field_requires_replace() {
        let prior = attrs(&[("name", "g1".into())]);
        let desired = attrs(&[("name", "g1".into()), ("type", "a".into())]);
        let change_set = diff(&schema(), &prior, &desired);
        assert_eq!(change_set.added, vec!["type".to_string()]);
        assert!(change_set.requires_replace);
    }

    #[test]
    fn computed_fields_are_excluded() {
        let prior = attrs(&[("name", "g1".into()), ("id", "X".into())]);
        let desired = attrs(&[("name", "g1".into()), ("id", "Y".into())]);
        let change_set = diff(&schema(), &prior, &desired);
        assert!(change_set.is_empty());
    }

    #[test]
    fn diff_symmetry() {
        // diff(A,B) and diff(B,A) classify the same modified set with
        // added/removed swapped
        let a = attrs(&[("name", "g1".into()), ("size", 4.into())]);
        let b = attrs(&[("name", "g2".into()), ("type", "x".into())]);

        let ab = diff(&schema(), &a, &b);
        let ba = diff(&schema(), &b, &a);

        let mut ab_modified: Vec<&str> = ab.modified.iter().map(|c| c.path.as_str()).collect();
        let mut ba_modified: Vec<&str> = ba.modified.iter().map(|c| c.path.as_str()).collect();
        ab_modified.sort();
        ba_modified.sort();
        assert_eq!(ab_modified, ba_modified);
        assert_eq!(ab.added, ba.removed);
        assert_eq!(ab.removed, ba.added);
    }

    #[test]
    fn diff_suppress_delegates_equality() {
        let schema = Schema::new().field(
            "cidr",
            FieldSpec::string()
                .optional()
                .suppress_diff(|old, new| match (old.as_str(), new.as_str()) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => false,
                }),
        );
        let prior = attrs(&[("cidr", "10.0.0.0/8".into())]);
        let desired = attrs(&[("cidr", "10.0.0.0/8".into())]);
        assert!(diff(&schema, &prior, &desired).is_empty());
    }

    #[test]
    fn sensitive_change_displays_hash_only() {
        let prior = attrs(&[("name", "g1".into()), ("password", "hunter2".into())]);
        let desired = attrs(&[("name", "g1".into()), ("password", "s3cret!".into())]);
        let change_set = diff(&schema(), &prior, &desired);
        let rendered = change_set.to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cret!"));
        assert!(rendered.contains("sensitive"));
    }

    #[test]
    fn map_value_change_is_modified() {
        let mut prior_tags = std::collections::BTreeMap::new();
        prior_tags.insert("a".to_string(), AttrValue::String("1".to_string()));
        let mut desired_tags = std::collections::BTreeMap::new();
        desired_tags.insert("a".to_string(), AttrValue::String("2".to_string()));

        let prior = attrs(&[("name", "g1".into()), ("tags", AttrValue::Map(prior_tags))]);
        let desired = attrs(&[("name", "g1".into()), ("tags", AttrValue::Map(desired_tags))]);
        let change_set = diff(&schema(), &prior, &desired);
        assert_eq!(change_set.modified.len(), 1);
        assert_eq!(change_set.modified[0].path, "tags");
    }
}
