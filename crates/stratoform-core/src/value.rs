//! Typed attribute values
//!
//! The host passes resource attributes as an untyped JSON tree. Inside the
//! provider every attribute is an [`AttrValue`] paired with a `present`
//! marker, because "optional and never set" must stay distinguishable from
//! "optional with a zero default".

use indexmap::IndexMap;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A typed attribute value.
///
/// `Set` keeps its elements in a `Vec` but compares order-insensitively;
/// `List` ordering is significant. `Block` is a nested attribute map with
/// its own schema.
#[derive(Debug, Clone)]
pub enum AttrValue {
    Null,
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<AttrValue>),
    Set(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Block(AttributeMap),
}

impl AttrValue {
    /// Human-readable kind name, used in coercion diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::String(_) => "string",
            AttrValue::Int(_) => "int",
            AttrValue::Bool(_) => "bool",
            AttrValue::List(_) => "list",
            AttrValue::Set(_) => "set",
            AttrValue::Map(_) => "map",
            AttrValue::Block(_) => "block",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) | AttrValue::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&AttributeMap> {
        match self {
            AttrValue::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to the host's JSON representation.
    pub fn to_json(&self) -> Json {
        match self {
            AttrValue::Null => Json::Null,
            AttrValue::String(s) => Json::String(s.clone()),
            AttrValue::Int(n) => Json::Number((*n).into()),
            AttrValue::Bool(b) => Json::Bool(*b),
            AttrValue::List(items) | AttrValue::Set(items) => {
                Json::Array(items.iter().map(AttrValue::to_json).collect())
            }
            AttrValue::Map(m) => Json::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            AttrValue::Block(b) => b.to_json(),
        }
    }

    /// Canonical encoding used for set-element and sensitive-value hashing.
    ///
    /// Set elements are re-encoded sorted by their own hash so two sets with
    /// the same members always produce the same digest.
    fn canonical(&self, out: &mut String) {
        match self {
            AttrValue::Null => out.push_str("~"),
            AttrValue::String(s) => {
                out.push_str("s:");
                out.push_str(s);
            }
            AttrValue::Int(n) => {
                out.push_str("i:");
                out.push_str(&n.to_string());
            }
            AttrValue::Bool(b) => {
                out.push_str("b:");
                out.push_str(if *b { "1" } else { "0" });
            }
            AttrValue::List(items) => {
                out.push_str("l[");
                for item in items {
                    item.canonical(out);
                    out.push(',');
                }
                out.push(']');
            }
            AttrValue::Set(items) => {
                let mut encoded: Vec<String> = items
                    .iter()
                    .map(|i| {
                        let mut s = String::new();
                        i.canonical(&mut s);
                        s
                    })
                    .collect();
                encoded.sort();
                out.push_str("t{");
                for e in encoded {
                    out.push_str(&e);
                    out.push(',');
                }
                out.push('}');
            }
            AttrValue::Map(m) => {
                out.push_str("m{");
                for (k, v) in m {
                    out.push_str(k);
                    out.push('=');
                    v.canonical(out);
                    out.push(',');
                }
                out.push('}');
            }
            AttrValue::Block(b) => {
                out.push_str("k{");
                let mut keys: Vec<&String> = b.inner.keys().collect();
                keys.sort();
                for k in keys {
                    let attr = &b.inner[k.as_str()];
                    if !attr.present {
                        continue;
                    }
                    out.push_str(k);
                    out.push('=');
                    attr.value.canonical(out);
                    out.push(',');
                }
                out.push('}');
            }
        }
    }

    /// Hex SHA-256 of the canonical encoding.
    ///
    /// Used for set-element identity and for representing sensitive values
    /// in diff output without exposing them.
    pub fn hash_hex(&self) -> String {
        let mut encoded = String::new();
        self.canonical(&mut encoded);
        let digest = Sha256::digest(encoded.as_bytes());
        format!("{:x}", digest)
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Null, AttrValue::Null) => true,
            (AttrValue::String(a), AttrValue::String(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::List(a), AttrValue::List(b)) => a == b,
            // Set equality is by element hash, ignoring order
            (AttrValue::Set(a), AttrValue::Set(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                let mut ha: Vec<String> = a.iter().map(AttrValue::hash_hex).collect();
                let mut hb: Vec<String> = b.iter().map(AttrValue::hash_hex).collect();
                ha.sort();
                hb.sort();
                ha == hb
            }
            (AttrValue::Map(a), AttrValue::Map(b)) => a == b,
            (AttrValue::Block(a), AttrValue::Block(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// A value plus its "is-set" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub value: AttrValue,
    pub present: bool,
}

impl Attribute {
    /// An attribute the caller actually set.
    pub fn set(value: impl Into<AttrValue>) -> Self {
        Self {
            value: value.into(),
            present: true,
        }
    }

    /// A zero-valued placeholder for an optional field that was never set.
    pub fn unset(value: AttrValue) -> Self {
        Self {
            value,
            present: false,
        }
    }
}

/// Ordered mapping from field name to [`Attribute`].
///
/// Order follows the schema declaration order, which keeps diff output and
/// serialized state stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    inner: IndexMap<String, Attribute>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert a present value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.inner.insert(name.into(), Attribute::set(value));
    }

    /// Insert a zero value with the not-set marker.
    pub fn set_absent(&mut self, name: impl Into<String>, zero: AttrValue) {
        self.inner.insert(name.into(), Attribute::unset(zero));
    }

    pub fn insert(&mut self, name: impl Into<String>, attr: Attribute) {
        self.inner.insert(name.into(), attr);
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.inner.get(name)
    }

    /// Value of a field the caller actually set; `None` for absent fields.
    pub fn get_present(&self, name: &str) -> Option<&AttrValue> {
        self.inner
            .get(name)
            .filter(|a| a.present)
            .map(|a| &a.value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_present(name).and_then(AttrValue::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get_present(name).and_then(AttrValue::as_int)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_present(name).and_then(AttrValue::as_bool)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.inner.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Merge `other` into `self`, overwriting fields that are present in
    /// `other`. Used to fold Read results (computed fields included) back
    /// into the state returned to the host.
    pub fn merge_present(&mut self, other: &AttributeMap) {
        for (name, attr) in other.iter() {
            if attr.present {
                self.inner.insert(name.clone(), attr.clone());
            }
        }
    }

    /// JSON object containing only present fields.
    pub fn to_json(&self) -> Json {
        let mut obj = serde_json::Map::new();
        for (name, attr) in &self.inner {
            if attr.present {
                obj.insert(name.clone(), attr.value.to_json());
            }
        }
        Json::Object(obj)
    }
}

impl FromIterator<(String, Attribute)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (String, Attribute)>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_equality_ignores_order() {
        let a = AttrValue::Set(vec!["x".into(), "y".into()]);
        let b = AttrValue::Set(vec!["y".into(), "x".into()]);
        assert_eq!(a, b);

        let c = AttrValue::Set(vec!["x".into(), "z".into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn list_equality_is_ordered() {
        let a = AttrValue::List(vec!["x".into(), "y".into()]);
        let b = AttrValue::List(vec!["y".into(), "x".into()]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_across_set_order() {
        let a = AttrValue::Set(vec!["x".into(), "y".into()]);
        let b = AttrValue::Set(vec!["y".into(), "x".into()]);
        assert_eq!(a.hash_hex(), b.hash_hex());
    }

    #[test]
    fn present_marker_round_trip() {
        let mut attrs = AttributeMap::new();
        attrs.set("name", "g1");
        attrs.set_absent("description", AttrValue::String(String::new()));

        assert_eq!(attrs.get_str("name"), Some("g1"));
        assert_eq!(attrs.get_str("description"), None);
        assert!(attrs.get("description").is_some());

        let json = attrs.to_json();
        assert_eq!(json, serde_json::json!({"name": "g1"}));
    }

    #[test]
    fn merge_present_overwrites_only_present() {
        let mut base = AttributeMap::new();
        base.set("name", "g1");
        base.set("id", "");

        let mut read = AttributeMap::new();
        read.set("id", "ID-1");
        read.set_absent("ignored", AttrValue::Null);

        base.merge_present(&read);
        assert_eq!(base.get_str("id"), Some("ID-1"));
        assert_eq!(base.get_str("name"), Some("g1"));
        assert!(base.get_present("ignored").is_none());
    }
}
