//! Typed attribute maps attached to files and notes.
//!
//! Front-matter values are untyped at the YAML level; this module models them
//! as a tagged value (scalar, sequence or sub-map) and keeps the tag explicit
//! through merge and serialisation. Maps are key-sorted so canonical YAML
//! output is deterministic for hashing.

pub mod extract;
pub mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single attribute value.
///
/// The untagged representation matches what YAML naturally produces: `true`
/// is a bool, `42` an integer, `4.2` a float, everything else a string, with
/// sequences and nested maps recursing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Convert a raw YAML value, dropping nulls and non-string keys.
    pub fn from_yaml(value: &serde_yaml::Value) -> Option<AttributeValue> {
        match value {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttributeValue::Integer(i))
                } else {
                    n.as_f64().map(AttributeValue::Float)
                }
            }
            serde_yaml::Value::String(s) => Some(AttributeValue::String(s.clone())),
            serde_yaml::Value::Sequence(seq) => Some(AttributeValue::Sequence(
                seq.iter().filter_map(AttributeValue::from_yaml).collect(),
            )),
            serde_yaml::Value::Mapping(m) => {
                let mut out = BTreeMap::new();
                for (k, v) in m {
                    if let (Some(key), Some(value)) =
                        (yaml_key_to_string(k), AttributeValue::from_yaml(v))
                    {
                        out.insert(key, value);
                    }
                }
                Some(AttributeValue::Map(out))
            }
            serde_yaml::Value::Tagged(t) => AttributeValue::from_yaml(&t.value),
        }
    }

    /// String form used when a value flows into text (slug overrides, titles).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Render a scalar to its display string. Sequences and maps yield their
    /// YAML flow form.
    pub fn to_display_string(&self) -> String {
        match self {
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
        }
    }
}

fn yaml_key_to_string(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// An ordered (key-sorted) attribute map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(pub BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn new() -> Attributes {
        Attributes(BTreeMap::new())
    }

    /// Build from a YAML mapping (front matter).
    pub fn from_yaml_mapping(mapping: &serde_yaml::Mapping) -> Attributes {
        let mut out = BTreeMap::new();
        for (k, v) in mapping {
            if let (Some(key), Some(value)) = (yaml_key_to_string(k), AttributeValue::from_yaml(v))
            {
                out.insert(key, value);
            }
        }
        Attributes(out)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    /// Merge `child` on top of `self`, returning a new map.
    ///
    /// Scalar and map keys in `child` override; when both sides hold a
    /// sequence the parent's elements come first and child elements are
    /// appended with duplicates eliminated. Associative, not commutative.
    pub fn merge(&self, child: &Attributes) -> Attributes {
        let mut out = self.0.clone();
        for (key, child_value) in &child.0 {
            match (out.get(key), child_value) {
                (Some(AttributeValue::Sequence(parent_seq)), AttributeValue::Sequence(child_seq)) => {
                    let mut merged = parent_seq.clone();
                    for item in child_seq {
                        if !merged.contains(item) {
                            merged.push(item.clone());
                        }
                    }
                    out.insert(key.clone(), AttributeValue::Sequence(merged));
                }
                _ => {
                    out.insert(key.clone(), child_value.clone());
                }
            }
        }
        Attributes(out)
    }
}

impl FromIterator<(String, AttributeValue)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(items: &[&str]) -> AttributeValue {
        AttributeValue::Sequence(
            items
                .iter()
                .map(|s| AttributeValue::String((*s).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_from_yaml_mapping_types() {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(
            r#"
            title: My Book
            year: 1994
            rating: 4.5
            read: true
            tags: [books, favorite]
            "#,
        )
        .unwrap();
        let attrs = Attributes::from_yaml_mapping(&mapping);
        assert_eq!(attrs.get("title"), Some(&AttributeValue::String("My Book".into())));
        assert_eq!(attrs.get("year"), Some(&AttributeValue::Integer(1994)));
        assert_eq!(attrs.get("rating"), Some(&AttributeValue::Float(4.5)));
        assert_eq!(attrs.get("read"), Some(&AttributeValue::Bool(true)));
        assert_eq!(attrs.get("tags"), Some(&seq(&["books", "favorite"])));
    }

    #[test]
    fn test_merge_scalar_override() {
        let mut parent = Attributes::new();
        parent.insert("author", AttributeValue::String("Unknown".into()));
        parent.insert("year", AttributeValue::Integer(1990));
        let mut child = Attributes::new();
        child.insert("author", AttributeValue::String("Thoreau".into()));

        let merged = parent.merge(&child);
        assert_eq!(merged.get("author"), Some(&AttributeValue::String("Thoreau".into())));
        assert_eq!(merged.get("year"), Some(&AttributeValue::Integer(1990)));
    }

    #[test]
    fn test_merge_sequences_concat_dedup() {
        let mut parent = Attributes::new();
        parent.insert("tags", seq(&["books", "life"]));
        let mut child = Attributes::new();
        child.insert("tags", seq(&["life", "philosophy"]));

        let merged = parent.merge(&child);
        assert_eq!(merged.get("tags"), Some(&seq(&["books", "life", "philosophy"])));
    }

    #[test]
    fn test_merge_not_commutative() {
        let mut a = Attributes::new();
        a.insert("k", AttributeValue::Integer(1));
        let mut b = Attributes::new();
        b.insert("k", AttributeValue::Integer(2));
        assert_ne!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn test_merge_associative() {
        let mut a = Attributes::new();
        a.insert("tags", seq(&["x"]));
        a.insert("title", AttributeValue::String("a".into()));
        let mut b = Attributes::new();
        b.insert("tags", seq(&["y"]));
        b.insert("title", AttributeValue::String("b".into()));
        let mut c = Attributes::new();
        c.insert("tags", seq(&["x", "z"]));

        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }
}
