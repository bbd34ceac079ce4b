//! Schema-aware attribute casting and inheritance filtering.
//!
//! The schema declares, per (path-prefix glob, note kind), a set of attribute
//! definitions. Casting coerces loosely-typed YAML values to their declared
//! type; inheritance filtering decides which attributes flow into child
//! scopes. Pattern constraints are declared here but enforced by lint.

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::{
    attribute::{AttributeValue, Attributes},
    errors::NtError,
};

/// Declared type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Integer,
    Float,
    Bool,
    Array,
    Map,
}

/// One attribute definition inside a schema scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: AttributeType,
    /// Optional regex the lint engine checks values against.
    pub pattern: Option<String>,
    pub required: bool,
    pub inherit: bool,
    pub aliases: Vec<String>,
}

impl Default for AttributeDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            value_type: AttributeType::String,
            pattern: None,
            required: false,
            inherit: true,
            aliases: Vec::new(),
        }
    }
}

/// A set of definitions applying to files under a path glob, optionally
/// restricted to one note kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaScope {
    /// Glob over repository-relative paths (`*` segment, `**` any depth).
    pub path: String,
    /// Note kind name this scope applies to; empty = all kinds.
    pub kind: String,
    pub attributes: Vec<AttributeDefinition>,
}

impl Default for SchemaScope {
    fn default() -> Self {
        Self {
            path: "**".to_string(),
            kind: String::new(),
            attributes: Vec::new(),
        }
    }
}

/// Compiled schema: scopes with pre-built glob matchers.
pub struct Schema {
    scopes: Vec<(GlobMatcher, SchemaScope)>,
}

impl Schema {
    pub fn empty() -> Schema {
        Schema { scopes: Vec::new() }
    }

    pub fn compile(scopes: &[SchemaScope]) -> Result<Schema, NtError> {
        let mut compiled = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let matcher = Glob::new(&scope.path)
                .map_err(|e| NtError::InvalidConfig(format!("schema path `{}`: {e}", scope.path)))?
                .compile_matcher();
            compiled.push((matcher, scope.clone()));
        }
        Ok(Schema { scopes: compiled })
    }

    /// Definitions applying to a file path and note kind, in scope order.
    pub fn definitions_for(&self, rel_path: &str, kind: &str) -> Vec<&AttributeDefinition> {
        self.scopes
            .iter()
            .filter(|(matcher, scope)| {
                matcher.is_match(rel_path)
                    && (scope.kind.is_empty() || scope.kind.eq_ignore_ascii_case(kind))
            })
            .flat_map(|(_, scope)| scope.attributes.iter())
            .collect()
    }

    /// Find the definition (if any) for a key, resolving aliases to the
    /// canonical name.
    fn definition_for_key<'s>(
        defs: &'s [&AttributeDefinition],
        key: &str,
    ) -> Option<&'s AttributeDefinition> {
        defs.iter()
            .find(|d| d.name == key || d.aliases.iter().any(|a| a == key))
            .copied()
    }

    /// Coerce each recognised key of `attrs` to its declared type; alias keys
    /// are renamed to the canonical name; unrecognised keys pass through.
    pub fn cast(&self, rel_path: &str, kind: &str, attrs: &Attributes) -> Result<Attributes, NtError> {
        let defs = self.definitions_for(rel_path, kind);
        let mut out = Attributes::new();
        for (key, value) in attrs.iter() {
            match Self::definition_for_key(&defs, key) {
                Some(def) => {
                    let cast = cast_value(value, def)?;
                    out.insert(def.name.clone(), cast);
                }
                None => out.insert(key.clone(), value.clone()),
            }
        }
        Ok(out)
    }

    /// Drop attributes whose definition says `inherit = false`. Attributes
    /// without a definition inherit by default.
    pub fn inherit_filter(&self, rel_path: &str, kind: &str, attrs: &Attributes) -> Attributes {
        let defs = self.definitions_for(rel_path, kind);
        attrs
            .iter()
            .filter(|(key, _)| {
                Self::definition_for_key(&defs, key).is_none_or(|def| def.inherit)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Required attribute names for a scope (consumed by lint).
    pub fn required_for(&self, rel_path: &str, kind: &str) -> Vec<&AttributeDefinition> {
        self.definitions_for(rel_path, kind)
            .into_iter()
            .filter(|d| d.required)
            .collect()
    }
}

fn cast_value(value: &AttributeValue, def: &AttributeDefinition) -> Result<AttributeValue, NtError> {
    let fail = |expected: &str| NtError::InvalidAttributeType {
        name: def.name.clone(),
        expected: expected.to_string(),
        value: value.to_display_string(),
    };
    match def.value_type {
        AttributeType::String => Ok(match value {
            AttributeValue::String(_) => value.clone(),
            AttributeValue::Integer(i) => AttributeValue::String(i.to_string()),
            AttributeValue::Float(f) => AttributeValue::String(f.to_string()),
            AttributeValue::Bool(b) => AttributeValue::String(b.to_string()),
            _ => return Err(fail("string")),
        }),
        AttributeType::Integer => match value {
            AttributeValue::Integer(_) => Ok(value.clone()),
            AttributeValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(AttributeValue::Integer)
                .map_err(|_| fail("integer")),
            _ => Err(fail("integer")),
        },
        AttributeType::Float => match value {
            AttributeValue::Float(_) => Ok(value.clone()),
            AttributeValue::Integer(i) => Ok(AttributeValue::Float(*i as f64)),
            AttributeValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(AttributeValue::Float)
                .map_err(|_| fail("float")),
            _ => Err(fail("float")),
        },
        AttributeType::Bool => match value {
            AttributeValue::Bool(_) => Ok(value.clone()),
            AttributeValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(AttributeValue::Bool(true)),
                "false" | "no" => Ok(AttributeValue::Bool(false)),
                _ => Err(fail("bool")),
            },
            _ => Err(fail("bool")),
        },
        AttributeType::Array => match value {
            AttributeValue::Sequence(_) => Ok(value.clone()),
            // A lone scalar becomes a one-element sequence.
            scalar @ (AttributeValue::String(_)
            | AttributeValue::Integer(_)
            | AttributeValue::Float(_)
            | AttributeValue::Bool(_)) => {
                Ok(AttributeValue::Sequence(vec![scalar.clone()]))
            }
            _ => Err(fail("array")),
        },
        AttributeType::Map => match value {
            AttributeValue::Map(_) => Ok(value.clone()),
            _ => Err(fail("map")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(defs: Vec<AttributeDefinition>) -> Schema {
        Schema::compile(&[SchemaScope {
            path: "**".to_string(),
            kind: String::new(),
            attributes: defs,
        }])
        .unwrap()
    }

    #[test]
    fn test_cast_isbn_stays_string() {
        let schema = schema_with(vec![AttributeDefinition {
            name: "isbn".into(),
            value_type: AttributeType::String,
            ..Default::default()
        }]);
        let mut attrs = Attributes::new();
        attrs.insert("isbn", AttributeValue::Integer(9780807014271));
        let cast = schema.cast("references/walden.md", "reference", &attrs).unwrap();
        assert_eq!(
            cast.get("isbn"),
            Some(&AttributeValue::String("9780807014271".into()))
        );
    }

    #[test]
    fn test_cast_scalar_to_array() {
        let schema = schema_with(vec![AttributeDefinition {
            name: "tags".into(),
            value_type: AttributeType::Array,
            ..Default::default()
        }]);
        let mut attrs = Attributes::new();
        attrs.insert("tags", AttributeValue::String("favorite".into()));
        let cast = schema.cast("a.md", "note", &attrs).unwrap();
        assert_eq!(
            cast.get("tags"),
            Some(&AttributeValue::Sequence(vec![AttributeValue::String(
                "favorite".into()
            )]))
        );
    }

    #[test]
    fn test_cast_alias_renames() {
        let schema = schema_with(vec![AttributeDefinition {
            name: "author".into(),
            aliases: vec!["by".into()],
            ..Default::default()
        }]);
        let mut attrs = Attributes::new();
        attrs.insert("by", AttributeValue::String("Thoreau".into()));
        let cast = schema.cast("a.md", "quote", &attrs).unwrap();
        assert!(cast.contains_key("author"));
        assert!(!cast.contains_key("by"));
    }

    #[test]
    fn test_cast_unknown_key_passes_through() {
        let schema = schema_with(vec![]);
        let mut attrs = Attributes::new();
        attrs.insert("anything", AttributeValue::Integer(42));
        let cast = schema.cast("a.md", "note", &attrs).unwrap();
        assert_eq!(cast.get("anything"), Some(&AttributeValue::Integer(42)));
    }

    #[test]
    fn test_cast_bad_integer_fails() {
        let schema = schema_with(vec![AttributeDefinition {
            name: "year".into(),
            value_type: AttributeType::Integer,
            ..Default::default()
        }]);
        let mut attrs = Attributes::new();
        attrs.insert("year", AttributeValue::String("MCMXCIV".into()));
        assert!(matches!(
            schema.cast("a.md", "note", &attrs),
            Err(NtError::InvalidAttributeType { .. })
        ));
    }

    #[test]
    fn test_inherit_filter() {
        let schema = schema_with(vec![AttributeDefinition {
            name: "slug".into(),
            inherit: false,
            ..Default::default()
        }]);
        let mut attrs = Attributes::new();
        attrs.insert("slug", AttributeValue::String("custom".into()));
        attrs.insert("author", AttributeValue::String("Thoreau".into()));
        let filtered = schema.inherit_filter("a.md", "note", &attrs);
        assert!(!filtered.contains_key("slug"));
        assert!(filtered.contains_key("author"));
    }

    #[test]
    fn test_scope_path_and_kind_restriction() {
        let schema = Schema::compile(&[SchemaScope {
            path: "references/**".to_string(),
            kind: "reference".to_string(),
            attributes: vec![AttributeDefinition {
                name: "isbn".into(),
                required: true,
                ..Default::default()
            }],
        }])
        .unwrap();
        assert_eq!(schema.required_for("references/books/walden.md", "reference").len(), 1);
        assert!(schema.required_for("journal/2024.md", "reference").is_empty());
        assert!(schema.required_for("references/books/walden.md", "note").is_empty());
    }
}
