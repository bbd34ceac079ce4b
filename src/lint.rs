//! Lint engine: rules over parse results, driven by the attribute schema.
//!
//! Rules are pure — they look at one [`ParsedFile`] (plus shared state the
//! engine carries for cross-file checks like go-name uniqueness) and report
//! violations. `nt lint` exits 2 when any rule fires; `add` records schema
//! violations without blocking unless strict mode is on.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

use crate::{
    attribute::schema::Schema,
    errors::NtError,
    parser::{ParsedFile, Parser, ParserOptions},
};

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub line: usize,
    pub rule: String,
    pub message: String,
}

/// A lint rule over one parsed file.
pub trait Rule {
    fn name(&self) -> &'static str;
    fn check(&self, parsed: &ParsedFile, schema: &Schema) -> Vec<Violation>;
}

/// `missing-required-attribute`: every required schema attribute must be
/// present on matching notes.
pub struct MissingRequiredAttribute;

impl Rule for MissingRequiredAttribute {
    fn name(&self) -> &'static str {
        "missing-required-attribute"
    }

    fn check(&self, parsed: &ParsedFile, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();
        for note in &parsed.notes {
            for def in schema.required_for(&parsed.rel_path, note.kind.as_str()) {
                if !note.attributes.contains_key(&def.name) {
                    violations.push(Violation {
                        path: parsed.rel_path.clone(),
                        line: note.line,
                        rule: self.name().to_string(),
                        message: format!(
                            "note \"{}\" is missing required attribute `{}`",
                            note.short_title, def.name
                        ),
                    });
                }
            }
        }
        violations
    }
}

/// `pattern-mismatch`: attribute values must match their declared regex.
pub struct PatternMismatch;

impl Rule for PatternMismatch {
    fn name(&self) -> &'static str {
        "pattern-mismatch"
    }

    fn check(&self, parsed: &ParsedFile, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();
        for note in &parsed.notes {
            for def in schema.definitions_for(&parsed.rel_path, note.kind.as_str()) {
                let Some(pattern) = &def.pattern else {
                    continue;
                };
                let Ok(re) = Regex::new(pattern) else {
                    continue;
                };
                if let Some(value) = note.attributes.get(&def.name) {
                    let rendered = value.to_display_string();
                    if !re.is_match(&rendered) {
                        violations.push(Violation {
                            path: parsed.rel_path.clone(),
                            line: note.line,
                            rule: self.name().to_string(),
                            message: format!(
                                "attribute `{}` value `{rendered}` does not match `{pattern}`",
                                def.name
                            ),
                        });
                    }
                }
            }
        }
        violations
    }
}

/// `dangling-media`: referenced media files must exist on disk.
pub struct DanglingMedia;

impl Rule for DanglingMedia {
    fn name(&self) -> &'static str {
        "dangling-media"
    }

    fn check(&self, parsed: &ParsedFile, _schema: &Schema) -> Vec<Violation> {
        parsed
            .medias
            .iter()
            .filter(|m| m.dangling)
            .map(|m| Violation {
                path: parsed.rel_path.clone(),
                line: m.line,
                rule: self.name().to_string(),
                message: format!("media `{}` does not exist", m.raw_path),
            })
            .collect()
    }
}

static RULES: LazyLock<Vec<Box<dyn Rule + Send + Sync>>> = LazyLock::new(|| {
    vec![
        Box::new(MissingRequiredAttribute),
        Box::new(PatternMismatch),
        Box::new(DanglingMedia),
    ]
});

/// Runs every enabled rule over a set of files, tracking cross-file state
/// (go-name uniqueness).
pub struct Linter<'a> {
    root: std::path::PathBuf,
    schema: &'a Schema,
    options: ParserOptions,
    disabled: Vec<String>,
}

impl<'a> Linter<'a> {
    pub fn new(
        root: &std::path::Path,
        schema: &'a Schema,
        options: ParserOptions,
        disabled: &[String],
    ) -> Linter<'a> {
        Linter {
            root: root.to_path_buf(),
            schema,
            options,
            disabled: disabled.to_vec(),
        }
    }

    /// Lint the given working-tree files (relative paths, lexicographic).
    pub fn run(&self, rel_paths: &[String]) -> Result<Vec<Violation>, NtError> {
        let parser = Parser::new(&self.root, self.schema, self.options.clone());
        let mut violations = Vec::new();
        // go-name -> first (path, line) seen.
        let mut go_names: BTreeMap<String, (String, usize)> = BTreeMap::new();

        for rel_path in rel_paths {
            let parsed = match parser.parse_file(rel_path) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    violations.push(Violation {
                        path: rel_path.clone(),
                        line: 0,
                        rule: "parse-error".to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            for rule in RULES.iter() {
                if self.disabled.iter().any(|d| d == rule.name()) {
                    continue;
                }
                violations.extend(rule.check(&parsed, self.schema));
            }
            if !self.disabled.iter().any(|d| d == "duplicate-go-name") {
                for golink in &parsed.golinks {
                    let line = parsed.notes[golink.note].line;
                    match go_names.get(&golink.go_name) {
                        Some((first_path, first_line)) => violations.push(Violation {
                            path: rel_path.clone(),
                            line,
                            rule: "duplicate-go-name".to_string(),
                            message: format!(
                                "go/{} already defined at {first_path}:{first_line}",
                                golink.go_name
                            ),
                        }),
                        None => {
                            go_names.insert(golink.go_name.clone(), (rel_path.clone(), line));
                        }
                    }
                }
            }
        }
        Ok(violations)
    }
}

/// Convenience entry point for the CLI: lint matching files of a repository
/// working tree.
pub fn lint_paths(
    root: &std::path::Path,
    schema: &Schema,
    options: ParserOptions,
    disabled: &[String],
    rel_paths: &[String],
) -> Result<Vec<Violation>, NtError> {
    Linter::new(root, schema, options, disabled).run(rel_paths)
}

#[cfg(test)]
mod tests {
    use crate::attribute::schema::{AttributeDefinition, SchemaScope};

    use super::*;

    fn write(root: &std::path::Path, rel: &str, content: &str) {
        let abs = root.join(rel);
        std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
        std::fs::write(abs, content).unwrap();
    }

    fn schema_with(defs: Vec<AttributeDefinition>) -> Schema {
        Schema::compile(&[SchemaScope {
            path: "**".to_string(),
            kind: "reference".to_string(),
            attributes: defs,
        }])
        .unwrap()
    }

    #[test]
    fn test_missing_required_attribute() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "refs.md",
            "# Refs\n\n## Reference: Walden\n\nA book without an ISBN.",
        );
        let schema = schema_with(vec![AttributeDefinition {
            name: "isbn".into(),
            required: true,
            ..Default::default()
        }]);
        let violations = lint_paths(
            dir.path(),
            &schema,
            ParserOptions::default(),
            &[],
            &["refs.md".to_string()],
        )
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "missing-required-attribute");
    }

    #[test]
    fn test_pattern_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "refs.md",
            "# Refs\n\n## Reference: Walden\n\n<!-- isbn: not-an-isbn -->\n\nA book.",
        );
        let schema = schema_with(vec![AttributeDefinition {
            name: "isbn".into(),
            pattern: Some("^97[89][0-9]{10}$".to_string()),
            ..Default::default()
        }]);
        let violations = lint_paths(
            dir.path(),
            &schema,
            ParserOptions::default(),
            &[],
            &["refs.md".to_string()],
        )
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "pattern-mismatch");
    }

    #[test]
    fn test_duplicate_go_name() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.md",
            "# A\n\n## Note: one\n\n[docs](https://a.example \"x #go/docs\")",
        );
        write(
            dir.path(),
            "b.md",
            "# B\n\n## Note: two\n\n[docs](https://b.example \"y #go/docs\")",
        );
        let schema = Schema::empty();
        let violations = lint_paths(
            dir.path(),
            &schema,
            ParserOptions::default(),
            &[],
            &["a.md".to_string(), "b.md".to_string()],
        )
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "duplicate-go-name");
        assert_eq!(violations[0].path, "b.md");
    }

    #[test]
    fn test_dangling_media() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "# A\n\n## Note: pic\n\n![gone](missing.png)");
        let violations = lint_paths(
            dir.path(),
            &Schema::empty(),
            ParserOptions::default(),
            &[],
            &["a.md".to_string()],
        )
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "dangling-media");
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "# A\n\n## Note: pic\n\n![gone](missing.png)");
        let violations = lint_paths(
            dir.path(),
            &Schema::empty(),
            ParserOptions::default(),
            &["dangling-media".to_string()],
            &["a.md".to_string()],
        )
        .unwrap();
        assert!(violations.is_empty());
    }
}
