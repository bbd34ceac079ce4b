//! Markdown document model: front matter, body, and a level-nested tree of
//! sections keyed by ATX headings.
//!
//! The model is deliberately line-oriented — sections keep their exact source
//! text and two 1-based line ranges (file-relative for diagnostics,
//! body-relative for everything downstream). Fenced code blocks suppress
//! heading and wikilink detection; a horizontal rule inside the body is inert
//! (flashcards use it as their front/back separator).

pub mod wikilink;

use std::{path::Path, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::NtError;
use wikilink::{Wikilink, extract_wikilinks};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.*?)[ \t]*#*[ \t]*$").unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(```+|~~~+)").unwrap());

/// 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// One heading-rooted section of a document.
///
/// `content` spans from the heading line to the line before the next heading
/// of the same or a shallower level, sub-sections included. `own_content` is
/// the text this section owns exclusively: the lines between its heading and
/// the next heading of any level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text without the leading `#` run.
    pub heading: String,
    /// ATX level, 1–6.
    pub level: usize,
    /// Full section text, heading included.
    pub content: String,
    /// Text owned by this section alone, heading excluded.
    pub own_content: String,
    /// Position relative to the whole file (for diagnostics).
    pub file_lines: LineRange,
    /// Position relative to the body.
    pub body_lines: LineRange,
    /// Index of the enclosing section in `MarkdownFile::sections`.
    pub parent: Option<usize>,
}

impl Section {
    /// Inline wikilinks in this section's text, code fences excluded.
    pub fn wikilinks(&self) -> Vec<Wikilink> {
        extract_wikilinks(&self.content)
    }
}

/// A parsed Markdown document.
#[derive(Debug, Clone, Default)]
pub struct MarkdownFile {
    /// Front-matter mapping; empty when the file has none.
    pub front_matter: serde_yaml::Mapping,
    /// Document body, starting at the first non-blank line after the front
    /// matter.
    pub body: String,
    /// 1-based file line where the body starts.
    pub body_start_line: usize,
    /// Sections in source order.
    pub sections: Vec<Section>,
    /// Non-fatal oddities found while parsing (unterminated fences).
    pub warnings: Vec<String>,
}

impl MarkdownFile {
    /// Parse a Markdown document. `path` is used for diagnostics only.
    pub fn parse(path: &Path, content: &str) -> Result<MarkdownFile, NtError> {
        let lines: Vec<&str> = content.lines().collect();
        let mut doc = MarkdownFile::default();

        // Front matter: a pair of `---` fences at the very start.
        let mut body_first_idx = 0;
        if lines.first().map(|l| l.trim_end()) == Some("---") {
            let close = lines[1..]
                .iter()
                .position(|l| l.trim_end() == "---")
                .map(|p| p + 1)
                .ok_or_else(|| NtError::FrontMatter {
                    path: path.to_path_buf(),
                    reason: "unterminated `---` fence".to_string(),
                })?;
            let raw = lines[1..close].join("\n");
            doc.front_matter = if raw.trim().is_empty() {
                serde_yaml::Mapping::new()
            } else {
                serde_yaml::from_str(&raw).map_err(|e| NtError::FrontMatter {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            };
            body_first_idx = close + 1;
        }
        while body_first_idx < lines.len() && lines[body_first_idx].trim().is_empty() {
            body_first_idx += 1;
        }
        doc.body_start_line = body_first_idx + 1;

        let body_lines: Vec<&str> = lines[body_first_idx.min(lines.len())..].to_vec();
        doc.body = body_lines.join("\n");

        // Mark lines inside fenced code blocks. An opening fence with no
        // closer is inert text and surfaces a warning.
        let mut in_code = vec![false; body_lines.len()];
        let mut i = 0;
        while i < body_lines.len() {
            if let Some(cap) = FENCE_RE.captures(body_lines[i]) {
                let marker = &cap[1];
                let fence_char = marker.chars().next().unwrap_or('`');
                let close = body_lines[i + 1..].iter().position(|l| {
                    let t = l.trim();
                    t.len() >= marker.len() && t.chars().all(|c| c == fence_char)
                });
                match close {
                    Some(offset) => {
                        for flag in in_code.iter_mut().take(i + 1 + offset + 1).skip(i) {
                            *flag = true;
                        }
                        i += offset + 2;
                    }
                    None => {
                        doc.warnings.push(format!(
                            "{}:{}: unterminated code fence",
                            path.display(),
                            body_first_idx + i + 1
                        ));
                        i += 1;
                    }
                }
            } else {
                i += 1;
            }
        }

        // Collect headings outside code.
        let mut headings: Vec<(usize, usize, String)> = Vec::new();
        for (idx, line) in body_lines.iter().enumerate() {
            if in_code[idx] {
                continue;
            }
            if let Some(cap) = HEADING_RE.captures(line) {
                headings.push((idx, cap[1].len(), cap[2].to_string()));
            }
        }

        // Build sections with level-based extents and parents.
        for (pos, (idx, level, heading)) in headings.iter().enumerate() {
            let container_end = headings[pos + 1..]
                .iter()
                .find(|(_, l, _)| l <= level)
                .map(|(j, _, _)| *j)
                .unwrap_or(body_lines.len());
            let own_end = headings
                .get(pos + 1)
                .map(|(j, _, _)| *j)
                .unwrap_or(body_lines.len());
            let parent = headings[..pos]
                .iter()
                .rposition(|(_, l, _)| l < level);

            doc.sections.push(Section {
                heading: heading.clone(),
                level: *level,
                content: body_lines[*idx..container_end].join("\n"),
                own_content: body_lines[idx + 1..own_end].join("\n"),
                file_lines: LineRange {
                    start: body_first_idx + idx + 1,
                    end: body_first_idx + container_end,
                },
                body_lines: LineRange {
                    start: idx + 1,
                    end: container_end,
                },
                parent,
            });
        }

        Ok(doc)
    }

    /// Direct children of the section at `index`.
    pub fn children_of(&self, index: usize) -> Vec<&Section> {
        self.sections
            .iter()
            .filter(|s| s.parent == Some(index))
            .collect()
    }

    /// Wikilinks across the whole body, code fences excluded.
    pub fn wikilinks(&self) -> Vec<Wikilink> {
        extract_wikilinks(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> MarkdownFile {
        MarkdownFile::parse(Path::new("test.md"), content).unwrap()
    }

    #[test]
    fn test_front_matter_and_body() {
        let doc = parse("---\ntitle: Walden\ntags: [books]\n---\n\n# Walden\n\nBody.");
        assert_eq!(
            doc.front_matter.get(serde_yaml::Value::String("title".into())),
            Some(&serde_yaml::Value::String("Walden".into()))
        );
        assert_eq!(doc.body_start_line, 6);
        assert!(doc.body.starts_with("# Walden"));
    }

    #[test]
    fn test_no_front_matter() {
        let doc = parse("# Title\n\nText.");
        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body_start_line, 1);
    }

    #[test]
    fn test_malformed_front_matter() {
        let err = MarkdownFile::parse(Path::new("bad.md"), "---\n{ not: [valid\n---\nBody.");
        assert!(matches!(err, Err(NtError::FrontMatter { .. })));
    }

    #[test]
    fn test_unterminated_front_matter() {
        let err = MarkdownFile::parse(Path::new("bad.md"), "---\ntitle: x\nno close");
        assert!(matches!(err, Err(NtError::FrontMatter { .. })));
    }

    #[test]
    fn test_section_tree() {
        let doc = parse("# A\n\nintro\n\n## Note: One\n\nbody one\n\n### Sub\n\ndeep\n\n## Note: Two\n\nbody two");
        let headings: Vec<&str> = doc.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["A", "Note: One", "Sub", "Note: Two"]);
        assert_eq!(doc.sections[0].parent, None);
        assert_eq!(doc.sections[1].parent, Some(0));
        assert_eq!(doc.sections[2].parent, Some(1));
        assert_eq!(doc.sections[3].parent, Some(0));
        // "Note: One" contains its sub-section, but owns only its own text.
        assert!(doc.sections[1].content.contains("### Sub"));
        assert!(!doc.sections[1].own_content.contains("### Sub"));
        assert!(doc.sections[1].own_content.contains("body one"));
    }

    #[test]
    fn test_heading_inside_fence_ignored() {
        let doc = parse("# A\n\n```\n# not a heading\n```\n\n## B");
        let headings: Vec<&str> = doc.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["A", "B"]);
    }

    #[test]
    fn test_indented_code_suppresses_heading() {
        let doc = parse("# A\n\n    # indented code, not a heading\n\ntext");
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn test_unterminated_fence_is_inert() {
        let doc = parse("# A\n\n```\n# Heading After Unterminated Fence");
        assert_eq!(doc.warnings.len(), 1);
        // The fence is inert text, so the heading is still detected.
        assert_eq!(doc.sections.len(), 2);
    }

    #[test]
    fn test_line_ranges() {
        let doc = parse("---\nk: v\n---\n\n# A\n\ntext\n\n## B\n\nmore");
        // Body starts at file line 5.
        assert_eq!(doc.body_start_line, 5);
        let a = &doc.sections[0];
        assert_eq!(a.body_lines.start, 1);
        assert_eq!(a.file_lines.start, 5);
        let b = &doc.sections[1];
        assert_eq!(b.body_lines.start, 5);
        assert_eq!(b.file_lines.start, 9);
    }

    #[test]
    fn test_horizontal_rule_is_inert() {
        let doc = parse("# Flashcard: Q\n\nfront\n\n---\n\nback");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].content.contains("---"));
    }
}
