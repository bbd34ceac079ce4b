//! Extraction of inline tags and HTML-comment attributes from Markdown text.
//!
//! Two inline forms are recognised:
//!
//! - lines whose only content is a run of backtick-wrapped tags:
//!   `` `#books` `#favorite` `` — the line is removed and the tag names
//!   collected;
//! - HTML-comment attribute assignments on their own line:
//!   `<!-- author: Henry David Thoreau -->` — removed and collected as a
//!   typed attribute.
//!
//! Lines inside fenced code blocks are never touched.

use std::sync::LazyLock;

use regex::Regex;

use crate::attribute::{AttributeValue, Attributes};

static TAG_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(`#[A-Za-z0-9][\w/-]*`\s*)+$").unwrap());
static TAG_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`#([A-Za-z0-9][\w/-]*)`").unwrap());
static COMMENT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<!--\s*([A-Za-z_][\w.-]*)\s*:\s*(.*?)\s*-->\s*$").unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}(```+|~~~+)").unwrap());

/// Result of scrubbing a Markdown block.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    /// The block with tag lines and comment attributes removed.
    pub text: String,
    /// Tag names, in order of appearance, duplicates removed.
    pub tags: Vec<String>,
    /// Attribute assignments from HTML comments, in order of appearance.
    pub attributes: Attributes,
}

/// Remove tag-only lines and comment attributes from `block`, collecting
/// them. The remaining text keeps its line structure.
pub fn extract(block: &str) -> Extracted {
    let mut out = Extracted::default();
    let mut kept: Vec<&str> = Vec::new();
    let mut fence: Option<String> = None;

    for line in block.lines() {
        if let Some(open) = &fence {
            kept.push(line);
            if is_closing_fence(line, open) {
                fence = None;
            }
            continue;
        }
        if let Some(m) = FENCE_RE.captures(line) {
            fence = Some(m[1].to_string());
            kept.push(line);
            continue;
        }
        if TAG_LINE_RE.is_match(line) {
            for cap in TAG_TOKEN_RE.captures_iter(line) {
                let tag = cap[1].to_string();
                if !out.tags.contains(&tag) {
                    out.tags.push(tag);
                }
            }
            continue;
        }
        if let Some(cap) = COMMENT_ATTR_RE.captures(line) {
            let key = cap[1].to_string();
            out.attributes.insert(key, parse_scalar(&cap[2]));
            continue;
        }
        kept.push(line);
    }

    out.text = kept.join("\n");
    out
}

fn is_closing_fence(line: &str, open: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(open) && trimmed.trim_end().chars().all(|c| c == open.chars().next().unwrap())
}

/// Parse a comment-attribute value the way YAML would type a scalar.
fn parse_scalar(raw: &str) -> AttributeValue {
    let raw = raw.trim();
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(value) => AttributeValue::from_yaml(&value)
            .unwrap_or_else(|| AttributeValue::String(raw.to_string())),
        Err(_) => AttributeValue::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag_line() {
        let block = "Some text.\n`#books` `#favorite`\nMore text.";
        let extracted = extract(block);
        assert_eq!(extracted.tags, vec!["books", "favorite"]);
        assert_eq!(extracted.text, "Some text.\nMore text.");
    }

    #[test]
    fn test_inline_tag_not_alone_is_kept() {
        let block = "Remember to water the plants `#reminder-every-month` today.";
        let extracted = extract(block);
        assert!(extracted.tags.is_empty());
        assert_eq!(extracted.text, block);
    }

    #[test]
    fn test_extract_comment_attributes() {
        let block = "A quote body.\n<!-- author: Henry David Thoreau -->\n<!-- year: 1854 -->";
        let extracted = extract(block);
        assert_eq!(extracted.text, "A quote body.");
        assert_eq!(
            extracted.attributes.get("author"),
            Some(&AttributeValue::String("Henry David Thoreau".into()))
        );
        assert_eq!(
            extracted.attributes.get("year"),
            Some(&AttributeValue::Integer(1854))
        );
    }

    #[test]
    fn test_code_fence_is_untouched() {
        let block = "```\n`#not-a-tag`\n<!-- key: value -->\n```";
        let extracted = extract(block);
        assert!(extracted.tags.is_empty());
        assert!(extracted.attributes.is_empty());
        assert_eq!(extracted.text, block);
    }

    #[test]
    fn test_duplicate_tags_collapse() {
        let block = "`#life`\n\n`#life` `#books`";
        let extracted = extract(block);
        assert_eq!(extracted.tags, vec!["life", "books"]);
    }

    #[test]
    fn test_non_comment_html_kept() {
        let block = "<!-- just a comment without a colon key -->";
        let extracted = extract(block);
        assert_eq!(extracted.text, block);
    }
}
