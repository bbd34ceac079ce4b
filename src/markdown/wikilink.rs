//! Wikilink (`[[target#section|label]]`) recognition.
//!
//! The grammar follows the usual note-taking convention: an optional target,
//! an optional `#section` fragment and an optional `|label`, all inside
//! double brackets. Links inside fenced code blocks are ignored.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]|#]+?)(?:#([^\[\]|]+?))?(?:\|([^\[\]]+?))?\]\]").unwrap()
});
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}(```+|~~~+)").unwrap());

/// One `[[...]]` reference found in a block of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wikilink {
    /// The note name or partial path being referenced.
    pub target: String,
    /// A heading inside the target, when `#section` was given.
    pub section: Option<String>,
    /// The display label, when `|label` was given.
    pub label: Option<String>,
    /// 1-based line number within the scanned text.
    pub line: usize,
}

impl fmt::Display for Wikilink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.section, &self.label) {
            (_, Some(label)) => write!(f, "{label}"),
            (Some(section), None) => write!(f, "{} > {}", self.target, section),
            (None, None) => write!(f, "{}", self.target),
        }
    }
}

/// Collect every wikilink in `text`, skipping fenced code blocks.
pub fn extract_wikilinks(text: &str) -> Vec<Wikilink> {
    let mut links = Vec::new();
    let mut fence: Option<char> = None;

    for (idx, line) in text.lines().enumerate() {
        if let Some(open) = fence {
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == open) {
                fence = None;
            }
            continue;
        }
        if let Some(cap) = FENCE_RE.captures(line) {
            fence = cap[1].chars().next();
            continue;
        }
        for cap in WIKILINK_RE.captures_iter(line) {
            links.push(Wikilink {
                target: cap[1].trim().to_string(),
                section: cap.get(2).map(|m| m.as_str().trim().to_string()),
                label: cap.get(3).map(|m| m.as_str().to_string()),
                line: idx + 1,
            });
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_link() {
        let links = extract_wikilinks("See [[Walden]] for details.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Walden");
        assert_eq!(links[0].section, None);
        assert_eq!(links[0].label, None);
        assert_eq!(links[0].line, 1);
    }

    #[test]
    fn test_section_and_label() {
        let links = extract_wikilinks("[[Walden#Economy|the first chapter]]");
        assert_eq!(links[0].target, "Walden");
        assert_eq!(links[0].section.as_deref(), Some("Economy"));
        assert_eq!(links[0].label.as_deref(), Some("the first chapter"));
    }

    #[test]
    fn test_multiple_links_with_lines() {
        let links = extract_wikilinks("[[One]]\ntext\n[[Two]] and [[Three]]");
        assert_eq!(links.len(), 3);
        assert_eq!(links[1].line, 3);
        assert_eq!(links[2].line, 3);
    }

    #[test]
    fn test_link_inside_code_fence_ignored() {
        let links = extract_wikilinks("```\n[[NotALink]]\n```\n[[Real]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Real");
    }

    #[test]
    fn test_display() {
        let link = Wikilink {
            target: "Walden".into(),
            section: Some("Economy".into()),
            label: None,
            line: 1,
        };
        assert_eq!(link.to_string(), "Walden > Economy");
    }
}
