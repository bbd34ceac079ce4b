//! Markdown-to-object parsing.
//!
//! `Parser::parse_file` turns one Markdown document into a [`ParsedFile`]: a
//! stateless, environment-agnostic graph of notes, flashcards, go-links,
//! reminders, medias and wikilinks. The object model later lifts this graph
//! into stateful records with stable OIDs.
//!
//! Kinds are detected from heading text (`## Note: ...`, `## Flashcard: ...`);
//! attribute and tag scopes nest file → parent note → note; generator notes
//! are executed in a subprocess and their stdout parsed in place.

pub mod generator;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    attribute::{Attributes, AttributeValue, extract::extract, schema::Schema},
    clock,
    errors::NtError,
    markdown::{MarkdownFile, wikilink::Wikilink},
    oid::Oid,
    utils::normalize_rel_path,
};
use generator::{Generator, GeneratorSite, first_code_block};

static KIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(Note|Reference|Flashcard|Quote|Cheatsheet|Todo|Artwork|Snippet|Journal|Generator)[-: _]\s*(.*)$",
    )
    .unwrap()
});
static HR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(-{3,}|\*{3,}|_{3,})\s*$").unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(```+|~~~+)").unwrap());
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"!\[[^\]]*\]\(([^)\s"]+)(?:\s+"[^"]*")?\)"#).unwrap());
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|[^!])\[([^\]]*)\]\(([^)\s"]+)(?:\s+"([^"]*)")?\)"#).unwrap());
static GO_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#go/([A-Za-z0-9][\w-]*)").unwrap());
static REMINDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`#reminder-([^`\s]+)`").unwrap());
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.*)$").unwrap());

/// Asciidoc-style entity substitutions applied outside code.
const ENTITIES: &[(&str, &str)] = &[
    ("(TM)", "™"),
    ("(C)", "©"),
    ("(R)", "®"),
    ("...", "…"),
    ("<=", "⇐"),
    ("=>", "⇒"),
    ("<-", "←"),
    ("->", "→"),
];

/// Recognised note kinds. A heading that matches no kind prefix is `Free`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    #[default]
    Free,
    Note,
    Reference,
    Flashcard,
    Quote,
    Cheatsheet,
    Todo,
    Artwork,
    Snippet,
    Journal,
    Generator,
}

impl NoteKind {
    /// Detect the kind and short title from a heading text.
    pub fn detect(heading: &str) -> (NoteKind, String) {
        if let Some(cap) = KIND_RE.captures(heading) {
            let kind = match cap[1].to_ascii_lowercase().as_str() {
                "note" => NoteKind::Note,
                "reference" => NoteKind::Reference,
                "flashcard" => NoteKind::Flashcard,
                "quote" => NoteKind::Quote,
                "cheatsheet" => NoteKind::Cheatsheet,
                "todo" => NoteKind::Todo,
                "artwork" => NoteKind::Artwork,
                "snippet" => NoteKind::Snippet,
                "journal" => NoteKind::Journal,
                "generator" => NoteKind::Generator,
                _ => NoteKind::Free,
            };
            (kind, cap[2].trim().to_string())
        } else {
            (NoteKind::Free, heading.trim().to_string())
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            NoteKind::Free => "free",
            NoteKind::Note => "note",
            NoteKind::Reference => "reference",
            NoteKind::Flashcard => "flashcard",
            NoteKind::Quote => "quote",
            NoteKind::Cheatsheet => "cheatsheet",
            NoteKind::Todo => "todo",
            NoteKind::Artwork => "artwork",
            NoteKind::Snippet => "snippet",
            NoteKind::Journal => "journal",
            NoteKind::Generator => "generator",
        }
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media categories, derived from the referenced file's extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Picture,
    Audio,
    Video,
    #[default]
    Other,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> MediaKind {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "tiff" => MediaKind::Picture,
            "mp3" | "wav" | "ogg" | "flac" | "m4a" => MediaKind::Audio,
            "mp4" | "webm" | "mov" | "avi" | "mkv" => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// One note lifted from a heading.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote {
    pub kind: NoteKind,
    pub level: usize,
    /// Full heading text.
    pub title: String,
    /// Heading text with the kind prefix stripped.
    pub short_title: String,
    pub slug: String,
    /// Index of the parent note in `ParsedFile::notes`.
    pub parent: Option<usize>,
    /// Merged attributes: file-level, parent note, own.
    pub attributes: Attributes,
    /// Union of ancestor tags and own tags.
    pub tags: Vec<String>,
    /// Canonical body: tags, comment attributes and the note comment
    /// stripped, entities substituted.
    pub body: String,
    /// The original body, untouched.
    pub body_raw: String,
    /// Trailing HTML comment, when present.
    pub comment: Option<String>,
    /// 1-based line of the heading in the source file.
    pub line: usize,
    /// Hash of the canonical body.
    pub body_hash: Oid,
}

/// A flashcard derived from a note of kind `Flashcard`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFlashcard {
    /// Index of the owning note.
    pub note: usize,
    pub short_title: String,
    pub tags: Vec<String>,
    pub front: String,
    pub back: String,
}

/// A `#go/<name>` short link found inside a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGoLink {
    /// Index of the owning note.
    pub note: usize,
    pub text: String,
    pub url: String,
    pub title: String,
    pub go_name: String,
}

/// A `` `#reminder-<expr>` `` occurrence inside a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReminder {
    /// Index of the owning note.
    pub note: usize,
    /// The enclosing list-item text, or the note's short title.
    pub description: String,
    /// The raw tag, `#reminder-` prefix included.
    pub tag: String,
    /// The recurrence expression after `#reminder-`.
    pub expression: String,
}

/// A referenced binary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMedia {
    /// The path exactly as written in the document.
    pub raw_path: String,
    /// Repository-relative resolved path.
    pub rel_path: String,
    pub kind: MediaKind,
    pub extension: String,
    pub size: u64,
    pub mtime: Option<DateTime<Utc>>,
    /// True when the referenced file does not exist.
    pub dangling: bool,
    /// 1-based line of the first reference.
    pub line: usize,
}

/// The complete parse result for one Markdown file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub rel_path: String,
    pub slug: String,
    pub title: String,
    pub short_title: String,
    /// Schema-cast front matter merged over ancestor `index.md` attributes.
    pub attributes: Attributes,
    pub tags: Vec<String>,
    /// Body of the document (front matter excluded).
    pub body: String,
    pub body_hash: Oid,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub notes: Vec<ParsedNote>,
    pub flashcards: Vec<ParsedFlashcard>,
    pub golinks: Vec<ParsedGoLink>,
    pub reminders: Vec<ParsedReminder>,
    pub medias: Vec<ParsedMedia>,
    pub wikilinks: Vec<Wikilink>,
    pub warnings: Vec<String>,
}

impl Default for ParsedFile {
    fn default() -> Self {
        Self {
            rel_path: String::new(),
            slug: String::new(),
            title: String::new(),
            short_title: String::new(),
            attributes: Attributes::new(),
            tags: Vec::new(),
            body: String::new(),
            body_hash: Oid::nil(),
            size: 0,
            mtime: DateTime::UNIX_EPOCH,
            notes: Vec::new(),
            flashcards: Vec::new(),
            golinks: Vec::new(),
            reminders: Vec::new(),
            medias: Vec::new(),
            wikilinks: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Tunables threaded from the repository configuration.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub generator_timeout: Duration,
    pub generator_max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            generator_timeout: Duration::from_secs(30),
            generator_max_depth: 4,
        }
    }
}

/// Stateless parser over a repository root.
pub struct Parser<'a> {
    root: PathBuf,
    schema: &'a Schema,
    options: ParserOptions,
}

impl<'a> Parser<'a> {
    pub fn new(root: &Path, schema: &'a Schema, options: ParserOptions) -> Parser<'a> {
        Parser {
            root: root.to_path_buf(),
            schema,
            options,
        }
    }

    /// Parse one file from the working tree. Returns `Ok(None)` when the
    /// file carries the `ignore` tag.
    pub fn parse_file(&self, rel_path: &str) -> Result<Option<ParsedFile>, NtError> {
        let abs = self.root.join(rel_path);
        let content = std::fs::read_to_string(&abs)?;
        let metadata = std::fs::metadata(&abs)?;
        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| clock::now());
        self.parse_content(rel_path, &content, metadata.len(), mtime)
    }

    /// Parse already-read content (used by tests and the lint engine).
    pub fn parse_content(
        &self,
        rel_path: &str,
        content: &str,
        size: u64,
        mtime: DateTime<Utc>,
    ) -> Result<Option<ParsedFile>, NtError> {
        let path = Path::new(rel_path);
        let doc = MarkdownFile::parse(path, content)?;

        // File attributes: schema-cast front matter over ancestor attributes.
        let own_attrs = self.schema.cast(
            rel_path,
            "file",
            &Attributes::from_yaml_mapping(&doc.front_matter),
        )?;
        let inherited = self.ancestor_attributes(rel_path)?;
        let attributes = inherited.merge(&own_attrs);

        let mut tags = attribute_tags(&attributes);
        // Tag lines in the preamble (before any heading) count as file tags.
        let preamble_end = doc
            .sections
            .first()
            .map(|s| s.body_lines.start.saturating_sub(1))
            .unwrap_or(usize::MAX);
        let preamble: String = doc
            .body
            .lines()
            .take(preamble_end)
            .collect::<Vec<_>>()
            .join("\n");
        let preamble_extract = extract(&preamble);
        for tag in &preamble_extract.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        if tags.iter().any(|t| t == "ignore") {
            debug!(rel_path, "file carries the ignore tag, skipping");
            return Ok(None);
        }

        let slug = match attributes.get("slug").and_then(AttributeValue::as_str) {
            Some(s) => s.to_string(),
            None => file_slug(rel_path),
        };
        let title = attributes
            .get("title")
            .and_then(AttributeValue::as_str)
            .map(str::to_string)
            .or_else(|| {
                doc.sections
                    .iter()
                    .find(|s| s.level == 1)
                    .map(|s| s.heading.clone())
            })
            .unwrap_or_else(|| file_stem(rel_path));
        let short_title = attributes
            .get("short_title")
            .and_then(AttributeValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| title.clone());

        let mut parsed = ParsedFile {
            rel_path: rel_path.to_string(),
            slug,
            title,
            short_title,
            attributes,
            tags,
            body: doc.body.clone(),
            body_hash: Oid::for_content(doc.body.as_bytes()),
            size,
            mtime,
            warnings: doc.warnings.clone(),
            ..Default::default()
        };
        parsed.wikilinks = doc.wikilinks();

        let mut builder = FileBuilder {
            parser: self,
            parsed: &mut parsed,
            raw_medias: Vec::new(),
        };
        builder.process_doc(&doc, 0, None)?;
        let raw_medias = builder.raw_medias;
        self.collect_medias(&mut parsed, raw_medias);

        Ok(Some(parsed))
    }

    /// Attributes inherited through ancestor `index.md` files, root first,
    /// inheritance-filtered at each hop.
    fn ancestor_attributes(&self, rel_path: &str) -> Result<Attributes, NtError> {
        let mut merged = Attributes::new();
        let mut dir = PathBuf::new();
        let parts: Vec<&str> = rel_path.split('/').collect();
        // Ancestor chain: every index.md strictly above the file.
        for (i, part) in parts.iter().enumerate() {
            let index_rel = if dir.as_os_str().is_empty() {
                "index.md".to_string()
            } else {
                format!("{}/index.md", dir.display())
            };
            let is_last = i == parts.len() - 1;
            if !is_last || *part != "index.md" {
                let abs = self.root.join(&index_rel);
                if abs.exists() && index_rel != rel_path {
                    let content = std::fs::read_to_string(&abs)?;
                    let doc = MarkdownFile::parse(Path::new(&index_rel), &content)?;
                    let attrs = self.schema.cast(
                        &index_rel,
                        "file",
                        &Attributes::from_yaml_mapping(&doc.front_matter),
                    )?;
                    let filtered = self.schema.inherit_filter(&index_rel, "file", &attrs);
                    merged = merged.merge(&filtered);
                }
            }
            if is_last {
                break;
            }
            dir.push(part);
        }
        Ok(merged)
    }

    /// Stat each distinct raw media path and fill in its metadata.
    fn collect_medias(&self, parsed: &mut ParsedFile, raw: Vec<(String, usize)>) {
        let file_dir = Path::new(&parsed.rel_path)
            .parent()
            .unwrap_or(Path::new(""))
            .to_path_buf();
        let mut seen = Vec::new();
        for (raw_path, line) in raw {
            if seen.contains(&raw_path) {
                continue;
            }
            if raw_path.starts_with("http://") || raw_path.starts_with("https://") {
                continue;
            }
            seen.push(raw_path.clone());

            let joined = if let Some(stripped) = raw_path.strip_prefix('/') {
                PathBuf::from(stripped)
            } else {
                file_dir.join(&raw_path)
            };
            let rel = normalize_media_path(&joined);
            let extension = Path::new(&rel)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            let abs = self.root.join(&rel);
            let (size, mtime, dangling) = match std::fs::metadata(&abs) {
                Ok(meta) => (
                    meta.len(),
                    meta.modified().ok().map(DateTime::<Utc>::from),
                    false,
                ),
                Err(_) => (0, None, true),
            };
            parsed.medias.push(ParsedMedia {
                raw_path,
                rel_path: rel,
                kind: MediaKind::from_extension(&extension),
                extension,
                size,
                mtime,
                dangling,
                line,
            });
        }
    }
}

/// Accumulates notes while walking sections, recursing into generators.
struct FileBuilder<'p, 'a> {
    parser: &'p Parser<'a>,
    parsed: &'p mut ParsedFile,
    /// (raw path, line) pairs, deduplicated later.
    raw_medias: Vec<(String, usize)>,
}

impl FileBuilder<'_, '_> {
    fn process_doc(
        &mut self,
        doc: &MarkdownFile,
        depth: usize,
        line_override: Option<usize>,
    ) -> Result<(), NtError> {
        for section in &doc.sections {
            let line = line_override.unwrap_or(section.file_lines.start);
            let (kind, short_title) = NoteKind::detect(&section.heading);

            let extracted = extract(&section.own_content);
            if extracted.text.trim().is_empty() && kind == NoteKind::Free {
                continue;
            }
            if extracted.tags.iter().any(|t| t == "ignore") {
                continue;
            }

            if kind == NoteKind::Generator {
                self.run_generator(section.own_content.as_str(), &extracted.attributes, line, depth)?;
                continue;
            }

            let parent = self
                .parsed
                .notes
                .iter()
                .rposition(|n| n.level < section.level);

            // Attribute scopes nest: file, parent note, own.
            let rel_path = self.parsed.rel_path.clone();
            let schema = self.parser.schema;
            let file_scope =
                schema.inherit_filter(&rel_path, kind.as_str(), &self.parsed.attributes);
            let parent_scope = parent
                .map(|p| schema.inherit_filter(&rel_path, kind.as_str(), &self.parsed.notes[p].attributes))
                .unwrap_or_default();
            let own = schema.cast(&rel_path, kind.as_str(), &extracted.attributes)?;
            let attributes = file_scope.merge(&parent_scope).merge(&own);

            let mut tags: Vec<String> = self.parsed.tags.clone();
            if let Some(p) = parent {
                for tag in &self.parsed.notes[p].tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
            }
            for tag in &extracted.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }

            let slug = match attributes.get("slug").and_then(AttributeValue::as_str) {
                Some(s) => s.to_string(),
                None => note_slug(&self.parsed.slug, kind, &short_title, &section.heading),
            };

            let (body, comment) = split_note_comment(&replace_entities(&extracted.text));
            let note_index = self.parsed.notes.len();
            let note = ParsedNote {
                kind,
                level: section.level,
                title: section.heading.clone(),
                short_title: if short_title.is_empty() {
                    section.heading.clone()
                } else {
                    short_title
                },
                slug,
                parent,
                attributes,
                tags,
                body_hash: Oid::for_content(body.as_bytes()),
                body,
                body_raw: section.own_content.clone(),
                comment,
                line,
            };
            self.extract_satellites(&note, note_index)?;
            for cap in IMAGE_RE.captures_iter(&note.body) {
                self.raw_medias.push((cap[1].to_string(), note.line));
            }
            self.parsed.notes.push(note);
        }
        Ok(())
    }

    /// Flashcards, go-links and reminders owned by one note.
    fn extract_satellites(&mut self, note: &ParsedNote, note_index: usize) -> Result<(), NtError> {
        if note.kind == NoteKind::Flashcard {
            let (front, back) = split_flashcard(&note.body).ok_or_else(|| {
                NtError::FlashcardSeparator {
                    path: PathBuf::from(&self.parsed.rel_path),
                    line: note.line,
                    title: note.short_title.clone(),
                }
            })?;
            self.parsed.flashcards.push(ParsedFlashcard {
                note: note_index,
                short_title: note.short_title.clone(),
                tags: note.tags.clone(),
                front,
                back,
            });
        }

        for cap in LINK_RE.captures_iter(&note.body) {
            let title = cap.get(3).map(|m| m.as_str()).unwrap_or("");
            if let Some(go) = GO_NAME_RE.captures(title) {
                self.parsed.golinks.push(ParsedGoLink {
                    note: note_index,
                    text: cap[1].to_string(),
                    url: cap[2].to_string(),
                    title: title.to_string(),
                    go_name: go[1].to_string(),
                });
            }
        }

        for line_text in note.body.lines() {
            for cap in REMINDER_RE.captures_iter(line_text) {
                let expression = cap[1].to_string();
                let description = LIST_ITEM_RE
                    .captures(line_text)
                    .map(|item| {
                        REMINDER_RE
                            .replace_all(&item[1], "")
                            .trim()
                            .to_string()
                    })
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| note.short_title.clone());
                self.parsed.reminders.push(ParsedReminder {
                    note: note_index,
                    description,
                    tag: format!("#reminder-{expression}"),
                    expression,
                });
            }
        }
        Ok(())
    }

    fn run_generator(
        &mut self,
        body: &str,
        attributes: &Attributes,
        line: usize,
        depth: usize,
    ) -> Result<(), NtError> {
        let site = GeneratorSite {
            path: PathBuf::from(&self.parsed.rel_path),
            line,
        };
        if depth >= self.parser.options.generator_max_depth {
            return Err(NtError::GeneratorDepthExceeded {
                path: site.path,
                line,
                limit: self.parser.options.generator_max_depth,
            });
        }
        let runner = Generator::new(self.parser.options.generator_timeout);
        let workdir = self
            .parser
            .root
            .join(Path::new(&self.parsed.rel_path).parent().unwrap_or(Path::new("")));

        let output = match attributes.get("file").and_then(AttributeValue::as_str) {
            Some(script) => {
                let interpreter = attributes.get("interpreter").and_then(AttributeValue::as_str);
                runner.run_script(&workdir.join(script), interpreter, &workdir, &site)?
            }
            None => {
                let block = first_code_block(body).ok_or_else(|| NtError::GeneratorEmpty {
                    path: site.path.clone(),
                    line,
                })?;
                runner.run_inline(&block, &workdir, &site)?
            }
        };

        let generated = MarkdownFile::parse(Path::new(&self.parsed.rel_path), &output)
            .map_err(|e| NtError::GeneratorOutput {
                path: PathBuf::from(&self.parsed.rel_path),
                line,
                reason: e.to_string(),
            })?;
        debug!(
            rel_path = self.parsed.rel_path,
            line,
            sections = generated.sections.len(),
            "generator produced sections"
        );
        self.process_doc(&generated, depth + 1, Some(line))
    }
}

/// Derive a file slug: `<dirname>/<stem>`, with `index.md` collapsing to the
/// directory and `books/books.md` collapsing to `books`.
pub fn file_slug(rel_path: &str) -> String {
    let path = Path::new(rel_path);
    let stem = file_stem(rel_path);
    let dir = normalize_rel_path(path.parent().unwrap_or(Path::new("")));
    if stem == "index" || dir.rsplit('/').next() == Some(stem.as_str()) {
        if dir.is_empty() { slug::slugify(&stem) } else { dir }
    } else if dir.is_empty() {
        slug::slugify(&stem)
    } else {
        format!("{dir}/{}", slug::slugify(&stem))
    }
}

/// Resolve `..` and `.` components of a media reference into a
/// repository-relative path.
fn normalize_media_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            std::path::Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.join("/")
}

fn file_stem(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index")
        .to_string()
}

fn note_slug(file_slug: &str, kind: NoteKind, short_title: &str, heading: &str) -> String {
    let title_part = if short_title.is_empty() { heading } else { short_title };
    format!("{file_slug}-{}-{}", kind.as_str(), slug::slugify(title_part))
}

fn attribute_tags(attributes: &Attributes) -> Vec<String> {
    match attributes.get("tags") {
        Some(AttributeValue::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(AttributeValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Apply the entity table outside fenced code blocks and inline code spans.
pub fn replace_entities(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut fence: Option<char> = None;
    for line in text.lines() {
        if let Some(open) = fence {
            out.push(line.to_string());
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == open) {
                fence = None;
            }
            continue;
        }
        if let Some(cap) = FENCE_RE.captures(line) {
            fence = cap[1].chars().next();
            out.push(line.to_string());
            continue;
        }
        // Inline code spans keep their text verbatim.
        let mut rebuilt = String::new();
        for (i, span) in line.split('`').enumerate() {
            if i > 0 {
                rebuilt.push('`');
            }
            if i % 2 == 0 {
                let mut replaced = span.to_string();
                for (from, to) in ENTITIES {
                    replaced = replaced.replace(from, to);
                }
                rebuilt.push_str(&replaced);
            } else {
                rebuilt.push_str(span);
            }
        }
        out.push(rebuilt);
    }
    out.join("\n")
}

/// Split off a trailing HTML comment (the "note comment").
pub fn split_note_comment(body: &str) -> (String, Option<String>) {
    let trimmed = body.trim_end();
    if !trimmed.ends_with("-->") {
        return (body.to_string(), None);
    }
    if let Some(start) = trimmed.rfind("<!--") {
        let comment = trimmed[start + 4..trimmed.len() - 3].trim().to_string();
        let rest = trimmed[..start].trim_end().to_string();
        return (rest, Some(comment));
    }
    (body.to_string(), None)
}

/// Split a flashcard body into front and back on its single horizontal rule.
/// A rule before any content (directly under the heading) is decorative.
pub fn split_flashcard(body: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = body.lines().collect();
    let mut separators = Vec::new();
    let mut decorative = Vec::new();
    let mut fence: Option<char> = None;
    let mut seen_content = false;
    for (idx, line) in lines.iter().enumerate() {
        if let Some(open) = fence {
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == open) {
                fence = None;
            }
            seen_content = true;
            continue;
        }
        if let Some(cap) = FENCE_RE.captures(line) {
            fence = cap[1].chars().next();
            seen_content = true;
            continue;
        }
        if HR_RE.is_match(line) {
            if seen_content {
                separators.push(idx);
            } else {
                decorative.push(idx);
            }
            continue;
        }
        if !line.trim().is_empty() {
            seen_content = true;
        }
    }
    if separators.len() != 1 {
        return None;
    }
    let split = separators[0];
    let front = lines[..split]
        .iter()
        .enumerate()
        .filter(|(idx, _)| !decorative.contains(idx))
        .map(|(_, l)| *l)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    let back = lines[split + 1..].join("\n").trim().to_string();
    if front.is_empty() || back.is_empty() {
        return None;
    }
    Some((front, back))
}
