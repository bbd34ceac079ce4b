//! The Note object: one typed heading inside a file.
//!
//! Logical identity across edits is resolved by a match chain rather than by
//! OID: slug first, then parent-plus-title, then canonical body hash, then
//! short title. The first previous record that matches lends its OID to the
//! fresh parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    attribute::Attributes,
    clock,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
    parser::{NoteKind, ParsedNote},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub oid: Oid,
    pub file_oid: Oid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_note_oid: Option<Oid>,
    pub kind: NoteKind,
    pub level: usize,
    pub title: String,
    pub short_title: String,
    pub slug: String,
    /// Canonical body: tags, comment attributes and the note comment
    /// stripped, entities substituted.
    pub body: String,
    /// The source text as written.
    pub raw_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub attributes: Attributes,
    pub tags: Vec<String>,
    /// 1-based heading line in the source file.
    pub line: usize,
    pub body_hash: Oid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: State,
}

impl Note {
    pub fn new_or_existing(
        parsed: &ParsedNote,
        file_oid: Oid,
        parent_note_oid: Option<Oid>,
        previous: Option<&Note>,
    ) -> Note {
        let now = clock::now();
        match previous {
            Some(prev) => {
                let changed = prev.body_hash != parsed.body_hash
                    || prev.title != parsed.title
                    || prev.slug != parsed.slug
                    || prev.attributes != parsed.attributes
                    || prev.tags != parsed.tags
                    || prev.parent_note_oid != parent_note_oid
                    || prev.line != parsed.line;
                Note {
                    oid: prev.oid,
                    file_oid,
                    parent_note_oid,
                    kind: parsed.kind,
                    level: parsed.level,
                    title: parsed.title.clone(),
                    short_title: parsed.short_title.clone(),
                    slug: parsed.slug.clone(),
                    body: parsed.body.clone(),
                    raw_body: parsed.body_raw.clone(),
                    comment: parsed.comment.clone(),
                    attributes: parsed.attributes.clone(),
                    tags: parsed.tags.clone(),
                    line: parsed.line,
                    body_hash: parsed.body_hash,
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    state: if changed { State::Modified } else { State::None },
                }
            }
            None => Note {
                oid: Oid::random(),
                file_oid,
                parent_note_oid,
                kind: parsed.kind,
                level: parsed.level,
                title: parsed.title.clone(),
                short_title: parsed.short_title.clone(),
                slug: parsed.slug.clone(),
                body: parsed.body.clone(),
                raw_body: parsed.body_raw.clone(),
                comment: parsed.comment.clone(),
                attributes: parsed.attributes.clone(),
                tags: parsed.tags.clone(),
                line: parsed.line,
                body_hash: parsed.body_hash,
                created_at: now,
                updated_at: now,
                state: State::Added,
            },
        }
    }

    /// Pick the previous record a parsed note corresponds to.
    ///
    /// Match chain: slug, then parent + short title, then body hash, then
    /// short title. Kind must agree throughout.
    pub fn match_previous<'a>(
        parsed: &ParsedNote,
        parent_note_oid: Option<Oid>,
        candidates: &'a [Note],
    ) -> Option<&'a Note> {
        let same_kind = |n: &&Note| n.kind == parsed.kind;
        candidates
            .iter()
            .filter(same_kind)
            .find(|n| n.slug == parsed.slug)
            .or_else(|| {
                candidates.iter().filter(same_kind).find(|n| {
                    n.parent_note_oid == parent_note_oid && n.short_title == parsed.short_title
                })
            })
            .or_else(|| {
                candidates
                    .iter()
                    .filter(same_kind)
                    .find(|n| n.body_hash == parsed.body_hash)
            })
            .or_else(|| {
                candidates
                    .iter()
                    .filter(same_kind)
                    .find(|n| n.short_title == parsed.short_title)
            })
    }
}

impl NtObject for Note {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Note
    }

    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }

    fn mtime(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn desc(&self) -> String {
        format!("note \"{}\" [{}]", self.short_title, self.slug)
    }
}
