//! The File object: one Markdown document under the repository root.
//!
//! A file owns the notes, medias, go-links, flashcards and reminders parsed
//! from it; deleting the file tombstones all owned objects. Identity across
//! edits is the relative path — the index pairs a fresh parse with the
//! committed File record for the same path, and `new_or_existing` decides
//! whether anything tracked actually changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    attribute::Attributes,
    clock,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
    parser::ParsedFile,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub oid: Oid,
    /// Packfile currently carrying this record; nil until staged.
    pub packfile_oid: Oid,
    pub relative_path: String,
    pub slug: String,
    pub title: String,
    pub short_title: String,
    pub attributes: Attributes,
    pub tags: Vec<String>,
    pub body_hash: Oid,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_indexed_at: DateTime<Utc>,
    /// Set when the working-tree file disappeared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub state: State,
}

impl File {
    /// Lift a parse result into a File record, reusing `previous` when the
    /// path was already tracked.
    pub fn new_or_existing(parsed: &ParsedFile, previous: Option<&File>) -> File {
        let now = clock::now();
        match previous {
            Some(prev) => {
                let changed = prev.body_hash != parsed.body_hash
                    || prev.slug != parsed.slug
                    || prev.title != parsed.title
                    || prev.attributes != parsed.attributes
                    || prev.tags != parsed.tags
                    || prev.size != parsed.size;
                File {
                    oid: prev.oid,
                    packfile_oid: Oid::nil(),
                    relative_path: parsed.rel_path.clone(),
                    slug: parsed.slug.clone(),
                    title: parsed.title.clone(),
                    short_title: parsed.short_title.clone(),
                    attributes: parsed.attributes.clone(),
                    tags: parsed.tags.clone(),
                    body_hash: parsed.body_hash,
                    size: parsed.size,
                    mtime: parsed.mtime,
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    last_indexed_at: now,
                    deleted_at: None,
                    state: if changed { State::Modified } else { State::None },
                }
            }
            None => File {
                oid: Oid::random(),
                packfile_oid: Oid::nil(),
                relative_path: parsed.rel_path.clone(),
                slug: parsed.slug.clone(),
                title: parsed.title.clone(),
                short_title: parsed.short_title.clone(),
                attributes: parsed.attributes.clone(),
                tags: parsed.tags.clone(),
                body_hash: parsed.body_hash,
                size: parsed.size,
                mtime: parsed.mtime,
                created_at: now,
                updated_at: now,
                last_indexed_at: now,
                deleted_at: None,
                state: State::Added,
            },
        }
    }

    /// Tombstone the record after its working-tree file disappeared.
    pub fn mark_deleted(&mut self) {
        self.state = State::Deleted;
        self.deleted_at = Some(clock::now());
    }
}

impl NtObject for File {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::File
    }

    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }

    fn mtime(&self) -> DateTime<Utc> {
        self.mtime
    }

    fn desc(&self) -> String {
        format!("file \"{}\"", self.relative_path)
    }
}
