//! The Media object: a referenced binary file (image, audio, video).
//!
//! The OID derives from the referenced path so the same file referenced from
//! several notes resolves to one record. Each rendition of the bytes
//! (original, thumbnail, transcode) is a blob reference; a media whose file
//! vanished from disk is flagged dangling rather than erroring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    clock,
    internal::object::{NtObject, ObjectKind, State},
    internal::pack::BlobRef,
    oid::Oid,
    parser::{MediaKind, ParsedMedia},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub oid: Oid,
    pub relative_path: String,
    pub kind: MediaKind,
    pub extension: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    /// One entry per rendition stored in the blob directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blob_refs: Vec<BlobRef>,
    pub dangling: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: State,
}

impl Media {
    /// OIDs derive from the referenced path, so every reference to the same
    /// file converges on one record.
    pub fn oid_for_path(rel_path: &str) -> Oid {
        Oid::for_content(rel_path.as_bytes())
    }

    pub fn new_or_existing(parsed: &ParsedMedia, previous: Option<&Media>) -> Media {
        let now = clock::now();
        match previous {
            Some(prev) => {
                let changed = prev.size != parsed.size
                    || prev.mtime.map(|t| t.timestamp())
                        != parsed.mtime.map(|t| t.timestamp())
                    || prev.dangling != parsed.dangling;
                Media {
                    oid: prev.oid,
                    relative_path: parsed.rel_path.clone(),
                    kind: parsed.kind,
                    extension: parsed.extension.clone(),
                    size: parsed.size,
                    mtime: parsed.mtime,
                    // Refreshed by blob ingestion when the bytes changed.
                    blob_refs: prev.blob_refs.clone(),
                    dangling: parsed.dangling,
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    state: if changed { State::Modified } else { State::None },
                }
            }
            None => Media {
                oid: Self::oid_for_path(&parsed.rel_path),
                relative_path: parsed.rel_path.clone(),
                kind: parsed.kind,
                extension: parsed.extension.clone(),
                size: parsed.size,
                mtime: parsed.mtime,
                blob_refs: Vec::new(),
                dangling: parsed.dangling,
                created_at: now,
                updated_at: now,
                state: State::Added,
            },
        }
    }
}

impl NtObject for Media {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Media
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
        format!("media \"{}\"", self.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(size: u64) -> ParsedMedia {
        ParsedMedia {
            raw_path: "images/pond.png".to_string(),
            rel_path: "notes/images/pond.png".to_string(),
            kind: MediaKind::Picture,
            extension: "png".to_string(),
            size,
            mtime: Some(clock::now()),
            dangling: false,
            line: 5,
        }
    }

    #[test]
    fn test_oid_derives_from_path() {
        let a = Media::new_or_existing(&parsed(10), None);
        let b = Media::new_or_existing(&parsed(10), None);
        assert_eq!(a.oid, b.oid);
        assert_eq!(a.oid, Media::oid_for_path("notes/images/pond.png"));
    }

    #[test]
    fn test_size_change_marks_modified() {
        let first = Media::new_or_existing(&parsed(10), None);
        let second = Media::new_or_existing(&parsed(20), Some(&first));
        assert_eq!(second.oid, first.oid);
        assert_eq!(second.state, State::Modified);
    }

    #[test]
    fn test_yaml_round_trip() {
        let media = Media::new_or_existing(&parsed(10), None);
        let yaml = media.to_yaml().unwrap();
        let mut back = Media::from_yaml(&yaml).unwrap();
        back.state = media.state;
        assert_eq!(back, media);
    }
}
