//! Object kinds and lifecycle states shared by every persistent record.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::NtError;

/// The six kinds of persistent records carried by packfiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    File,
    Note,
    Flashcard,
    Reminder,
    #[serde(rename = "golink")]
    GoLink,
    Media,
}

impl ObjectKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::File => "file",
            ObjectKind::Note => "note",
            ObjectKind::Flashcard => "flashcard",
            ObjectKind::Reminder => "reminder",
            ObjectKind::GoLink => "golink",
            ObjectKind::Media => "media",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = NtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(ObjectKind::File),
            "note" => Ok(ObjectKind::Note),
            "flashcard" => Ok(ObjectKind::Flashcard),
            "reminder" => Ok(ObjectKind::Reminder),
            "golink" => Ok(ObjectKind::GoLink),
            "media" => Ok(ObjectKind::Media),
            other => Err(NtError::InvalidObjectData(format!(
                "unknown object kind `{other}`"
            ))),
        }
    }
}

/// Lifecycle state of a record relative to its committed ancestor.
///
/// `None` means unchanged since the last commit. Transitions:
///
/// ```text
///  (fresh parse)          Added ──commit──▶ None
///  (textual change)       None ──parse──▶ Modified ──commit──▶ None
///  (file removed)         None ──parse──▶ Deleted ──commit──▶ (gone)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::None => "none",
            State::Added => "added",
            State::Modified => "modified",
            State::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ObjectKind::File,
            ObjectKind::Note,
            ObjectKind::Flashcard,
            ObjectKind::Reminder,
            ObjectKind::GoLink,
            ObjectKind::Media,
        ] {
            assert_eq!(ObjectKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(ObjectKind::from_str("tree").is_err());
    }

    #[test]
    fn test_state_serde_form() {
        assert_eq!(serde_yaml::to_string(&State::Modified).unwrap().trim(), "modified");
    }
}
