//! Object model definitions for files, notes, flashcards, reminders,
//! go-links and medias, plus the trait that lets the pack layer create
//! strongly typed values from raw bytes.
//!
//! Every record carries a stable OID, a lifecycle [`State`] and symmetric
//! YAML serialisation with a fixed field order (OIDs first, then structural
//! keys, then timestamps). Construction goes through `new_or_existing`: given
//! the previously committed record with the same logical identity, fields are
//! updated in place, the OID is preserved and the state reflects whether
//! anything tracked actually changed.

pub mod file;
pub mod flashcard;
pub mod golink;
pub mod media;
pub mod note;
pub mod reminder;
pub mod types;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

pub use file::File;
pub use flashcard::Flashcard;
pub use golink::GoLink;
pub use media::Media;
pub use note::Note;
pub use reminder::Reminder;
pub use types::{ObjectKind, State};

use crate::{errors::NtError, oid::Oid};

/// Common interface over every persistent record.
pub trait NtObject {
    /// Stable identifier, preserved across edits.
    fn oid(&self) -> Oid;
    /// Which record table this object belongs to.
    fn kind(&self) -> ObjectKind;
    /// Lifecycle state relative to the committed ancestor.
    fn state(&self) -> State;
    fn set_state(&mut self, state: State);
    /// Last modification time of the record.
    fn mtime(&self) -> DateTime<Utc>;
    /// One-line human description used in packfile listings.
    fn desc(&self) -> String;

    /// Canonical YAML serialisation.
    fn to_yaml(&self) -> Result<String, NtError>
    where
        Self: Serialize + Sized,
    {
        encode_yaml(self).map_err(|e| NtError::EncodeObjectError(self.oid().to_string(), e))
    }

    /// Symmetric deserialisation: `from_yaml(to_yaml(x)) == x`.
    fn from_yaml(data: &str) -> Result<Self, NtError>
    where
        Self: DeserializeOwned + Sized,
    {
        decode_yaml(data)
    }
}

fn encode_yaml<T: Serialize>(value: &T) -> Result<String, String> {
    serde_yaml::to_string(value).map_err(|e| e.to_string())
}

fn decode_yaml<T: DeserializeOwned>(data: &str) -> Result<T, NtError> {
    serde_yaml::from_str(data).map_err(|e| NtError::InvalidObjectData(e.to_string()))
}
