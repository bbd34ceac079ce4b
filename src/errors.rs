//! Error types for the NoteWriter crate.
//!
//! This module defines a unified error enumeration used across Markdown
//! parsing, object construction, pack encoding/decoding, index handling and
//! the repository lifecycle. It integrates with `thiserror` to provide rich
//! `Display` implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Parse-side variants carry the source file and line where known.
//! - Store-side variants distinguish corruption from plain I/O failure.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the NoteWriter library.
///
/// - Used across parsing, object serialisation, pack encode/decode, index,
///   commit graph, reminders, study scheduling and the SQL projection.
/// - Implements `std::error::Error` via `thiserror`.
pub enum NtError {
    /// Malformed YAML front matter between the leading `---` fences.
    #[error("{path}: malformed front matter: {reason}", path = .path.display())]
    FrontMatter { path: PathBuf, reason: String },

    /// A flashcard body did not split into exactly a front and a back.
    #[error("{path}:{line}: flashcard `{title}` must contain exactly one `---` separator", path = .path.display())]
    FlashcardSeparator {
        path: PathBuf,
        line: usize,
        title: String,
    },

    /// An attribute value could not be coerced to its declared type.
    #[error("attribute `{name}` is not a valid {expected}: {value}")]
    InvalidAttributeType {
        name: String,
        expected: String,
        value: String,
    },

    /// Generator script referenced by a note does not exist.
    #[error("{path}:{line}: generator script `{script}` not found", path = .path.display())]
    GeneratorMissing {
        path: PathBuf,
        line: usize,
        script: String,
    },

    /// Generator note has no inline code block and no external script.
    #[error("{path}:{line}: generator has no code block to execute", path = .path.display())]
    GeneratorEmpty { path: PathBuf, line: usize },

    /// Generator subprocess exited with a non-zero status.
    #[error("{path}:{line}: generator exited with status {status}: {stderr}", path = .path.display())]
    GeneratorFailed {
        path: PathBuf,
        line: usize,
        status: i32,
        stderr: String,
    },

    /// Generator subprocess exceeded the configured timeout.
    #[error("{path}:{line}: generator timed out after {seconds}s", path = .path.display())]
    GeneratorTimeout {
        path: PathBuf,
        line: usize,
        seconds: u64,
    },

    /// Generators nested beyond the recursion limit.
    #[error("{path}:{line}: generator depth exceeded (limit {limit})", path = .path.display())]
    GeneratorDepthExceeded {
        path: PathBuf,
        line: usize,
        limit: usize,
    },

    /// Generator stdout was not parseable as Markdown.
    #[error("{path}:{line}: generator output is not valid Markdown: {reason}", path = .path.display())]
    GeneratorOutput {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// I/O error from the underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// Invalid or unparseable object identifier.
    #[error("The `{0}` is not a valid object identifier")]
    InvalidOid(String),

    /// Failed to encode an object record to YAML.
    #[error("Can't encode the object which id [{0}] to YAML: {1}")]
    EncodeObjectError(String, String),

    /// Failed to decode an object record from its stored bytes.
    #[error("Error decoding object, info: {0}")]
    InvalidObjectData(String),

    /// A packfile's bytes did not decode to a valid packfile.
    #[error("The `{0}` is not a valid packfile: {1}")]
    InvalidPackFile(String, String),

    /// A packfile's recomputed OID did not match its claimed OID.
    #[error("Packfile `{claimed}` is corrupt: content hashes to `{actual}`")]
    PackFileOidMismatch { claimed: String, actual: String },

    /// Object missing from a packfile or from the object store.
    #[error("Can't find specific object: {0}")]
    ObjectNotFound(String),

    /// Blob referenced by the index is absent from the object directory.
    #[error("Missing blob: {0}")]
    MissingBlob(String),

    /// The index file did not decode to a valid index.
    #[error("The index at `{path}` is not valid: {1}", path = .0.display())]
    InvalidIndex(PathBuf, String),

    /// An index entry is staged with neither a packfile nor a tombstone.
    #[error("Index entry `{0}` is staged without packfile or tombstone")]
    InconsistentEntry(String),

    /// Commit appended out of chronological order.
    #[error("Commit `{0}` predates the commit graph head")]
    OutOfOrderCommit(String),

    /// Commit OID not present in the commit graph.
    #[error("Unknown commit: {0}")]
    UnknownCommit(String),

    /// Another process holds the repository lock.
    #[error("Repository is locked by another process ({path}); retry once it completes", path = .0.display())]
    LockHeld(PathBuf),

    /// Reads kept observing a half-written index beyond the retry budget.
    #[error("Torn read of `{path}`; retry the operation", path = .0.display())]
    TornRead(PathBuf),

    /// Repository root discovery failed.
    #[error("Not a NoteWriter repository (no .nt directory found from `{path}`)", path = .0.display())]
    RepositoryNotFound(PathBuf),

    /// `.nt` already present on `nt init`.
    #[error("Repository already initialized at `{path}`", path = .0.display())]
    RepositoryExists(PathBuf),

    /// Reminder expression contains an unknown token.
    #[error("Unsupported recurrence expression: `{0}`")]
    UnsupportedExpression(String),

    /// Reminder expression has no satisfying future date.
    #[error("No future date satisfies `{0}`")]
    NoFutureDate(String),

    /// Short OID matched more than one object.
    #[error("Short OID `{0}` is ambiguous")]
    AmbiguousOid(String),

    /// Short OID matched nothing in the index.
    #[error("Unknown OID: {0}")]
    UnknownOid(String),

    /// A pathspec matched no tracked or working-tree file.
    #[error("Pathspec `{0}` did not match any files")]
    PathspecNoMatch(String),

    /// A pathspec was not a valid glob.
    #[error("Invalid pathspec `{0}`: {1}")]
    InvalidPathspec(String, String),

    /// `nt commit` invoked with an empty staging area.
    #[error("Nothing staged; run `nt add` first")]
    EmptyStagingArea,

    /// Configuration file failed to parse.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SQL projection failure.
    #[error("Projection error: {0}")]
    Projection(String),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),
}

impl From<rusqlite::Error> for NtError {
    fn from(err: rusqlite::Error) -> Self {
        NtError::Projection(err.to_string())
    }
}
