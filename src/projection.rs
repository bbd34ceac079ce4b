//! Derived SQLite projection of the object store.
//!
//! The database (`.nt/database.db`) is a read-side cache: queries, full-text
//! search and study selection read from it, but the packfiles stay the source
//! of truth. The projection records a checksum of the index it was built
//! from and rebuilds itself whenever that checksum drifts.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::{
    errors::NtError,
    internal::object::{File, Flashcard, GoLink, Media, Note, Reminder},
    oid::Oid,
    repository::Repository,
    srs::Review,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS file (
    oid TEXT PRIMARY KEY,
    relative_path TEXT NOT NULL,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    tags TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS note (
    oid TEXT PRIMARY KEY,
    file_oid TEXT NOT NULL,
    kind TEXT NOT NULL,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    short_title TEXT NOT NULL,
    body TEXT NOT NULL,
    line INTEGER NOT NULL,
    tags TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS flashcard (
    oid TEXT PRIMARY KEY,
    note_oid TEXT NOT NULL,
    slug TEXT NOT NULL,
    short_title TEXT NOT NULL,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    due_at TEXT,
    last_studied_at TEXT,
    settings TEXT NOT NULL,
    tags TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reminder (
    oid TEXT PRIMARY KEY,
    note_oid TEXT NOT NULL,
    description TEXT NOT NULL,
    tag TEXT NOT NULL,
    next_performed_at TEXT
);
CREATE TABLE IF NOT EXISTS golink (
    oid TEXT PRIMARY KEY,
    note_oid TEXT NOT NULL,
    go_name TEXT NOT NULL,
    url TEXT NOT NULL,
    text TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS media (
    oid TEXT PRIMARY KEY,
    relative_path TEXT NOT NULL,
    kind TEXT NOT NULL,
    size INTEGER NOT NULL,
    dangling INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS review (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flashcard_oid TEXT NOT NULL,
    feedback TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    completed_at TEXT NOT NULL,
    due_at TEXT NOT NULL,
    settings TEXT NOT NULL
);
CREATE VIRTUAL TABLE IF NOT EXISTS note_fts USING fts5(
    oid UNINDEXED,
    title,
    body
);
";

/// A note row as returned by queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRow {
    pub oid: String,
    pub kind: String,
    pub slug: String,
    pub short_title: String,
    pub body: String,
}

pub struct Projection {
    conn: Connection,
}

impl Projection {
    pub fn open(path: &std::path::Path) -> Result<Projection, NtError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Projection { conn })
    }

    /// In-memory projection for tests.
    pub fn open_in_memory() -> Result<Projection, NtError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Projection { conn })
    }

    fn stored_checksum(&self) -> Result<Option<String>, NtError> {
        let mut stmt = self.conn.prepare("SELECT value FROM meta WHERE key = 'index_checksum'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Rebuild when the index changed since the last projection.
    pub fn sync(&mut self, repo: &Repository) -> Result<bool, NtError> {
        let index_path = repo.root().join(".nt/index");
        let checksum = match std::fs::read(&index_path) {
            Ok(bytes) => Oid::for_content(&bytes).to_string(),
            Err(_) => Oid::zero_str(),
        };
        if self.stored_checksum()?.as_deref() == Some(checksum.as_str()) {
            debug!("projection up to date");
            return Ok(false);
        }
        self.rebuild(repo)?;
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('index_checksum', ?1)
             ON CONFLICT(key) DO UPDATE SET value = ?1",
            params![checksum],
        )?;
        Ok(true)
    }

    /// Repopulate every table from the committed object store.
    pub fn rebuild(&mut self, repo: &Repository) -> Result<(), NtError> {
        info!("rebuilding projection");
        let tx = self.conn.transaction()?;
        for table in ["file", "note", "flashcard", "reminder", "golink", "media", "note_fts"] {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }

        for file in repo.load_objects::<File>(crate::internal::object::ObjectKind::File)? {
            tx.execute(
                "INSERT OR REPLACE INTO file (oid, relative_path, slug, title, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    file.oid.to_string(),
                    file.relative_path,
                    file.slug,
                    file.title,
                    file.tags.join(",")
                ],
            )?;
        }
        for note in repo.load_objects::<Note>(crate::internal::object::ObjectKind::Note)? {
            tx.execute(
                "INSERT OR REPLACE INTO note (oid, file_oid, kind, slug, title, short_title, body, line, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    note.oid.to_string(),
                    note.file_oid.to_string(),
                    note.kind.to_string(),
                    note.slug,
                    note.title,
                    note.short_title,
                    note.body,
                    note.line as i64,
                    note.tags.join(",")
                ],
            )?;
            tx.execute(
                "INSERT INTO note_fts (oid, title, body) VALUES (?1, ?2, ?3)",
                params![note.oid.to_string(), note.title, note.body],
            )?;
        }
        for card in repo.load_objects::<Flashcard>(crate::internal::object::ObjectKind::Flashcard)? {
            tx.execute(
                "INSERT OR REPLACE INTO flashcard
                 (oid, note_oid, slug, short_title, front, back, due_at, last_studied_at, settings, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    card.oid.to_string(),
                    card.note_oid.to_string(),
                    card.slug,
                    card.short_title,
                    card.front,
                    card.back,
                    card.due_at.map(|t| t.to_rfc3339()),
                    card.last_studied_at.map(|t| t.to_rfc3339()),
                    serde_json::to_string(&card.settings)
                        .map_err(|e| NtError::Projection(e.to_string()))?,
                    card.tags.join(",")
                ],
            )?;
        }
        for reminder in repo.load_objects::<Reminder>(crate::internal::object::ObjectKind::Reminder)? {
            tx.execute(
                "INSERT OR REPLACE INTO reminder (oid, note_oid, description, tag, next_performed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    reminder.oid.to_string(),
                    reminder.note_oid.to_string(),
                    reminder.description,
                    reminder.tag,
                    reminder.next_performed_at.map(|d| d.to_string())
                ],
            )?;
        }
        for golink in repo.load_objects::<GoLink>(crate::internal::object::ObjectKind::GoLink)? {
            tx.execute(
                "INSERT OR REPLACE INTO golink (oid, note_oid, go_name, url, text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    golink.oid.to_string(),
                    golink.note_oid.to_string(),
                    golink.go_name,
                    golink.url,
                    golink.text
                ],
            )?;
        }
        for media in repo.load_objects::<Media>(crate::internal::object::ObjectKind::Media)? {
            tx.execute(
                "INSERT OR REPLACE INTO media (oid, relative_path, kind, size, dangling)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    media.oid.to_string(),
                    media.relative_path,
                    format!("{:?}", media.kind).to_lowercase(),
                    media.size as i64,
                    media.dangling as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn note_by_slug(&self, slug: &str) -> Result<Option<NoteRow>, NtError> {
        let mut stmt = self.conn.prepare(
            "SELECT oid, kind, slug, short_title, body FROM note WHERE slug = ?1",
        )?;
        let mut rows = stmt.query(params![slug])?;
        match rows.next()? {
            Some(row) => Ok(Some(NoteRow {
                oid: row.get(0)?,
                kind: row.get(1)?,
                slug: row.get(2)?,
                short_title: row.get(3)?,
                body: row.get(4)?,
            })),
            None => Ok(None),
        }
    }

    pub fn count_notes(&self) -> Result<i64, NtError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM note", [], |row| row.get(0))?)
    }

    /// Full-text search over note titles and bodies.
    pub fn search_notes(&self, query: &str) -> Result<Vec<NoteRow>, NtError> {
        let mut stmt = self.conn.prepare(
            "SELECT n.oid, n.kind, n.slug, n.short_title, n.body
             FROM note_fts f JOIN note n ON n.oid = f.oid
             WHERE note_fts MATCH ?1 ORDER BY rank",
        )?;
        let rows = stmt.query_map(params![query], |row| {
            Ok(NoteRow {
                oid: row.get(0)?,
                kind: row.get(1)?,
                slug: row.get(2)?,
                short_title: row.get(3)?,
                body: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Flashcard OIDs due at `t`, optionally restricted to a tag.
    pub fn due_flashcards(
        &self,
        t: DateTime<Utc>,
        tag: Option<&str>,
    ) -> Result<Vec<String>, NtError> {
        let mut stmt = self.conn.prepare(
            "SELECT oid, tags FROM flashcard
             WHERE due_at IS NULL OR due_at <= ?1
             ORDER BY due_at IS NOT NULL, due_at",
        )?;
        let rows = stmt.query_map(params![t.to_rfc3339()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (oid, tags) = row?;
            if let Some(tag) = tag
                && !tags.split(',').any(|t| t == tag)
            {
                continue;
            }
            out.push(oid);
        }
        Ok(out)
    }

    /// Append one review row.
    pub fn record_review(&mut self, review: &Review) -> Result<(), NtError> {
        self.conn.execute(
            "INSERT INTO review (flashcard_oid, feedback, duration_ms, completed_at, due_at, settings)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                review.flashcard_oid.to_string(),
                format!("{:?}", review.feedback).to_lowercase(),
                review.duration_ms as i64,
                review.completed_at.to_rfc3339(),
                review.due_at.to_rfc3339(),
                serde_json::to_string(&review.settings)
                    .map_err(|e| NtError::Projection(e.to_string()))?
            ],
        )?;
        Ok(())
    }

    pub fn count_reviews(&self) -> Result<i64, NtError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM review", [], |row| row.get(0))?)
    }
}
