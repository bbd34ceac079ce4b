//! The index: mutable mapping from repository paths to packfiles, with a
//! staging overlay, reverse lookups and orphan tracking.
//!
//! Layout at rest (`.nt/index`, YAML):
//!
//! ```yaml
//! objects_format_version: 1
//! entries: [...]
//! objects: [...]      # object OID -> packfile
//! blobs: [...]        # blob OID -> packfile
//! orphan_packfiles: [{oid, dtime}, ...]
//! orphan_blobs: [{oid, dtime, media_oid}, ...]
//! ```
//!
//! The index is a single-writer artifact: mutating operations run under the
//! repository lock and finish with an atomic write. Lock-free readers
//! tolerate one torn read by retrying.

pub mod pathspec;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    clock,
    errors::NtError,
    internal::object::ObjectKind,
    internal::pack::PackFile,
    oid::Oid,
    utils::atomic_write,
};
pub use pathspec::PathSpec;

pub const OBJECTS_FORMAT_VERSION: u32 = 1;
/// Minimum length of a short OID.
pub const SHORT_OID_MIN: usize = 4;

/// One tracked file path: the committed packfile plus the staged overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub relative_path: String,
    /// Committed packfile; None for a freshly added, never-committed path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packfile_oid: Option<Oid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub staged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_packfile_oid: Option<Oid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_tombstone: Option<DateTime<Utc>>,
}

impl IndexEntry {
    fn new(relative_path: &str) -> IndexEntry {
        IndexEntry {
            relative_path: relative_path.to_string(),
            packfile_oid: None,
            mtime: None,
            size: 0,
            staged: false,
            staged_packfile_oid: None,
            staged_mtime: None,
            staged_size: None,
            staged_tombstone: None,
        }
    }

    /// The packfile a reader should consult: staged overlay first.
    pub fn effective_packfile(&self) -> Option<Oid> {
        if self.staged {
            self.staged_packfile_oid
        } else {
            self.packfile_oid
        }
    }

    fn clear_overlay(&mut self) {
        self.staged = false;
        self.staged_packfile_oid = None;
        self.staged_mtime = None;
        self.staged_size = None;
        self.staged_tombstone = None;
    }

    fn validate(&self) -> Result<(), NtError> {
        if self.staged && self.staged_packfile_oid.is_none() && self.staged_tombstone.is_none() {
            return Err(NtError::InconsistentEntry(self.relative_path.clone()));
        }
        if !self.staged && self.packfile_oid.is_none() {
            return Err(NtError::InconsistentEntry(self.relative_path.clone()));
        }
        Ok(())
    }
}

/// Reverse lookup: object OID -> packfile and path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexObject {
    pub oid: Oid,
    pub kind: ObjectKind,
    pub packfile_oid: Oid,
    pub relative_path: String,
}

/// Reverse lookup: blob OID -> packfile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexBlob {
    pub oid: Oid,
    pub mime: String,
    pub packfile_oid: Oid,
}

/// A packfile no entry references any more, awaiting gc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrphanPackFile {
    pub oid: Oid,
    pub dtime: DateTime<Utc>,
}

/// A blob whose last reference disappeared, awaiting gc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrphanBlob {
    pub oid: Oid,
    pub dtime: DateTime<Utc>,
    pub media_oid: Oid,
}

/// What `self` lacks relative to another index (committed state only).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexDiff {
    pub missing_packfiles: Vec<Oid>,
    pub missing_blobs: Vec<Oid>,
    pub missing_orphans: Vec<Oid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub objects_format_version: u32,
    pub entries: Vec<IndexEntry>,
    pub objects: Vec<IndexObject>,
    pub blobs: Vec<IndexBlob>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphan_packfiles: Vec<OrphanPackFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphan_blobs: Vec<OrphanBlob>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Index {
    fn default() -> Self {
        Index {
            objects_format_version: OBJECTS_FORMAT_VERSION,
            entries: Vec::new(),
            objects: Vec::new(),
            blobs: Vec::new(),
            orphan_packfiles: Vec::new(),
            orphan_blobs: Vec::new(),
            path: PathBuf::new(),
        }
    }
}

impl Index {
    /// Load from `.nt/index`, tolerating one torn read. A missing file is an
    /// empty index.
    pub fn load(path: &Path) -> Result<Index, NtError> {
        if !path.exists() {
            let mut index = Index::default();
            index.path = path.to_path_buf();
            return Ok(index);
        }
        let mut last_err = None;
        for _ in 0..2 {
            let raw = std::fs::read_to_string(path)?;
            match serde_yaml::from_str::<Index>(&raw) {
                Ok(mut index) => {
                    index.path = path.to_path_buf();
                    for entry in &index.entries {
                        entry.validate()?;
                    }
                    return Ok(index);
                }
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        match last_err {
            Some(_) => Err(NtError::TornRead(path.to_path_buf())),
            None => Err(NtError::InvalidIndex(path.to_path_buf(), "unreadable".into())),
        }
    }

    /// Atomically persist the index.
    pub fn save(&self) -> Result<(), NtError> {
        for entry in &self.entries {
            entry.validate()?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| NtError::InvalidIndex(self.path.clone(), e.to_string()))?;
        atomic_write(&self.path, yaml.as_bytes())
    }

    pub fn entry(&self, rel_path: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.relative_path == rel_path)
    }

    fn entry_mut(&mut self, rel_path: &str) -> &mut IndexEntry {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.relative_path == rel_path)
        {
            &mut self.entries[pos]
        } else {
            self.entries.push(IndexEntry::new(rel_path));
            self.entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
            let pos = self
                .entries
                .iter()
                .position(|e| e.relative_path == rel_path)
                .expect("entry was just inserted");
            &mut self.entries[pos]
        }
    }

    /// Stage a freshly written packfile against its path's entry.
    pub fn stage(&mut self, pack: &PackFile, mtime: DateTime<Utc>, size: u64) {
        debug!(path = %pack.file_relative_path, oid = %pack.oid, "staging packfile");
        let previous_staged = {
            let entry = self.entry_mut(&pack.file_relative_path);
            let previous = entry.staged_packfile_oid;
            entry.staged = true;
            entry.staged_packfile_oid = Some(pack.oid);
            entry.staged_mtime = Some(mtime);
            entry.staged_size = Some(size);
            entry.staged_tombstone = None;
            previous
        };
        // Re-staging the same path before a commit orphans the overwritten
        // staged packfile.
        if let Some(old) = previous_staged
            && old != pack.oid
        {
            self.purge_packfile_rows(old);
            self.orphan_packfiles.push(OrphanPackFile {
                oid: old,
                dtime: clock::now(),
            });
        }
        self.upsert_rows(pack);
    }

    /// Record that a tracked path disappeared from the working tree.
    pub fn set_tombstone(&mut self, rel_path: &str) {
        debug!(path = %rel_path, "staging tombstone");
        let previous_staged = {
            let entry = self.entry_mut(rel_path);
            let previous = entry.staged_packfile_oid;
            entry.staged = true;
            entry.staged_packfile_oid = None;
            entry.staged_mtime = None;
            entry.staged_size = None;
            entry.staged_tombstone = Some(clock::now());
            previous
        };
        if let Some(old) = previous_staged {
            self.purge_packfile_rows(old);
            self.orphan_packfiles.push(OrphanPackFile {
                oid: old,
                dtime: clock::now(),
            });
        }
    }

    /// Entries with a pending staged overlay.
    pub fn staged_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().filter(|e| e.staged)
    }

    pub fn has_staged_changes(&self) -> bool {
        self.entries.iter().any(|e| e.staged)
    }

    /// Promote every staged overlay into committed state.
    ///
    /// Tombstoned entries are dropped; replaced packfiles move to the orphan
    /// list with `dtime = now` for gc to collect after the retention window.
    pub fn commit(&mut self) {
        let now = clock::now();
        let mut orphaned: Vec<Oid> = Vec::new();
        let mut kept: Vec<IndexEntry> = Vec::new();

        for mut entry in std::mem::take(&mut self.entries) {
            if !entry.staged {
                kept.push(entry);
                continue;
            }
            if entry.staged_tombstone.is_some() {
                if let Some(old) = entry.packfile_oid {
                    orphaned.push(old);
                }
                // Entry removed entirely.
                continue;
            }
            if let (Some(old), Some(new)) = (entry.packfile_oid, entry.staged_packfile_oid)
                && old != new
            {
                orphaned.push(old);
            }
            entry.packfile_oid = entry.staged_packfile_oid;
            entry.mtime = entry.staged_mtime;
            entry.size = entry.staged_size.unwrap_or(entry.size);
            entry.clear_overlay();
            kept.push(entry);
        }
        self.entries = kept;

        for oid in orphaned {
            self.purge_packfile_rows(oid);
            self.orphan_packfiles.push(OrphanPackFile { oid, dtime: now });
        }
        info!(entries = self.entries.len(), "index committed");
    }

    /// Discard staged overlays for matching paths. Returns the staged
    /// packfile OIDs that became orphans (their files stay on disk until gc).
    pub fn reset(&mut self, spec: &PathSpec) -> Vec<Oid> {
        let now = clock::now();
        let mut orphaned = Vec::new();
        self.entries.retain_mut(|entry| {
            if !entry.staged || !spec.matches(&entry.relative_path) {
                return true;
            }
            if let Some(staged) = entry.staged_packfile_oid
                && Some(staged) != entry.packfile_oid
            {
                orphaned.push(staged);
            }
            entry.clear_overlay();
            // A never-committed entry disappears with its staging.
            entry.packfile_oid.is_some()
        });
        for oid in &orphaned {
            self.purge_packfile_rows(*oid);
            self.orphan_packfiles.push(OrphanPackFile {
                oid: *oid,
                dtime: now,
            });
        }
        orphaned
    }

    /// Iterate matching entries with their packfiles.
    pub fn walk<F>(&self, spec: &PathSpec, mut cb: F) -> Result<(), NtError>
    where
        F: FnMut(&IndexEntry, Vec<&IndexObject>, Vec<&IndexBlob>) -> Result<(), NtError>,
    {
        for entry in self.entries.iter().filter(|e| spec.matches(&e.relative_path)) {
            let Some(pack_oid) = entry.effective_packfile() else {
                continue;
            };
            let objects = self
                .objects
                .iter()
                .filter(|o| o.packfile_oid == pack_oid)
                .collect();
            let blobs = self
                .blobs
                .iter()
                .filter(|b| b.packfile_oid == pack_oid)
                .collect();
            cb(entry, objects, blobs)?;
        }
        Ok(())
    }

    /// What `self` lacks relative to `other`. Only committed state counts.
    pub fn diff(&self, other: &Index) -> IndexDiff {
        let mut diff = IndexDiff::default();
        for entry in &other.entries {
            if let Some(oid) = entry.packfile_oid
                && !self
                    .entries
                    .iter()
                    .any(|e| e.packfile_oid == Some(oid))
            {
                diff.missing_packfiles.push(oid);
            }
        }
        for blob in &other.blobs {
            if !self.blobs.iter().any(|b| b.oid == blob.oid) {
                diff.missing_blobs.push(blob.oid);
            }
        }
        for orphan in &other.orphan_packfiles {
            if !self.orphan_packfiles.iter().any(|o| o.oid == orphan.oid) {
                diff.missing_orphans.push(orphan.oid);
            }
        }
        diff
    }

    /// Fast path for `add`: has the path changed since it was indexed?
    /// Compares mtime at second precision plus the byte size.
    pub fn modified(&self, rel_path: &str, mtime: DateTime<Utc>, size: u64) -> bool {
        match self.entry(rel_path) {
            None => true,
            Some(entry) => {
                let (ref_mtime, ref_size) = if entry.staged {
                    (entry.staged_mtime, entry.staged_size.unwrap_or(entry.size))
                } else {
                    (entry.mtime, entry.size)
                };
                ref_mtime.map(|t| t.timestamp()) != Some(mtime.timestamp()) || ref_size != size
            }
        }
    }

    /// Look up which packfile carries an object.
    pub fn object(&self, oid: Oid) -> Option<&IndexObject> {
        self.objects.iter().find(|o| o.oid == oid)
    }

    /// Minimum unique prefix (>= 4 chars) of an OID within this index.
    pub fn short_oid(&self, oid: Oid) -> String {
        let target = oid.to_string();
        let others: Vec<String> = self
            .all_oids()
            .filter(|o| *o != oid)
            .map(|o| o.to_string())
            .collect();
        for len in SHORT_OID_MIN..target.len() {
            let prefix = &target[..len];
            if !others.iter().any(|o| o.starts_with(prefix)) {
                return prefix.to_string();
            }
        }
        target
    }

    /// Resolve a short OID to a full one, or fail as unknown/ambiguous.
    pub fn resolve_short_oid(&self, prefix: &str) -> Result<Oid, NtError> {
        let mut matches: Vec<Oid> = self
            .all_oids()
            .filter(|o| o.to_string().starts_with(prefix))
            .collect();
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Err(NtError::UnknownOid(prefix.to_string())),
            1 => Ok(matches[0]),
            _ => Err(NtError::AmbiguousOid(prefix.to_string())),
        }
    }

    fn all_oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.entries
            .iter()
            .flat_map(|e| [e.packfile_oid, e.staged_packfile_oid])
            .flatten()
            .chain(self.objects.iter().map(|o| o.oid))
            .chain(self.blobs.iter().map(|b| b.oid))
            .chain(self.orphan_packfiles.iter().map(|o| o.oid))
            .chain(self.orphan_blobs.iter().map(|o| o.oid))
    }

    /// Every packfile referenced by an entry, committed or staged.
    pub fn referenced_packfiles(&self) -> Vec<Oid> {
        let mut oids: Vec<Oid> = self
            .entries
            .iter()
            .flat_map(|e| [e.packfile_oid, e.staged_packfile_oid])
            .flatten()
            .collect();
        oids.sort();
        oids.dedup();
        oids
    }

    /// Drop orphans older than the retention window, returning what gc
    /// should delete from disk.
    pub fn take_expired_orphans(
        &mut self,
        retention: std::time::Duration,
    ) -> (Vec<Oid>, Vec<Oid>) {
        let cutoff = clock::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(7));
        let (expired_packs, live_packs): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orphan_packfiles)
            .into_iter()
            .partition(|o| o.dtime <= cutoff);
        self.orphan_packfiles = live_packs;
        let (expired_blobs, live_blobs): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orphan_blobs)
            .into_iter()
            .partition(|o| o.dtime <= cutoff);
        self.orphan_blobs = live_blobs;
        (
            expired_packs.into_iter().map(|o| o.oid).collect(),
            expired_blobs.into_iter().map(|o| o.oid).collect(),
        )
    }

    /// Upsert reverse-lookup rows for a staged packfile. Every object OID
    /// lives in exactly one row.
    fn upsert_rows(&mut self, pack: &PackFile) {
        for object in &pack.objects {
            match self.objects.iter_mut().find(|o| o.oid == object.oid) {
                Some(row) => {
                    row.kind = object.kind;
                    row.packfile_oid = pack.oid;
                    row.relative_path = pack.file_relative_path.clone();
                }
                None => self.objects.push(IndexObject {
                    oid: object.oid,
                    kind: object.kind,
                    packfile_oid: pack.oid,
                    relative_path: pack.file_relative_path.clone(),
                }),
            }
        }
        for blob_ref in &pack.blob_refs {
            match self.blobs.iter_mut().find(|b| b.oid == blob_ref.oid) {
                Some(row) => row.packfile_oid = pack.oid,
                None => self.blobs.push(IndexBlob {
                    oid: blob_ref.oid,
                    mime: blob_ref.mime.clone(),
                    packfile_oid: pack.oid,
                }),
            }
        }
    }

    /// Remove reverse-lookup rows still pointing at a packfile; blobs whose
    /// last reference vanished become orphan blobs.
    fn purge_packfile_rows(&mut self, pack_oid: Oid) {
        self.objects.retain(|o| o.packfile_oid != pack_oid);
        let now = clock::now();
        let mut orphans = Vec::new();
        self.blobs.retain(|b| {
            if b.packfile_oid == pack_oid {
                orphans.push(OrphanBlob {
                    oid: b.oid,
                    dtime: now,
                    media_oid: Oid::nil(),
                });
                false
            } else {
                true
            }
        });
        self.orphan_blobs.extend(orphans);
    }

    /// Rebuild the reverse indexes from scratch (used after reset, when the
    /// staged rows must fall back to committed packfiles).
    pub fn rebuild_rows(&mut self, packs: &[PackFile]) {
        self.objects.clear();
        self.blobs.clear();
        for pack in packs {
            self.upsert_rows(pack);
        }
    }
}
