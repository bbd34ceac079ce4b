//! Repository lifecycle: `add`, `commit`, `reset`, `gc`, `status`, `diff`
//! and `cat`, coordinating parser → objects → packfiles → index → commit
//! graph.
//!
//! A [`Repository`] is an explicit context: root directory, configuration,
//! compiled schema, index, commit graph and object directory. The CLI builds
//! one per invocation; tests build one per test with a frozen clock and a
//! temporary root. Mutating operations hold the `.nt/lock` advisory lock and
//! finish with atomic writes, so a cancelled or crashed run never leaves a
//! half-visible state.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use similar::TextDiff;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    attribute::{AttributeValue, Attributes, schema::Schema},
    clock,
    config::Config,
    errors::NtError,
    internal::{
        commit_graph::{Commit, CommitGraph, PackFileRef},
        index::{Index, PathSpec},
        object::{File, Flashcard, GoLink, Media, Note, NtObject, ObjectKind, Reminder, State},
        pack::{BlobRef, PackFile, blob::ObjectDirectory},
    },
    oid::Oid,
    parser::{ParsedFile, Parser, ParserOptions},
    utils::LockFile,
};

/// Attribute marking the packfile blob that holds the source document bytes.
const SOURCE_BLOB_ROLE: &str = "source";

/// Outcome of one `add` invocation.
#[derive(Debug, Default)]
pub struct AddReport {
    pub staged: Vec<String>,
    pub tombstoned: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<(String, NtError)>,
    pub cancelled: bool,
}

/// One line of `nt status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Added(String),
    Modified(String),
    Deleted(String),
}

impl StatusChange {
    pub fn path(&self) -> &str {
        match self {
            StatusChange::Added(p) | StatusChange::Modified(p) | StatusChange::Deleted(p) => p,
        }
    }
}

/// Staged and unstaged changes plus untracked files.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub staged: Vec<StatusChange>,
    pub unstaged: Vec<StatusChange>,
    pub untracked: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.untracked.is_empty()
    }
}

/// What one `gc` pass deleted.
#[derive(Debug, Default)]
pub struct GcReport {
    pub deleted_packfiles: Vec<Oid>,
    pub deleted_blobs: Vec<Oid>,
}

pub struct Repository {
    root: PathBuf,
    nt_dir: PathBuf,
    pub config: Config,
    schema: Schema,
    pub index: Index,
    pub commit_graph: CommitGraph,
    pub objects: ObjectDirectory,
}

impl Repository {
    /// Create `.nt/` scaffolding under `root`.
    pub fn init(root: &Path) -> Result<Repository, NtError> {
        let nt_dir = root.join(".nt");
        if nt_dir.exists() {
            return Err(NtError::RepositoryExists(root.to_path_buf()));
        }
        std::fs::create_dir_all(nt_dir.join("objects"))?;
        std::fs::create_dir_all(nt_dir.join("refs"))?;
        let config = Config::default();
        config.save(&nt_dir.join("config"))?;
        info!(root = %root.display(), "initialized repository");
        Self::open(root)
    }

    /// Open an existing repository, discovering the root from `start`:
    /// `NT_HOME` wins, then the nearest ancestor containing `.nt`.
    pub fn open(start: &Path) -> Result<Repository, NtError> {
        let root = Self::discover_root(start)?;
        let nt_dir = root.join(".nt");
        let config = Config::load(&nt_dir.join("config"))?;
        let schema = Schema::compile(&config.lint.schema)?;
        let index = Index::load(&nt_dir.join("index"))?;
        let commit_graph = CommitGraph::load(&nt_dir.join("commit-graph"))?;
        let objects = ObjectDirectory::new(&nt_dir.join("objects"));
        Ok(Repository {
            root,
            nt_dir,
            config,
            schema,
            index,
            commit_graph,
            objects,
        })
    }

    fn discover_root(start: &Path) -> Result<PathBuf, NtError> {
        if let Ok(home) = std::env::var("NT_HOME") {
            let root = PathBuf::from(home);
            if root.join(".nt").exists() {
                return Ok(root);
            }
            return Err(NtError::RepositoryNotFound(root));
        }
        let mut current = start.to_path_buf();
        loop {
            if current.join(".nt").exists() {
                return Ok(current);
            }
            if !current.pop() {
                return Err(NtError::RepositoryNotFound(start.to_path_buf()));
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> Result<LockFile, NtError> {
        LockFile::acquire(&self.nt_dir.join("lock"))
    }

    fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            generator_timeout: self.config.core.generator_timeout(),
            generator_max_depth: self.config.core.generator_max_depth,
        }
    }

    /// Markdown files under the root matching a pathspec, lexicographic so
    /// `index.md` ancestors precede their descendants.
    pub fn working_files(&self, spec: &PathSpec) -> Vec<String> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name().to_str() != Some(".nt"))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if !self.config.core.matches_extension(rel) {
                continue;
            }
            let rel = crate::utils::normalize_rel_path(rel);
            if spec.matches(&rel) {
                files.push(rel);
            }
        }
        files.sort();
        files
    }

    /// Parse matching files, write packfiles and stage them.
    pub fn add(&mut self, pathspecs: &[String]) -> Result<AddReport, NtError> {
        self.add_with_cancel(pathspecs, &AtomicBool::new(false))
    }

    /// `add` with a cancellation token: when the flag flips, no further file
    /// is processed and the in-memory index mutations are discarded — only
    /// already-written packfiles/blobs remain, as orphans for the next gc.
    pub fn add_with_cancel(
        &mut self,
        pathspecs: &[String],
        cancel: &AtomicBool,
    ) -> Result<AddReport, NtError> {
        let _lock = self.lock()?;
        let spec = PathSpec::compile(pathspecs)?;
        let mut report = AddReport::default();

        let files = self.working_files(&spec);
        if files.is_empty() && !pathspecs.is_empty() && self.tracked_matching(&spec).is_empty() {
            return Err(NtError::PathspecNoMatch(pathspecs.join(" ")));
        }

        for rel_path in &files {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                // Discard in-memory staging; on-disk index was never touched.
                self.index = Index::load(&self.nt_dir.join("index"))?;
                return Ok(report);
            }
            match self.add_one(rel_path) {
                Ok(AddOutcome::Staged) => report.staged.push(rel_path.clone()),
                Ok(AddOutcome::Unchanged) => report.skipped.push(rel_path.clone()),
                Ok(AddOutcome::Ignored) => {
                    // A tracked file that became ignored disappears.
                    if self.index.entry(rel_path).is_some() {
                        self.index.set_tombstone(rel_path);
                        report.tombstoned.push(rel_path.clone());
                    } else {
                        report.skipped.push(rel_path.clone());
                    }
                }
                Err(e) => {
                    warn!(path = %rel_path, error = %e, "add failed for file");
                    report.errors.push((rel_path.clone(), e));
                }
            }
        }

        // Tracked files gone from the working tree get tombstones.
        for rel_path in self.tracked_matching(&spec) {
            if !self.root.join(&rel_path).exists() {
                self.index.set_tombstone(&rel_path);
                report.tombstoned.push(rel_path);
            }
        }

        self.index.save()?;
        info!(
            staged = report.staged.len(),
            tombstoned = report.tombstoned.len(),
            errors = report.errors.len(),
            "add finished"
        );
        Ok(report)
    }

    fn tracked_matching(&self, spec: &PathSpec) -> Vec<String> {
        self.index
            .entries
            .iter()
            .filter(|e| spec.matches(&e.relative_path))
            .map(|e| e.relative_path.clone())
            .collect()
    }

    fn add_one(&mut self, rel_path: &str) -> Result<AddOutcome, NtError> {
        let abs = self.root.join(rel_path);
        let metadata = std::fs::metadata(&abs)?;
        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| clock::now());
        if !self.index.modified(rel_path, mtime, metadata.len()) {
            return Ok(AddOutcome::Unchanged);
        }

        let content = std::fs::read_to_string(&abs)?;
        let parser = Parser::new(&self.root, &self.schema, self.parser_options());
        let Some(parsed) = parser.parse_content(rel_path, &content, metadata.len(), mtime)? else {
            return Ok(AddOutcome::Ignored);
        };
        for warning in &parsed.warnings {
            warn!("{warning}");
        }

        let previous = self.previous_pack(rel_path)?;
        let pack = self.build_pack(&parsed, &content, previous.as_ref())?;
        pack.save(&self.objects)?;
        self.index.stage(&pack, mtime, metadata.len());
        Ok(AddOutcome::Staged)
    }

    fn previous_pack(&self, rel_path: &str) -> Result<Option<PackFile>, NtError> {
        match self.index.entry(rel_path).and_then(|e| e.effective_packfile()) {
            Some(oid) => Ok(Some(PackFile::load(&self.objects, oid)?)),
            None => Ok(None),
        }
    }

    /// Lift a parse result into object records and bundle them into a new
    /// packfile, matching against the previously committed records so OIDs
    /// stay stable.
    fn build_pack(
        &self,
        parsed: &ParsedFile,
        source: &str,
        previous: Option<&PackFile>,
    ) -> Result<PackFile, NtError> {
        let prev_file = previous.and_then(|p| unmarshal_all::<File>(p, ObjectKind::File).pop());
        let prev_notes = previous.map(|p| unmarshal_all::<Note>(p, ObjectKind::Note)).unwrap_or_default();
        let prev_cards = previous
            .map(|p| unmarshal_all::<Flashcard>(p, ObjectKind::Flashcard))
            .unwrap_or_default();
        let prev_reminders = previous
            .map(|p| unmarshal_all::<Reminder>(p, ObjectKind::Reminder))
            .unwrap_or_default();
        let prev_golinks = previous
            .map(|p| unmarshal_all::<GoLink>(p, ObjectKind::GoLink))
            .unwrap_or_default();
        let prev_medias = previous
            .map(|p| unmarshal_all::<Media>(p, ObjectKind::Media))
            .unwrap_or_default();

        let file = File::new_or_existing(parsed, prev_file.as_ref());

        // Notes in source order; parents resolve to already-built notes.
        let mut notes: Vec<Note> = Vec::with_capacity(parsed.notes.len());
        for parsed_note in &parsed.notes {
            let parent_oid = parsed_note.parent.map(|i| notes[i].oid);
            let matched = Note::match_previous(parsed_note, parent_oid, &prev_notes);
            notes.push(Note::new_or_existing(parsed_note, file.oid, parent_oid, matched));
        }

        let mut flashcards: Vec<Flashcard> = Vec::new();
        for parsed_card in &parsed.flashcards {
            let note = &notes[parsed_card.note];
            let matched = prev_cards
                .iter()
                .find(|c| c.note_oid == note.oid)
                .or_else(|| prev_cards.iter().find(|c| c.slug == note.slug));
            flashcards.push(Flashcard::new_or_existing(
                parsed_card,
                &note.slug,
                file.oid,
                note.oid,
                matched,
            ));
        }

        let mut reminders: Vec<Reminder> = Vec::new();
        for parsed_reminder in &parsed.reminders {
            let note = &notes[parsed_reminder.note];
            let matched = prev_reminders
                .iter()
                .find(|r| r.note_oid == note.oid && r.tag == parsed_reminder.tag)
                .or_else(|| {
                    prev_reminders
                        .iter()
                        .find(|r| r.description == parsed_reminder.description)
                });
            reminders.push(Reminder::new_or_existing(
                parsed_reminder,
                file.oid,
                note.oid,
                matched,
            )?);
        }

        let mut golinks: Vec<GoLink> = Vec::new();
        for parsed_golink in &parsed.golinks {
            let note = &notes[parsed_golink.note];
            let matched = prev_golinks.iter().find(|g| g.go_name == parsed_golink.go_name);
            golinks.push(GoLink::new_or_existing(parsed_golink, note.oid, matched));
        }

        let mut medias: Vec<Media> = Vec::new();
        for parsed_media in &parsed.medias {
            let media_oid = Media::oid_for_path(&parsed_media.rel_path);
            let matched = prev_medias
                .iter()
                .find(|m| m.oid == media_oid)
                .cloned()
                .or_else(|| self.committed_media(media_oid));
            medias.push(Media::new_or_existing(parsed_media, matched.as_ref()));
        }
        self.ingest_media_blobs(&mut medias)?;

        let mut pack = PackFile::new(&parsed.rel_path);
        pack.append_object(&file)?;
        for note in &notes {
            pack.append_object(note)?;
        }
        for card in &flashcards {
            pack.append_object(card)?;
        }
        for reminder in &reminders {
            pack.append_object(reminder)?;
        }
        for golink in &golinks {
            pack.append_object(golink)?;
        }
        for media in &medias {
            pack.append_object(media)?;
            for blob_ref in &media.blob_refs {
                pack.append_blob_ref(blob_ref.clone());
            }
        }

        // The raw document bytes ride along as a blob so `diff` and mirrors
        // can reconstruct the source.
        let mut source_attrs = Attributes::new();
        source_attrs.insert("role", AttributeValue::String(SOURCE_BLOB_ROLE.to_string()));
        let source_blob = self
            .objects
            .put_blob(source.as_bytes(), Some("md"), source_attrs)?;
        pack.append_blob_ref(source_blob.to_ref());

        pack.finalize()?;
        debug!(path = %parsed.rel_path, oid = %pack.oid, "built packfile");
        Ok(pack)
    }

    /// A media previously committed under another file's packfile.
    fn committed_media(&self, media_oid: Oid) -> Option<Media> {
        let row = self.index.object(media_oid)?;
        let pack = PackFile::load(&self.objects, row.packfile_oid).ok()?;
        pack.unmarshal_object::<Media>(media_oid).ok()
    }

    /// Hash and store the bytes of every media that needs (re-)ingestion,
    /// across a bounded worker pool.
    fn ingest_media_blobs(&self, medias: &mut [Media]) -> Result<(), NtError> {
        let pending: Vec<usize> = medias
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.dangling && (m.blob_refs.is_empty() || m.state == State::Modified))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.core.media_workers())
            .build()
            .map_err(|e| NtError::CustomError(e.to_string()))?;
        let snapshot: &[Media] = medias;
        let results: Vec<(usize, Result<BlobRef, NtError>)> = pool.install(|| {
            pending
                .par_iter()
                .map(|&i| {
                    let media = &snapshot[i];
                    let result = std::fs::read(self.root.join(&media.relative_path))
                        .map_err(NtError::IOError)
                        .and_then(|bytes| {
                            self.objects
                                .put_blob(&bytes, Some(&media.extension), Attributes::new())
                        })
                        .map(|blob| blob.to_ref());
                    (i, result)
                })
                .collect()
        });

        for (i, result) in results {
            match result {
                Ok(blob_ref) => medias[i].blob_refs = vec![blob_ref],
                Err(e) => {
                    warn!(path = %medias[i].relative_path, error = %e, "media ingestion failed; marking dangling");
                    medias[i].dangling = true;
                }
            }
        }
        Ok(())
    }

    /// Promote staged entries into a new commit.
    pub fn commit(&mut self, message: &str) -> Result<Commit, NtError> {
        let _lock = self.lock()?;
        if !self.index.has_staged_changes() {
            return Err(NtError::EmptyStagingArea);
        }
        let refs: Vec<PackFileRef> = self
            .index
            .staged_entries()
            .filter_map(|e| {
                e.staged_packfile_oid.map(|oid| PackFileRef {
                    oid,
                    relative_path: e.relative_path.clone(),
                })
            })
            .collect();

        self.index.commit();
        let commit = Commit::new(message, refs)?;
        self.commit_graph.append_commit(commit.clone())?;
        self.index.save()?;
        self.commit_graph.save()?;
        info!(oid = %commit.oid, "committed");
        Ok(commit)
    }

    /// Discard staged entries matching the pathspec.
    pub fn reset(&mut self, pathspecs: &[String]) -> Result<Vec<Oid>, NtError> {
        let _lock = self.lock()?;
        let spec = PathSpec::compile(pathspecs)?;
        let orphaned = self.index.reset(&spec);

        // Reverse indexes fall back to the committed packfiles.
        let mut packs = Vec::new();
        for oid in self.index.referenced_packfiles() {
            packs.push(PackFile::load(&self.objects, oid)?);
        }
        self.index.rebuild_rows(&packs);
        self.index.save()?;
        Ok(orphaned)
    }

    /// Delete orphan packfiles and blobs past the retention window, plus any
    /// unreferenced stray under `.nt/objects` (newly discovered strays are
    /// granted the retention window first).
    pub fn gc(&mut self) -> Result<GcReport, NtError> {
        let _lock = self.lock()?;
        let mut report = GcReport::default();
        let retention = self.config.core.gc_retention();

        let referenced_packs = self.index.referenced_packfiles();
        let referenced_blobs: Vec<Oid> = self.index.blobs.iter().map(|b| b.oid).collect();

        let (expired_packs, expired_blobs) = self.index.take_expired_orphans(retention);
        for oid in expired_packs {
            // A resurrected packfile (same content re-staged) stays.
            if referenced_packs.contains(&oid) {
                continue;
            }
            self.objects.remove(oid)?;
            report.deleted_packfiles.push(oid);
        }
        for oid in expired_blobs {
            if referenced_blobs.contains(&oid) {
                continue;
            }
            self.objects.remove(oid)?;
            report.deleted_blobs.push(oid);
        }

        // Strays (e.g. leftovers of a cancelled add) enter the orphan list
        // and get deleted by a later pass.
        let tracked: Vec<Oid> = self
            .index
            .orphan_packfiles
            .iter()
            .map(|o| o.oid)
            .chain(self.index.orphan_blobs.iter().map(|o| o.oid))
            .chain(referenced_packs.iter().copied())
            .chain(referenced_blobs.iter().copied())
            .collect();
        for oid in self.objects.list()? {
            if !tracked.contains(&oid) {
                self.index
                    .orphan_packfiles
                    .push(crate::internal::index::OrphanPackFile {
                        oid,
                        dtime: clock::now(),
                    });
            }
        }

        self.index.save()?;
        info!(
            packfiles = report.deleted_packfiles.len(),
            blobs = report.deleted_blobs.len(),
            "gc finished"
        );
        Ok(report)
    }

    /// Staged and unstaged changes. Lock-free.
    pub fn status(&self) -> Result<StatusReport, NtError> {
        let mut report = StatusReport::default();
        for entry in self.index.staged_entries() {
            let change = if entry.staged_tombstone.is_some() {
                StatusChange::Deleted(entry.relative_path.clone())
            } else if entry.packfile_oid.is_none() {
                StatusChange::Added(entry.relative_path.clone())
            } else {
                StatusChange::Modified(entry.relative_path.clone())
            };
            report.staged.push(change);
        }

        let spec = PathSpec::all();
        let working = self.working_files(&spec);
        for rel_path in &working {
            let abs = self.root.join(rel_path);
            let Ok(metadata) = std::fs::metadata(&abs) else {
                continue;
            };
            let mtime = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| clock::now());
            match self.index.entry(rel_path) {
                None => report.untracked.push(rel_path.clone()),
                Some(_) if self.index.modified(rel_path, mtime, metadata.len()) => {
                    report
                        .unstaged
                        .push(StatusChange::Modified(rel_path.clone()));
                }
                Some(_) => {}
            }
        }
        for entry in &self.index.entries {
            if !entry.staged && !self.root.join(&entry.relative_path).exists() {
                report
                    .unstaged
                    .push(StatusChange::Deleted(entry.relative_path.clone()));
            }
        }
        Ok(report)
    }

    /// Unified diff of Markdown content between the working tree and the
    /// committed packfiles. Lock-free.
    pub fn diff(&self, pathspecs: &[String]) -> Result<String, NtError> {
        let spec = PathSpec::compile(pathspecs)?;
        let mut out = String::new();
        for entry in self.index.entries.iter().filter(|e| spec.matches(&e.relative_path)) {
            let Some(pack_oid) = entry.packfile_oid else {
                continue;
            };
            let pack = PackFile::load(&self.objects, pack_oid)?;
            let committed = self.source_text(&pack)?;
            let working = std::fs::read_to_string(self.root.join(&entry.relative_path))
                .unwrap_or_default();
            if committed == working {
                continue;
            }
            let diff = TextDiff::from_lines(&committed, &working);
            out.push_str(&format!(
                "--- a/{path}\n+++ b/{path}\n",
                path = entry.relative_path
            ));
            out.push_str(&diff.unified_diff().context_radius(3).to_string());
        }
        Ok(out)
    }

    /// Content of the source-document blob carried by a packfile.
    fn source_text(&self, pack: &PackFile) -> Result<String, NtError> {
        let source_ref = pack
            .blob_refs
            .iter()
            .find(|b| {
                b.attributes
                    .get("role")
                    .and_then(AttributeValue::as_str)
                    == Some(SOURCE_BLOB_ROLE)
            })
            .ok_or_else(|| NtError::MissingBlob(format!("source blob of {}", pack.oid)))?;
        let bytes = self.objects.read_blob(source_ref.oid)?;
        String::from_utf8(bytes)
            .map_err(|e| NtError::InvalidObjectData(format!("source blob is not UTF-8: {e}")))
    }

    /// Print an object, packfile or blob reference by OID or short OID.
    pub fn cat(&self, oid_or_short: &str) -> Result<String, NtError> {
        let oid = match oid_or_short.parse::<Oid>() {
            Ok(oid) => oid,
            Err(_) => self.index.resolve_short_oid(oid_or_short)?,
        };

        if let Some(row) = self.index.object(oid) {
            let pack = PackFile::load(&self.objects, row.packfile_oid)?;
            let object = pack
                .get_object(oid)
                .ok_or_else(|| NtError::ObjectNotFound(oid.to_string()))?;
            return object.decode_data();
        }
        if self
            .index
            .referenced_packfiles()
            .contains(&oid)
            || self.index.orphan_packfiles.iter().any(|o| o.oid == oid)
        {
            let pack = PackFile::load(&self.objects, oid)?;
            return pack.encode();
        }
        if let Some(blob) = self.index.blobs.iter().find(|b| b.oid == oid) {
            return Ok(format!(
                "oid: {}\nmime: {}\npackfile_oid: {}\n",
                blob.oid, blob.mime, blob.packfile_oid
            ));
        }
        Err(NtError::UnknownOid(oid_or_short.to_string()))
    }

    /// Objects of one kind across the committed index, for the projection
    /// and study flows.
    pub fn load_objects<T>(&self, kind: ObjectKind) -> Result<Vec<T>, NtError>
    where
        T: NtObject + serde::de::DeserializeOwned,
    {
        let mut out = Vec::new();
        let mut packs: BTreeMap<Oid, PackFile> = BTreeMap::new();
        for row in self.index.objects.iter().filter(|o| o.kind == kind) {
            if !packs.contains_key(&row.packfile_oid) {
                let loaded = PackFile::load(&self.objects, row.packfile_oid)?;
                packs.insert(row.packfile_oid, loaded);
            }
            let pack = &packs[&row.packfile_oid];
            out.push(pack.unmarshal_object::<T>(row.oid)?);
        }
        Ok(out)
    }

    /// Persist an updated flashcard in place by rewriting its packfile entry.
    ///
    /// Study mutates SRS state without a working-tree change, so the record
    /// is re-staged through the normal pack path.
    pub fn save_flashcard(&mut self, card: &Flashcard) -> Result<(), NtError> {
        let _lock = self.lock()?;
        let row = self
            .index
            .object(card.oid)
            .ok_or_else(|| NtError::ObjectNotFound(card.oid.to_string()))?
            .clone();
        let old_pack = PackFile::load(&self.objects, row.packfile_oid)?;
        let mut pack = PackFile::new(&old_pack.file_relative_path);
        pack.ctime = old_pack.ctime;
        for object in &old_pack.objects {
            if object.oid == card.oid {
                pack.append_object(card)?;
            } else {
                pack.objects.push(object.clone());
            }
        }
        pack.blob_refs = old_pack.blob_refs.clone();
        pack.finalize()?;
        pack.save(&self.objects)?;

        let entry = self
            .index
            .entry(&row.relative_path)
            .ok_or_else(|| NtError::InconsistentEntry(row.relative_path.clone()))?;
        let (mtime, size) = (entry.mtime.unwrap_or_else(clock::now), entry.size);
        self.index.stage(&pack, mtime, size);
        self.index.save()?;
        Ok(())
    }
}

enum AddOutcome {
    Staged,
    Unchanged,
    Ignored,
}

fn unmarshal_all<T>(pack: &PackFile, kind: ObjectKind) -> Vec<T>
where
    T: NtObject + serde::de::DeserializeOwned,
{
    pack.objects
        .iter()
        .filter(|o| o.kind == kind)
        .filter_map(|o| o.unmarshal::<T>().ok())
        .collect()
}
