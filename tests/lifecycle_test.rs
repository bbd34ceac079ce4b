//! End-to-end lifecycle scenarios over a temporary repository: first add,
//! stable identity across edits, deletion tombstones, reset identity,
//! add/commit idempotence, gc safety, diff and cat.

use std::path::Path;

use notewriter::{
    internal::object::{File, Flashcard, Note, ObjectKind, State},
    internal::pack::PackFile,
    projection::Projection,
    repository::{Repository, StatusChange},
};

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
    std::fs::write(abs, content).unwrap();
}

fn init_repo(dir: &tempfile::TempDir) -> Repository {
    Repository::init(dir.path()).unwrap()
}

/// S1 — first add: one entry, one packfile with a File and a Note object,
/// one commit citing that packfile.
#[test]
fn test_first_add_and_commit() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");

    let report = repo.add(&[]).unwrap();
    assert_eq!(report.staged, vec!["a.md"]);
    assert!(report.errors.is_empty());

    let commit = repo.commit("first").unwrap();
    assert_eq!(repo.index.entries.len(), 1);
    assert_eq!(commit.packfiles.len(), 1);
    assert_eq!(repo.commit_graph.commits.len(), 1);

    let entry = repo.index.entry("a.md").unwrap();
    let pack_oid = entry.packfile_oid.unwrap();
    assert_eq!(commit.packfiles[0].oid, pack_oid);

    let pack = PackFile::load(&repo.objects, pack_oid).unwrap();
    let kinds: Vec<ObjectKind> = pack.objects.iter().map(|o| o.kind).collect();
    assert_eq!(kinds, vec![ObjectKind::File, ObjectKind::Note]);
}

/// S2 — edit stable identity: the note keeps its OID across a body edit,
/// the replaced packfile becomes an orphan and gc deletes it once expired.
#[test]
fn test_edit_preserves_note_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let old_pack_oid = repo.index.entry("a.md").unwrap().packfile_oid.unwrap();
    let old_pack = PackFile::load(&repo.objects, old_pack_oid).unwrap();
    let old_note: Note = {
        let row = old_pack
            .objects
            .iter()
            .find(|o| o.kind == ObjectKind::Note)
            .unwrap();
        old_pack.unmarshal_object(row.oid).unwrap()
    };
    assert_eq!(old_note.state, State::Added);

    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody changed.");
    repo.add(&[]).unwrap();
    repo.commit("second").unwrap();

    let new_pack_oid = repo.index.entry("a.md").unwrap().packfile_oid.unwrap();
    assert_ne!(new_pack_oid, old_pack_oid);
    let new_pack = PackFile::load(&repo.objects, new_pack_oid).unwrap();
    let new_note: Note = {
        let row = new_pack
            .objects
            .iter()
            .find(|o| o.kind == ObjectKind::Note)
            .unwrap();
        new_pack.unmarshal_object(row.oid).unwrap()
    };

    assert_eq!(new_note.oid, old_note.oid);
    assert_eq!(new_note.state, State::Modified);
    assert_ne!(new_note.body_hash, old_note.body_hash);
    assert!(repo.index.orphan_packfiles.iter().any(|o| o.oid == old_pack_oid));

    // gc with a zero retention removes the orphan from disk.
    repo.config.core.gc_retention = "0s".to_string();
    let gc = repo.gc().unwrap();
    assert!(gc.deleted_packfiles.contains(&old_pack_oid));
    assert!(!repo.objects.contains(old_pack_oid));
    assert!(repo.objects.contains(new_pack_oid));
}

/// S3 — delete file: tombstone on add, entry dropped on commit, zero notes
/// in the SQL projection.
#[test]
fn test_delete_file_tombstones() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();
    let old_pack_oid = repo.index.entry("a.md").unwrap().packfile_oid.unwrap();

    std::fs::remove_file(dir.path().join("a.md")).unwrap();
    let report = repo.add(&[]).unwrap();
    assert_eq!(report.tombstoned, vec!["a.md"]);
    assert!(repo.index.entry("a.md").unwrap().staged_tombstone.is_some());

    repo.commit("remove").unwrap();
    assert!(repo.index.entry("a.md").is_none());
    assert!(repo.index.orphan_packfiles.iter().any(|o| o.oid == old_pack_oid));

    let mut projection = Projection::open_in_memory().unwrap();
    projection.rebuild(&repo).unwrap();
    assert_eq!(projection.count_notes().unwrap(), 0);
}

/// Property 4 — add/commit idempotence: a second add+commit on an unchanged
/// tree stages nothing and the index file stays bit-identical.
#[test]
fn test_add_commit_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();
    assert_eq!(repo.commit_graph.commits.len(), 1);

    let index_before = std::fs::read(dir.path().join(".nt/index")).unwrap();
    let report = repo.add(&[]).unwrap();
    assert!(report.staged.is_empty());
    assert_eq!(report.skipped, vec!["a.md"]);
    assert!(repo.commit("again").is_err());
    let index_after = std::fs::read(dir.path().join(".nt/index")).unwrap();
    assert_eq!(index_before, index_after);
    assert_eq!(repo.commit_graph.commits.len(), 1);
}

/// Property 5 — reset identity: staging then resetting returns the index to
/// its committed state; the staged packfile survives on disk as an orphan.
#[test]
fn test_reset_restores_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();
    let committed_oid = repo.index.entry("a.md").unwrap().packfile_oid.unwrap();

    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody changed.");
    repo.add(&[]).unwrap();
    let staged_oid = repo.index.entry("a.md").unwrap().staged_packfile_oid.unwrap();
    assert_ne!(staged_oid, committed_oid);

    let orphaned = repo.reset(&[]).unwrap();
    assert_eq!(orphaned, vec![staged_oid]);
    let entry = repo.index.entry("a.md").unwrap();
    assert!(!entry.staged);
    assert_eq!(entry.packfile_oid, Some(committed_oid));
    // The staged packfile is still on disk, awaiting gc.
    assert!(repo.objects.contains(staged_oid));
    // Reverse rows point at the committed packfile again.
    assert!(repo.index.objects.iter().all(|o| o.packfile_oid == committed_oid));
}

/// Property 6 — gc safety: nothing referenced is ever deleted.
#[test]
fn test_gc_never_deletes_referenced() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    write(dir.path(), "b.md", "# B\n\n## Note: y\n\nOther.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    repo.config.core.gc_retention = "0s".to_string();
    repo.gc().unwrap();
    for oid in repo.index.referenced_packfiles() {
        assert!(repo.objects.contains(oid));
    }
    for blob in &repo.index.blobs {
        assert!(repo.objects.contains(blob.oid));
    }
}

#[test]
fn test_status_reports_all_three_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "committed.md", "# C\n\n## Note: c\n\nText.");
    repo.add(&[]).unwrap();
    repo.commit("base").unwrap();

    write(dir.path(), "staged.md", "# S\n\n## Note: s\n\nText.");
    repo.add(&["staged.md".to_string()]).unwrap();
    write(dir.path(), "untracked.md", "# U\n\n## Note: u\n\nText.");
    write(dir.path(), "committed.md", "# C\n\n## Note: c\n\nText edited.");

    let status = repo.status().unwrap();
    assert_eq!(status.staged, vec![StatusChange::Added("staged.md".into())]);
    assert_eq!(
        status.unstaged,
        vec![StatusChange::Modified("committed.md".into())]
    );
    assert_eq!(status.untracked, vec!["untracked.md"]);
}

#[test]
fn test_diff_shows_working_tree_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.\n");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody changed.\n");
    let diff = repo.diff(&[]).unwrap();
    assert!(diff.contains("--- a/a.md"));
    assert!(diff.contains("-Body."));
    assert!(diff.contains("+Body changed."));

    // No change, no diff.
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.\n");
    assert!(repo.diff(&[]).unwrap().is_empty());
}

#[test]
fn test_cat_by_short_oid() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "a.md", "# A\n\n## Note: x\n\nBody.");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let note_row = repo
        .index
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::Note)
        .unwrap();
    let short = repo.index.short_oid(note_row.oid);
    let yaml = repo.cat(&short).unwrap();
    assert!(yaml.contains("slug: a-note-x"));

    assert!(repo.cat("ffffffff").is_err());
}

/// Owned objects follow the file: a flashcard parses into a record whose
/// study state survives an unrelated edit.
#[test]
fn test_flashcard_lifecycle_through_add() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(
        dir.path(),
        "deck.md",
        "# Deck\n\n## Flashcard: Capital\n\nCapital of France?\n\n---\n\nParis.",
    );
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let cards = repo.load_objects::<Flashcard>(ObjectKind::Flashcard).unwrap();
    assert_eq!(cards.len(), 1);
    let first_oid = cards[0].oid;

    write(
        dir.path(),
        "deck.md",
        "# Deck\n\n## Flashcard: Capital\n\nWhat is the capital of France?\n\n---\n\nParis.",
    );
    repo.add(&[]).unwrap();
    repo.commit("edit").unwrap();

    let cards = repo.load_objects::<Flashcard>(ObjectKind::Flashcard).unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].oid, first_oid);
    assert!(cards[0].front.starts_with("What is"));
}

/// Ancestor `index.md` attributes flow into descendants during `add`.
#[test]
fn test_ancestor_attributes_through_add() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "references/index.md", "---\nauthor: Thoreau\n---\n");
    write(
        dir.path(),
        "references/walden.md",
        "# Walden\n\n## Quote: pond\n\nSimplify, simplify.",
    );
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let files = repo.load_objects::<File>(ObjectKind::File).unwrap();
    let walden = files
        .iter()
        .find(|f| f.relative_path == "references/walden.md")
        .unwrap();
    assert_eq!(
        walden
            .attributes
            .get("author")
            .and_then(|v| v.as_str()),
        Some("Thoreau")
    );
}

/// A media reference writes its bytes as a blob referenced by the packfile.
#[test]
fn test_media_blob_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    std::fs::create_dir_all(dir.path().join("images")).unwrap();
    std::fs::write(dir.path().join("images/pond.png"), [0x89, b'P', b'N', b'G', 1, 2, 3]).unwrap();
    write(dir.path(), "a.md", "# A\n\n## Note: pic\n\n![pond](images/pond.png)");
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let blob_row = repo
        .index
        .blobs
        .iter()
        .find(|b| b.mime == "image/png")
        .expect("media blob indexed");
    assert_eq!(
        repo.objects.read_blob(blob_row.oid).unwrap(),
        vec![0x89, b'P', b'N', b'G', 1, 2, 3]
    );
}

/// Pathspec-restricted add only stages matching files.
#[test]
fn test_add_with_pathspec() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(dir.path(), "notes/a.md", "# A\n\n## Note: a\n\nText.");
    write(dir.path(), "journal/j.md", "# J\n\n## Journal: day\n\nText.");

    let report = repo.add(&["notes/**".to_string()]).unwrap();
    assert_eq!(report.staged, vec!["notes/a.md"]);

    assert!(matches!(
        repo.add(&["nothing-here/**".to_string()]),
        Err(notewriter::errors::NtError::PathspecNoMatch(_))
    ));
}

/// S5 — generator output contributes notes through a real `add`.
#[test]
fn test_generator_note_through_add() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(
        dir.path(),
        "gen.md",
        "# G\n\n## Generator: listing\n\n```sh\necho '## Note: Generated'\necho 'Hello.'\n```",
    );
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let notes = repo.load_objects::<Note>(ObjectKind::Note).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].short_title, "Generated");
    assert_eq!(notes[0].line, 3);
}

/// The SQL projection rebuilds on checksum drift and serves FTS queries.
#[test]
fn test_projection_sync_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = init_repo(&dir);
    write(
        dir.path(),
        "a.md",
        "# A\n\n## Note: walden\n\nI went to the woods to live deliberately.",
    );
    repo.add(&[]).unwrap();
    repo.commit("first").unwrap();

    let mut projection = Projection::open(&dir.path().join(".nt/database.db")).unwrap();
    assert!(projection.sync(&repo).unwrap());
    // Second sync is a no-op.
    assert!(!projection.sync(&repo).unwrap());

    let hits = projection.search_notes("deliberately").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].slug, "a-note-walden");

    let row = projection.note_by_slug("a-note-walden").unwrap().unwrap();
    assert_eq!(row.kind, "note");
}
