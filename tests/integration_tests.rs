//! End-to-end tests for ordena.
//!
//! These exercise the full pipeline the way a caller would: snapshot,
//! validation, concurrent verified moves, undo ledger, and the CLI layer
//! with its persisted history file.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use ordena::cli::{Cli, run};
use ordena::ledger::{UndoLedger, UndoOutcome};
use ordena::mover::{ConflictPolicy, MoveStatus, hash_file};
use ordena::organizer::{BatchOrganizer, CancelToken, NoopSink, OrganizeOptions};
use ordena::rules::{Profile, RuleTable};
use clap::Parser;

// ============================================================================
// Test utilities
// ============================================================================

/// Minimal valid JPEG header (SOI + APP0 marker).
const JPEG_HEADER: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
];

/// A temporary directory with helpers for building file layouts.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestFixture { temp_dir }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn create_file(&self, name: &str, content: &[u8]) {
        fs::write(self.path().join(name), content).expect("Failed to write file");
    }

    fn profile(&self) -> Profile {
        Profile::new(self.path(), RuleTable::default())
    }

    /// Runs one batch with default options against the fixture directory.
    fn organize(&self, ledger: &mut UndoLedger) -> ordena::Batch {
        self.organize_with(ledger, OrganizeOptions::default())
    }

    fn organize_with(&self, ledger: &mut UndoLedger, options: OrganizeOptions) -> ordena::Batch {
        let organizer = BatchOrganizer::new(options);
        organizer
            .organize(&self.profile(), ledger, &NoopSink, &CancelToken::new())
            .expect("organize should succeed")
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.exists(), "file should exist: {}", path.display());
    }

    fn assert_file_absent(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "file should not exist: {}", path.display());
    }
}

// ============================================================================
// Classification and movement
// ============================================================================

#[test]
fn test_organize_classifies_by_extension() {
    let fixture = TestFixture::new();
    fixture.create_file("a.jpg", JPEG_HEADER);
    fixture.create_file("b.txt", b"notes");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.stats.moved, 2);
    fixture.assert_file_exists("Fotos/a.jpg");
    fixture.assert_file_exists("Documentos_txt/b.txt");
    fixture.assert_file_absent("a.jpg");
    fixture.assert_file_absent("b.txt");
}

#[test]
fn test_unknown_extension_routes_to_default_bucket() {
    let fixture = TestFixture::new();
    fixture.create_file("data.xyz", b"mystery payload");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.stats.moved, 1);
    fixture.assert_file_exists("Otros/data.xyz");
}

#[test]
fn test_zero_byte_file_is_skipped_never_moved() {
    let fixture = TestFixture::new();
    fixture.create_file("empty.txt", b"");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].status, MoveStatus::Skipped);
    fixture.assert_file_exists("empty.txt");
    fixture.assert_file_absent("Documentos_txt/empty.txt");
}

#[test]
fn test_moved_content_is_byte_identical() {
    let fixture = TestFixture::new();
    let payload: Vec<u8> = (0..u8::MAX).cycle().take(100_000).collect();
    fixture.create_file("blob.bin", &payload);
    let original_hash = hash_file(&fixture.path().join("blob.bin")).unwrap();

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.stats.moved, 1);
    let dest = fixture.path().join("Otros/blob.bin");
    assert_eq!(hash_file(&dest).unwrap(), original_hash);
    fixture.assert_file_absent("blob.bin");
}

#[test]
fn test_per_extension_stats_and_bytes() {
    let fixture = TestFixture::new();
    fixture.create_file("one.txt", b"12345");
    fixture.create_file("two.txt", b"123");
    fixture.create_file("song.mp3", b"audio");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.stats.moved, 3);
    assert_eq!(batch.stats.bytes_moved, 13);
    assert_eq!(batch.stats.by_extension.get(".txt"), Some(&2));
    assert_eq!(batch.stats.by_extension.get(".mp3"), Some(&1));
}

// ============================================================================
// Conflict resolution
// ============================================================================

#[test]
fn test_rename_policy_is_deterministic_across_batches() {
    let fixture = TestFixture::new();
    let mut ledger = UndoLedger::new();

    for expected in ["PDFs/report.pdf", "PDFs/report_1.pdf", "PDFs/report_2.pdf"] {
        fixture.create_file("report.pdf", b"%PDF-1.4 body");
        let batch = fixture.organize(&mut ledger);
        assert_eq!(batch.stats.moved, 1);
        fixture.assert_file_exists(expected);
    }
}

#[test]
fn test_skip_policy_leaves_duplicate_in_place() {
    let fixture = TestFixture::new();
    let mut ledger = UndoLedger::new();

    fixture.create_file("report.pdf", b"%PDF-1.4 first");
    fixture.organize(&mut ledger);

    fixture.create_file("report.pdf", b"%PDF-1.4 second");
    let batch = fixture.organize_with(
        &mut ledger,
        OrganizeOptions {
            conflict_policy: ConflictPolicy::Skip,
            ..OrganizeOptions::default()
        },
    );

    assert_eq!(batch.stats.skipped, 1);
    fixture.assert_file_exists("report.pdf");
    assert_eq!(
        fs::read(fixture.path().join("PDFs/report.pdf")).unwrap(),
        b"%PDF-1.4 first"
    );
}

// ============================================================================
// Integrity and isolation
// ============================================================================

#[test]
fn test_mislabeled_file_fails_but_siblings_move() {
    let fixture = TestFixture::new();
    // A .png whose content is plainly not a PNG must be flagged, not moved.
    fixture.create_file("fake.png", b"definitely not an image");
    fixture.create_file("clean.txt", b"fine");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize(&mut ledger);

    assert_eq!(batch.stats.failed, 1);
    assert_eq!(batch.stats.moved, 1);
    fixture.assert_file_exists("fake.png");
    fixture.assert_file_absent("Fotos/fake.png");
    fixture.assert_file_exists("Documentos_txt/clean.txt");

    let failed = batch
        .records
        .iter()
        .find(|r| r.status == MoveStatus::Failed)
        .expect("one record should have failed");
    assert!(failed.reason.as_deref().unwrap_or("").contains("signature"));
}

#[test]
fn test_failed_final_rename_preserves_original() {
    let fixture = TestFixture::new();
    // Occupy the final destination name with a directory: the staged copy
    // succeeds but the rename into place cannot.
    fs::create_dir_all(fixture.path().join("Otros/victim.xyz")).unwrap();
    fixture.create_file("victim.xyz", b"survives");

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize_with(
        &mut ledger,
        OrganizeOptions {
            conflict_policy: ConflictPolicy::Overwrite,
            ..OrganizeOptions::default()
        },
    );

    assert_eq!(batch.stats.failed, 1);
    fixture.assert_file_exists("victim.xyz");
    assert_eq!(
        fs::read(fixture.path().join("victim.xyz")).unwrap(),
        b"survives"
    );
    fixture.assert_file_absent("Otros/victim.xyz.tmp");
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn test_undo_restores_last_batch() {
    let fixture = TestFixture::new();
    fixture.create_file("a.jpg", JPEG_HEADER);
    fixture.create_file("b.txt", b"notes");

    let mut ledger = UndoLedger::new();
    fixture.organize(&mut ledger);
    fixture.assert_file_exists("Fotos/a.jpg");
    fixture.assert_file_exists("Documentos_txt/b.txt");

    let UndoOutcome::Undone(report) = ledger.undo_last() else {
        panic!("expected an undo");
    };
    assert_eq!(report.restored, 2);
    assert!(report.is_complete_success());

    fixture.assert_file_exists("a.jpg");
    fixture.assert_file_exists("b.txt");
    fixture.assert_file_absent("Fotos/a.jpg");
    fixture.assert_file_absent("Documentos_txt/b.txt");
}

#[test]
fn test_undo_history_is_bounded_to_five_batches() {
    let fixture = TestFixture::new();
    let mut ledger = UndoLedger::new();

    for i in 0..6 {
        fixture.create_file(&format!("file{i}.txt"), b"content");
        fixture.organize(&mut ledger);
    }
    assert_eq!(ledger.len(), 5);

    // The five retained batches undo in reverse chronological order.
    for i in (1..6).rev() {
        let UndoOutcome::Undone(report) = ledger.undo_last() else {
            panic!("expected batch {i} to be undoable");
        };
        assert_eq!(report.restored, 1);
        fixture.assert_file_exists(&format!("file{i}.txt"));
    }

    // The sixth (oldest) batch was evicted and is unrecoverable.
    assert!(matches!(ledger.undo_last(), UndoOutcome::NothingToUndo));
    fixture.assert_file_exists("Documentos_txt/file0.txt");
}

#[test]
fn test_undo_on_empty_ledger_is_a_noop() {
    let mut ledger = UndoLedger::new();
    assert!(matches!(ledger.undo_last(), UndoOutcome::NothingToUndo));
}

// ============================================================================
// Worker pool behavior
// ============================================================================

#[test]
fn test_many_files_with_single_worker() {
    let fixture = TestFixture::new();
    for i in 0..20 {
        fixture.create_file(&format!("doc{i:02}.txt"), format!("doc {i}").as_bytes());
    }

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize_with(
        &mut ledger,
        OrganizeOptions {
            workers: 1,
            ..OrganizeOptions::default()
        },
    );

    assert_eq!(batch.records.len(), 20);
    assert_eq!(batch.stats.moved, 20);
    for i in 0..20 {
        fixture.assert_file_exists(&format!("Documentos_txt/doc{i:02}.txt"));
    }
}

#[test]
fn test_many_files_with_wide_pool() {
    let fixture = TestFixture::new();
    for i in 0..40 {
        fixture.create_file(&format!("clip{i:02}.mp3"), format!("clip {i}").as_bytes());
    }

    let mut ledger = UndoLedger::new();
    let batch = fixture.organize_with(
        &mut ledger,
        OrganizeOptions {
            workers: 8,
            ..OrganizeOptions::default()
        },
    );

    // Strict join: one terminal record per snapshotted file.
    assert_eq!(batch.records.len(), 40);
    assert_eq!(batch.stats.moved, 40);
    assert_eq!(ledger.len(), 1);
}

// ============================================================================
// CLI layer
// ============================================================================

#[test]
fn test_cli_organize_then_undo_round_trip() {
    let fixture = TestFixture::new();
    fixture.create_file("song.mp3", b"tune");
    let dir = fixture.path().to_string_lossy().into_owned();

    let cli = Cli::parse_from(["ordena", "organize", &dir]);
    run(cli).expect("organize should succeed");
    fixture.assert_file_exists("Musica/song.mp3");
    fixture.assert_file_exists(".ordena_history.json");

    let cli = Cli::parse_from(["ordena", "undo", &dir]);
    run(cli).expect("undo should succeed");
    fixture.assert_file_exists("song.mp3");
    fixture.assert_file_absent("Musica/song.mp3");
}

#[test]
fn test_cli_organize_with_custom_rules_file() {
    let fixture = TestFixture::new();
    fixture.create_file("notes.md", b"# hi");
    let rules_dir = TempDir::new().unwrap();
    let rules_path = rules_dir.path().join("rules.toml");
    fs::write(
        &rules_path,
        "default_bucket = \"Misc\"\n\n[rules]\n\".md\" = \"Markdown\"\n",
    )
    .unwrap();

    let dir = fixture.path().to_string_lossy().into_owned();
    let rules_arg = rules_path.to_string_lossy().into_owned();
    let cli = Cli::parse_from(["ordena", "organize", &dir, "--rules", &rules_arg]);
    run(cli).expect("organize should succeed");

    fixture.assert_file_exists("Markdown/notes.md");
}

#[test]
fn test_cli_preview_moves_nothing() {
    let fixture = TestFixture::new();
    fixture.create_file("pic.jpg", JPEG_HEADER);
    let dir = fixture.path().to_string_lossy().into_owned();

    let cli = Cli::parse_from(["ordena", "preview", &dir]);
    run(cli).expect("preview should succeed");

    fixture.assert_file_exists("pic.jpg");
    fixture.assert_file_absent("Fotos");
}

#[test]
fn test_cli_organize_missing_directory_is_an_error() {
    let cli = Cli::parse_from(["ordena", "organize", "/definitely/not/here"]);
    assert!(run(cli).is_err());
}

#[test]
fn test_history_file_survives_repeat_runs() {
    let fixture = TestFixture::new();
    let dir = fixture.path().to_string_lossy().into_owned();

    fixture.create_file("first.txt", b"1");
    run(Cli::parse_from(["ordena", "organize", &dir])).unwrap();
    fixture.create_file("second.txt", b"2");
    run(Cli::parse_from(["ordena", "organize", &dir])).unwrap();

    let ledger = UndoLedger::load_from(&fixture.path().join(".ordena_history.json")).unwrap();
    assert_eq!(ledger.len(), 2);
}
