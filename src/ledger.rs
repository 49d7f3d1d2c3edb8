//! Bounded undo history.
//!
//! The ledger keeps the last few batches (capacity 5): new batches evict
//! the oldest, undo pops the newest. Reversals run in reverse completion
//! order and each failure is recorded individually, mirroring the forward
//! isolation guarantee.
//!
//! The types serialize so a caller can persist the ledger between runs
//! (the CLI writes it next to the organized files); the engine itself
//! never reads or writes that file during a batch.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::organizer::Batch;

/// How many batches stay undoable.
pub const LEDGER_CAPACITY: usize = 5;

/// Errors from ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write ledger file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} has an invalid format: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// One reversible move: where the file was and where it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// The undoable part of a finished batch: its successful moves in
/// completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoBatch {
    pub timestamp: String,
    pub directory: PathBuf,
    pub moves: Vec<RecordedMove>,
}

impl UndoBatch {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            timestamp: batch.timestamp.clone(),
            directory: batch.directory.clone(),
            moves: batch
                .successes()
                .map(|(source, destination)| RecordedMove {
                    source: source.to_path_buf(),
                    destination: destination.to_path_buf(),
                })
                .collect(),
        }
    }
}

/// Per-file outcomes of one undo pass.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub restored: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl UndoReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Result of asking the ledger to undo.
#[derive(Debug)]
pub enum UndoOutcome {
    /// The ledger was empty; nothing happened.
    NothingToUndo,
    /// The newest batch was popped and its moves reversed (possibly with
    /// individual failures).
    Undone(UndoReport),
}

/// Bounded stack of undoable batches: FIFO eviction, LIFO undo.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UndoLedger {
    batches: VecDeque<UndoBatch>,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// The batches currently held, oldest first.
    pub fn batches(&self) -> impl Iterator<Item = &UndoBatch> {
        self.batches.iter()
    }

    /// Records a finished batch, silently evicting the oldest entry once
    /// the capacity is reached.
    pub fn push_batch(&mut self, batch: &Batch) {
        self.push(UndoBatch::from_batch(batch));
    }

    pub fn push(&mut self, batch: UndoBatch) {
        if self.batches.len() == LEDGER_CAPACITY {
            self.batches.pop_front();
        }
        self.batches.push_back(batch);
    }

    /// Pops the most recent batch and moves its files back, newest move
    /// first. An empty ledger reports [`UndoOutcome::NothingToUndo`].
    pub fn undo_last(&mut self) -> UndoOutcome {
        let Some(batch) = self.batches.pop_back() else {
            return UndoOutcome::NothingToUndo;
        };

        let mut report = UndoReport::default();
        for recorded in batch.moves.iter().rev() {
            match restore_file(recorded) {
                Ok(()) => report.restored += 1,
                Err((path, reason)) => {
                    if reason.contains("no longer") {
                        report.skipped.push((path, reason));
                    } else {
                        report.failed.push((path, reason));
                    }
                }
            }
        }
        UndoOutcome::Undone(report)
    }

    /// Loads a persisted ledger; a missing file is an empty ledger.
    pub fn load_from(path: &Path) -> Result<Self, LedgerError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(LedgerError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|e| LedgerError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Persists the ledger as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| LedgerError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Moves one file back to its original location.
///
/// A file already sitting at the original path is backed up with a
/// timestamp suffix rather than clobbered.
fn restore_file(recorded: &RecordedMove) -> Result<(), (PathBuf, String)> {
    if !recorded.destination.exists() {
        return Err((
            recorded.destination.clone(),
            "file is no longer at its recorded destination".to_string(),
        ));
    }

    if let Some(parent) = recorded.source.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                (
                    recorded.source.clone(),
                    format!("could not recreate original directory: {e}"),
                )
            })?;
        }
    }

    if recorded.source.exists() {
        let backup = backup_path(&recorded.source);
        warn!(
            path = %recorded.source.display(),
            backup = %backup.display(),
            "original location occupied, backing up"
        );
        fs::rename(&recorded.source, &backup).map_err(|e| {
            (
                recorded.source.clone(),
                format!("could not back up conflicting file: {e}"),
            )
        })?;
    }

    fs::rename(&recorded.destination, &recorded.source).map_err(|e| {
        (
            recorded.destination.clone(),
            format!("failed to restore file: {e}"),
        )
    })
}

/// `file.txt` becomes `file.txt.bak.20260829-143052`.
fn backup_path(original: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let backup_name = format!("{filename}.bak.{timestamp}");
    match original.parent() {
        Some(parent) => parent.join(backup_name),
        None => PathBuf::from(backup_name),
    }
}
