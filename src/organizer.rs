//! Directory-level batch organization.
//!
//! One `organize` call snapshots the directory listing, filters candidates
//! through the validator, fans eligible files out to a fixed pool of worker
//! threads and joins on every result before returning. Workers only read
//! the rule table and only report through the result channel, so no shared
//! state is mutated concurrently and no file is ever handled twice.
//!
//! File I/O here is blocking on purpose: moving many files benefits from
//! real OS threads, not cooperative scheduling.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::UndoLedger;
use crate::mover::{ConflictPolicy, IntegrityMover, MoveRecord, MoveStatus};
use crate::rules::{Profile, extension_of};
use crate::validator::{FileValidator, ValidationError, ValidatorConfig, Verdict};

/// Default number of worker threads per batch.
pub const DEFAULT_WORKERS: usize = 4;

/// Directory-level precondition failures. These abort the whole call before
/// any file is touched; everything else becomes per-file record data.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("directory does not exist: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("directory is not writable: {path}")]
    DirectoryReadOnly { path: PathBuf },

    #[error("failed to read directory {path}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives progress while a batch runs. All callbacks happen on the thread
/// that called `organize`.
pub trait ProgressSink {
    /// Called after each file reaches a terminal state.
    fn on_progress(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }

    /// Called once with the finished batch.
    fn on_batch_complete(&self, batch: &Batch) {
        let _ = batch;
    }
}

/// Sink that ignores everything; useful for tests and embedding.
pub struct NoopSink;

impl ProgressSink for NoopSink {}

/// Cooperative cancellation flag checked between file dispatches. A move
/// already in flight is allowed to finish so no staging files are left
/// behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Aggregate numbers for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_moved: u64,
    /// Successful moves per normalized extension ("" = no extension).
    pub by_extension: HashMap<String, usize>,
}

/// Complete set of per-file outcomes from one `organize` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// RFC 3339 timestamp of when the batch finished.
    pub timestamp: String,
    pub directory: PathBuf,
    /// Records in completion order.
    pub records: Vec<MoveRecord>,
    pub stats: BatchStats,
}

impl Batch {
    fn from_records(directory: PathBuf, records: Vec<MoveRecord>) -> Self {
        let mut stats = BatchStats::default();
        for record in &records {
            match record.status {
                MoveStatus::Success => {
                    stats.moved += 1;
                    stats.bytes_moved += record.bytes;
                    *stats
                        .by_extension
                        .entry(extension_of(&record.source))
                        .or_insert(0) += 1;
                }
                MoveStatus::Skipped => stats.skipped += 1,
                MoveStatus::Failed => stats.failed += 1,
            }
        }
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            directory,
            records,
            stats,
        }
    }

    /// Successful `(source, destination)` pairs in completion order.
    pub fn successes(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.records.iter().filter_map(|r| {
            r.destination
                .as_deref()
                .filter(|_| r.is_success())
                .map(|dest| (r.source.as_path(), dest))
        })
    }
}

/// Tunables for one organizer instance.
#[derive(Debug, Clone)]
pub struct OrganizeOptions {
    pub workers: usize,
    pub conflict_policy: ConflictPolicy,
    pub validator: ValidatorConfig,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            conflict_policy: ConflictPolicy::Rename,
            validator: ValidatorConfig::default(),
        }
    }
}

struct MoveJob {
    source: PathBuf,
    dest_dir: PathBuf,
}

/// Orchestrates validation, concurrent moves and undo recording for one
/// directory at a time.
pub struct BatchOrganizer {
    validator: FileValidator,
    mover: IntegrityMover,
    workers: usize,
    conflict_policy: ConflictPolicy,
}

impl BatchOrganizer {
    pub fn new(options: OrganizeOptions) -> Self {
        Self {
            validator: FileValidator::new(options.validator),
            mover: IntegrityMover::new(),
            workers: options.workers.max(1),
            conflict_policy: options.conflict_policy,
        }
    }

    /// Organizes the profile's directory and pushes the batch onto the
    /// caller's ledger.
    ///
    /// Every snapshotted candidate yields exactly one record before this
    /// returns. Only directory-level preconditions produce an `Err`.
    pub fn organize(
        &self,
        profile: &Profile,
        ledger: &mut UndoLedger,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Batch, OrganizeError> {
        let directory = profile.directory.as_path();
        let candidates = self.snapshot(directory)?;
        let total = candidates.len();
        info!(directory = %directory.display(), candidates = total, "starting batch");

        let mut records: Vec<MoveRecord> = Vec::with_capacity(total);
        let mut jobs: VecDeque<MoveJob> = VecDeque::new();

        // Validation phase: ineligible files are recorded without ever
        // reaching the mover; validation errors are loud failures. Each
        // record counts as one completion towards the progress total.
        for path in candidates {
            let record = match self.validator.check(&path) {
                Ok(Verdict::Eligible) => {
                    let folder = profile.rules.resolve_path(&path);
                    jobs.push_back(MoveJob {
                        dest_dir: directory.join(folder),
                        source: path,
                    });
                    continue;
                }
                Ok(Verdict::Ineligible { reason }) => MoveRecord::skipped(path, reason),
                Err(e @ ValidationError::Permission { .. }) => {
                    warn!(path = %path.display(), error = %e, "permission problem");
                    MoveRecord::failed(path, e.to_string())
                }
                Err(e) => MoveRecord::failed(path, e.to_string()),
            };
            records.push(record);
            sink.on_progress(records.len(), total);
        }

        let mut completed = records.len();

        // Move phase: a fixed pool drains the job queue; results come back
        // over a channel and are joined here before the batch is built.
        let queue = Mutex::new(jobs);
        let (tx, rx) = mpsc::channel::<MoveRecord>();
        thread::scope(|scope| {
            for _ in 0..self.workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    loop {
                        let job = {
                            let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                            queue.pop_front()
                        };
                        let Some(job) = job else { break };
                        let record = if cancel.is_cancelled() {
                            MoveRecord::skipped(job.source, "cancelled before dispatch")
                        } else {
                            self.mover
                                .move_file(&job.source, &job.dest_dir, self.conflict_policy)
                        };
                        if tx.send(record).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for record in rx {
                completed += 1;
                sink.on_progress(completed, total);
                records.push(record);
            }
        });

        let batch = Batch::from_records(directory.to_path_buf(), records);
        info!(
            moved = batch.stats.moved,
            skipped = batch.stats.skipped,
            failed = batch.stats.failed,
            bytes = batch.stats.bytes_moved,
            "batch finished"
        );
        ledger.push_batch(&batch);
        sink.on_batch_complete(&batch);
        Ok(batch)
    }

    /// Lists planned `(source, destination)` pairs without touching disk.
    /// Conflict resolution and validation are not applied; this mirrors
    /// what a preview pane shows before the real run.
    pub fn preview(
        &self,
        profile: &Profile,
    ) -> Result<Vec<(PathBuf, PathBuf)>, OrganizeError> {
        let directory = profile.directory.as_path();
        let candidates = self.snapshot(directory)?;
        Ok(candidates
            .into_iter()
            .map(|path| {
                let folder = profile.rules.resolve_path(&path);
                let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
                let dest = directory.join(folder).join(file_name);
                (path, dest)
            })
            .collect())
    }

    /// Checks directory preconditions and snapshots its immediate regular,
    /// non-hidden children exactly once.
    fn snapshot(&self, directory: &Path) -> Result<Vec<PathBuf>, OrganizeError> {
        let metadata = match std::fs::metadata(directory) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrganizeError::DirectoryNotFound {
                    path: directory.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(OrganizeError::DirectoryUnreadable {
                    path: directory.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_dir() {
            return Err(OrganizeError::NotADirectory {
                path: directory.to_path_buf(),
            });
        }
        if metadata.permissions().readonly() {
            return Err(OrganizeError::DirectoryReadOnly {
                path: directory.to_path_buf(),
            });
        }

        let entries =
            std::fs::read_dir(directory).map_err(|source| OrganizeError::DirectoryUnreadable {
                path: directory.to_path_buf(),
                source,
            })?;

        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_type()
                    .map(|t| t.is_file())
                    .unwrap_or(false)
            })
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.path())
            .collect();
        candidates.sort();
        Ok(candidates)
    }
}

impl Default for BatchOrganizer {
    fn default() -> Self {
        Self::new(OrganizeOptions::default())
    }
}
