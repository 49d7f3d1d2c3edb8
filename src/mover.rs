//! Verified single-file relocation.
//!
//! A move is never a bare rename. The mover hashes the source, copies it to
//! a `.tmp` sibling of the final destination, re-hashes the copy, atomically
//! renames it into place and only then deletes the original. A checksum
//! mismatch or any I/O failure leaves the source untouched.
//!
//! All per-file outcomes are data: [`move_file`](IntegrityMover::move_file)
//! always returns a [`MoveRecord`], so one bad file can never abort its
//! siblings in a batch.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Read buffer for hashing and copying.
const BUFFER_SIZE: usize = 64 * 1024;

/// What to do when the destination filename is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Append `_N` before the extension until a free name is found.
    Rename,
    /// Leave the source where it is and record a skip.
    Skip,
    /// Replace the existing file if it is writable.
    Overwrite,
}

/// Terminal state of a single file's move attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveStatus {
    Success,
    Skipped,
    Failed,
}

/// Immutable outcome of one move attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source: PathBuf,
    /// Final destination; present for successes.
    pub destination: Option<PathBuf>,
    pub status: MoveStatus,
    /// Human-readable explanation for skips and failures.
    pub reason: Option<String>,
    /// Bytes relocated; zero unless the move succeeded.
    pub bytes: u64,
}

impl MoveRecord {
    pub fn success(source: PathBuf, destination: PathBuf, bytes: u64) -> Self {
        Self {
            source,
            destination: Some(destination),
            status: MoveStatus::Success,
            reason: None,
            bytes,
        }
    }

    pub fn skipped(source: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            source,
            destination: None,
            status: MoveStatus::Skipped,
            reason: Some(reason.into()),
            bytes: 0,
        }
    }

    pub fn failed(source: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            source,
            destination: None,
            status: MoveStatus::Failed,
            reason: Some(reason.into()),
            bytes: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == MoveStatus::Success
    }
}

/// Internal failure causes; their Display text becomes the record's reason.
#[derive(Debug, Error)]
enum MoveError {
    #[error("failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create destination directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to copy to staging file {path}: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("integrity mismatch after copy: expected {expected}, got {actual}; source left untouched")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("failed to rename staging file into place at {path}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("file copied to {destination} but the original could not be removed: {source}")]
    SourceCleanup {
        destination: PathBuf,
        source: std::io::Error,
    },
}

/// Result of destination name resolution under a conflict policy.
enum Destination {
    Free(PathBuf),
    Skip(String),
}

/// Moves files with checksum verification and conflict resolution.
#[derive(Debug, Default, Clone)]
pub struct IntegrityMover;

impl IntegrityMover {
    pub fn new() -> Self {
        Self
    }

    /// Relocates `source` into `dest_dir`, returning a terminal record.
    ///
    /// This function is total: every error path is folded into a
    /// [`MoveStatus::Failed`] record with a reason.
    pub fn move_file(
        &self,
        source: &Path,
        dest_dir: &Path,
        policy: ConflictPolicy,
    ) -> MoveRecord {
        match self.try_move(source, dest_dir, policy) {
            Ok(record) => record,
            Err(e) => {
                debug!(source = %source.display(), error = %e, "move failed");
                MoveRecord::failed(source.to_path_buf(), e.to_string())
            }
        }
    }

    fn try_move(
        &self,
        source: &Path,
        dest_dir: &Path,
        policy: ConflictPolicy,
    ) -> Result<MoveRecord, MoveError> {
        // 1. Checksum the source before touching anything.
        let source_checksum = hash_file(source).map_err(|e| MoveError::Hash {
            path: source.to_path_buf(),
            source: e,
        })?;

        // 2. Destination directory, created on demand.
        fs::create_dir_all(dest_dir).map_err(|e| MoveError::DirectoryCreation {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        // 3. Final name under the conflict policy.
        let file_name = match source.file_name() {
            Some(n) => n.to_os_string(),
            None => {
                return Ok(MoveRecord::skipped(
                    source.to_path_buf(),
                    "source has no file name component",
                ));
            }
        };
        let final_dest = match resolve_destination(dest_dir, &file_name, policy) {
            Destination::Free(path) => path,
            Destination::Skip(reason) => {
                return Ok(MoveRecord::skipped(source.to_path_buf(), reason));
            }
        };

        // 4. Copy to a staging sibling next to the final destination.
        let temp = staging_path(&final_dest);
        let bytes = match copy_file(source, &temp) {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_staging(&temp);
                return Err(MoveError::Copy {
                    path: temp,
                    source: e,
                });
            }
        };

        // 5. Verify what actually landed on disk.
        let temp_checksum = match hash_file(&temp) {
            Ok(c) => c,
            Err(e) => {
                remove_staging(&temp);
                return Err(MoveError::Hash {
                    path: temp,
                    source: e,
                });
            }
        };
        if temp_checksum != source_checksum {
            remove_staging(&temp);
            return Err(MoveError::ChecksumMismatch {
                expected: source_checksum,
                actual: temp_checksum,
            });
        }

        // 6. Atomic rename into place.
        if let Err(e) = fs::rename(&temp, &final_dest) {
            remove_staging(&temp);
            return Err(MoveError::Rename {
                path: final_dest,
                source: e,
            });
        }

        // 7. Only now is the original deleted.
        if let Err(e) = fs::remove_file(source) {
            return Err(MoveError::SourceCleanup {
                destination: final_dest,
                source: e,
            });
        }

        debug!(
            source = %source.display(),
            destination = %final_dest.display(),
            bytes,
            "moved"
        );
        Ok(MoveRecord::success(
            source.to_path_buf(),
            final_dest,
            bytes,
        ))
    }
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn copy_file(source: &Path, destination: &Path) -> Result<u64, std::io::Error> {
    fs::copy(source, destination)
}

/// Picks the final destination path for `file_name` inside `dest_dir`.
fn resolve_destination(
    dest_dir: &Path,
    file_name: &std::ffi::OsStr,
    policy: ConflictPolicy,
) -> Destination {
    let candidate = dest_dir.join(file_name);
    if !candidate.exists() {
        return Destination::Free(candidate);
    }
    match policy {
        ConflictPolicy::Skip => Destination::Skip("already exists at destination".to_string()),
        ConflictPolicy::Overwrite => match fs::metadata(&candidate) {
            Ok(meta) if meta.permissions().readonly() => {
                Destination::Skip("existing destination is not writable".to_string())
            }
            _ => Destination::Free(candidate),
        },
        ConflictPolicy::Rename => {
            let name = file_name.to_string_lossy();
            let (stem, ext) = match name.rsplit_once('.') {
                // Dotfiles like ".bashrc" keep their whole name as the stem.
                Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
                _ => (name.to_string(), None),
            };
            let mut n = 1u32;
            loop {
                let numbered = match &ext {
                    Some(ext) => format!("{stem}_{n}.{ext}"),
                    None => format!("{stem}_{n}"),
                };
                let candidate = dest_dir.join(&numbered);
                if !candidate.exists() {
                    return Destination::Free(candidate);
                }
                n += 1;
            }
        }
    }
}

/// Staging path: the final name with a `.tmp` suffix, same directory.
fn staging_path(final_dest: &Path) -> PathBuf {
    let mut name = final_dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    final_dest.with_file_name(name)
}

/// Best-effort removal of a partial staging file.
fn remove_staging(temp: &Path) {
    if temp.exists() {
        if let Err(e) = fs::remove_file(temp) {
            warn!(path = %temp.display(), error = %e, "could not clean up staging file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mover() -> IntegrityMover {
        IntegrityMover::new()
    }

    #[test]
    fn test_successful_move_preserves_content() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("file.txt");
        fs::write(&source, "payload").unwrap();
        let original_hash = hash_file(&source).unwrap();

        let dest_dir = dir.path().join("Documentos_txt");
        let record = mover().move_file(&source, &dest_dir, ConflictPolicy::Rename);

        assert!(record.is_success());
        assert!(!source.exists());
        let dest = record.destination.unwrap();
        assert_eq!(dest, dest_dir.join("file.txt"));
        assert_eq!(hash_file(&dest).unwrap(), original_hash);
        assert_eq!(record.bytes, 7);
    }

    #[test]
    fn test_creates_destination_directory() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.bin");
        fs::write(&source, "x").unwrap();

        let dest_dir = dir.path().join("deep").join("nested");
        let record = mover().move_file(&source, &dest_dir, ConflictPolicy::Rename);
        assert!(record.is_success());
        assert!(dest_dir.join("a.bin").exists());
    }

    #[test]
    fn test_rename_policy_numbers_conflicts() {
        let dir = TempDir::new().unwrap();
        let dest_dir = dir.path().join("PDFs");
        fs::create_dir(&dest_dir).unwrap();
        fs::write(dest_dir.join("report.pdf"), "occupied").unwrap();

        let second = dir.path().join("report.pdf");
        fs::write(&second, "second").unwrap();
        let record = mover().move_file(&second, &dest_dir, ConflictPolicy::Rename);
        assert_eq!(
            record.destination.as_deref(),
            Some(dest_dir.join("report_1.pdf").as_path())
        );

        let third = dir.path().join("report.pdf");
        fs::write(&third, "third").unwrap();
        let record = mover().move_file(&third, &dest_dir, ConflictPolicy::Rename);
        assert_eq!(
            record.destination.as_deref(),
            Some(dest_dir.join("report_2.pdf").as_path())
        );
    }

    #[test]
    fn test_skip_policy_leaves_source_in_place() {
        let dir = TempDir::new().unwrap();
        let dest_dir = dir.path().join("Otros");
        fs::create_dir(&dest_dir).unwrap();
        fs::write(dest_dir.join("data.xyz"), "occupied").unwrap();

        let source = dir.path().join("data.xyz");
        fs::write(&source, "new").unwrap();
        let record = mover().move_file(&source, &dest_dir, ConflictPolicy::Skip);

        assert_eq!(record.status, MoveStatus::Skipped);
        assert!(source.exists());
        assert_eq!(fs::read_to_string(dest_dir.join("data.xyz")).unwrap(), "occupied");
    }

    #[test]
    fn test_overwrite_policy_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let dest_dir = dir.path().join("Otros");
        fs::create_dir(&dest_dir).unwrap();
        fs::write(dest_dir.join("data.xyz"), "old").unwrap();

        let source = dir.path().join("data.xyz");
        fs::write(&source, "new").unwrap();
        let record = mover().move_file(&source, &dest_dir, ConflictPolicy::Overwrite);

        assert!(record.is_success());
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(dest_dir.join("data.xyz")).unwrap(), "new");
    }

    #[test]
    fn test_failed_rename_leaves_source_and_no_staging() {
        let dir = TempDir::new().unwrap();
        let dest_dir = dir.path().join("Otros");
        // Occupy the final destination name with a directory so the rename
        // step fails after a clean copy.
        fs::create_dir_all(dest_dir.join("victim.xyz")).unwrap();

        let source = dir.path().join("victim.xyz");
        fs::write(&source, "survives").unwrap();
        let record = mover().move_file(&source, &dest_dir, ConflictPolicy::Overwrite);

        assert_eq!(record.status, MoveStatus::Failed);
        assert!(source.exists(), "original must survive a failed rename");
        assert!(
            !dest_dir.join("victim.xyz.tmp").exists(),
            "staging file must be cleaned up"
        );
        assert_eq!(fs::read_to_string(&source).unwrap(), "survives");
    }

    #[test]
    fn test_missing_source_yields_failed_record() {
        let dir = TempDir::new().unwrap();
        let record = mover().move_file(
            &dir.path().join("ghost.txt"),
            &dir.path().join("Otros"),
            ConflictPolicy::Rename,
        );
        assert_eq!(record.status, MoveStatus::Failed);
        assert!(record.reason.is_some());
    }

    #[test]
    fn test_staging_path_appends_tmp() {
        assert_eq!(
            staging_path(Path::new("/x/Fotos/a.jpg")),
            PathBuf::from("/x/Fotos/a.jpg.tmp")
        );
    }
}
