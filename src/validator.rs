//! File eligibility checks.
//!
//! Before a file is handed to the mover it passes through a short-circuiting
//! pipeline: existence, read permission, an exclusivity probe, a transient
//! artifact filter, size bounds, and a content signature check for formats
//! with a well-known magic sequence.
//!
//! The distinction between the two return channels matters: an ineligible
//! file is routine and the batch records it as skipped, while a
//! [`ValidationError`] (permission problem or signature mismatch) is
//! something the caller must be told about loudly.

use glob::Pattern;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rules::extension_of;

/// Default size ceiling: files above this are not moved.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Number of leading bytes read for the signature check.
const SIGNATURE_HEADER_LEN: usize = 8192;

/// Hard validation failures. These surface as failed records, not skips.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The file cannot be read by the current user.
    #[error("permission denied reading {path}")]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file's leading bytes do not match the magic sequence its
    /// extension promises. Indicates corruption or mislabeling.
    #[error("content of {path} does not match the expected {expected} signature")]
    SignatureMismatch { path: PathBuf, expected: &'static str },

    /// Unexpected I/O failure while inspecting the file.
    #[error("failed to inspect {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a validation pass over one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Ineligible { reason: String },
}

impl Verdict {
    fn skip(reason: impl Into<String>) -> Self {
        Verdict::Ineligible {
            reason: reason.into(),
        }
    }
}

/// Tunable validation parameters.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Files larger than this many bytes are ineligible.
    pub max_file_size: u64,
    /// Exact filenames that are never moved.
    pub artifact_names: Vec<String>,
    /// Glob patterns for transient artifacts (lock files, partial downloads).
    pub artifact_patterns: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            artifact_names: ["Thumbs.db", "desktop.ini", ".DS_Store", ".localized"]
                .map(String::from)
                .to_vec(),
            artifact_patterns: ["~$*", ".~lock.*#", "*.tmp", "*.crdownload", "*.part"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Decides whether a candidate file may be moved.
///
/// The validator only reads filesystem metadata and file headers; it never
/// mutates anything.
pub struct FileValidator {
    max_file_size: u64,
    artifact_names: HashSet<String>,
    artifact_patterns: Vec<Pattern>,
}

impl FileValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let artifact_patterns = config
            .artifact_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid artifact pattern");
                    None
                }
            })
            .collect();
        Self {
            max_file_size: config.max_file_size,
            artifact_names: config.artifact_names.into_iter().collect(),
            artifact_patterns,
        }
    }

    /// Runs all checks in order, stopping at the first that disqualifies
    /// the file.
    pub fn check(&self, path: &Path) -> Result<Verdict, ValidationError> {
        // 1. Must exist and be a regular file.
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Verdict::skip("file no longer exists"));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ValidationError::Permission {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                return Err(ValidationError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        if !metadata.is_file() {
            return Ok(Verdict::skip("not a regular file"));
        }

        // 2. Read permission. Denial is a hard error so callers can log it
        //    instead of silently leaving the file behind.
        match File::open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ValidationError::Permission {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                return Err(ValidationError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }

        // 3. Exclusivity probe. A file another process holds open (or that
        //    we cannot open for writing) is skipped, never an error.
        if OpenOptions::new().write(true).open(path).is_err() {
            return Ok(Verdict::skip("file is in use or write-protected"));
        }

        // 4. Transient artifacts: office lock files, OS metadata, partial
        //    downloads, staging temps.
        if let Some(name) = path.file_name().map(|n| n.to_string_lossy()) {
            if self.is_artifact(&name) {
                return Ok(Verdict::skip("system or transient artifact"));
            }
        }

        // 5. Size bounds.
        let size = metadata.len();
        if size == 0 {
            return Ok(Verdict::skip("empty file"));
        }
        if size > self.max_file_size {
            return Ok(Verdict::skip(format!(
                "file size {} exceeds ceiling of {} bytes",
                size, self.max_file_size
            )));
        }

        // 6. Content signature for formats we know the magic bytes of.
        if let Some(expected) = expected_signature(&extension_of(path)) {
            let header = read_header(path)?;
            if !expected.matches(&header) {
                debug!(path = %path.display(), expected = expected.name(), "signature mismatch");
                return Err(ValidationError::SignatureMismatch {
                    path: path.to_path_buf(),
                    expected: expected.name(),
                });
            }
        }

        Ok(Verdict::Eligible)
    }

    fn is_artifact(&self, file_name: &str) -> bool {
        self.artifact_names.contains(file_name)
            || self
                .artifact_patterns
                .iter()
                .any(|p| p.matches(file_name))
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

/// Binary signatures the validator knows how to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signature {
    Jpeg,
    Png,
    Pdf,
    Zip,
}

impl Signature {
    fn name(self) -> &'static str {
        match self {
            Signature::Jpeg => "JPEG",
            Signature::Png => "PNG",
            Signature::Pdf => "PDF",
            Signature::Zip => "ZIP",
        }
    }

    fn matches(self, header: &[u8]) -> bool {
        match self {
            Signature::Jpeg => infer::image::is_jpeg(header),
            Signature::Png => infer::image::is_png(header),
            Signature::Pdf => infer::archive::is_pdf(header),
            Signature::Zip => infer::archive::is_zip(header),
        }
    }
}

/// Maps an extension to the signature its content must carry, if any.
/// Office and OpenDocument formats are ZIP containers.
fn expected_signature(extension: &str) -> Option<Signature> {
    match extension {
        ".jpg" | ".jpeg" => Some(Signature::Jpeg),
        ".png" => Some(Signature::Png),
        ".pdf" => Some(Signature::Pdf),
        ".zip" | ".docx" | ".xlsx" | ".pptx" | ".odt" | ".ods" | ".odp" | ".jar" => {
            Some(Signature::Zip)
        }
        _ => None,
    }
}

fn read_header(path: &Path) -> Result<Vec<u8>, ValidationError> {
    let file = File::open(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut header = Vec::with_capacity(SIGNATURE_HEADER_LEN);
    file.take(SIGNATURE_HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|source| ValidationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(header)
}
