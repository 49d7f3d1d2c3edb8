//! Extension-to-folder rule table.
//!
//! A [`RuleTable`] maps normalized file extensions (lower-case, leading dot)
//! to destination folder names. Lookups are total: anything not in the table
//! resolves to the default bucket, so classification can never fail.
//!
//! Rule files use TOML:
//!
//! ```toml
//! default_bucket = "Otros"
//!
//! [rules]
//! ".jpg" = "Fotos"
//! ".pdf" = "PDFs"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Folder name used for extensions without a matching rule.
pub const DEFAULT_BUCKET: &str = "Otros";

/// Errors from rule table mutation and rule file loading.
#[derive(Debug, Error)]
pub enum RuleError {
    /// `add` was called with an empty extension.
    #[error("extension must not be empty")]
    EmptyExtension,

    /// `add` was called with an empty destination folder.
    #[error("destination folder must not be empty")]
    EmptyFolder,

    /// Rules file could not be read.
    #[error("failed to read rules file {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rules file is not valid TOML or has the wrong shape.
    #[error("invalid rules file {path}: {reason}")]
    FileInvalid { path: PathBuf, reason: String },

    /// Rules file could not be written.
    #[error("failed to write rules file {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Maps file extensions to destination folder names.
///
/// Extensions are stored pre-normalized: lower-case with a leading dot.
/// A duplicate extension added via [`RuleTable::add`] silently overwrites
/// the previous folder (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default = "default_bucket")]
    default_bucket: String,
    #[serde(default)]
    rules: HashMap<String, String>,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

impl RuleTable {
    /// Creates an empty table with the given default bucket.
    pub fn new(default_bucket: impl Into<String>) -> Self {
        Self {
            default_bucket: default_bucket.into(),
            rules: HashMap::new(),
        }
    }

    /// Returns the folder used for extensions without a rule.
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Number of explicit rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the table has no explicit rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Adds a rule, normalizing the extension first.
    ///
    /// Re-adding an existing extension overwrites its folder silently.
    pub fn add(&mut self, extension: &str, folder: &str) -> Result<(), RuleError> {
        let extension = extension.trim();
        let folder = folder.trim();
        if extension.is_empty() || extension == "." {
            return Err(RuleError::EmptyExtension);
        }
        if folder.is_empty() {
            return Err(RuleError::EmptyFolder);
        }
        self.rules
            .insert(normalize_extension(extension), folder.to_string());
        Ok(())
    }

    /// Removes a rule; returns the folder it pointed at, if any.
    pub fn remove(&mut self, extension: &str) -> Option<String> {
        self.rules.remove(&normalize_extension(extension))
    }

    /// Resolves an extension to a folder name. Never fails: unknown or blank
    /// extensions resolve to the default bucket.
    pub fn resolve(&self, extension: &str) -> &str {
        self.rules
            .get(&normalize_extension(extension))
            .map(String::as_str)
            .unwrap_or(&self.default_bucket)
    }

    /// Resolves the folder for a file path based on its extension.
    pub fn resolve_path(&self, path: &Path) -> &str {
        self.resolve(&extension_of(path))
    }

    /// Iterates over `(extension, folder)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(e, f)| (e.as_str(), f.as_str()))
    }

    /// Loads a rule table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let content = fs::read_to_string(path).map_err(|source| RuleError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut table: RuleTable =
            toml::from_str(&content).map_err(|e| RuleError::FileInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        // Normalize keys coming from the file so lookups stay case-insensitive.
        table.rules = table
            .rules
            .into_iter()
            .map(|(ext, folder)| (normalize_extension(&ext), folder))
            .collect();
        Ok(table)
    }

    /// Writes the table to a TOML file, loadable by [`RuleTable::load`].
    pub fn save(&self, path: &Path) -> Result<(), RuleError> {
        let content = toml::to_string_pretty(self).map_err(|e| RuleError::FileInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, content).map_err(|source| RuleError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for RuleTable {
    /// The stock table: photos, icons, videos, music, PDFs and documents,
    /// with everything else falling through to `Otros`.
    fn default() -> Self {
        let mut table = Self::new(DEFAULT_BUCKET);
        let defaults = [
            (".jpg", "Fotos"),
            (".png", "Fotos"),
            (".ico", "Iconos"),
            (".mp4", "Videos"),
            (".avi", "Videos"),
            (".mpg", "Videos"),
            (".mp3", "Musica"),
            (".pdf", "PDFs"),
            (".docx", "Documentos_work"),
            (".doc", "Documentos_work"),
            (".txt", "Documentos_txt"),
        ];
        for (ext, folder) in defaults {
            // Static entries are known-valid.
            let _ = table.add(ext, folder);
        }
        table
    }
}

/// A resolved organization target: the directory to tidy and the rules to
/// apply. The caller owns profile storage; the engine only consumes a
/// snapshot per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub directory: PathBuf,
    pub rules: RuleTable,
}

impl Profile {
    pub fn new(directory: impl Into<PathBuf>, rules: RuleTable) -> Self {
        Self {
            directory: directory.into(),
            rules,
        }
    }
}

/// Lower-cases an extension and ensures a leading dot. The empty string
/// stays empty ("no extension").
fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim();
    if extension.is_empty() {
        return String::new();
    }
    let lower = extension.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Extracts the normalized extension of a path, or `""` when absent.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
