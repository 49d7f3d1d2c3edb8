//! Command-line surface.
//!
//! Three subcommands wrap the engine: `organize` runs a batch, `undo`
//! reverses the most recent one, `preview` lists planned destinations
//! without touching disk. The persisted ledger file in the organized
//! directory is owned by this layer; the engine only ever sees the
//! in-memory [`UndoLedger`].
//!
//! Exit semantics: per-file failures still exit 0 — only directory-level
//! precondition failures (and bad rules/ledger files) are process errors.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::ledger::{LedgerError, UndoLedger, UndoOutcome};
use crate::mover::ConflictPolicy;
use crate::organizer::{
    BatchOrganizer, CancelToken, DEFAULT_WORKERS, OrganizeError, OrganizeOptions,
};
use crate::output::{ConsoleProgress, OutputFormatter};
use crate::rules::{Profile, RuleError, RuleTable};
use crate::validator::ValidatorConfig;

/// Name of the persisted ledger file inside the organized directory.
const HISTORY_FILE: &str = ".ordena_history.json";

#[derive(Debug, Parser)]
#[command(name = "ordena", version, about = "Organize files into category folders with verified moves and undo")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify and move the files of a directory into category subfolders.
    Organize {
        /// Directory whose top-level files will be organized.
        directory: PathBuf,

        /// TOML rules file mapping extensions to folder names.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Number of parallel move workers.
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// What to do when the destination name is taken.
        #[arg(long, value_enum, default_value = "rename")]
        conflict: ConflictPolicy,

        /// Size ceiling in bytes; larger files are skipped.
        #[arg(long)]
        max_file_size: Option<u64>,
    },

    /// Move the files of the most recent batch back where they came from.
    Undo {
        /// Directory that was previously organized.
        directory: PathBuf,
    },

    /// Show where each file would go, without moving anything.
    Preview {
        /// Directory to analyze.
        directory: PathBuf,

        /// TOML rules file mapping extensions to folder names.
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

/// Failures that should terminate the process with a non-zero code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Dispatches a parsed command line.
pub fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Organize {
            directory,
            rules,
            workers,
            conflict,
            max_file_size,
        } => run_organize(&directory, rules.as_deref(), workers, conflict, max_file_size),
        Command::Undo { directory } => run_undo(&directory),
        Command::Preview { directory, rules } => run_preview(&directory, rules.as_deref()),
    }
}

fn load_rules(rules_path: Option<&Path>) -> Result<RuleTable, RuleError> {
    match rules_path {
        Some(path) => RuleTable::load(path),
        None => Ok(RuleTable::default()),
    }
}

fn history_path(directory: &Path) -> PathBuf {
    directory.join(HISTORY_FILE)
}

fn run_organize(
    directory: &Path,
    rules_path: Option<&Path>,
    workers: usize,
    conflict: ConflictPolicy,
    max_file_size: Option<u64>,
) -> Result<(), CliError> {
    OutputFormatter::info(&format!("Organizing {}", directory.display()));

    let rules = load_rules(rules_path)?;
    let profile = Profile::new(directory, rules);

    let mut validator = ValidatorConfig::default();
    if let Some(ceiling) = max_file_size {
        validator.max_file_size = ceiling;
    }
    let organizer = BatchOrganizer::new(OrganizeOptions {
        workers,
        conflict_policy: conflict,
        validator,
    });

    let mut ledger = UndoLedger::load_from(&history_path(directory))?;
    let progress = ConsoleProgress::new();
    let batch = organizer.organize(&profile, &mut ledger, &progress, &CancelToken::new())?;
    ledger.save_to(&history_path(directory))?;

    if batch.records.is_empty() {
        OutputFormatter::plain("Nothing to do: no eligible files found.");
        return Ok(());
    }

    OutputFormatter::record_details(&batch);
    OutputFormatter::batch_summary(&batch);
    if batch.stats.failed > 0 {
        OutputFormatter::warning("Some files could not be moved. Review the errors above.");
    } else {
        OutputFormatter::success("Organization complete. Run 'ordena undo' to revert.");
    }
    Ok(())
}

fn run_undo(directory: &Path) -> Result<(), CliError> {
    let path = history_path(directory);
    let mut ledger = UndoLedger::load_from(&path)?;

    match ledger.undo_last() {
        UndoOutcome::NothingToUndo => {
            OutputFormatter::plain("Nothing to undo.");
            Ok(())
        }
        UndoOutcome::Undone(report) => {
            // The batch is consumed either way; persist the shorter ledger.
            ledger.save_to(&path)?;
            info!(restored = report.restored, "undo finished");

            OutputFormatter::success(&format!("Restored {} file(s)", report.restored));
            for (file, reason) in &report.skipped {
                OutputFormatter::plain(&format!("  - skipped {}: {}", file.display(), reason));
            }
            for (file, reason) in &report.failed {
                OutputFormatter::error(&format!("{}: {}", file.display(), reason));
            }
            if !report.failed.is_empty() {
                OutputFormatter::warning("Some files could not be restored.");
            }
            Ok(())
        }
    }
}

fn run_preview(directory: &Path, rules_path: Option<&Path>) -> Result<(), CliError> {
    let rules = load_rules(rules_path)?;
    let profile = Profile::new(directory, rules);
    let organizer = BatchOrganizer::default();
    let planned = organizer.preview(&profile)?;

    if planned.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    OutputFormatter::header("PREVIEW");
    for (source, destination) in &planned {
        OutputFormatter::plain(&format!(
            "  {} → {}",
            source.display(),
            destination.display()
        ));
    }
    OutputFormatter::plain(&format!("\n{} file(s) would be moved.", planned.len()));
    Ok(())
}
