//! Console output and progress display.
//!
//! All user-facing formatting lives here: colored status lines, the live
//! progress bar, and the post-batch summary table. The engine reports
//! through [`ProgressSink`]; this module is the terminal-bound
//! implementation of that collaborator.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use crate::mover::MoveStatus;
use crate::organizer::{Batch, ProgressSink};

/// Styled one-line messages.
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints the batch summary: counts, bytes freed from the source
    /// directory, and the per-extension distribution.
    pub fn batch_summary(batch: &Batch) {
        Self::header("RESUMEN");
        println!(
            "{:<12} | {}",
            "Moved".bold(),
            batch.stats.moved.to_string().green()
        );
        println!("{:<12} | {}", "Skipped".bold(), batch.stats.skipped);
        let failed = if batch.stats.failed > 0 {
            batch.stats.failed.to_string().red().to_string()
        } else {
            batch.stats.failed.to_string()
        };
        println!("{:<12} | {}", "Failed".bold(), failed);
        println!(
            "{:<12} | {:.2} KB",
            "Freed".bold(),
            batch.stats.bytes_moved as f64 / 1024.0
        );

        if !batch.stats.by_extension.is_empty() {
            println!("{}", "Por tipo:".bold());
            let mut extensions: Vec<_> = batch.stats.by_extension.iter().collect();
            extensions.sort_by_key(|&(ext, _)| ext);
            for (ext, count) in extensions {
                let label = if ext.is_empty() { "(sin extensión)" } else { ext };
                println!("  {:<10} {}", label, count.to_string().green());
            }
        }
    }

    /// Prints the reasons behind skipped and failed records.
    pub fn record_details(batch: &Batch) {
        for record in &batch.records {
            let Some(reason) = &record.reason else { continue };
            let name = record
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| record.source.display().to_string());
            match record.status {
                MoveStatus::Failed => Self::error(&format!("{name}: {reason}")),
                _ => Self::plain(&format!("  - {name}: {reason}")),
            }
        }
    }
}

/// Progress sink backed by an indicatif bar.
///
/// The bar is created lazily on the first update because the total is only
/// known once the directory has been snapshotted.
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar_for(&self, total: usize) -> ProgressBar {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .get_or_insert_with(|| {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("█▓░"),
                );
                pb
            })
            .clone()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        let bar = self.bar_for(total);
        bar.set_position(completed as u64);
    }

    fn on_batch_complete(&self, _batch: &Batch) {
        let guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.as_ref() {
            bar.finish_and_clear();
        }
    }
}
