//! ordena - concurrent file organization with verified moves and undo
//!
//! This library classifies the top-level files of a directory by extension,
//! moves them into category subfolders through a checksum-verified
//! copy/rename pipeline, and keeps a bounded history so the last batches
//! can be reversed.

pub mod cli;
pub mod ledger;
pub mod mover;
pub mod organizer;
pub mod output;
pub mod rules;
pub mod validator;

pub use ledger::{LedgerError, UndoLedger, UndoOutcome, UndoReport};
pub use mover::{ConflictPolicy, IntegrityMover, MoveRecord, MoveStatus};
pub use organizer::{
    Batch, BatchOrganizer, BatchStats, CancelToken, NoopSink, OrganizeError, OrganizeOptions,
    ProgressSink,
};
pub use rules::{Profile, RuleError, RuleTable};
pub use validator::{FileValidator, ValidationError, ValidatorConfig, Verdict};
