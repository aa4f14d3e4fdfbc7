//! Data models for pfi-ingest
//!
//! - Import run state machine and run record
//! - Per-run image, text and progress values

pub mod import_run;
pub mod source;

pub use import_run::{ImportRun, StateTransition};
pub use source::{ImportProgress, MergedText, RecognizedBlock, SourceImage};
pub use pfi_common::events::{ImportSource, ImportState};
