//! Import workflow
//!
//! The orchestrator drives one run through sampling, recognition and merging,
//! publishing state and progress on the shared [`pfi_common::events::EventBus`].

pub mod pipeline;
pub mod progress;

pub use pipeline::{ImportOrchestrator, ImportOutcome};
pub use progress::{overall_progress, Phase, ProgressCallback, ProgressReporter};
