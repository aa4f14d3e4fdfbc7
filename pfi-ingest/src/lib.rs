//! pfi-ingest library interface
//!
//! Turns a screen recording or a set of screenshots of a dating profile into
//! deduplicated profile text, and optionally into a structured profile via the
//! remote parse endpoint.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::config::{CliOverrides, ExecutionProfile, IngestConfig};
pub use crate::error::{ImportError, ImportResult};
pub use crate::workflow::{ImportOrchestrator, ImportOutcome};
