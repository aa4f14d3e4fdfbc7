//! Utility modules for pfi-ingest

pub mod image_scaling;
pub mod retry;

pub use image_scaling::{downscale_to_fit, fit_within, fitted_dimensions};
pub use retry::{or_cancel, sleep_or_cancel, RetryPolicy};
