//! # PFI Common Library
//!
//! Shared code for the profile-import crates including:
//! - Error types
//! - Configuration loading and data folder resolution
//! - Import event types and the EventBus
//! - Identifier helpers

pub mod config;
pub mod error;
pub mod events;
pub mod uuid_utils;

pub use error::{Error, Result};
