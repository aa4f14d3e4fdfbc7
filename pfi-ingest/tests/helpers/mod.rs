//! Test Helper Utilities
//!
//! Shared utilities for testing pfi-ingest

#![allow(dead_code, unused_imports)]

pub mod fakes;
pub mod mock_server;

pub use fakes::{tagged_image, tagged_still, FakeVideo, ScriptedRecognizer};
pub use mock_server::{closed_port_url, MockParseServer};
