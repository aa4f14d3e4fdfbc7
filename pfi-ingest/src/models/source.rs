//! Per-run values that flow through the pipeline

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Still image owned by one pipeline run
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub image: DynamicImage,
    /// Frame position (video) or screenshot order (stills)
    pub index: Option<usize>,
    /// Presentation time of a sampled frame
    pub timestamp_secs: Option<f64>,
}

impl SourceImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            index: None,
            timestamp_secs: None,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_timestamp(mut self, timestamp_secs: f64) -> Self {
        self.timestamp_secs = Some(timestamp_secs);
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Text lines recognized from one SourceImage, in recognizer order
///
/// A failed recognition still produces a (empty) block so that block
/// indices stay aligned with image indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizedBlock {
    pub lines: Vec<String>,
}

impl RecognizedBlock {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }
}

/// Final ordered, deduplicated lines of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedText {
    lines: Vec<String>,
}

impl MergedText {
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Newline-joined text handed to the parse endpoint
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl std::fmt::Display for MergedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Progress value in [0.0, 1.0] with an optional phase label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub value: f64,
    pub label: Option<String>,
}

impl ImportProgress {
    pub fn new(value: f64, label: Option<String>) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            label,
        }
    }
}
