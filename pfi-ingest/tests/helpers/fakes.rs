//! Test doubles for the video and recognition capabilities
//!
//! Frames are blank bitmaps whose width encodes the frame index, which lets
//! the scripted recognizer know which frame it was handed.

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use pfi_ingest::error::{ImportError, ImportResult};
use pfi_ingest::models::SourceImage;
use pfi_ingest::services::{TextRecognizer, VideoSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

const BASE_WIDTH: u32 = 100;
const FRAME_HEIGHT: u32 = 40;

/// Bitmap standing for frame or screenshot number `index`
pub fn tagged_image(index: usize) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(BASE_WIDTH + index as u32, FRAME_HEIGHT))
}

pub fn tagged_still(index: usize) -> SourceImage {
    SourceImage::new(tagged_image(index)).with_index(index)
}

fn index_of(image: &DynamicImage) -> usize {
    (image.width() - BASE_WIDTH) as usize
}

/// Video with a fixed duration and a fixed sampling interval for tagging
pub struct FakeVideo {
    duration: f64,
    interval: f64,
    failing_frames: Vec<usize>,
    cancel_on_frame: Option<(usize, CancellationToken)>,
    requested: Mutex<Vec<f64>>,
}

impl FakeVideo {
    pub fn new(duration: f64, interval: f64) -> Self {
        Self {
            duration,
            interval,
            failing_frames: Vec::new(),
            cancel_on_frame: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, frames: &[usize]) -> Self {
        self.failing_frames = frames.to_vec();
        self
    }

    /// Cancel `token` when frame `index` is requested and then never complete
    pub fn cancel_on_frame(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_on_frame = Some((index, token));
        self
    }

    pub fn requested(&self) -> Vec<f64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoSource for FakeVideo {
    async fn duration_secs(&self) -> ImportResult<f64> {
        Ok(self.duration)
    }

    async fn frame_at(&self, timestamp_secs: f64) -> ImportResult<DynamicImage> {
        self.requested.lock().unwrap().push(timestamp_secs);
        let index = (timestamp_secs / self.interval).round() as usize;
        if let Some((cancel_index, token)) = &self.cancel_on_frame {
            if index == *cancel_index {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        if self.failing_frames.contains(&index) {
            return Err(ImportError::InvalidMedia(format!("decode error at {}", timestamp_secs)));
        }
        Ok(tagged_image(index))
    }
}

/// Recognizer returning scripted lines per image index
///
/// Unscripted images yield no lines; indices in `failing` yield
/// `RecognitionFailed`. Optionally cancels a token on its n-th call and then
/// never completes.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: HashMap<usize, Vec<String>>,
    failing: Vec<usize>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, index: usize, lines: &[&str]) -> Self {
        self.scripts
            .insert(index, lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn failing(mut self, index: usize) -> Self {
        self.failing.push(index);
        self
    }

    /// Cancel `token` when the `call`-th recognition (1-based) starts
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, image: &DynamicImage) -> ImportResult<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((cancel_call, token)) = &self.cancel_on_call {
            if call == *cancel_call {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }

        let index = index_of(image);
        if self.failing.contains(&index) {
            return Err(ImportError::RecognitionFailed(format!("image {} unreadable", index)));
        }
        Ok(self.scripts.get(&index).cloned().unwrap_or_default())
    }
}
