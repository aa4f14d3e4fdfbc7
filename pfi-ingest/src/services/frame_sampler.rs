//! Frame Sampler
//!
//! Pulls an ordered, bounded set of still frames out of a screen recording on a
//! fixed time cadence.
//!
//! **Algorithm:**
//! 1. Read duration; non-positive → `InvalidMedia`
//! 2. `frame_count = min(max_frames, floor(duration / interval))`; zero → `InvalidMedia`
//! 3. Request a frame at `0, interval, 2·interval, …` with zero seek tolerance
//! 4. Per-frame failures are skipped, not fatal
//! 5. Frames over `max_dimension` are downscaled (aspect preserved)
//! 6. No frames at all → `NoFramesExtracted`
//!
//! Progress is reported after every attempt (success or skip) as
//! `attempts / frame_count`.

use crate::error::{ImportError, ImportResult};
use crate::models::SourceImage;
use crate::utils::{downscale_to_fit, or_cancel};
use async_trait::async_trait;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sampling cadence used by every execution context
pub const DEFAULT_FRAME_INTERVAL_SECS: f64 = 0.5;

/// Tolerance for `duration / interval` landing a hair under an integer
const FRAME_COUNT_EPSILON: f64 = 1e-9;

/// Video decoding capability
///
/// Implementations must return the frame at exactly the requested
/// presentation time (zero tolerance), never a substitute from elsewhere in
/// the stream.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Total duration in seconds
    async fn duration_secs(&self) -> ImportResult<f64>;

    /// Decoded frame at `timestamp_secs`
    async fn frame_at(&self, timestamp_secs: f64) -> ImportResult<DynamicImage>;
}

/// Frame sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    /// Seconds between sampled frames
    pub interval_seconds: f64,
    /// Upper bound on frames requested
    pub max_frames: u32,
    /// Longest allowed axis of a sampled frame, in pixels
    pub max_dimension: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_FRAME_INTERVAL_SECS,
            max_frames: 30,
            max_dimension: 2000,
        }
    }
}

/// Sampler progress notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerUpdate {
    /// A timestamp could not be extracted and was skipped
    FrameSkipped { timestamp_secs: f64, error: String },
    /// `attempts` of `total` timestamps have been tried
    Progress { attempts: usize, total: usize },
}

impl SamplerUpdate {
    /// Fraction of the sampling phase completed, if this is a progress update
    pub fn fraction(&self) -> Option<f64> {
        match self {
            SamplerUpdate::Progress { attempts, total } if *total > 0 => {
                Some(*attempts as f64 / *total as f64)
            }
            _ => None,
        }
    }
}

/// Timestamps (seconds) to request for a video of `duration_secs`
pub fn sample_timestamps(
    duration_secs: f64,
    interval_seconds: f64,
    max_frames: u32,
) -> ImportResult<Vec<f64>> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(ImportError::InvalidMedia(format!(
            "video duration must be positive, got {}",
            duration_secs
        )));
    }
    if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
        return Err(ImportError::Config(format!(
            "sampling interval must be positive, got {}",
            interval_seconds
        )));
    }

    let fitting = (duration_secs / interval_seconds + FRAME_COUNT_EPSILON).floor() as u64;
    let frame_count = fitting.min(max_frames as u64) as usize;

    if frame_count == 0 {
        return Err(ImportError::InvalidMedia(format!(
            "video of {:.2}s is shorter than one {:.2}s sampling interval",
            duration_secs, interval_seconds
        )));
    }

    Ok((0..frame_count)
        .map(|i| i as f64 * interval_seconds)
        .collect())
}

/// Samples still frames from a [`VideoSource`]
pub struct FrameSampler<'a> {
    source: &'a dyn VideoSource,
    config: SamplingConfig,
}

impl<'a> FrameSampler<'a> {
    pub fn new(source: &'a dyn VideoSource, config: SamplingConfig) -> Self {
        Self { source, config }
    }

    /// Run the sampler to completion
    ///
    /// # Returns
    /// Frames in timestamp order; skipped timestamps leave gaps in `index`.
    ///
    /// # Errors
    /// `InvalidMedia`, `NoFramesExtracted`, or `Cancelled` when `cancel_token`
    /// fires before or during a suspension point.
    pub async fn sample<F>(
        &self,
        cancel_token: &CancellationToken,
        mut on_update: F,
    ) -> ImportResult<Vec<SourceImage>>
    where
        F: FnMut(SamplerUpdate),
    {
        if cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let duration_secs = or_cancel(self.source.duration_secs(), cancel_token).await?;
        let timestamps = sample_timestamps(
            duration_secs,
            self.config.interval_seconds,
            self.config.max_frames,
        )?;
        let total = timestamps.len();

        info!(
            duration_secs,
            frames = total,
            interval_seconds = self.config.interval_seconds,
            "Sampling video frames"
        );

        let mut frames = Vec::with_capacity(total);

        for (index, &timestamp_secs) in timestamps.iter().enumerate() {
            if cancel_token.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            match or_cancel(self.source.frame_at(timestamp_secs), cancel_token).await {
                Ok(image) => {
                    let image = downscale_to_fit(image, self.config.max_dimension);
                    debug!(
                        index,
                        timestamp_secs,
                        width = image.width(),
                        height = image.height(),
                        "Frame extracted"
                    );
                    frames.push(
                        SourceImage::new(image)
                            .with_index(index)
                            .with_timestamp(timestamp_secs),
                    );
                }
                Err(ImportError::Cancelled) => return Err(ImportError::Cancelled),
                Err(e) => {
                    warn!(index, timestamp_secs, error = %e, "Frame extraction failed, skipping");
                    on_update(SamplerUpdate::FrameSkipped {
                        timestamp_secs,
                        error: e.to_string(),
                    });
                }
            }

            on_update(SamplerUpdate::Progress {
                attempts: index + 1,
                total,
            });
        }

        if frames.is_empty() {
            return Err(ImportError::NoFramesExtracted);
        }

        info!(
            extracted = frames.len(),
            skipped = total - frames.len(),
            "Frame sampling complete"
        );
        Ok(frames)
    }
}
