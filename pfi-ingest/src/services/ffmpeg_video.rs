//! FFmpeg-backed video source
//!
//! Duration comes from `ffprobe`; single frames are decoded by `ffmpeg` with an
//! output-side seek (`-ss` after `-i`), which decodes up to the exact
//! presentation time instead of snapping to the nearest keyframe.

use crate::error::{ImportError, ImportResult};
use crate::services::frame_sampler::VideoSource;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Video file decoded through the ffmpeg command-line tools
pub struct FfmpegVideoSource {
    path: PathBuf,
    ffmpeg_binary: String,
    ffprobe_binary: String,
}

impl FfmpegVideoSource {
    /// Open a video file
    ///
    /// Only checks that the file exists; decoding errors surface from
    /// [`VideoSource::duration_secs`] as `InvalidMedia`.
    pub fn open(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ImportError::InvalidMedia(format!(
                "video file not found: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
        })
    }

    /// Use explicit tool binaries instead of the ones on PATH
    pub fn with_binaries(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg_binary = ffmpeg.into();
        self.ffprobe_binary = ffprobe.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, binary: &str, args: &[&str]) -> ImportResult<Vec<u8>> {
        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ImportError::InvalidMedia(format!("{} not found in PATH", binary))
                } else {
                    ImportError::InvalidMedia(format!("failed to run {}: {}", binary, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportError::InvalidMedia(format!(
                "{} exited with {}: {}",
                binary,
                output.status,
                last_line(&stderr)
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl VideoSource for FfmpegVideoSource {
    async fn duration_secs(&self) -> ImportResult<f64> {
        let path = self.path.to_string_lossy();
        let stdout = self
            .run(
                &self.ffprobe_binary,
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                    path.as_ref(),
                ],
            )
            .await?;

        let duration = parse_duration(&String::from_utf8_lossy(&stdout))?;
        debug!(path = %self.path.display(), duration, "Probed video duration");
        Ok(duration)
    }

    async fn frame_at(&self, timestamp_secs: f64) -> ImportResult<DynamicImage> {
        let path = self.path.to_string_lossy();
        let seek = format!("{:.3}", timestamp_secs);
        let png = self
            .run(
                &self.ffmpeg_binary,
                &[
                    "-v",
                    "error",
                    "-i",
                    path.as_ref(),
                    "-ss",
                    &seek,
                    "-frames:v",
                    "1",
                    "-f",
                    "image2pipe",
                    "-c:v",
                    "png",
                    "-",
                ],
            )
            .await?;

        if png.is_empty() {
            return Err(ImportError::InvalidMedia(format!(
                "no frame decoded at {}s",
                seek
            )));
        }

        image::load_from_memory(&png)
            .map_err(|e| ImportError::InvalidImage(format!("frame at {}s: {}", seek, e)))
    }
}

/// Parse ffprobe's bare `format=duration` output
fn parse_duration(output: &str) -> ImportResult<f64> {
    let trimmed = output.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| ImportError::InvalidMedia(format!("unreadable duration: {:?}", trimmed)))
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}
