//! Text Recognizer Adapter
//!
//! Wraps an on-device text recognition capability: one [`SourceImage`] in, one
//! [`RecognizedBlock`] out. Batches keep output order equal to input order
//! even when several images are recognized concurrently.

use crate::error::{ImportError, ImportResult};
use crate::models::{RecognizedBlock, SourceImage};
use crate::utils::{fit_within, or_cancel};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Text recognition capability
///
/// Implementations run in their most accurate mode with language correction
/// and return lines in reading order.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Recognize text lines in `image`
    async fn recognize(&self, image: &DynamicImage) -> ImportResult<Vec<String>>;
}

/// Recognition batch notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionUpdate {
    /// Recognition failed for one image; an empty block stands in for it
    Failed { image_index: usize, error: String },
    /// `completed` of `total` images are done
    Progress { completed: usize, total: usize },
}

impl RecognitionUpdate {
    /// Fraction of the recognition phase completed, if this is a progress update
    pub fn fraction(&self) -> Option<f64> {
        match self {
            RecognitionUpdate::Progress { completed, total } if *total > 0 => {
                Some(*completed as f64 / *total as f64)
            }
            _ => None,
        }
    }
}

/// Recognizer with bounded input size and batch ordering
#[derive(Clone)]
pub struct RecognizerAdapter {
    recognizer: Arc<dyn TextRecognizer>,
    max_dimension: u32,
    concurrency: usize,
}

impl RecognizerAdapter {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, max_dimension: u32) -> Self {
        Self {
            recognizer,
            max_dimension,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` recognitions in flight (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Recognize a single image
    ///
    /// # Errors
    /// `InvalidImage` for an image with no pixels, `RecognitionFailed` (or
    /// whatever the capability reports) otherwise.
    pub async fn recognize_one(&self, source: &SourceImage) -> ImportResult<RecognizedBlock> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(ImportError::InvalidImage(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }

        let prepared = fit_within(&source.image, self.max_dimension);
        let lines = self.recognizer.recognize(&prepared).await?;

        debug!(
            recognizer = self.recognizer.name(),
            index = ?source.index,
            lines = lines.len(),
            "Recognized image"
        );
        Ok(RecognizedBlock::new(lines))
    }

    /// Recognize every image, one block per image in input order
    ///
    /// Per-image failures are logged, reported through `on_update`, and
    /// replaced by an empty block. Only cancellation aborts the batch.
    pub async fn recognize_all<F>(
        &self,
        images: &[SourceImage],
        cancel_token: &CancellationToken,
        mut on_update: F,
    ) -> ImportResult<Vec<RecognizedBlock>>
    where
        F: FnMut(RecognitionUpdate),
    {
        if images.is_empty() {
            return Err(ImportError::NoImages);
        }
        if cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let total = images.len();
        info!(
            recognizer = self.recognizer.name(),
            images = total,
            concurrency = self.concurrency,
            "Recognizing text"
        );

        let mut results = Box::pin(
            stream::iter(images.iter().enumerate())
                .map(|(position, image)| async move { (position, self.recognize_one(image).await) })
                .buffered(self.concurrency),
        );

        let mut blocks = Vec::with_capacity(total);

        while let Some((position, result)) =
            or_cancel(async { Ok(results.next().await) }, cancel_token).await?
        {
            let block = match result {
                Ok(block) => block,
                Err(ImportError::Cancelled) => return Err(ImportError::Cancelled),
                Err(e) => {
                    warn!(image_index = position, error = %e, "Text recognition failed, using empty block");
                    on_update(RecognitionUpdate::Failed {
                        image_index: position,
                        error: e.to_string(),
                    });
                    RecognizedBlock::empty()
                }
            };
            blocks.push(block);

            on_update(RecognitionUpdate::Progress {
                completed: blocks.len(),
                total,
            });
        }

        Ok(blocks)
    }
}

/// Load still images from disk for a stills run
///
/// # Errors
/// `InvalidImage` naming the first file that cannot be opened or decoded.
pub fn load_images<P: AsRef<std::path::Path>>(paths: &[P]) -> ImportResult<Vec<SourceImage>> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let path = path.as_ref();
            image::open(path)
                .map(|image| SourceImage::new(image).with_index(index))
                .map_err(|e| ImportError::InvalidImage(format!("{}: {}", path.display(), e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Encodes the image width as its single recognized line
    struct WidthRecognizer {
        fail_widths: Vec<u32>,
        seen: Mutex<Vec<(u32, u32)>>,
        delay_for_width: fn(u32) -> Duration,
    }

    impl WidthRecognizer {
        fn new() -> Self {
            Self {
                fail_widths: Vec::new(),
                seen: Mutex::new(Vec::new()),
                delay_for_width: |_| Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl TextRecognizer for WidthRecognizer {
        fn name(&self) -> &str {
            "width"
        }

        async fn recognize(&self, image: &DynamicImage) -> ImportResult<Vec<String>> {
            self.seen.lock().unwrap().push((image.width(), image.height()));
            tokio::time::sleep((self.delay_for_width)(image.width())).await;
            if self.fail_widths.contains(&image.width()) {
                return Err(ImportError::RecognitionFailed("unreadable".into()));
            }
            Ok(vec![format!("width {}", image.width())])
        }
    }

    fn image(width: u32, height: u32) -> SourceImage {
        SourceImage::new(DynamicImage::ImageRgb8(RgbImage::new(width, height)))
    }

    #[tokio::test]
    async fn test_oversized_image_is_downscaled_before_recognition() {
        let recognizer = Arc::new(WidthRecognizer::new());
        let adapter = RecognizerAdapter::new(recognizer.clone(), 100);

        let block = adapter.recognize_one(&image(400, 200)).await.unwrap();
        assert_eq!(block.lines, vec!["width 100".to_string()]);
        assert_eq!(recognizer.seen.lock().unwrap().as_slice(), &[(100, 50)]);
    }

    #[tokio::test]
    async fn test_zero_size_image_is_invalid() {
        let adapter = RecognizerAdapter::new(Arc::new(WidthRecognizer::new()), 100);
        let result = adapter.recognize_one(&image(0, 0)).await;
        assert!(matches!(result, Err(ImportError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_failures_become_empty_blocks() {
        let mut recognizer = WidthRecognizer::new();
        recognizer.fail_widths = vec![20];
        let adapter = RecognizerAdapter::new(Arc::new(recognizer), 1000);
        let images = vec![image(10, 10), image(20, 10), image(30, 10)];
        let mut failed = Vec::new();
        let mut fractions = Vec::new();

        let blocks = adapter
            .recognize_all(&images, &CancellationToken::new(), |update| match update {
                RecognitionUpdate::Failed { image_index, .. } => failed.push(image_index),
                other => fractions.extend(other.fraction()),
            })
            .await
            .unwrap();

        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].is_empty());
        assert_eq!(blocks[2].lines, vec!["width 30".to_string()]);
        assert_eq!(failed, vec![1]);
        assert_eq!(fractions.len(), 3);
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_parallel_batch_preserves_input_order() {
        let mut recognizer = WidthRecognizer::new();
        // Earlier images finish last
        recognizer.delay_for_width = |w| Duration::from_millis(60 - w as u64);
        let adapter = RecognizerAdapter::new(Arc::new(recognizer), 1000).with_concurrency(3);
        let images = vec![image(10, 5), image(20, 5), image(30, 5), image(40, 5)];

        let blocks = adapter
            .recognize_all(&images, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        let lines: Vec<_> = blocks.iter().map(|b| b.lines[0].clone()).collect();
        assert_eq!(lines, vec!["width 10", "width 20", "width 30", "width 40"]);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_batch() {
        let mut recognizer = WidthRecognizer::new();
        recognizer.delay_for_width = |_| Duration::from_secs(30);
        let adapter = RecognizerAdapter::new(Arc::new(recognizer), 1000);
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });

        let result = adapter
            .recognize_all(&[image(10, 10), image(20, 10)], &token, |_| {})
            .await;
        assert!(matches!(result, Err(ImportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_no_images() {
        let adapter = RecognizerAdapter::new(Arc::new(WidthRecognizer::new()), 1000);
        let result = adapter
            .recognize_all(&[], &CancellationToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(ImportError::NoImages)));
    }

    #[test]
    fn test_load_images_reports_bad_path() {
        let result = load_images(&["/nonexistent/screenshot.png"]);
        assert!(matches!(result, Err(ImportError::InvalidImage(msg)) if msg.contains("screenshot.png")));
    }

    #[test]
    fn test_load_images_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        RgbImage::new(3, 2).save(&first).unwrap();
        RgbImage::new(5, 4).save(&second).unwrap();

        let images = load_images(&[&first, &second]).unwrap();
        assert_eq!(images[0].dimensions(), (3, 2));
        assert_eq!(images[1].index, Some(1));
    }
}
