//! Import pipeline orchestrator
//!
//! # State Progression
//! IDLE → SAMPLING_FRAMES (video only) → RECOGNIZING → MERGING → SUCCEEDED
//!
//! Any working state can end in FAILED (terminal error) or CANCELLED (caller
//! fired the cancellation token). A run never moves backwards; retrying means
//! starting a new run.
//!
//! Each run is confined to the calling task. Cancellation is cooperative and
//! checked at every suspension point: video metadata, each frame, each
//! recognition, and the parse request.

use crate::error::{ImportError, ImportResult};
use crate::models::{ImportRun, ImportSource, ImportState, MergedText, SourceImage};
use crate::services::frame_sampler::{FrameSampler, SamplerUpdate, SamplingConfig, VideoSource};
use crate::services::line_merger::merge_blocks;
use crate::services::profile_parse_client::{ParsedProfile, ProfileParseClient};
use crate::services::text_recognizer::{RecognitionUpdate, RecognizerAdapter};
use crate::workflow::progress::{Phase, ProgressCallback, ProgressReporter};
use chrono::Utc;
use pfi_common::events::{EventBus, ImportEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a successful run
#[derive(Debug)]
pub struct ImportOutcome {
    /// Final run record (state is `Succeeded`)
    pub run: ImportRun,
    /// Deduplicated text
    pub text: MergedText,
    /// Parse outcome, present when a parse client is configured
    ///
    /// A failed parse does not fail the run; the merged text stays usable.
    pub sync: Option<ImportResult<ParsedProfile>>,
}

/// Import pipeline orchestrator
pub struct ImportOrchestrator {
    event_bus: EventBus,
    recognizer: RecognizerAdapter,
    sampling: SamplingConfig,
    parse_client: Option<Arc<ProfileParseClient>>,
    progress_callback: Option<ProgressCallback>,
}

impl ImportOrchestrator {
    pub fn new(event_bus: EventBus, recognizer: RecognizerAdapter, sampling: SamplingConfig) -> Self {
        Self {
            event_bus,
            recognizer,
            sampling,
            parse_client: None,
            progress_callback: None,
        }
    }

    /// Send merged text to the parse endpoint after each successful run
    pub fn with_parse_client(mut self, client: Arc<ProfileParseClient>) -> Self {
        self.parse_client = Some(client);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Import a screen recording
    pub async fn run_video(
        &self,
        video: &dyn VideoSource,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ImportOutcome> {
        let mut run = ImportRun::new(ImportSource::Video);
        let mut progress = self.reporter(&run);
        self.announce(&run, self.sampling.max_frames as usize);

        let result = self
            .execute_video(&mut run, &mut progress, video, cancel_token)
            .await;
        self.finish(run, result, cancel_token).await
    }

    /// Import an ordered list of screenshots
    pub async fn run_stills(
        &self,
        images: Vec<SourceImage>,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ImportOutcome> {
        let mut run = ImportRun::new(ImportSource::Stills);
        let mut progress = self.reporter(&run);
        self.announce(&run, images.len());

        let result = if images.is_empty() {
            Err(ImportError::NoImages)
        } else {
            self.recognize_and_merge(&mut run, &mut progress, images, cancel_token)
                .await
        };
        self.finish(run, result, cancel_token).await
    }

    async fn execute_video(
        &self,
        run: &mut ImportRun,
        progress: &mut ProgressReporter,
        video: &dyn VideoSource,
        cancel_token: &CancellationToken,
    ) -> ImportResult<MergedText> {
        if cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        self.transition(run, ImportState::SamplingFrames)?;

        let run_id = run.run_id;
        let mut skipped = 0;
        let frames = FrameSampler::new(video, self.sampling)
            .sample(cancel_token, |update| match update {
                SamplerUpdate::FrameSkipped { timestamp_secs, error } => {
                    skipped += 1;
                    self.event_bus.emit_lossy(ImportEvent::FrameSkipped {
                        run_id,
                        timestamp_secs,
                        error,
                    });
                }
                update => {
                    if let Some(fraction) = update.fraction() {
                        progress.phase(Phase::Sampling, fraction);
                    }
                }
            })
            .await;
        run.frames_skipped = skipped;
        let frames = frames?;

        info!(
            run_id = %run_id,
            frames = frames.len(),
            skipped = run.frames_skipped,
            "Frames sampled"
        );

        self.recognize_and_merge(run, progress, frames, cancel_token)
            .await
    }

    async fn recognize_and_merge(
        &self,
        run: &mut ImportRun,
        progress: &mut ProgressReporter,
        images: Vec<SourceImage>,
        cancel_token: &CancellationToken,
    ) -> ImportResult<MergedText> {
        if cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        self.transition(run, ImportState::Recognizing)?;

        let run_id = run.run_id;
        let mut failures = 0;
        let blocks = self
            .recognizer
            .recognize_all(&images, cancel_token, |update| match update {
                RecognitionUpdate::Failed { image_index, error } => {
                    failures += 1;
                    self.event_bus.emit_lossy(ImportEvent::RecognitionFailed {
                        run_id,
                        image_index,
                        error,
                    });
                }
                update => {
                    if let Some(fraction) = update.fraction() {
                        progress.phase(Phase::Recognition, fraction);
                    }
                }
            })
            .await;
        run.recognition_failures = failures;
        let blocks = blocks?;
        run.images_processed = blocks.len();
        drop(images);

        if cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        self.transition(run, ImportState::Merging)?;

        let merged = merge_blocks(&blocks);
        progress.report(1.0, Some("Merging text"));

        self.transition(run, ImportState::Succeeded)?;
        Ok(merged)
    }

    /// Publish the terminal events and hand the outcome to the caller
    async fn finish(
        &self,
        mut run: ImportRun,
        result: ImportResult<MergedText>,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ImportOutcome> {
        match result {
            Ok(text) => {
                info!(
                    run_id = %run.run_id,
                    lines = text.line_count(),
                    images = run.images_processed,
                    recognition_failures = run.recognition_failures,
                    duration_ms = run.duration_ms(),
                    "Import run succeeded"
                );
                self.event_bus.emit_lossy(ImportEvent::RunSucceeded {
                    run_id: run.run_id,
                    line_count: text.line_count(),
                    duration_ms: run.duration_ms(),
                });

                let sync = match &self.parse_client {
                    Some(client) => Some(self.sync(client, &run, &text, cancel_token).await),
                    None => None,
                };

                Ok(ImportOutcome { run, text, sync })
            }
            Err(ImportError::Cancelled) => {
                let old_state = run.state;
                if run.transition_to(ImportState::Cancelled).is_ok() {
                    self.emit_state_change(&run, old_state);
                }
                info!(run_id = %run.run_id, state = old_state.label(), "Import run cancelled");
                self.event_bus
                    .emit_lossy(ImportEvent::RunCancelled { run_id: run.run_id });
                Err(ImportError::Cancelled)
            }
            Err(e) => {
                let old_state = run.state;
                if run.fail(&e).is_ok() {
                    self.emit_state_change(&run, old_state);
                }
                error!(run_id = %run.run_id, state = old_state.label(), error = %e, "Import run failed");
                self.event_bus.emit_lossy(ImportEvent::RunFailed {
                    run_id: run.run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn sync(
        &self,
        client: &ProfileParseClient,
        run: &ImportRun,
        text: &MergedText,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ParsedProfile> {
        let result = client.parse_text(&text.text(), cancel_token).await;
        match &result {
            Ok(profile) => info!(
                run_id = %run.run_id,
                has_name = profile.name.is_some(),
                prompts = profile.prompts.len(),
                "Profile synced"
            ),
            Err(e) => warn!(run_id = %run.run_id, error = %e, "Profile sync failed"),
        }
        result
    }

    fn reporter(&self, run: &ImportRun) -> ProgressReporter {
        ProgressReporter::new(
            run.run_id,
            run.source,
            self.event_bus.clone(),
            self.progress_callback.clone(),
        )
    }

    fn announce(&self, run: &ImportRun, input_count: usize) {
        info!(
            run_id = %run.run_id,
            source = ?run.source,
            input_count,
            "Import run started"
        );
        self.event_bus.emit_lossy(ImportEvent::RunStarted {
            run_id: run.run_id,
            source: run.source,
            input_count,
            timestamp: run.started_at,
        });
    }

    fn transition(&self, run: &mut ImportRun, new_state: ImportState) -> ImportResult<()> {
        let old_state = run.state;
        run.transition_to(new_state)?;
        self.emit_state_change(run, old_state);
        Ok(())
    }

    fn emit_state_change(&self, run: &ImportRun, old_state: ImportState) {
        tracing::debug!(
            run_id = %run.run_id,
            from = old_state.label(),
            to = run.state.label(),
            "Import state changed"
        );
        self.event_bus.emit_lossy(ImportEvent::StateChanged {
            run_id: run.run_id,
            old_state,
            new_state: run.state,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::text_recognizer::TextRecognizer;
    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};

    struct EchoRecognizer;

    #[async_trait]
    impl TextRecognizer for EchoRecognizer {
        fn name(&self) -> &str {
            "echo"
        }

        async fn recognize(&self, image: &DynamicImage) -> ImportResult<Vec<String>> {
            Ok(vec![format!("line {}", image.width())])
        }
    }

    fn orchestrator(bus: EventBus) -> ImportOrchestrator {
        let recognizer = RecognizerAdapter::new(Arc::new(EchoRecognizer), 2000);
        ImportOrchestrator::new(bus, recognizer, SamplingConfig::default())
    }

    fn still(width: u32) -> SourceImage {
        SourceImage::new(DynamicImage::ImageRgb8(RgbImage::new(width, 10)))
    }

    #[tokio::test]
    async fn test_stills_run_succeeds_without_sampling() {
        let outcome = orchestrator(EventBus::new(64))
            .run_stills(vec![still(1), still(2), still(1)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.text.text(), "line 1\nline 2");
        assert_eq!(outcome.run.state, ImportState::Succeeded);
        assert_eq!(outcome.run.images_processed, 3);
        assert!(!outcome.run.visited(ImportState::SamplingFrames));
        assert!(outcome.sync.is_none());
    }

    #[tokio::test]
    async fn test_no_images_fails_before_any_work_state() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();

        let result = orchestrator(bus)
            .run_stills(Vec::new(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ImportError::NoImages)));

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ImportEvent::StateChanged { new_state, .. } = event {
                states.push(new_state);
            }
        }
        assert_eq!(states, vec![ImportState::Failed]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_cancelled_not_failed() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator(bus).run_stills(vec![still(1)], &token).await;
        assert!(matches!(result, Err(ImportError::Cancelled)));

        let mut saw_cancelled = false;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, ImportEvent::RunFailed { .. }));
            saw_cancelled |= matches!(event, ImportEvent::RunCancelled { .. });
        }
        assert!(saw_cancelled);
    }
}
