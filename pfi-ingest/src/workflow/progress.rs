//! Run progress reporting
//!
//! Phase fractions are blended into one overall value and published as
//! [`ImportEvent::Progress`] plus an optional caller callback. The published
//! value never decreases within a run.

use crate::models::{ImportProgress, ImportSource};
use pfi_common::events::{EventBus, ImportEvent};
use std::sync::Arc;
use uuid::Uuid;

/// Caller-supplied progress sink
pub type ProgressCallback = Arc<dyn Fn(ImportProgress) + Send + Sync>;

/// Share of overall progress given to frame sampling on a video run
const VIDEO_SAMPLING_WEIGHT: f64 = 0.5;

/// Pipeline phases that report fractional progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sampling,
    Recognition,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Sampling => "Sampling frames",
            Phase::Recognition => "Recognizing text",
        }
    }
}

/// Overall run progress for `fraction` of `phase`
///
/// Video: sampling covers [0, 0.5], recognition [0.5, 1.0].
/// Stills: recognition covers [0, 1.0].
pub fn overall_progress(source: ImportSource, phase: Phase, fraction: f64) -> f64 {
    let fraction = fraction.clamp(0.0, 1.0);
    match (source, phase) {
        (ImportSource::Video, Phase::Sampling) => VIDEO_SAMPLING_WEIGHT * fraction,
        (ImportSource::Video, Phase::Recognition) => {
            VIDEO_SAMPLING_WEIGHT + (1.0 - VIDEO_SAMPLING_WEIGHT) * fraction
        }
        (ImportSource::Stills, Phase::Recognition) => fraction,
        (ImportSource::Stills, Phase::Sampling) => 0.0,
    }
}

/// Monotonic progress publisher for one run
pub struct ProgressReporter {
    run_id: Uuid,
    source: ImportSource,
    event_bus: EventBus,
    callback: Option<ProgressCallback>,
    high_water: Option<f64>,
}

impl ProgressReporter {
    pub fn new(
        run_id: Uuid,
        source: ImportSource,
        event_bus: EventBus,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            run_id,
            source,
            event_bus,
            callback,
            high_water: None,
        }
    }

    /// Report `fraction` of `phase`
    pub fn phase(&mut self, phase: Phase, fraction: f64) {
        let value = overall_progress(self.source, phase, fraction);
        self.report(value, Some(phase.label()));
    }

    /// Report an overall value
    ///
    /// Values at or below the last published value are dropped; NaN is ignored.
    pub fn report(&mut self, value: f64, label: Option<&str>) {
        if value.is_nan() {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        if let Some(previous) = self.high_water {
            if value <= previous {
                return;
            }
        }
        self.high_water = Some(value);

        self.event_bus.emit_lossy(ImportEvent::Progress {
            run_id: self.run_id,
            value,
            label: label.map(str::to_string),
        });
        if let Some(callback) = &self.callback {
            callback(ImportProgress::new(value, label.map(str::to_string)));
        }
    }

    /// Highest value published so far
    pub fn current(&self) -> f64 {
        self.high_water.unwrap_or(0.0)
    }
}
