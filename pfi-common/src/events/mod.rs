//! Event types for the PFI event system
//!
//! Provides shared import event definitions and the EventBus.

mod import_types;

pub use import_types::{ImportSource, ImportState};

use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Import run events
///
/// Events are broadcast via EventBus and can be serialized for transport.
/// Every variant carries the `run_id` it belongs to so that subscribers can
/// follow several concurrent runs on one bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Run accepted and about to start work
    RunStarted {
        run_id: Uuid,
        source: ImportSource,
        /// Number of input images (stills) or the frame budget (video)
        input_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run moved between states
    StateChanged {
        run_id: Uuid,
        old_state: ImportState,
        new_state: ImportState,
        timestamp: DateTime<Utc>,
    },

    /// Overall progress update
    ///
    /// `value` is in [0.0, 1.0] and never decreases within one run.
    Progress {
        run_id: Uuid,
        value: f64,
        label: Option<String>,
    },

    /// A frame timestamp could not be extracted and was skipped
    FrameSkipped {
        run_id: Uuid,
        timestamp_secs: f64,
        error: String,
    },

    /// Text recognition failed for one image; the run continues
    RecognitionFailed {
        run_id: Uuid,
        image_index: usize,
        error: String,
    },

    /// Merged text produced
    RunSucceeded {
        run_id: Uuid,
        line_count: usize,
        duration_ms: u64,
    },

    /// Run ended with a terminal error
    RunFailed { run_id: Uuid, error: String },

    /// Run stopped by the caller
    RunCancelled { run_id: Uuid },
}

impl ImportEvent {
    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            ImportEvent::RunStarted { run_id, .. }
            | ImportEvent::StateChanged { run_id, .. }
            | ImportEvent::Progress { run_id, .. }
            | ImportEvent::FrameSkipped { run_id, .. }
            | ImportEvent::RecognitionFailed { run_id, .. }
            | ImportEvent::RunSucceeded { run_id, .. }
            | ImportEvent::RunFailed { run_id, .. }
            | ImportEvent::RunCancelled { run_id } => *run_id,
        }
    }

    /// True for the last event a run emits
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportEvent::RunSucceeded { .. }
                | ImportEvent::RunFailed { .. }
                | ImportEvent::RunCancelled { .. }
        )
    }
}

/// Broadcast bus for import events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag.
    ///   A video run emits roughly three events per frame.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ImportEvent) {
        let _ = self.tx.send(event);
    }

    /// Progress values for one run as a stream
    ///
    /// Subscribes immediately, so events emitted after this call and before
    /// the first poll are not lost. The stream ends after the run's terminal
    /// event or when the bus is dropped.
    pub fn progress_stream(&self, run_id: Uuid) -> impl Stream<Item = f64> {
        let mut rx = self.subscribe();

        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) if event.run_id() == run_id => {
                        if let ImportEvent::Progress { value, .. } = event {
                            yield value;
                        } else if event.is_terminal() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(run_id = %run_id, skipped, "Progress stream lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_emit_lossy_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.emit_lossy(ImportEvent::RunCancelled {
            run_id: Uuid::new_v4(),
        });

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let run_id = Uuid::new_v4();
        let json = serde_json::to_value(ImportEvent::Progress {
            run_id,
            value: 0.25,
            label: Some("Recognizing text".to_string()),
        })
        .unwrap();

        assert_eq!(json["type"], "Progress");
        assert_eq!(json["value"], 0.25);
        assert_eq!(json["run_id"], run_id.to_string());
    }

    #[tokio::test]
    async fn test_progress_stream_filters_by_run_and_ends_on_terminal() {
        let bus = EventBus::new(32);
        let run_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let stream = bus.progress_stream(run_id);

        bus.emit_lossy(ImportEvent::Progress { run_id, value: 0.1, label: None });
        bus.emit_lossy(ImportEvent::Progress { run_id: other, value: 0.9, label: None });
        bus.emit_lossy(ImportEvent::Progress { run_id, value: 0.5, label: None });
        bus.emit_lossy(ImportEvent::RunSucceeded { run_id: other, line_count: 1, duration_ms: 1 });
        bus.emit_lossy(ImportEvent::Progress { run_id, value: 1.0, label: None });
        bus.emit_lossy(ImportEvent::RunSucceeded { run_id, line_count: 3, duration_ms: 5 });

        let values: Vec<f64> = stream.collect().await;
        assert_eq!(values, vec![0.1, 0.5, 1.0]);
    }
}
