//! Import run state machine
//!
//! Idle → SamplingFrames (video only) → Recognizing → Merging → Succeeded,
//! with Failed and Cancelled reachable from every non-terminal state.
//! Transitions are one-directional; a retry is a new run.

use crate::error::{ImportError, ImportResult};
use chrono::{DateTime, Utc};
use pfi_common::events::{ImportSource, ImportState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: ImportState,
    pub new_state: ImportState,
    pub transitioned_at: DateTime<Utc>,
}

/// One pipeline invocation (in-memory record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Video or stills input
    pub source: ImportSource,

    /// Current state
    pub state: ImportState,

    /// Images that went through recognition (successfully or not)
    pub images_processed: usize,

    /// Frame timestamps that could not be extracted
    pub frames_skipped: usize,

    /// Images whose recognition failed and produced an empty block
    pub recognition_failures: usize,

    /// Terminal error message, if the run failed
    pub error: Option<String>,

    /// Every accepted transition, oldest first
    pub transitions: Vec<StateTransition>,

    pub started_at: DateTime<Utc>,

    /// Set when the run reaches a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    pub fn new(source: ImportSource) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source,
            state: ImportState::Idle,
            images_processed: 0,
            frames_skipped: 0,
            recognition_failures: 0,
            error: None,
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether `to` may follow `from` for a run with this input source
    pub fn can_transition(source: ImportSource, from: ImportState, to: ImportState) -> bool {
        use ImportState::*;

        if from.is_terminal() {
            return false;
        }
        if matches!(to, Failed | Cancelled) {
            return true;
        }

        match (from, to) {
            (Idle, SamplingFrames) => source == ImportSource::Video,
            (Idle, Recognizing) => source == ImportSource::Stills,
            (SamplingFrames, Recognizing) => true,
            (Recognizing, Merging) => true,
            (Merging, Succeeded) => true,
            _ => false,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: ImportState) -> ImportResult<StateTransition> {
        if !Self::can_transition(self.source, self.state, new_state) {
            return Err(ImportError::Common(pfi_common::Error::Internal(format!(
                "Illegal import state transition {:?} → {:?}",
                self.state, new_state
            ))));
        }

        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        self.transitions.push(transition.clone());
        Ok(transition)
    }

    /// Move to Failed, recording the error message
    pub fn fail(&mut self, error: &ImportError) -> ImportResult<StateTransition> {
        self.error = Some(error.to_string());
        self.transition_to(ImportState::Failed)
    }

    /// Check if run is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the run ever entered `state`
    pub fn visited(&self, state: ImportState) -> bool {
        self.transitions.iter().any(|t| t.new_state == state)
    }

    /// Wall-clock duration so far (or total, once terminal)
    pub fn duration_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}
