//! Import workflow type definitions
//!
//! Supporting types for import run progress tracking.

use serde::{Deserialize, Serialize};

/// Import run state
///
/// Idle → SamplingFrames (video only) → Recognizing → Merging → Succeeded,
/// with Failed and Cancelled reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportState {
    /// Run created, no work issued yet
    Idle,
    /// Pulling still frames out of a video
    SamplingFrames,
    /// Running text recognition per image
    Recognizing,
    /// Merging and deduplicating recognized lines
    Merging,
    /// Merged text produced
    Succeeded,
    /// Run ended with a terminal error
    Failed,
    /// Run stopped by the caller
    Cancelled,
}

impl ImportState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Succeeded | ImportState::Failed | ImportState::Cancelled
        )
    }

    /// Short human-readable label used alongside progress values
    pub fn label(self) -> &'static str {
        match self {
            ImportState::Idle => "Waiting",
            ImportState::SamplingFrames => "Sampling video frames",
            ImportState::Recognizing => "Recognizing text",
            ImportState::Merging => "Merging text",
            ImportState::Succeeded => "Done",
            ImportState::Failed => "Failed",
            ImportState::Cancelled => "Cancelled",
        }
    }
}

/// Which kind of input a run was started with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    Video,
    Stills,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ImportState::Succeeded.is_terminal());
        assert!(ImportState::Failed.is_terminal());
        assert!(ImportState::Cancelled.is_terminal());
        assert!(!ImportState::Idle.is_terminal());
        assert!(!ImportState::SamplingFrames.is_terminal());
        assert!(!ImportState::Recognizing.is_terminal());
        assert!(!ImportState::Merging.is_terminal());
    }

    #[test]
    fn test_state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ImportState::SamplingFrames).unwrap();
        assert_eq!(json, "\"SAMPLING_FRAMES\"");
    }
}
