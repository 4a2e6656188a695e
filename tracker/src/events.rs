//! Session events
//!
//! Two directions:
//! - `WorkoutEvent`: the closed set of inputs the machine accepts, both user
//!   intents and completions of the machine's own async effects
//! - `SessionNotice`: what the runner reports back to subscribers

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PublishFailure, ResolutionError};
use crate::machine::LifecyclePhase;
use crate::model::{ResolvedTemplate, SetData, TemplateExercise};

// ============================================================================
// Machine Inputs
// ============================================================================

/// Every event the workout machine understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkoutEvent {
    /// Complete the set under the current position
    CompleteSet { data: SetData },

    /// Complete (or overwrite) a specific set
    CompleteSpecificSet {
        exercise_index: usize,
        set_number: u32,
        data: SetData,
    },

    /// Remove a completed set without renumbering the others
    UncompleteSpecificSet {
        exercise_index: usize,
        set_number: u32,
    },

    NavigateToExercise { exercise_index: usize },

    SelectSet {
        exercise_index: usize,
        set_number: u32,
    },

    /// Request one more set row for a slot's exercise
    AddSet { exercise_index: usize },

    /// Insert exercises at `at`, or append when absent
    AddExercises {
        exercises: Vec<TemplateExercise>,
        #[serde(default)]
        at: Option<usize>,
    },

    RemoveExercise { exercise_index: usize },

    SubstituteExercise {
        exercise_index: usize,
        exercise: TemplateExercise,
    },

    MoveExerciseUp { exercise_index: usize },

    MoveExerciseDown { exercise_index: usize },

    PauseWorkout,

    ResumeWorkout,

    /// Rename before the first set is completed
    RenameWorkout { title: String },

    CompleteWorkout,

    /// Retry the failed async operation (resolution or publish)
    RetryOperation,

    /// Leave a failed publication and go back to the paused session
    ReturnToWorkout,

    CancelWorkout,

    DismissSummary,

    TemplateResolved { template: ResolvedTemplate },

    TemplateResolutionFailed { error: ResolutionError },

    PublishSucceeded { record_id: String },

    PublishFailed { reason: PublishFailure },
}

impl WorkoutEvent {
    /// Wire name of the event, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            WorkoutEvent::CompleteSet { .. } => "COMPLETE_SET",
            WorkoutEvent::CompleteSpecificSet { .. } => "COMPLETE_SPECIFIC_SET",
            WorkoutEvent::UncompleteSpecificSet { .. } => "UNCOMPLETE_SPECIFIC_SET",
            WorkoutEvent::NavigateToExercise { .. } => "NAVIGATE_TO_EXERCISE",
            WorkoutEvent::SelectSet { .. } => "SELECT_SET",
            WorkoutEvent::AddSet { .. } => "ADD_SET",
            WorkoutEvent::AddExercises { .. } => "ADD_EXERCISES",
            WorkoutEvent::RemoveExercise { .. } => "REMOVE_EXERCISE",
            WorkoutEvent::SubstituteExercise { .. } => "SUBSTITUTE_EXERCISE",
            WorkoutEvent::MoveExerciseUp { .. } => "MOVE_EXERCISE_UP",
            WorkoutEvent::MoveExerciseDown { .. } => "MOVE_EXERCISE_DOWN",
            WorkoutEvent::PauseWorkout => "PAUSE_WORKOUT",
            WorkoutEvent::ResumeWorkout => "RESUME_WORKOUT",
            WorkoutEvent::RenameWorkout { .. } => "RENAME_WORKOUT",
            WorkoutEvent::CompleteWorkout => "COMPLETE_WORKOUT",
            WorkoutEvent::RetryOperation => "RETRY_OPERATION",
            WorkoutEvent::ReturnToWorkout => "RETURN_TO_WORKOUT",
            WorkoutEvent::CancelWorkout => "CANCEL_WORKOUT",
            WorkoutEvent::DismissSummary => "DISMISS_SUMMARY",
            WorkoutEvent::TemplateResolved { .. } => "TEMPLATE_RESOLVED",
            WorkoutEvent::TemplateResolutionFailed { .. } => "TEMPLATE_RESOLUTION_FAILED",
            WorkoutEvent::PublishSucceeded { .. } => "PUBLISH_SUCCEEDED",
            WorkoutEvent::PublishFailed { .. } => "PUBLISH_FAILED",
        }
    }

    /// Whether the event originates from the machine's own effects
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            WorkoutEvent::TemplateResolved { .. }
                | WorkoutEvent::TemplateResolutionFailed { .. }
                | WorkoutEvent::PublishSucceeded { .. }
                | WorkoutEvent::PublishFailed { .. }
        )
    }
}

// ============================================================================
// Runner Notices
// ============================================================================

/// Notices emitted by the session runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    /// The lifecycle phase changed
    PhaseChanged {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    /// An event was rejected; state is unchanged
    EventRejected { event: String, reason: String },

    /// A publish attempt is starting
    PublishAttempt { attempt: u32 },

    /// The workout record was accepted
    Published { record_id: String },

    /// A publish attempt failed
    PublishFailed {
        attempt: u32,
        reason: String,
        retries_left: u32,
    },
}

/// Sender for session notices
pub type NoticeTx = mpsc::UnboundedSender<SessionNotice>;

/// Receiver for session notices
pub type NoticeRx = mpsc::UnboundedReceiver<SessionNotice>;

/// Create a new notice channel
pub fn notice_channel() -> (NoticeTx, NoticeRx) {
    mpsc::unbounded_channel()
}

/// Helper for sending notices with a consistent API
#[derive(Clone, Default)]
pub struct NoticeSender {
    sender: Option<NoticeTx>,
}

impl NoticeSender {
    /// Create with an actual sender
    pub fn new(sender: NoticeTx) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Create a no-op sender (notices are discarded)
    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    /// Send a notice (silently dropped if nobody listens)
    pub fn send(&self, notice: SessionNotice) {
        if let Some(ref sender) = self.sender {
            let _ = sender.send(notice);
        }
    }

    pub fn phase_changed(&self, from: LifecyclePhase, to: LifecyclePhase) {
        self.send(SessionNotice::PhaseChanged { from, to });
    }

    pub fn rejected(&self, event: &str, reason: &str) {
        self.send(SessionNotice::EventRejected {
            event: event.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn publish_attempt(&self, attempt: u32) {
        self.send(SessionNotice::PublishAttempt { attempt });
    }

    pub fn published(&self, record_id: &str) {
        self.send(SessionNotice::Published {
            record_id: record_id.to_string(),
        });
    }

    pub fn publish_failed(&self, attempt: u32, reason: &str, retries_left: u32) {
        self.send(SessionNotice::PublishFailed {
            attempt,
            reason: reason.to_string(),
            retries_left,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = WorkoutEvent::CompleteSpecificSet {
            exercise_index: 1,
            set_number: 2,
            data: SetData::new(80.0, 6),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "COMPLETE_SPECIFIC_SET");
        assert_eq!(json["exercise_index"], 1);
        assert_eq!(json["data"]["reps"], 6);

        let unit = serde_json::to_value(WorkoutEvent::PauseWorkout).unwrap();
        assert_eq!(unit, serde_json::json!({"type": "PAUSE_WORKOUT"}));
    }

    #[test]
    fn test_event_names_match_wire_tags() {
        let events = [
            WorkoutEvent::CompleteWorkout,
            WorkoutEvent::AddSet { exercise_index: 0 },
            WorkoutEvent::MoveExerciseDown { exercise_index: 0 },
            WorkoutEvent::PublishSucceeded {
                record_id: "abc".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn test_malformed_payload_is_rejected_at_parse() {
        let bad = r#"{"type":"COMPLETE_SET","data":{"weight":100,"reps":-3}}"#;
        assert!(serde_json::from_str::<WorkoutEvent>(bad).is_err());

        let unknown = r#"{"type":"TELEPORT"}"#;
        assert!(serde_json::from_str::<WorkoutEvent>(unknown).is_err());
    }

    #[test]
    fn test_internal_events() {
        assert!(WorkoutEvent::PublishFailed {
            reason: PublishFailure::Network("down".into())
        }
        .is_internal());
        assert!(!WorkoutEvent::CancelWorkout.is_internal());
    }

    #[tokio::test]
    async fn test_notice_channel() {
        let (tx, mut rx) = notice_channel();
        let sender = NoticeSender::new(tx);
        assert!(sender.is_active());

        sender.published("abc");
        match rx.recv().await.unwrap() {
            SessionNotice::Published { record_id } => assert_eq!(record_id, "abc"),
            other => panic!("Expected Published, got {:?}", other),
        }
    }

    #[test]
    fn test_noop_sender() {
        let sender = NoticeSender::none();
        assert!(!sender.is_active());
        sender.rejected("ADD_SET", "paused");
    }
}
