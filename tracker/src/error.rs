//! Error types for the workout session engine
//!
//! Every failure crossing the machine boundary is a typed value. Rejected
//! events never leave the session partially updated.

use serde::{Deserialize, Serialize};

use crate::machine::LifecyclePhase;

/// Invalid event payloads, rejected before any mutation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Reps must be greater than zero")]
    ZeroReps,

    #[error("Weight must be a finite number, got {0}")]
    NonFiniteWeight(f64),

    #[error("RPE must lie between 1 and 10, got {0}")]
    RpeOutOfRange(f64),

    #[error("Exercise index {index} is out of range ({len} exercises)")]
    ExerciseOutOfRange { index: usize, len: usize },

    #[error("Set {set_number} is out of range for exercise {exercise_index} ({set_count} sets)")]
    SetOutOfRange {
        exercise_index: usize,
        set_number: u32,
        set_count: u32,
    },

    #[error("Workout title must not be empty")]
    EmptyTitle,

    #[error("Prescribed sets must lie between 1 and {max}, got {sets}")]
    SetsOutOfRange { sets: u32, max: u32 },
}

/// Structural edits that would break set-history integrity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("Exercise index {index} is out of range ({len} exercises)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cannot insert at {index}: session has {len} exercises")]
    InsertionOutOfRange { index: usize, len: usize },

    #[error("No exercises to add")]
    NothingToAdd,

    #[error("Exercise {index} has {sets} completed set(s); uncomplete them before removing it")]
    HasCompletedSets { index: usize, sets: usize },

    #[error("Exercise {index} already has the maximum of {max} sets")]
    SetLimitReached { index: usize, max: u32 },
}

/// Template resolution failures; always retryable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),

    #[error("Malformed template: {0}")]
    Malformed(String),

    #[error("Event store error: {0}")]
    Store(String),

    #[error("Template resolution timed out after {0}s")]
    Timeout(u64),
}

/// Why a publish attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PublishFailure {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Record rejected: {0}")]
    Validation(String),

    #[error("Publish timed out after {0}s")]
    Timeout(u64),
}

/// Errors returned by `WorkoutMachine::send`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    #[error("{event} is not allowed while {phase}")]
    NotAllowed {
        event: &'static str,
        phase: LifecyclePhase,
    },

    #[error("Guard {guard} failed: {reason}")]
    GuardFailed {
        guard: &'static str,
        reason: String,
    },

    #[error("Publish failed {attempts} time(s); no retries left")]
    RetriesExhausted { attempts: u32 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

impl MachineError {
    pub(crate) fn guard(guard: &'static str, reason: impl Into<String>) -> Self {
        MachineError::GuardFailed {
            guard,
            reason: reason.into(),
        }
    }
}
