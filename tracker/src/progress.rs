//! Set completion and navigation within an active session
//!
//! Each operation validates first and mutates last, so a rejected call
//! leaves the session exactly as it was.

use chrono::{DateTime, Utc};

use crate::error::{MachineError, ValidationError};
use crate::model::{CompletedSet, Position, SetData, SetKey, WorkoutSession};

fn check_exercise(session: &WorkoutSession, exercise_index: usize) -> Result<(), ValidationError> {
    if exercise_index < session.exercises.len() {
        Ok(())
    } else {
        Err(ValidationError::ExerciseOutOfRange {
            index: exercise_index,
            len: session.exercises.len(),
        })
    }
}

fn check_set(
    session: &WorkoutSession,
    exercise_index: usize,
    set_number: u32,
) -> Result<(), ValidationError> {
    check_exercise(session, exercise_index)?;
    let set_count = session.set_count(exercise_index);
    if set_number == 0 || set_number > set_count {
        return Err(ValidationError::SetOutOfRange {
            exercise_index,
            set_number,
            set_count,
        });
    }
    Ok(())
}

/// Upsert the set at (exercise_index, set_number) and advance the position
pub fn complete_set(
    session: &mut WorkoutSession,
    exercise_index: usize,
    set_number: u32,
    data: SetData,
    now: DateTime<Utc>,
) -> Result<(), MachineError> {
    data.validate()?;
    check_set(session, exercise_index, set_number)?;

    let replaced = session.completed_sets.upsert(CompletedSet {
        exercise_index,
        set_number,
        weight: data.weight,
        reps: data.reps,
        rpe: data.rpe,
        set_type: data.set_type,
        completed_at: now,
    });
    if replaced.is_some() {
        tracing::debug!(exercise_index, set_number, "Replaced completed set");
    }

    session.position = Some(session.position_after(exercise_index, set_number));
    Ok(())
}

/// Complete whatever set the position points at
pub fn complete_current_set(
    session: &mut WorkoutSession,
    data: SetData,
    now: DateTime<Utc>,
) -> Result<(), MachineError> {
    match session.position {
        Some(Position::Set {
            exercise_index,
            set_number,
        }) => complete_set(session, exercise_index, set_number, data, now),
        Some(Position::AddSet { exercise_index }) => Err(MachineError::guard(
            "hasCurrentSet",
            format!("all sets of exercise {} are complete; add a set first", exercise_index),
        )),
        None => Err(MachineError::guard("hasCurrentSet", "session has no exercises")),
    }
}

/// Remove the fact at the key; other set numbers are untouched
pub fn uncomplete_set(
    session: &mut WorkoutSession,
    exercise_index: usize,
    set_number: u32,
) -> Result<bool, MachineError> {
    check_exercise(session, exercise_index)?;
    Ok(session
        .completed_sets
        .remove(SetKey::new(exercise_index, set_number))
        .is_some())
}

/// Jump to a slot, landing on its first incomplete set
pub fn navigate_to_exercise(
    session: &mut WorkoutSession,
    exercise_index: usize,
) -> Result<bool, MachineError> {
    check_exercise(session, exercise_index)?;
    let next = Some(session.position_for_exercise(exercise_index));
    let changed = session.position != next;
    session.position = next;
    Ok(changed)
}

/// Point at a specific set row
pub fn select_set(
    session: &mut WorkoutSession,
    exercise_index: usize,
    set_number: u32,
) -> Result<bool, MachineError> {
    check_set(session, exercise_index, set_number)?;
    let next = Some(Position::Set {
        exercise_index,
        set_number,
    });
    let changed = session.position != next;
    session.position = next;
    Ok(changed)
}
