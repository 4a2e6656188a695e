//! Structural edits of the exercise list
//!
//! `completed_sets` are addressed by slot index, so every edit that shifts
//! slots re-addresses the sets (and the position pointer) in the same call.
//! Validation happens before the first write.

use crate::error::MutationError;
use crate::model::{ExerciseRef, ExerciseSlot, Position, WorkoutSession, MAX_SETS_PER_EXERCISE};

fn check_index(session: &WorkoutSession, index: usize) -> Result<(), MutationError> {
    if index < session.exercises.len() {
        Ok(())
    } else {
        Err(MutationError::IndexOutOfRange {
            index,
            len: session.exercises.len(),
        })
    }
}

fn remap_all(session: &mut WorkoutSession, map: impl Fn(usize) -> usize + Copy) {
    session.completed_sets.remap_indices(map);
    session.position = session.position.map(|p| p.remap(map));
}

/// Request one more set row for the slot's exercise
///
/// Returns the new set number and moves the position onto it.
pub fn add_set(session: &mut WorkoutSession, index: usize) -> Result<u32, MutationError> {
    check_index(session, index)?;

    let slot = &session.exercises[index];
    let prescribed = slot.prescribed_sets;
    let exercise_ref = slot.exercise_ref.clone();
    let set_number = session
        .set_count(index)
        .checked_add(1)
        .filter(|n| *n <= MAX_SETS_PER_EXERCISE)
        .ok_or(MutationError::SetLimitReached {
            index,
            max: MAX_SETS_PER_EXERCISE,
        })?;

    // History can already exceed prescription plus extras (e.g. after a substitution)
    let extra = session.extra_sets_requested.entry(exercise_ref).or_insert(0);
    *extra = extra.saturating_add(1).max(set_number.saturating_sub(prescribed));

    session.position = Some(Position::Set {
        exercise_index: index,
        set_number,
    });
    Ok(set_number)
}

/// Splice slots in at `at` (append when `None`), shifting later history up
pub fn add_exercises(
    session: &mut WorkoutSession,
    slots: Vec<ExerciseSlot>,
    at: Option<usize>,
) -> Result<usize, MutationError> {
    if slots.is_empty() {
        return Err(MutationError::NothingToAdd);
    }
    let len = session.exercises.len();
    let at = at.unwrap_or(len);
    if at > len {
        return Err(MutationError::InsertionOutOfRange { index: at, len });
    }

    let count = slots.len();
    remap_all(session, |i| if i >= at { i + count } else { i });
    session.exercises.splice(at..at, slots);

    if session.position.is_none() {
        session.position = Some(session.position_for_exercise(at));
    }
    Ok(at)
}

/// Remove a slot with no completed history, shifting later history down
pub fn remove_exercise(
    session: &mut WorkoutSession,
    index: usize,
) -> Result<ExerciseSlot, MutationError> {
    check_index(session, index)?;
    let sets = session.completed_sets.count_for(index);
    if sets > 0 {
        return Err(MutationError::HasCompletedSets { index, sets });
    }

    let removed = session.exercises.remove(index);
    let was_current = session.position.map(|p| p.exercise_index()) == Some(index);

    // No sets live at `index`, so the map is injective on what remains
    remap_all(session, |i| if i > index { i - 1 } else { i });

    if session.exercises.is_empty() {
        session.position = None;
    } else if was_current {
        let landing = index.min(session.exercises.len() - 1);
        session.position = Some(session.position_for_exercise(landing));
    }

    drop_unused_extras(session, &removed.exercise_ref);
    Ok(removed)
}

/// Replace a slot in place; its completed history stays with the index
pub fn substitute_exercise(
    session: &mut WorkoutSession,
    index: usize,
    slot: ExerciseSlot,
) -> Result<ExerciseSlot, MutationError> {
    check_index(session, index)?;
    let previous = std::mem::replace(&mut session.exercises[index], slot);

    drop_unused_extras(session, &previous.exercise_ref);

    if session.position.map(|p| p.exercise_index()) == Some(index) {
        session.position = Some(session.position_for_exercise(index));
    }
    Ok(previous)
}

/// Forget requested extra sets once no slot uses the exercise
fn drop_unused_extras(session: &mut WorkoutSession, exercise_ref: &ExerciseRef) {
    if !session
        .exercises
        .iter()
        .any(|slot| &slot.exercise_ref == exercise_ref)
    {
        session.extra_sets_requested.remove(exercise_ref);
    }
}

/// Swap two slots together with their history
fn swap_exercises(session: &mut WorkoutSession, a: usize, b: usize) {
    session.exercises.swap(a, b);
    remap_all(session, |i| {
        if i == a {
            b
        } else if i == b {
            a
        } else {
            i
        }
    });
}

/// Move a slot one place up; `Ok(false)` at the top boundary
pub fn move_exercise_up(session: &mut WorkoutSession, index: usize) -> Result<bool, MutationError> {
    check_index(session, index)?;
    if index == 0 {
        return Ok(false);
    }
    swap_exercises(session, index - 1, index);
    Ok(true)
}

/// Move a slot one place down; `Ok(false)` at the bottom boundary
pub fn move_exercise_down(
    session: &mut WorkoutSession,
    index: usize,
) -> Result<bool, MutationError> {
    check_index(session, index)?;
    if index + 1 == session.exercises.len() {
        return Ok(false);
    }
    swap_exercises(session, index, index + 1);
    Ok(true)
}
