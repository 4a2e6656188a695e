//! Structural edits during an active session

use powr_tracker::{
    LifecyclePhase, MachineError, MutationError, Position, SetKey, ValidationError, WorkoutEvent,
};

use crate::support::*;

#[test]
fn test_insert_shifts_history_of_later_slots() {
    let mut machine = started(&[("squat", 3), ("bench", 3)]);
    machine.send(complete(1, 1, 80.0, 5), at(10)).unwrap();
    machine.send(complete(1, 2, 80.0, 5), at(20)).unwrap();
    let before = history(&machine);

    machine
        .send(
            WorkoutEvent::AddExercises {
                exercises: vec![exercise("lunge", 2)],
                at: Some(1),
            },
            at(30),
        )
        .unwrap();

    let session = machine.session().unwrap();
    assert_eq!(session.exercises[1].name, "lunge");
    let indices: Vec<_> = session.completed_sets.iter().map(|s| s.exercise_index).collect();
    assert_eq!(indices, vec![2, 2]);
    assert_eq!(history(&machine), before);
}

#[test]
fn test_remove_shifts_remaining_slots_down() {
    let mut machine = started(&[("squat", 3), ("bench", 3), ("row", 3)]);
    machine.send(complete(1, 1, 80.0, 5), at(10)).unwrap();
    machine.send(complete(2, 3, 60.0, 10), at(20)).unwrap();
    let before = history(&machine);

    machine
        .send(WorkoutEvent::RemoveExercise { exercise_index: 0 }, at(30))
        .unwrap();

    let session = machine.session().unwrap();
    let names: Vec<_> = session.exercises.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["bench", "row"]);
    assert!(session.completed_sets.contains(SetKey::new(0, 1)));
    assert!(session.completed_sets.contains(SetKey::new(1, 3)));
    assert_eq!(history(&machine), before);
}

#[test]
fn test_remove_with_history_is_refused() {
    let mut machine = started(&[("squat", 3), ("bench", 3)]);
    machine.send(complete(0, 1, 100.0, 5), at(10)).unwrap();

    let err = machine
        .send(WorkoutEvent::RemoveExercise { exercise_index: 0 }, at(20))
        .unwrap_err();
    assert_eq!(
        err,
        MachineError::Mutation(MutationError::HasCompletedSets { index: 0, sets: 1 })
    );
    assert_eq!(machine.session().unwrap().exercises.len(), 2);

    // Clearing the history makes the slot removable
    machine
        .send(
            WorkoutEvent::UncompleteSpecificSet {
                exercise_index: 0,
                set_number: 1,
            },
            at(30),
        )
        .unwrap();
    machine
        .send(WorkoutEvent::RemoveExercise { exercise_index: 0 }, at(40))
        .unwrap();
    assert_eq!(machine.session().unwrap().exercises[0].name, "bench");
}

#[test]
fn test_moves_carry_history_and_stop_at_edges() {
    let mut machine = started(&[("squat", 3), ("bench", 3), ("row", 3)]);
    machine.send(complete(0, 1, 100.0, 5), at(10)).unwrap();
    machine.send(complete(2, 1, 60.0, 10), at(20)).unwrap();
    let before = history(&machine);

    machine
        .send(WorkoutEvent::MoveExerciseDown { exercise_index: 0 }, at(30))
        .unwrap();
    machine
        .send(WorkoutEvent::MoveExerciseUp { exercise_index: 2 }, at(31))
        .unwrap();
    let names: Vec<_> = machine
        .session()
        .unwrap()
        .exercises
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, vec!["bench", "row", "squat"]);
    assert_eq!(history(&machine), before);

    let edge = machine
        .send(WorkoutEvent::MoveExerciseUp { exercise_index: 0 }, at(40))
        .unwrap();
    assert!(!edge.changed);
    let edge = machine
        .send(WorkoutEvent::MoveExerciseDown { exercise_index: 2 }, at(41))
        .unwrap();
    assert!(!edge.changed);
    assert_eq!(history(&machine), before);
}

#[test]
fn test_substitution_keeps_history_on_the_slot() {
    let mut machine = started(&[("squat", 3), ("bench", 3)]);
    machine.send(complete(0, 1, 100.0, 5), at(10)).unwrap();

    machine
        .send(
            WorkoutEvent::SubstituteExercise {
                exercise_index: 0,
                exercise: exercise("front-squat", 3),
            },
            at(20),
        )
        .unwrap();

    let session = machine.session().unwrap();
    assert_eq!(session.exercises[0].name, "front-squat");
    assert!(session.completed_sets.contains(SetKey::new(0, 1)));
}

#[test]
fn test_add_set_extends_then_completes() {
    let mut machine = started(&[("squat", 1)]);
    machine.send(complete(0, 1, 100.0, 5), at(10)).unwrap();
    assert_eq!(
        machine.session().unwrap().position,
        Some(Position::AddSet { exercise_index: 0 })
    );

    machine
        .send(WorkoutEvent::AddSet { exercise_index: 0 }, at(20))
        .unwrap();
    let session = machine.session().unwrap();
    assert_eq!(session.set_count(0), 2);
    assert_eq!(session.completed_sets.len(), 1);

    machine
        .send(
            WorkoutEvent::CompleteSet {
                data: powr_tracker::SetData::new(100.0, 4),
            },
            at(30),
        )
        .unwrap();
    assert!(machine.session().unwrap().is_set_completed(0, 2));
}

#[test]
fn test_structural_edits_require_active() {
    let mut machine = started(&[("squat", 3), ("bench", 3)]);
    machine.send(WorkoutEvent::PauseWorkout, at(10)).unwrap();

    for event in [
        WorkoutEvent::AddExercises {
            exercises: vec![exercise("row", 3)],
            at: None,
        },
        WorkoutEvent::RemoveExercise { exercise_index: 1 },
        WorkoutEvent::SubstituteExercise {
            exercise_index: 0,
            exercise: exercise("row", 3),
        },
        WorkoutEvent::MoveExerciseDown { exercise_index: 0 },
        WorkoutEvent::AddSet { exercise_index: 0 },
    ] {
        assert!(matches!(
            machine.send(event, at(20)),
            Err(MachineError::NotAllowed {
                phase: LifecyclePhase::Paused,
                ..
            })
        ));
    }
    assert_eq!(machine.session().unwrap().exercises.len(), 2);
}

#[test]
fn test_oversized_or_empty_prescriptions_are_refused() {
    let mut machine = started(&[("squat", 3)]);
    let before = machine.session().unwrap().clone();

    let mut empty = exercise("lunge", 0);
    empty.reps = 0;
    empty.rpe = Some(42.0);
    let err = machine
        .send(
            WorkoutEvent::AddExercises {
                exercises: vec![empty],
                at: None,
            },
            at(10),
        )
        .unwrap_err();
    assert!(matches!(err, MachineError::Validation(_)));

    let err = machine
        .send(
            WorkoutEvent::SubstituteExercise {
                exercise_index: 0,
                exercise: exercise("front-squat", u32::MAX),
            },
            at(20),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MachineError::Validation(ValidationError::SetsOutOfRange { .. })
    ));
    assert_eq!(machine.session().unwrap(), &before);

    // Later edits keep working on the unchanged slot
    machine
        .send(WorkoutEvent::AddSet { exercise_index: 0 }, at(30))
        .unwrap();
    assert_eq!(machine.session().unwrap().set_count(0), 4);
}
