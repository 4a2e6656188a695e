//! Lifecycle scenarios: pause accounting, guards and terminal states

use powr_tracker::timer;
use powr_tracker::{
    LifecyclePhase, MachineError, PublishResult, SetData, SetKey, WorkoutEvent, WorkoutView,
};

use crate::support::*;

fn elapsed(machine: &powr_tracker::WorkoutMachine, secs: i64) -> i64 {
    WorkoutView::project(machine, at(secs)).elapsed_secs
}

#[test]
fn test_full_session_reaches_final() {
    let mut machine = started(&[("squat", 3), ("bench", 3), ("row", 3)]);

    for exercise_index in 0..3 {
        for _ in 0..3 {
            machine
                .send(
                    WorkoutEvent::NavigateToExercise { exercise_index },
                    at(10),
                )
                .unwrap();
            machine
                .send(
                    WorkoutEvent::CompleteSet {
                        data: SetData::new(100.0, 5),
                    },
                    at(60),
                )
                .unwrap();
        }
    }
    assert_eq!(machine.session().unwrap().completed_sets.len(), 9);

    machine.send(WorkoutEvent::CompleteWorkout, at(3000)).unwrap();
    machine
        .send(
            WorkoutEvent::PublishSucceeded {
                record_id: "note1abc".to_string(),
            },
            at(3001),
        )
        .unwrap();
    machine.send(WorkoutEvent::DismissSummary, at(3005)).unwrap();

    assert_eq!(machine.phase(), LifecyclePhase::Final);
    assert_eq!(
        machine.publish_result(),
        Some(PublishResult::Published {
            record_id: "note1abc".to_string()
        })
    );
    assert_eq!(machine.session().unwrap().completed_sets.len(), 9);
}

#[test]
fn test_pause_does_not_count_toward_elapsed() {
    let mut machine = started(&[("squat", 3)]);

    machine.send(WorkoutEvent::PauseWorkout, at(120)).unwrap();
    assert_eq!(elapsed(&machine, 120), 120);
    // Frozen while paused
    assert_eq!(elapsed(&machine, 170), 120);

    machine.send(WorkoutEvent::ResumeWorkout, at(180)).unwrap();
    assert_eq!(elapsed(&machine, 180), 120);
    assert_eq!(elapsed(&machine, 200), 140);
}

#[test]
fn test_repeated_pauses_accumulate() {
    let mut machine = started(&[("squat", 3)]);
    let mut paused_total = 0;

    for (pause, resume) in [(100, 130), (300, 301), (500, 900)] {
        machine.send(WorkoutEvent::PauseWorkout, at(pause)).unwrap();
        machine.send(WorkoutEvent::ResumeWorkout, at(resume)).unwrap();
        paused_total += resume - pause;
        assert_eq!(elapsed(&machine, resume), resume - paused_total);
    }

    let session = machine.session().unwrap();
    assert_eq!(session.pause_intervals.len(), 3);
    assert_eq!(timer::total_paused(&session.pause_intervals).num_seconds(), paused_total);
}

#[test]
fn test_upsert_keeps_latest_data() {
    let mut machine = started(&[("squat", 3)]);
    machine.send(complete(0, 2, 100.0, 5), at(10)).unwrap();
    machine.send(complete(0, 2, 105.0, 3), at(20)).unwrap();

    let session = machine.session().unwrap();
    assert_eq!(session.completed_sets.len(), 1);
    let set = session.completed_sets.get(SetKey::new(0, 2)).unwrap();
    assert_eq!(set.weight, 105.0);
    assert_eq!(set.reps, 3);
}

#[test]
fn test_invalid_payload_leaves_state_untouched() {
    let mut machine = started(&[("squat", 3)]);
    let before = machine.session().unwrap().clone();

    let err = machine
        .send(
            WorkoutEvent::CompleteSet {
                data: SetData::new(100.0, 5).with_rpe(12.0),
            },
            at(10),
        )
        .unwrap_err();
    assert!(matches!(err, MachineError::Validation(_)));
    assert!(machine.send(complete(0, 1, 100.0, 0), at(11)).is_err());
    assert!(machine.send(complete(4, 1, 100.0, 5), at(12)).is_err());

    assert_eq!(machine.session().unwrap(), &before);
}

#[test]
fn test_complete_requires_a_set() {
    let mut machine = started(&[("squat", 3)]);
    assert!(machine.send(WorkoutEvent::CompleteWorkout, at(10)).is_err());
    assert_eq!(machine.phase(), LifecyclePhase::Active);

    machine.send(complete(0, 1, 100.0, 5), at(20)).unwrap();
    machine.send(WorkoutEvent::UncompleteSpecificSet { exercise_index: 0, set_number: 1 }, at(30)).unwrap();
    assert!(machine.send(WorkoutEvent::CompleteWorkout, at(40)).is_err());
}

#[test]
fn test_terminal_states_reject_mutation() {
    let mut cancelled = started(&[("squat", 3), ("bench", 3)]);
    cancelled.send(complete(0, 1, 100.0, 5), at(10)).unwrap();
    cancelled.send(WorkoutEvent::CancelWorkout, at(20)).unwrap();

    let mut finished = started(&[("squat", 3), ("bench", 3)]);
    finished.send(complete(0, 1, 100.0, 5), at(10)).unwrap();
    finished.send(WorkoutEvent::CompleteWorkout, at(20)).unwrap();
    finished
        .send(
            WorkoutEvent::PublishSucceeded {
                record_id: "id".to_string(),
            },
            at(21),
        )
        .unwrap();
    finished.send(WorkoutEvent::DismissSummary, at(22)).unwrap();
    let frozen = finished.session().unwrap().clone();

    let mutations = || {
        vec![
            complete(0, 2, 100.0, 5),
            WorkoutEvent::UncompleteSpecificSet {
                exercise_index: 0,
                set_number: 1,
            },
            WorkoutEvent::AddSet { exercise_index: 0 },
            WorkoutEvent::AddExercises {
                exercises: vec![exercise("row", 3)],
                at: None,
            },
            WorkoutEvent::RemoveExercise { exercise_index: 1 },
            WorkoutEvent::MoveExerciseUp { exercise_index: 1 },
            WorkoutEvent::PauseWorkout,
            WorkoutEvent::RetryOperation,
            WorkoutEvent::CancelWorkout,
        ]
    };

    for event in mutations() {
        assert!(cancelled.send(event, at(30)).is_err());
    }
    for event in mutations() {
        assert!(finished.send(event, at(30)).is_err());
    }

    assert_eq!(cancelled.phase(), LifecyclePhase::Cancelled);
    assert_eq!(finished.phase(), LifecyclePhase::Final);
    assert_eq!(finished.session().unwrap(), &frozen);
}

#[test]
fn test_paused_session_can_complete_or_cancel() {
    let mut machine = started(&[("squat", 3)]);
    machine.send(complete(0, 1, 100.0, 5), at(60)).unwrap();
    machine.send(WorkoutEvent::PauseWorkout, at(90)).unwrap();

    assert!(machine
        .send(WorkoutEvent::NavigateToExercise { exercise_index: 0 }, at(95))
        .is_err());

    machine.send(WorkoutEvent::CancelWorkout, at(100)).unwrap();
    assert_eq!(machine.phase(), LifecyclePhase::Cancelled);
    assert!(machine.session().is_none());
}
