//! Publication: deterministic records, bounded retries, runner pipeline

use std::sync::Arc;

use powr_common::{Address, Record, Tag, UnsignedRecord, EXERCISE_KIND, TEMPLATE_KIND, WORKOUT_RECORD_KIND};
use powr_tracker::{
    Effect, InMemoryStore, LifecyclePhase, MachineConfig, MachineError, ManualClock, OutboxSigner,
    PublishFailure, PublishResult, SessionRunner, SetData, StoreResolver, WorkoutEvent,
};

use crate::support::*;

fn publish_effect(effect: Option<Effect>) -> (UnsignedRecord, u32) {
    match effect {
        Some(Effect::Publish { record, attempt }) => (record, attempt),
        other => panic!("Expected a publish effect, got {:?}", other),
    }
}

fn network_failure() -> WorkoutEvent {
    WorkoutEvent::PublishFailed {
        reason: PublishFailure::Network("timeout talking to relay".to_string()),
    }
}

#[test]
fn test_two_failures_then_success() {
    let mut machine = started(&[("squat", 2)]);
    machine.send(complete(0, 1, 100.0, 5), at(60)).unwrap();
    machine.send(complete(0, 2, 100.0, 5), at(180)).unwrap();

    let (first, attempt) = publish_effect(machine.send(WorkoutEvent::CompleteWorkout, at(600)).unwrap().effect);
    assert_eq!(attempt, 1);

    machine.send(network_failure(), at(601)).unwrap();
    let (second, attempt) = publish_effect(machine.send(WorkoutEvent::RetryOperation, at(650)).unwrap().effect);
    assert_eq!(attempt, 2);

    machine.send(network_failure(), at(651)).unwrap();
    let (third, attempt) = publish_effect(machine.send(WorkoutEvent::RetryOperation, at(700)).unwrap().effect);
    assert_eq!(attempt, 3);

    // Every attempt carries the same logical record
    assert_eq!(first, second);
    assert_eq!(second, third);

    machine
        .send(
            WorkoutEvent::PublishSucceeded {
                record_id: "third".to_string(),
            },
            at(701),
        )
        .unwrap();
    machine.send(WorkoutEvent::DismissSummary, at(702)).unwrap();

    assert_eq!(machine.phase(), LifecyclePhase::Final);
    assert_eq!(
        machine.publish_result(),
        Some(PublishResult::Published {
            record_id: "third".to_string()
        })
    );
    // Publishing time is not workout time
    assert_eq!(machine.finished().unwrap().summary.duration_secs, 600);
}

#[test]
fn test_exhausted_retries_leave_return_or_cancel() {
    let config = MachineConfig {
        max_publish_attempts: 2,
        ..Default::default()
    };
    let mut machine = started_with(&[("squat", 2)], config);
    machine.send(complete(0, 1, 100.0, 5), at(60)).unwrap();
    machine.send(WorkoutEvent::CompleteWorkout, at(100)).unwrap();
    machine.send(network_failure(), at(101)).unwrap();
    machine.send(WorkoutEvent::RetryOperation, at(102)).unwrap();
    machine.send(network_failure(), at(103)).unwrap();

    assert_eq!(
        machine.send(WorkoutEvent::RetryOperation, at(104)),
        Err(MachineError::RetriesExhausted { attempts: 2 })
    );

    machine.send(WorkoutEvent::ReturnToWorkout, at(200)).unwrap();
    assert_eq!(machine.phase(), LifecyclePhase::Paused);
    machine.send(WorkoutEvent::ResumeWorkout, at(300)).unwrap();
    machine.send(complete(0, 2, 100.0, 5), at(320)).unwrap();

    // A fresh completion starts a fresh attempt budget
    let (record, attempt) = publish_effect(machine.send(WorkoutEvent::CompleteWorkout, at(400)).unwrap().effect);
    assert_eq!(attempt, 1);
    assert_eq!(record.tags_named("exercise").count(), 2);
    assert_eq!(record.tag_value("end"), Some(at(400).timestamp().to_string().as_str()));
}

#[test]
fn test_record_layout() {
    let mut machine = started(&[("squat", 2), ("bench", 1)]);
    machine
        .send(
            WorkoutEvent::CompleteSpecificSet {
                exercise_index: 1,
                set_number: 1,
                data: SetData::new(-10.0, 8).with_rpe(7.5),
            },
            at(30),
        )
        .unwrap();
    machine.send(complete(0, 1, 102.5, 5), at(60)).unwrap();
    machine.send(WorkoutEvent::CompleteWorkout, at(900)).unwrap();

    let record = &machine.finished().unwrap().record;
    assert_eq!(record.kind, WORKOUT_RECORD_KIND);
    assert_eq!(record.tag_value("title"), Some("Full Body"));
    assert_eq!(record.tag_value("completed"), Some("true"));
    assert_eq!(record.tag_value("start"), Some(t0().timestamp().to_string().as_str()));
    assert_eq!(record.tag_value("template"), Some("33402:coach:full-body"));

    let sets: Vec<&Tag> = record.tags_named("exercise").collect();
    assert_eq!(
        sets[0].0,
        vec!["exercise", "33401:coach:squat", "", "102.5", "5", "", "normal", "1"]
    );
    assert_eq!(
        sets[1].0,
        vec!["exercise", "33401:coach:bench", "", "-10", "8", "7.5", "normal", "1"]
    );
}

#[tokio::test]
async fn test_runner_retries_against_flaky_signer() {
    let store = InMemoryStore::new();
    store
        .insert(
            UnsignedRecord::new(EXERCISE_KIND, "coach", 1)
                .with_tag(Tag::new(["d", "squat"]))
                .with_tag(Tag::new(["title", "Back Squat"])),
        )
        .await;
    store
        .insert(
            UnsignedRecord::new(TEMPLATE_KIND, "coach", 1)
                .with_tag(Tag::new(["d", "five-by-five"]))
                .with_tag(Tag::new(["title", "5x5"]))
                .with_tag(Tag::new(["exercise", "33401:coach:squat", "", "100", "5", "", "normal", "5"])),
        )
        .await;

    let clock = ManualClock::new(t0());
    let signer = Arc::new(FlakySigner::failing(2));
    let handle = SessionRunner::new(Arc::new(StoreResolver::new(Arc::new(store))), signer.clone())
        .with_clock(Arc::new(clock.clone()))
        .start(Address::template("coach", "five-by-five"), "athlete");

    let view = handle.settled().await.unwrap();
    assert_eq!(view.phase, LifecyclePhase::Active);
    assert_eq!(view.exercises[0].name, "Back Squat");
    assert_eq!(view.total_sets, 5);

    handle
        .send(WorkoutEvent::CompleteSet {
            data: SetData::new(100.0, 5),
        })
        .await
        .unwrap();
    clock.advance(chrono::Duration::minutes(5));
    handle.send(WorkoutEvent::CompleteWorkout).await.unwrap();

    for attempt in 1..=2 {
        let view = handle.settled().await.unwrap();
        assert_eq!(view.phase, LifecyclePhase::Error);
        assert_eq!(view.attempts, attempt);
        handle.send(WorkoutEvent::RetryOperation).await.unwrap();
    }

    let view = handle.settled().await.unwrap();
    assert_eq!(view.phase, LifecyclePhase::ShowingSummary);
    assert_eq!(signer.attempts(), 3);

    let accepted = signer.accepted();
    assert_eq!(accepted.len(), 1);
    assert_eq!(
        view.record_id,
        Some(format!("{}-3", accepted[0].canonical_id()))
    );
}

#[tokio::test]
async fn test_outbox_receives_one_line_per_publish() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = dir.path().join("outbox.jsonl");
    let store = InMemoryStore::with_records([
        UnsignedRecord::new(EXERCISE_KIND, "coach", 1)
            .with_tag(Tag::new(["d", "pullup"]))
            .with_tag(Tag::new(["title", "Pull-up"])),
        UnsignedRecord::new(TEMPLATE_KIND, "coach", 1)
            .with_tag(Tag::new(["d", "pull-day"]))
            .with_tag(Tag::new(["exercise", "33401:coach:pullup", "", "", "8", "", "", "3"])),
    ]);

    let clock = ManualClock::new(t0());
    let handle = SessionRunner::new(
        Arc::new(StoreResolver::new(Arc::new(store))),
        Arc::new(OutboxSigner::new(&outbox)),
    )
    .with_clock(Arc::new(clock.clone()))
    .start(Address::template("coach", "pull-day"), "athlete");
    handle.settled().await.unwrap();

    handle
        .send(WorkoutEvent::CompleteSet {
            data: SetData::new(0.0, 8),
        })
        .await
        .unwrap();
    clock.advance(chrono::Duration::minutes(3));
    handle.send(WorkoutEvent::CompleteWorkout).await.unwrap();
    let view = handle.settled().await.unwrap();
    assert_eq!(view.phase, LifecyclePhase::ShowingSummary);
    // Untitled templates fall back to their identifier
    assert_eq!(view.title.as_deref(), Some("pull-day"));

    let content = std::fs::read_to_string(&outbox).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    let stored: Record = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(Some(stored.id), view.record_id);
    assert_eq!(stored.body.kind, WORKOUT_RECORD_KIND);
}
