//! Shared builders and test doubles

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use powr_common::{Address, UnsignedRecord};
use powr_tracker::{
    MachineConfig, PublishFailure, ResolvedTemplate, SetData, Signer, TemplateExercise,
    WorkoutEvent, WorkoutMachine,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 18, 30, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn exercise(identifier: &str, sets: u32) -> TemplateExercise {
    TemplateExercise {
        exercise_ref: Address::exercise("coach", identifier),
        name: identifier.to_string(),
        sets,
        reps: 5,
        weight: Some(100.0),
        rpe: None,
        set_type: None,
    }
}

/// Template named "Full Body" with the given exercises
pub fn template(exercises: &[(&str, u32)]) -> ResolvedTemplate {
    ResolvedTemplate {
        address: Address::template("coach", "full-body"),
        name: "Full Body".to_string(),
        exercises: exercises.iter().map(|(id, sets)| exercise(id, *sets)).collect(),
    }
}

/// Machine resolved into `active` at `t0`
pub fn started(exercises: &[(&str, u32)]) -> WorkoutMachine {
    started_with(exercises, MachineConfig::default())
}

pub fn started_with(exercises: &[(&str, u32)], config: MachineConfig) -> WorkoutMachine {
    let (mut machine, _) = WorkoutMachine::start(Address::template("coach", "full-body"), "athlete", config);
    machine
        .send(
            WorkoutEvent::TemplateResolved {
                template: template(exercises),
            },
            t0(),
        )
        .unwrap();
    machine
}

pub fn complete(exercise_index: usize, set_number: u32, weight: f64, reps: u32) -> WorkoutEvent {
    WorkoutEvent::CompleteSpecificSet {
        exercise_index,
        set_number,
        data: SetData::new(weight, reps),
    }
}

/// Names of the slots each completed set is attached to
pub fn history(machine: &WorkoutMachine) -> Vec<(String, u32)> {
    let session = machine.session().unwrap();
    let mut pairs: Vec<_> = session
        .completed_sets
        .iter()
        .map(|set| (session.exercises[set.exercise_index].name.clone(), set.set_number))
        .collect();
    pairs.sort();
    pairs
}

/// Signer that fails a fixed number of times before accepting
pub struct FlakySigner {
    failures_left: AtomicU32,
    attempts: AtomicU32,
    accepted: Mutex<Vec<UnsignedRecord>>,
}

impl FlakySigner {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            attempts: AtomicU32::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<UnsignedRecord> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for FlakySigner {
    async fn sign_and_broadcast(&self, record: &UnsignedRecord) -> Result<String, PublishFailure> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishFailure::Network(format!("relay unreachable (attempt {})", attempt)));
        }
        self.accepted.lock().unwrap().push(record.clone());
        Ok(format!("{}-{}", record.canonical_id(), attempt))
    }
}
