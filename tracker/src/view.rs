//! Read-only projection of the machine for presentation

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::machine::{LifecyclePhase, WorkoutMachine, WorkoutState};
use crate::model::{Position, SetKey, SetType, WorkoutSession};
use crate::summary::WorkoutSummary;
use crate::timer;

/// One set row of an exercise
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetView {
    pub set_number: u32,
    pub completed: bool,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub set_type: SetType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseView {
    pub index: usize,
    pub exercise_ref: String,
    pub name: String,
    pub sets: Vec<SetView>,
}

impl ExerciseView {
    pub fn completed_count(&self) -> usize {
        self.sets.iter().filter(|s| s.completed).count()
    }
}

/// Snapshot of everything a screen needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutView {
    pub phase: LifecyclePhase,
    pub workout_id: String,
    pub title: Option<String>,
    pub elapsed_secs: i64,
    pub paused: bool,
    pub exercises: Vec<ExerciseView>,
    pub position: Option<Position>,
    pub completed_sets: usize,
    pub total_sets: u32,
    pub can_complete: bool,
    /// Last resolution or publish failure, when in an error phase
    pub error: Option<String>,
    pub attempts: u32,
    pub retries_left: u32,
    pub record_id: Option<String>,
    pub summary: Option<WorkoutSummary>,
}

fn exercises(session: &WorkoutSession) -> Vec<ExerciseView> {
    session
        .exercises
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let sets = (1..=session.set_count(index))
                .map(|set_number| match session.completed_sets.get(SetKey::new(index, set_number)) {
                    Some(done) => SetView {
                        set_number,
                        completed: true,
                        weight: Some(done.weight),
                        reps: Some(done.reps),
                        rpe: done.rpe,
                        set_type: done.set_type,
                    },
                    None => SetView {
                        set_number,
                        completed: false,
                        weight: slot.prescribed_weight,
                        reps: Some(slot.prescribed_reps),
                        rpe: slot.prescribed_rpe,
                        set_type: slot.prescribed_set_type,
                    },
                })
                .collect();

            ExerciseView {
                index,
                exercise_ref: slot.exercise_ref.to_string(),
                name: slot.name.clone(),
                sets,
            }
        })
        .collect()
}

impl WorkoutView {
    /// Project the machine as seen at `now`
    pub fn project(machine: &WorkoutMachine, now: DateTime<Utc>) -> Self {
        let state = machine.state();
        let finished = machine.finished();
        let session = machine.session();

        // Frozen sessions stop the clock at their end time
        let clock = finished.map(|f| f.end_time).unwrap_or(now);
        let elapsed_secs = session
            .map(|s| timer::elapsed_secs(s.start_time, &s.pause_intervals, clock))
            .unwrap_or(0);

        let error = match state {
            WorkoutState::TemplateError { error, .. } => Some(error.to_string()),
            WorkoutState::Error { reason, .. } => Some(reason.to_string()),
            _ => None,
        };
        let record_id = match state {
            WorkoutState::ShowingSummary { record_id, .. } | WorkoutState::Final { record_id, .. } => {
                Some(record_id.clone())
            }
            _ => None,
        };

        Self {
            phase: machine.phase(),
            workout_id: machine.workout_id().to_string(),
            title: session.map(|s| s.title.clone()),
            elapsed_secs,
            paused: session.map(|s| s.is_paused()).unwrap_or(false),
            exercises: session.map(exercises).unwrap_or_default(),
            position: session.and_then(|s| s.position),
            completed_sets: session.map(|s| s.completed_sets.len()).unwrap_or(0),
            total_sets: session.map(|s| s.total_set_count()).unwrap_or(0),
            can_complete: machine.can_complete(),
            error,
            attempts: machine.attempts(),
            retries_left: machine.retries_left(),
            record_id,
            summary: finished.map(|f| f.summary.clone()),
        }
    }

    /// Whether a template resolution or publish attempt is in flight
    pub fn is_pending(&self) -> bool {
        matches!(self.phase, LifecyclePhase::LoadingTemplate | LifecyclePhase::Publishing)
    }

    /// One-line status for terminal output
    pub fn status_line(&self) -> String {
        let title = self.title.as_deref().unwrap_or("(untitled)");
        let mut line = format!(
            "[{}] {} {} sets {}/{}",
            self.phase,
            title,
            timer::format_clock(self.elapsed_secs),
            self.completed_sets,
            self.total_sets
        );
        if let Some(error) = &self.error {
            line.push_str(&format!(" error: {}", error));
        }
        if let Some(id) = &self.record_id {
            line.push_str(&format!(" record: {}", id));
        }
        line
    }
}
