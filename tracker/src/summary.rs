//! Post-workout summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{WorkoutId, WorkoutSession};
use crate::timer;

/// Brzycki estimate of the one-rep max: weight × 36 / (37 - reps)
pub fn estimated_one_rep_max(weight: f64, reps: u32) -> f64 {
    match reps {
        0 => 0.0,
        1 => weight,
        r if r >= 37 => weight * 2.0,
        r => weight * (36.0 / (37.0 - r as f64)),
    }
}

/// Per-exercise totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSummary {
    pub exercise_index: usize,
    pub name: String,
    pub sets: usize,
    pub reps: u32,
    pub volume: f64,
    pub best_e1rm: Option<f64>,
}

/// Totals shown after a workout is completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub workout_id: WorkoutId,
    pub title: String,
    pub duration_secs: i64,
    pub total_sets: usize,
    pub total_reps: u32,
    /// Σ weight × reps over working sets; warmups excluded
    pub total_volume: f64,
    pub exercises: Vec<ExerciseSummary>,
}

/// Summarize a session finished at `end_time`
pub fn summarize(session: &WorkoutSession, end_time: DateTime<Utc>) -> WorkoutSummary {
    let exercises: Vec<ExerciseSummary> = session
        .exercises
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| {
            let sets: Vec<_> = session.completed_sets.for_exercise(index).collect();
            if sets.is_empty() {
                return None;
            }

            let working = sets.iter().filter(|s| s.set_type.is_working());
            let volume: f64 = working.clone().map(|s| s.weight * s.reps as f64).sum();
            let best_e1rm = working
                .filter(|s| s.weight > 0.0)
                .map(|s| estimated_one_rep_max(s.weight, s.reps))
                .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))));

            Some(ExerciseSummary {
                exercise_index: index,
                name: slot.name.clone(),
                sets: sets.len(),
                reps: sets.iter().map(|s| s.reps).sum(),
                volume,
                best_e1rm,
            })
        })
        .collect();

    WorkoutSummary {
        workout_id: session.workout_id.clone(),
        title: session.title.clone(),
        duration_secs: timer::elapsed_secs(session.start_time, &session.pause_intervals, end_time),
        total_sets: exercises.iter().map(|e| e.sets).sum(),
        total_reps: exercises.iter().map(|e| e.reps).sum(),
        total_volume: exercises.iter().map(|e| e.volume).sum(),
        exercises,
    }
}
