//! Session data model
//!
//! `WorkoutSession` is the aggregate root of one in-progress workout. Slot
//! indices are the addressing key for every set-level event, so anything
//! that reorders `exercises` must move `completed_sets` with it (see
//! `mutation`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use powr_common::Address;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::timer::PauseInterval;

/// Reference to an exercise definition (`33401:pubkey:identifier`)
pub type ExerciseRef = Address;

/// Opaque unique identifier of a workout session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkoutId(pub String);

impl WorkoutId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error type for parsing SetType from string
#[derive(Debug, Clone)]
pub struct ParseSetTypeError(String);

impl fmt::Display for ParseSetTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid set type: {}", self.0)
    }
}

impl std::error::Error for ParseSetTypeError {}

/// Kind of set performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetType {
    Warmup,
    #[default]
    Normal,
    Drop,
    Failure,
}

impl SetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::Warmup => "warmup",
            SetType::Normal => "normal",
            SetType::Drop => "drop",
            SetType::Failure => "failure",
        }
    }

    /// Whether the set counts toward working volume
    pub fn is_working(&self) -> bool {
        !matches!(self, SetType::Warmup)
    }
}

impl FromStr for SetType {
    type Err = ParseSetTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warmup" => Ok(SetType::Warmup),
            "normal" => Ok(SetType::Normal),
            "drop" => Ok(SetType::Drop),
            "failure" => Ok(SetType::Failure),
            _ => Err(ParseSetTypeError(s.to_string())),
        }
    }
}

/// Upper bound on set rows per slot, prescribed and added
pub const MAX_SETS_PER_EXERCISE: u32 = 100;

/// One prescribed exercise of a resolved template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExercise {
    pub exercise_ref: ExerciseRef,
    #[serde(default)]
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub rpe: Option<f64>,
    #[serde(default)]
    pub set_type: Option<SetType>,
}

impl TemplateExercise {
    /// Prescription checks shared by template resolution and exercise events
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sets == 0 || self.sets > MAX_SETS_PER_EXERCISE {
            return Err(ValidationError::SetsOutOfRange {
                sets: self.sets,
                max: MAX_SETS_PER_EXERCISE,
            });
        }
        if self.reps == 0 {
            return Err(ValidationError::ZeroReps);
        }
        if let Some(weight) = self.weight {
            if !weight.is_finite() {
                return Err(ValidationError::NonFiniteWeight(weight));
            }
        }
        if let Some(rpe) = self.rpe {
            if !(1.0..=10.0).contains(&rpe) {
                return Err(ValidationError::RpeOutOfRange(rpe));
            }
        }
        Ok(())
    }
}

/// A template with every exercise dependency resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTemplate {
    pub address: Address,
    pub name: String,
    pub exercises: Vec<TemplateExercise>,
}

/// One exercise's position within a session
///
/// Prescribed values are the historical record of intent and are never
/// edited once the session starts; substitution replaces the whole slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSlot {
    pub exercise_ref: ExerciseRef,
    pub name: String,
    pub prescribed_sets: u32,
    pub prescribed_reps: u32,
    pub prescribed_weight: Option<f64>,
    pub prescribed_rpe: Option<f64>,
    pub prescribed_set_type: SetType,
}

impl From<&TemplateExercise> for ExerciseSlot {
    fn from(exercise: &TemplateExercise) -> Self {
        let name = if exercise.name.is_empty() {
            exercise.exercise_ref.identifier.clone()
        } else {
            exercise.name.clone()
        };

        Self {
            exercise_ref: exercise.exercise_ref.clone(),
            name,
            prescribed_sets: exercise.sets,
            prescribed_reps: exercise.reps,
            prescribed_weight: exercise.weight,
            prescribed_rpe: exercise.rpe,
            prescribed_set_type: exercise.set_type.unwrap_or_default(),
        }
    }
}

/// Payload of a set completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetData {
    /// Zero for bodyweight, negative for assisted variants
    #[serde(default)]
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub rpe: Option<f64>,
    #[serde(default)]
    pub set_type: SetType,
}

impl SetData {
    pub fn new(weight: f64, reps: u32) -> Self {
        Self {
            weight,
            reps,
            rpe: None,
            set_type: SetType::Normal,
        }
    }

    pub fn with_rpe(mut self, rpe: f64) -> Self {
        self.rpe = Some(rpe);
        self
    }

    pub fn with_set_type(mut self, set_type: SetType) -> Self {
        self.set_type = set_type;
        self
    }

    /// Reject payloads before they touch session state
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reps == 0 {
            return Err(ValidationError::ZeroReps);
        }
        if !self.weight.is_finite() {
            return Err(ValidationError::NonFiniteWeight(self.weight));
        }
        if let Some(rpe) = self.rpe {
            if !(1.0..=10.0).contains(&rpe) {
                return Err(ValidationError::RpeOutOfRange(rpe));
            }
        }
        Ok(())
    }
}

/// Key of a completed set: slot index plus 1-based set number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetKey {
    pub exercise_index: usize,
    pub set_number: u32,
}

impl SetKey {
    pub fn new(exercise_index: usize, set_number: u32) -> Self {
        Self {
            exercise_index,
            set_number,
        }
    }
}

/// An immutable fact: one set was performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSet {
    pub exercise_index: usize,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub rpe: Option<f64>,
    pub set_type: SetType,
    pub completed_at: DateTime<Utc>,
}

impl CompletedSet {
    pub fn key(&self) -> SetKey {
        SetKey::new(self.exercise_index, self.set_number)
    }
}

/// Completed sets keyed by (slot index, set number)
///
/// The map makes a duplicate key unrepresentable: completing the same key
/// again replaces the previous fact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CompletedSet>", into = "Vec<CompletedSet>")]
pub struct CompletedSets {
    sets: BTreeMap<SetKey, CompletedSet>,
}

impl CompletedSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the fact previously held at the key
    pub fn upsert(&mut self, set: CompletedSet) -> Option<CompletedSet> {
        self.sets.insert(set.key(), set)
    }

    pub fn remove(&mut self, key: SetKey) -> Option<CompletedSet> {
        self.sets.remove(&key)
    }

    pub fn get(&self, key: SetKey) -> Option<&CompletedSet> {
        self.sets.get(&key)
    }

    pub fn contains(&self, key: SetKey) -> bool {
        self.sets.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// All sets ordered by slot index, then set number
    pub fn iter(&self) -> impl Iterator<Item = &CompletedSet> {
        self.sets.values()
    }

    /// Sets of one slot, ordered by set number
    pub fn for_exercise(&self, exercise_index: usize) -> impl Iterator<Item = &CompletedSet> {
        self.sets
            .range(SetKey::new(exercise_index, 0)..=SetKey::new(exercise_index, u32::MAX))
            .map(|(_, set)| set)
    }

    pub fn count_for(&self, exercise_index: usize) -> usize {
        self.for_exercise(exercise_index).count()
    }

    pub fn max_set_number(&self, exercise_index: usize) -> u32 {
        self.for_exercise(exercise_index)
            .map(|s| s.set_number)
            .max()
            .unwrap_or(0)
    }

    /// Re-address every set through `map`; `map` must be injective on the
    /// indices present, which all slot mutations guarantee.
    pub fn remap_indices(&mut self, map: impl Fn(usize) -> usize) {
        let sets = std::mem::take(&mut self.sets);
        self.sets = sets
            .into_values()
            .map(|mut set| {
                set.exercise_index = map(set.exercise_index);
                (set.key(), set)
            })
            .collect();
    }
}

impl From<Vec<CompletedSet>> for CompletedSets {
    fn from(sets: Vec<CompletedSet>) -> Self {
        Self {
            sets: sets.into_iter().map(|s| (s.key(), s)).collect(),
        }
    }
}

impl From<CompletedSets> for Vec<CompletedSet> {
    fn from(sets: CompletedSets) -> Self {
        sets.sets.into_values().collect()
    }
}

/// Where the user currently is within the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Position {
    /// A specific set row
    Set { exercise_index: usize, set_number: u32 },
    /// The "add set" affordance below a fully completed exercise
    AddSet { exercise_index: usize },
}

impl Position {
    pub fn exercise_index(&self) -> usize {
        match self {
            Position::Set { exercise_index, .. } | Position::AddSet { exercise_index } => {
                *exercise_index
            }
        }
    }

    /// Same position under a slot re-indexing
    pub fn remap(self, map: impl Fn(usize) -> usize) -> Self {
        match self {
            Position::Set {
                exercise_index,
                set_number,
            } => Position::Set {
                exercise_index: map(exercise_index),
                set_number,
            },
            Position::AddSet { exercise_index } => Position::AddSet {
                exercise_index: map(exercise_index),
            },
        }
    }
}

/// Aggregate root for one in-progress workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub workout_id: WorkoutId,
    pub title: String,
    /// Template the session was started from
    pub template: Option<Address>,
    /// Public key of the signing identity
    pub author: String,
    pub start_time: DateTime<Utc>,
    pub pause_intervals: Vec<PauseInterval>,
    pub exercises: Vec<ExerciseSlot>,
    pub completed_sets: CompletedSets,
    #[serde(default)]
    pub extra_sets_requested: BTreeMap<ExerciseRef, u32>,
    /// `None` only while the session has no exercises
    pub position: Option<Position>,
}

impl WorkoutSession {
    pub fn exercise(&self, index: usize) -> Option<&ExerciseSlot> {
        self.exercises.get(index)
    }

    /// Whether the last pause interval is still open
    pub fn is_paused(&self) -> bool {
        crate::timer::open_pause(&self.pause_intervals).is_some()
    }

    /// Number of set rows for a slot: prescribed plus user-added, never
    /// fewer than the highest completed set number.
    pub fn set_count(&self, index: usize) -> u32 {
        let Some(slot) = self.exercises.get(index) else {
            return 0;
        };
        let extra = self
            .extra_sets_requested
            .get(&slot.exercise_ref)
            .copied()
            .unwrap_or(0);
        slot.prescribed_sets
            .saturating_add(extra)
            .max(self.completed_sets.max_set_number(index))
    }

    pub fn is_set_completed(&self, index: usize, set_number: u32) -> bool {
        self.completed_sets.contains(SetKey::new(index, set_number))
    }

    pub fn total_set_count(&self) -> u32 {
        (0..self.exercises.len()).map(|i| self.set_count(i)).sum()
    }

    /// First incomplete set of a slot
    pub fn first_incomplete_set(&self, index: usize) -> Option<u32> {
        (1..=self.set_count(index)).find(|n| !self.is_set_completed(index, *n))
    }

    /// Position to land on when opening a slot
    pub fn position_for_exercise(&self, index: usize) -> Position {
        match self.first_incomplete_set(index) {
            Some(set_number) => Position::Set {
                exercise_index: index,
                set_number,
            },
            None => Position::AddSet {
                exercise_index: index,
            },
        }
    }

    /// Position after completing `set_number`: the next incomplete set of
    /// the same slot (searching forward first), else its add-set affordance.
    pub fn position_after(&self, index: usize, set_number: u32) -> Position {
        let count = self.set_count(index);
        let forward = (set_number.saturating_add(1)..=count).find(|n| !self.is_set_completed(index, *n));

        match forward.or_else(|| self.first_incomplete_set(index)) {
            Some(next) => Position::Set {
                exercise_index: index,
                set_number: next,
            },
            None => Position::AddSet {
                exercise_index: index,
            },
        }
    }

    /// Position after the slot list changed shape
    pub fn default_position(&self) -> Option<Position> {
        if self.exercises.is_empty() {
            None
        } else {
            Some(self.position_for_exercise(0))
        }
    }
}
