//! Workout setup resolution
//!
//! Turns a template address into a `ResolvedTemplate` by fetching the
//! template record and every exercise it references, then seeds the
//! session the machine will own.
//!
//! Template exercise tags have the layout
//! `["exercise", <address>, <relay>, <weight>, <reps>, <rpe>, <set_type>, <sets>]`
//! with empty strings for absent optional values.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use powr_common::{Address, Record, Tag, UnsignedRecord, EXERCISE_KIND, TEMPLATE_KIND};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::ResolutionError;
use crate::model::{
    CompletedSets, ExerciseSlot, ResolvedTemplate, SetType, TemplateExercise, WorkoutId,
    WorkoutSession,
};

/// Resolves a template address into concrete exercises
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn resolve(&self, template: &Address) -> Result<ResolvedTemplate, ResolutionError>;
}

/// Read access to the record store
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Latest record at an address, if any
    async fn fetch(&self, address: &Address) -> Result<Option<UnsignedRecord>, ResolutionError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Library file layout: `{ "records": [ ... ] }`
#[derive(Debug, Deserialize)]
struct LibraryFile {
    records: Vec<Record>,
}

/// Replaceable-record store held in memory
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<Address, UnsignedRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records; later `created_at` wins per address
    pub fn with_records(records: impl IntoIterator<Item = UnsignedRecord>) -> Self {
        let mut map: HashMap<Address, UnsignedRecord> = HashMap::new();
        for record in records {
            insert_latest(&mut map, record);
        }
        Self {
            records: RwLock::new(map),
        }
    }

    /// Load a JSON library file
    pub fn from_library_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read library at {}", path.display()))?;
        let library: LibraryFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse library at {}", path.display()))?;

        tracing::debug!(records = library.records.len(), "Loaded library");
        Ok(Self::with_records(library.records.into_iter().map(|r| r.body)))
    }

    /// Insert a record, replacing an older one at the same address
    pub async fn insert(&self, record: UnsignedRecord) {
        let mut records = self.records.write().await;
        insert_latest(&mut records, record);
    }

    /// Templates held by the store as (address, title), sorted by address
    pub async fn templates(&self) -> Vec<(Address, String)> {
        let records = self.records.read().await;
        let mut templates: Vec<_> = records
            .iter()
            .filter(|(address, _)| address.kind == TEMPLATE_KIND)
            .map(|(address, record)| {
                let title = record.tag_value("title").unwrap_or_default().to_string();
                (address.clone(), title)
            })
            .collect();
        templates.sort();
        templates
    }
}

fn insert_latest(map: &mut HashMap<Address, UnsignedRecord>, record: UnsignedRecord) {
    let Some(address) = record.address() else {
        tracing::warn!(kind = record.kind, "Skipping record without a 'd' tag");
        return;
    };
    match map.get(&address) {
        Some(existing) if existing.created_at > record.created_at => {}
        _ => {
            map.insert(address, record);
        }
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn fetch(&self, address: &Address) -> Result<Option<UnsignedRecord>, ResolutionError> {
        Ok(self.records.read().await.get(address).cloned())
    }
}

// ============================================================================
// Store-backed resolver
// ============================================================================

/// Resolver that reads templates and exercises from an `EventStore`
pub struct StoreResolver<S> {
    store: Arc<S>,
}

impl<S: EventStore> StoreResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn malformed(tag: &Tag, reason: impl std::fmt::Display) -> ResolutionError {
    ResolutionError::Malformed(format!("{:?}: {}", tag.0, reason))
}

fn parse_optional<T: std::str::FromStr>(tag: &Tag, index: usize) -> Result<Option<T>, ResolutionError>
where
    T::Err: std::fmt::Display,
{
    tag.non_empty(index)
        .map(|raw| raw.parse::<T>().map_err(|e| malformed(tag, e)))
        .transpose()
}

/// Parse one prescribed exercise out of a template tag; `name` is filled
/// in later from the exercise definition
pub fn parse_template_exercise(tag: &Tag) -> Result<TemplateExercise, ResolutionError> {
    let exercise_ref: Address = tag
        .non_empty(1)
        .ok_or_else(|| malformed(tag, "missing exercise address"))?
        .parse()
        .map_err(|e| malformed(tag, e))?;
    if exercise_ref.kind != EXERCISE_KIND {
        return Err(malformed(tag, format!("kind {} is not an exercise", exercise_ref.kind)));
    }

    let reps: u32 = parse_optional(tag, 4)?.ok_or_else(|| malformed(tag, "missing reps"))?;

    let exercise = TemplateExercise {
        exercise_ref,
        name: String::new(),
        sets: parse_optional(tag, 7)?.unwrap_or(1),
        reps,
        weight: parse_optional(tag, 3)?,
        rpe: parse_optional(tag, 5)?,
        set_type: parse_optional::<SetType>(tag, 6)?,
    };
    exercise.validate().map_err(|e| malformed(tag, e))?;
    Ok(exercise)
}

fn check_kind(record: &UnsignedRecord, kind: u32) -> Result<(), ResolutionError> {
    record
        .expect_kind(kind)
        .map_err(|e| ResolutionError::Malformed(e.to_string()))
}

#[async_trait]
impl<S: EventStore> TemplateResolver for StoreResolver<S> {
    async fn resolve(&self, template: &Address) -> Result<ResolvedTemplate, ResolutionError> {
        if template.kind != TEMPLATE_KIND {
            return Err(ResolutionError::Malformed(format!(
                "{} is not a template address",
                template
            )));
        }

        let record = self
            .store
            .fetch(template)
            .await?
            .ok_or_else(|| ResolutionError::TemplateNotFound(template.to_string()))?;
        check_kind(&record, TEMPLATE_KIND)?;

        let name = record
            .tag_value("title")
            .filter(|t| !t.is_empty())
            .unwrap_or(template.identifier.as_str())
            .to_string();

        let mut exercises = Vec::new();
        for tag in record.tags_named("exercise") {
            let mut exercise = parse_template_exercise(tag)?;

            let definition = self
                .store
                .fetch(&exercise.exercise_ref)
                .await?
                .ok_or_else(|| ResolutionError::ExerciseNotFound(exercise.exercise_ref.to_string()))?;
            check_kind(&definition, EXERCISE_KIND)?;
            exercise.name = definition
                .tag_value("title")
                .unwrap_or(exercise.exercise_ref.identifier.as_str())
                .to_string();

            exercises.push(exercise);
        }

        tracing::debug!(template = %template, exercises = exercises.len(), "Resolved template");
        Ok(ResolvedTemplate {
            address: template.clone(),
            name,
            exercises,
        })
    }
}

/// Build the session the machine starts with once resolution succeeds
pub fn seed_session(
    workout_id: WorkoutId,
    author: &str,
    template: &ResolvedTemplate,
    start_time: DateTime<Utc>,
) -> WorkoutSession {
    let mut session = WorkoutSession {
        workout_id,
        title: template.name.clone(),
        template: Some(template.address.clone()),
        author: author.to_string(),
        start_time,
        pause_intervals: Vec::new(),
        exercises: template.exercises.iter().map(ExerciseSlot::from).collect(),
        completed_sets: CompletedSets::new(),
        extra_sets_requested: Default::default(),
        position: None,
    };
    session.position = session.default_position();
    session
}
