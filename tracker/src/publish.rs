//! Completion and publication
//!
//! A finished session is serialized once, at completion, into an unsigned
//! workout record. Retries hand the very same record to the signer, so every
//! attempt carries identical logical content and the same canonical id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use powr_common::{Record, Tag, UnsignedRecord, WORKOUT_RECORD_KIND};
use tokio::io::AsyncWriteExt;

use crate::error::PublishFailure;
use crate::model::WorkoutSession;

/// Signing capability: signs the record and broadcasts it
///
/// Returns the opaque id of the published record.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_and_broadcast(&self, record: &UnsignedRecord) -> Result<String, PublishFailure>;
}

/// Render a number without a trailing `.0` for whole values
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Serialize a finished session into a workout record
///
/// Tag order is fixed: `d`, `title`, `type`, `start`, `end`, `completed`,
/// optional `template`, then one `exercise` tuple per completed set ordered
/// by slot index and set number:
/// `["exercise", <ref>, <relay>, <weight>, <reps>, <rpe>, <set_type>, <set_number>]`.
pub fn build_record(session: &WorkoutSession, end_time: DateTime<Utc>) -> UnsignedRecord {
    let mut record = UnsignedRecord::new(WORKOUT_RECORD_KIND, &session.author, end_time.timestamp())
        .with_tag(Tag::new(["d", session.workout_id.as_str()]))
        .with_tag(Tag::new(["title", session.title.as_str()]))
        .with_tag(Tag::new(["type", "strength"]))
        .with_tag(Tag::new(["start".to_string(), session.start_time.timestamp().to_string()]))
        .with_tag(Tag::new(["end".to_string(), end_time.timestamp().to_string()]))
        .with_tag(Tag::new(["completed", "true"]));

    if let Some(template) = &session.template {
        record = record.with_tag(Tag::new(["template".to_string(), template.to_string(), String::new()]));
    }

    for set in session.completed_sets.iter() {
        // Indices are kept in range by the mutation engine
        let Some(slot) = session.exercise(set.exercise_index) else {
            continue;
        };
        record = record.with_tag(Tag::new([
            "exercise".to_string(),
            slot.exercise_ref.to_string(),
            String::new(),
            format_number(set.weight),
            set.reps.to_string(),
            set.rpe.map(format_number).unwrap_or_default(),
            set.set_type.as_str().to_string(),
            set.set_number.to_string(),
        ]));
    }

    record
}

/// Local signer that appends records to a JSON-lines outbox file
///
/// Stands in for relay broadcast when running offline; the returned id is
/// the record's canonical id.
pub struct OutboxSigner {
    path: PathBuf,
}

impl OutboxSigner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Signer for OutboxSigner {
    async fn sign_and_broadcast(&self, record: &UnsignedRecord) -> Result<String, PublishFailure> {
        if record.tags.is_empty() {
            return Err(PublishFailure::Validation("record has no tags".to_string()));
        }

        let stored = Record::from_unsigned(record.clone());
        let mut line = serde_json::to_string(&stored)
            .map_err(|e| PublishFailure::Validation(e.to_string()))?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PublishFailure::Network(e.to_string()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PublishFailure::Network(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PublishFailure::Network(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PublishFailure::Network(e.to_string()))?;

        tracing::info!(id = %stored.id, path = %self.path.display(), "Record written to outbox");
        Ok(stored.id)
    }
}
