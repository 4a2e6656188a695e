//! Persistence of an in-progress session
//!
//! Only `active` and `paused` sessions are worth saving: anything earlier has
//! no data yet, anything later is already frozen into a record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::{LifecyclePhase, WorkoutMachine};
use crate::model::WorkoutSession;

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Cannot snapshot a session while {0}")]
    NotResumable(LifecyclePhase),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk form of a saved session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub session: WorkoutSession,
}

impl SessionSnapshot {
    pub fn capture(machine: &WorkoutMachine, saved_at: DateTime<Utc>) -> Result<Self, SnapshotError> {
        let phase = machine.phase();
        match (phase, machine.session()) {
            (LifecyclePhase::Active | LifecyclePhase::Paused, Some(session)) => Ok(Self {
                version: SNAPSHOT_VERSION,
                saved_at,
                session: session.clone(),
            }),
            _ => Err(SnapshotError::NotResumable(phase)),
        }
    }
}

/// A single snapshot file
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;

        // Readers never observe a partially written file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            workout = %snapshot.session.workout_id,
            path = %self.path.display(),
            "Session snapshot saved"
        );
        Ok(())
    }

    /// Load the saved session, if any
    pub async fn load(&self) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    /// Discard the saved session; returns whether one existed
    pub async fn clear(&self) -> Result<bool, SnapshotError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Session snapshot cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WorkoutEvent;
    use crate::machine::MachineConfig;
    use crate::model::fixtures::*;
    use crate::model::SetData;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_load_restore_paused() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("session.json"));

        let mut machine = WorkoutMachine::restore(session(vec![slot("squat", 3)]), MachineConfig::default());
        machine
            .send(WorkoutEvent::CompleteSet { data: SetData::new(100.0, 5) }, t0() + Duration::minutes(2))
            .unwrap();
        machine
            .send(WorkoutEvent::PauseWorkout, t0() + Duration::minutes(3))
            .unwrap();

        let snapshot = SessionSnapshot::capture(&machine, t0() + Duration::minutes(4)).unwrap();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let restored = WorkoutMachine::restore(loaded.session, MachineConfig::default());
        assert_eq!(restored.phase(), LifecyclePhase::Paused);
        assert_eq!(restored.session().unwrap().completed_sets.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_snapshot_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("none.json"));
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.clear().await.unwrap());

        let machine = WorkoutMachine::restore(session(vec![slot("squat", 3)]), MachineConfig::default());
        store
            .save(&SessionSnapshot::capture(&machine, t0()).unwrap())
            .await
            .unwrap();
        assert!(store.clear().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_finished_sessions_are_not_captured() {
        let mut machine = WorkoutMachine::restore(session(vec![slot("squat", 1)]), MachineConfig::default());
        machine
            .send(WorkoutEvent::CompleteSet { data: SetData::new(100.0, 5) }, t0())
            .unwrap();
        machine.send(WorkoutEvent::CompleteWorkout, t0()).unwrap();

        assert!(matches!(
            SessionSnapshot::capture(&machine, t0()),
            Err(SnapshotError::NotResumable(LifecyclePhase::Publishing))
        ));
    }
}
