//! Scripted sessions
//!
//! A script is a JSON array of steps, each advancing the clock and then
//! sending one event:
//!
//! ```json
//! [
//!   { "after_secs": 0,  "event": { "type": "COMPLETE_SET", "data": { "weight": 100, "reps": 5 } } },
//!   { "after_secs": 90, "event": { "type": "PAUSE_WORKOUT" } }
//! ]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::events::WorkoutEvent;
use crate::runner::{ManualClock, RunnerError, SessionHandle};
use crate::view::WorkoutView;

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    /// Seconds to advance the clock before sending
    #[serde(default)]
    pub after_secs: i64,
    pub event: WorkoutEvent,
}

/// Read a script file
pub fn load_script(path: &Path) -> anyhow::Result<Vec<ScriptStep>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script at {}", path.display()))?;
    let steps: Vec<ScriptStep> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse script at {}", path.display()))?;
    if steps.iter().any(|s| s.after_secs < 0) {
        anyhow::bail!("Script steps cannot move the clock backwards");
    }
    Ok(steps)
}

/// What happened to one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: usize,
    pub event: &'static str,
    /// Rejection message, if the event was refused
    pub rejected: Option<String>,
    pub view: WorkoutView,
}

/// Play `steps` against a running session
///
/// Rejected events are reported and the script carries on; only a stopped
/// runner ends it early.
pub async fn run_script(
    handle: &SessionHandle,
    clock: &ManualClock,
    steps: Vec<ScriptStep>,
) -> Result<Vec<StepOutcome>, RunnerError> {
    let mut outcomes = Vec::with_capacity(steps.len());

    for (index, step) in steps.into_iter().enumerate() {
        clock.advance(chrono::Duration::seconds(step.after_secs));
        let event = step.event.name();

        let rejected = match handle.send(step.event).await {
            Ok(_) => None,
            Err(RunnerError::Stopped) => return Err(RunnerError::Stopped),
            Err(e) => Some(e.to_string()),
        };

        handle.settled().await?;
        let view = handle.view().await?;
        tracing::debug!(step = index + 1, event, phase = %view.phase, "Script step applied");

        outcomes.push(StepOutcome {
            step: index + 1,
            event,
            rejected,
            view,
        });
    }

    Ok(outcomes)
}
