//! Active workout state machine
//!
//! ```text
//! loadingTemplate ──resolved──▶ active ⇄ paused
//!       │  ▲                      │        │
//!   failed │ retry          COMPLETE_WORKOUT (needs ≥1 set)
//!       ▼  │                      ▼
//! templateError             publishing ──ok──▶ showingSummary ──dismiss──▶ final
//!                             │   ▲      └──ok (no summary)──────────────▶ final
//!                       failed│   │retry (attempts < max)
//!                             ▼   │
//!                             error ──return──▶ paused
//!
//! CANCEL_WORKOUT: loadingTemplate | templateError | active | paused | error ──▶ cancelled
//! ```
//!
//! Each state carries exactly the data that exists in it. Async work
//! (resolution, publication) is requested through an `Effect` and its
//! outcome comes back as an ordinary event, so the machine is always in a
//! well-defined state while work is outstanding. Rejected events return an
//! error and leave the state untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use powr_common::{Address, UnsignedRecord};
use serde::{Deserialize, Serialize};

use crate::error::{MachineError, PublishFailure, ResolutionError, ValidationError};
use crate::events::WorkoutEvent;
use crate::model::{ExerciseSlot, WorkoutId, WorkoutSession};
use crate::summary::{self, WorkoutSummary};
use crate::{mutation, progress, publish, resolver, timer};

/// Default ceiling on publish attempts
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// Tag of the machine's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecyclePhase {
    LoadingTemplate,
    TemplateError,
    Active,
    Paused,
    Publishing,
    Error,
    ShowingSummary,
    Final,
    Cancelled,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::LoadingTemplate => "loadingTemplate",
            LifecyclePhase::TemplateError => "templateError",
            LifecyclePhase::Active => "active",
            LifecyclePhase::Paused => "paused",
            LifecyclePhase::Publishing => "publishing",
            LifecyclePhase::Error => "error",
            LifecyclePhase::ShowingSummary => "showingSummary",
            LifecyclePhase::Final => "final",
            LifecyclePhase::Cancelled => "cancelled",
        }
    }

    /// No event changes session data in these phases
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::ShowingSummary | LifecyclePhase::Final | LifecyclePhase::Cancelled
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioural knobs of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub max_publish_attempts: u32,
    /// Go to `showingSummary` after a successful publish instead of `final`
    pub show_summary: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_publish_attempts: DEFAULT_MAX_PUBLISH_ATTEMPTS,
            show_summary: true,
        }
    }
}

/// Identity of a session before its template is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
    pub workout_id: WorkoutId,
    pub template: Address,
    pub author: String,
}

/// A session frozen at completion, with the record built from it
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    pub session: WorkoutSession,
    pub end_time: DateTime<Utc>,
    pub record: UnsignedRecord,
    pub summary: WorkoutSummary,
}

/// Outcome stored once publication has settled
#[derive(Debug, Clone, PartialEq)]
pub enum PublishResult {
    Published { record_id: String },
    Failed { reason: PublishFailure, attempts: u32 },
}

/// The machine's state, one variant per lifecycle phase
#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutState {
    LoadingTemplate {
        seed: SessionSeed,
        attempt: u32,
    },
    TemplateError {
        seed: SessionSeed,
        attempts: u32,
        error: ResolutionError,
    },
    Active(WorkoutSession),
    Paused(WorkoutSession),
    Publishing {
        finished: FinishedSession,
        attempt: u32,
    },
    Error {
        finished: FinishedSession,
        attempts: u32,
        reason: PublishFailure,
    },
    ShowingSummary {
        finished: FinishedSession,
        record_id: String,
    },
    Final {
        finished: FinishedSession,
        record_id: String,
    },
    Cancelled,
}

impl WorkoutState {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            WorkoutState::LoadingTemplate { .. } => LifecyclePhase::LoadingTemplate,
            WorkoutState::TemplateError { .. } => LifecyclePhase::TemplateError,
            WorkoutState::Active(_) => LifecyclePhase::Active,
            WorkoutState::Paused(_) => LifecyclePhase::Paused,
            WorkoutState::Publishing { .. } => LifecyclePhase::Publishing,
            WorkoutState::Error { .. } => LifecyclePhase::Error,
            WorkoutState::ShowingSummary { .. } => LifecyclePhase::ShowingSummary,
            WorkoutState::Final { .. } => LifecyclePhase::Final,
            WorkoutState::Cancelled => LifecyclePhase::Cancelled,
        }
    }
}

/// Async work the owner of the machine must perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Resolve the template, then send `TemplateResolved` or
    /// `TemplateResolutionFailed`
    ResolveTemplate { template: Address },
    /// Sign and broadcast the record, then send `PublishSucceeded` or
    /// `PublishFailed`
    Publish { record: UnsignedRecord, attempt: u32 },
}

/// Result of an accepted event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
    /// Whether the state changed at all
    pub changed: bool,
    pub effect: Option<Effect>,
}

/// Owns one workout session and applies events to it
#[derive(Debug, Clone)]
pub struct WorkoutMachine {
    workout_id: WorkoutId,
    state: WorkoutState,
    config: MachineConfig,
}

impl WorkoutMachine {
    /// Start a session from a template; the returned effect must be run
    pub fn start(template: Address, author: impl Into<String>, config: MachineConfig) -> (Self, Effect) {
        let seed = SessionSeed {
            workout_id: WorkoutId::generate(),
            template: template.clone(),
            author: author.into(),
        };
        let machine = Self {
            workout_id: seed.workout_id.clone(),
            state: WorkoutState::LoadingTemplate { seed, attempt: 1 },
            config,
        };
        (machine, Effect::ResolveTemplate { template })
    }

    /// Re-open a saved in-progress session
    ///
    /// Lands in `paused` if the last pause interval is open, else `active`.
    pub fn restore(session: WorkoutSession, config: MachineConfig) -> Self {
        let workout_id = session.workout_id.clone();
        let state = if session.is_paused() {
            WorkoutState::Paused(session)
        } else {
            WorkoutState::Active(session)
        };
        Self {
            workout_id,
            state,
            config,
        }
    }

    pub fn workout_id(&self) -> &WorkoutId {
        &self.workout_id
    }

    pub fn state(&self) -> &WorkoutState {
        &self.state
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state.phase()
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// The session, in every state that has one
    pub fn session(&self) -> Option<&WorkoutSession> {
        match &self.state {
            WorkoutState::Active(session) | WorkoutState::Paused(session) => Some(session),
            WorkoutState::Publishing { finished, .. }
            | WorkoutState::Error { finished, .. }
            | WorkoutState::ShowingSummary { finished, .. }
            | WorkoutState::Final { finished, .. } => Some(&finished.session),
            WorkoutState::LoadingTemplate { .. }
            | WorkoutState::TemplateError { .. }
            | WorkoutState::Cancelled => None,
        }
    }

    /// The frozen session, once completed
    pub fn finished(&self) -> Option<&FinishedSession> {
        match &self.state {
            WorkoutState::Publishing { finished, .. }
            | WorkoutState::Error { finished, .. }
            | WorkoutState::ShowingSummary { finished, .. }
            | WorkoutState::Final { finished, .. } => Some(finished),
            _ => None,
        }
    }

    /// Settled publication outcome
    pub fn publish_result(&self) -> Option<PublishResult> {
        match &self.state {
            WorkoutState::ShowingSummary { record_id, .. } | WorkoutState::Final { record_id, .. } => {
                Some(PublishResult::Published {
                    record_id: record_id.clone(),
                })
            }
            WorkoutState::Error {
                attempts, reason, ..
            } => Some(PublishResult::Failed {
                reason: reason.clone(),
                attempts: *attempts,
            }),
            _ => None,
        }
    }

    /// Attempts made so far for the outstanding operation
    pub fn attempts(&self) -> u32 {
        match &self.state {
            WorkoutState::LoadingTemplate { attempt, .. } | WorkoutState::Publishing { attempt, .. } => {
                *attempt
            }
            WorkoutState::TemplateError { attempts, .. } | WorkoutState::Error { attempts, .. } => {
                *attempts
            }
            _ => 0,
        }
    }

    /// Publish retries still available in the `error` state
    pub fn retries_left(&self) -> u32 {
        match &self.state {
            WorkoutState::Error { attempts, .. } => {
                self.config.max_publish_attempts.saturating_sub(*attempts)
            }
            _ => 0,
        }
    }

    /// Guard `canCompleteWorkout`
    pub fn can_complete(&self) -> bool {
        matches!(
            &self.state,
            WorkoutState::Active(s) | WorkoutState::Paused(s) if !s.completed_sets.is_empty()
        )
    }

    /// Guard `canRename`: open while no set is completed, including after
    /// every completed set has been undone
    pub fn can_rename(&self) -> bool {
        matches!(
            &self.state,
            WorkoutState::Active(s) | WorkoutState::Paused(s) if s.completed_sets.is_empty()
        )
    }

    /// Apply one event at wall-clock time `now`
    pub fn send(&mut self, event: WorkoutEvent, now: DateTime<Utc>) -> Result<Transition, MachineError> {
        let from = self.phase();
        let name = event.name();

        match self.dispatch(event, now) {
            Ok((changed, effect)) => {
                let to = self.phase();
                if from != to {
                    tracing::debug!(workout = %self.workout_id, event = name, %from, %to, "Transition");
                } else if changed {
                    tracing::trace!(workout = %self.workout_id, event = name, phase = %to, "Session updated");
                }
                Ok(Transition {
                    from,
                    to,
                    changed: changed || from != to,
                    effect,
                })
            }
            Err(e) => {
                tracing::warn!(workout = %self.workout_id, event = name, phase = %from, error = %e, "Event rejected");
                Err(e)
            }
        }
    }

    fn not_allowed(&self, event: &'static str) -> MachineError {
        MachineError::NotAllowed {
            event,
            phase: self.phase(),
        }
    }

    /// Move out of the current state, leaving a placeholder behind
    ///
    /// Callers must put a real state back before returning.
    fn take_state(&mut self) -> WorkoutState {
        std::mem::replace(&mut self.state, WorkoutState::Cancelled)
    }

    fn dispatch(
        &mut self,
        event: WorkoutEvent,
        now: DateTime<Utc>,
    ) -> Result<(bool, Option<Effect>), MachineError> {
        let name = event.name();
        match event {
            WorkoutEvent::TemplateResolved { template } => self.on_template_resolved(name, template, now),
            WorkoutEvent::TemplateResolutionFailed { error } => self.on_template_failed(name, error),
            WorkoutEvent::PauseWorkout => self.on_pause(name, now),
            WorkoutEvent::ResumeWorkout => self.on_resume(name, now),
            WorkoutEvent::RenameWorkout { title } => self.on_rename(name, title),
            WorkoutEvent::CompleteWorkout => self.on_complete(name, now),
            WorkoutEvent::PublishSucceeded { record_id } => self.on_published(name, record_id),
            WorkoutEvent::PublishFailed { reason } => self.on_publish_failed(name, reason),
            WorkoutEvent::RetryOperation => self.on_retry(name),
            WorkoutEvent::ReturnToWorkout => self.on_return(name),
            WorkoutEvent::CancelWorkout => self.on_cancel(name),
            WorkoutEvent::DismissSummary => self.on_dismiss(name),
            other => {
                let WorkoutState::Active(session) = &mut self.state else {
                    return Err(self.not_allowed(name));
                };
                apply_active(session, other, now).map(|changed| (changed, None))
            }
        }
    }

    fn on_template_resolved(
        &mut self,
        name: &'static str,
        template: crate::model::ResolvedTemplate,
        now: DateTime<Utc>,
    ) -> Result<(bool, Option<Effect>), MachineError> {
        let WorkoutState::LoadingTemplate { seed, .. } = &self.state else {
            return Err(self.not_allowed(name));
        };
        let session = resolver::seed_session(seed.workout_id.clone(), &seed.author, &template, now);
        tracing::info!(
            workout = %self.workout_id,
            title = %session.title,
            exercises = session.exercises.len(),
            "Workout started"
        );
        self.state = WorkoutState::Active(session);
        Ok((true, None))
    }

    fn on_template_failed(
        &mut self,
        name: &'static str,
        error: ResolutionError,
    ) -> Result<(bool, Option<Effect>), MachineError> {
        let WorkoutState::LoadingTemplate { seed, attempt } = &self.state else {
            return Err(self.not_allowed(name));
        };
        self.state = WorkoutState::TemplateError {
            seed: seed.clone(),
            attempts: *attempt,
            error,
        };
        Ok((true, None))
    }

    fn on_pause(&mut self, name: &'static str, now: DateTime<Utc>) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::Active(mut session) => {
                timer::pause(&mut session.pause_intervals, now);
                self.state = WorkoutState::Paused(session);
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_resume(&mut self, name: &'static str, now: DateTime<Utc>) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::Paused(mut session) => {
                timer::resume(&mut session.pause_intervals, now);
                self.state = WorkoutState::Active(session);
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_rename(&mut self, name: &'static str, title: String) -> Result<(bool, Option<Effect>), MachineError> {
        let can_rename = self.can_rename();
        let session = match &mut self.state {
            WorkoutState::Active(session) | WorkoutState::Paused(session) => session,
            _ => return Err(self.not_allowed(name)),
        };

        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        if !can_rename {
            return Err(MachineError::guard(
                "canRename",
                "the title is fixed once a set has been completed",
            ));
        }

        let changed = session.title != title;
        session.title = title.to_string();
        Ok((changed, None))
    }

    fn on_complete(&mut self, name: &'static str, now: DateTime<Utc>) -> Result<(bool, Option<Effect>), MachineError> {
        let mut session = match self.take_state() {
            WorkoutState::Active(session) | WorkoutState::Paused(session) if session.completed_sets.is_empty() => {
                let paused = session.is_paused();
                self.state = if paused {
                    WorkoutState::Paused(session)
                } else {
                    WorkoutState::Active(session)
                };
                return Err(MachineError::guard(
                    "canCompleteWorkout",
                    "complete at least one set first",
                ));
            }
            WorkoutState::Active(session) | WorkoutState::Paused(session) => session,
            other => {
                self.state = other;
                return Err(self.not_allowed(name));
            }
        };
        timer::resume(&mut session.pause_intervals, now);

        let record = publish::build_record(&session, now);
        let summary = summary::summarize(&session, now);
        tracing::info!(
            workout = %self.workout_id,
            sets = session.completed_sets.len(),
            duration_secs = summary.duration_secs,
            "Workout completed"
        );

        let effect = Effect::Publish {
            record: record.clone(),
            attempt: 1,
        };
        self.state = WorkoutState::Publishing {
            finished: FinishedSession {
                session,
                end_time: now,
                record,
                summary,
            },
            attempt: 1,
        };
        Ok((true, Some(effect)))
    }

    fn on_published(&mut self, name: &'static str, record_id: String) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::Publishing { finished, attempt } => {
                tracing::info!(workout = %self.workout_id, record = %record_id, attempt, "Workout published");
                self.state = if self.config.show_summary {
                    WorkoutState::ShowingSummary { finished, record_id }
                } else {
                    WorkoutState::Final { finished, record_id }
                };
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_publish_failed(
        &mut self,
        name: &'static str,
        reason: PublishFailure,
    ) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::Publishing { finished, attempt } => {
                if attempt >= self.config.max_publish_attempts {
                    tracing::error!(
                        workout = %self.workout_id,
                        attempts = attempt,
                        reason = %reason,
                        "Publishing failed; no retries left"
                    );
                } else {
                    tracing::warn!(workout = %self.workout_id, attempt, reason = %reason, "Publish attempt failed");
                }
                self.state = WorkoutState::Error {
                    finished,
                    attempts: attempt,
                    reason,
                };
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_retry(&mut self, name: &'static str) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::TemplateError { seed, attempts, .. } => {
                let effect = Effect::ResolveTemplate {
                    template: seed.template.clone(),
                };
                self.state = WorkoutState::LoadingTemplate {
                    seed,
                    attempt: attempts + 1,
                };
                Ok((true, Some(effect)))
            }
            WorkoutState::Error {
                finished,
                attempts,
                reason,
            } => {
                if attempts >= self.config.max_publish_attempts {
                    self.state = WorkoutState::Error {
                        finished,
                        attempts,
                        reason,
                    };
                    return Err(MachineError::RetriesExhausted { attempts });
                }
                let attempt = attempts + 1;
                let effect = Effect::Publish {
                    record: finished.record.clone(),
                    attempt,
                };
                self.state = WorkoutState::Publishing { finished, attempt };
                Ok((true, Some(effect)))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_return(&mut self, name: &'static str) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::Error { finished, .. } => {
                let FinishedSession {
                    mut session,
                    end_time,
                    ..
                } = finished;
                // Time spent publishing is not workout time
                timer::pause(&mut session.pause_intervals, end_time);
                self.state = WorkoutState::Paused(session);
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }

    fn on_cancel(&mut self, name: &'static str) -> Result<(bool, Option<Effect>), MachineError> {
        match self.state {
            WorkoutState::LoadingTemplate { .. }
            | WorkoutState::TemplateError { .. }
            | WorkoutState::Active(_)
            | WorkoutState::Paused(_)
            | WorkoutState::Error { .. } => {
                tracing::info!(workout = %self.workout_id, from = %self.phase(), "Workout cancelled");
                self.state = WorkoutState::Cancelled;
                Ok((true, None))
            }
            _ => Err(self.not_allowed(name)),
        }
    }

    fn on_dismiss(&mut self, name: &'static str) -> Result<(bool, Option<Effect>), MachineError> {
        match self.take_state() {
            WorkoutState::ShowingSummary { finished, record_id } => {
                self.state = WorkoutState::Final { finished, record_id };
                Ok((true, None))
            }
            other => {
                self.state = other;
                Err(self.not_allowed(name))
            }
        }
    }
}

/// Events that only apply to an `active` session
fn apply_active(
    session: &mut WorkoutSession,
    event: WorkoutEvent,
    now: DateTime<Utc>,
) -> Result<bool, MachineError> {
    match event {
        WorkoutEvent::CompleteSet { data } => {
            progress::complete_current_set(session, data, now)?;
            Ok(true)
        }
        WorkoutEvent::CompleteSpecificSet {
            exercise_index,
            set_number,
            data,
        } => {
            progress::complete_set(session, exercise_index, set_number, data, now)?;
            Ok(true)
        }
        WorkoutEvent::UncompleteSpecificSet {
            exercise_index,
            set_number,
        } => progress::uncomplete_set(session, exercise_index, set_number),
        WorkoutEvent::NavigateToExercise { exercise_index } => {
            progress::navigate_to_exercise(session, exercise_index)
        }
        WorkoutEvent::SelectSet {
            exercise_index,
            set_number,
        } => progress::select_set(session, exercise_index, set_number),
        WorkoutEvent::AddSet { exercise_index } => {
            mutation::add_set(session, exercise_index)?;
            Ok(true)
        }
        WorkoutEvent::AddExercises { exercises, at } => {
            for exercise in &exercises {
                exercise.validate()?;
            }
            let slots: Vec<ExerciseSlot> = exercises.iter().map(ExerciseSlot::from).collect();
            mutation::add_exercises(session, slots, at)?;
            Ok(true)
        }
        WorkoutEvent::RemoveExercise { exercise_index } => {
            mutation::remove_exercise(session, exercise_index)?;
            Ok(true)
        }
        WorkoutEvent::SubstituteExercise {
            exercise_index,
            exercise,
        } => {
            exercise.validate()?;
            mutation::substitute_exercise(session, exercise_index, ExerciseSlot::from(&exercise))?;
            Ok(true)
        }
        WorkoutEvent::MoveExerciseUp { exercise_index } => {
            Ok(mutation::move_exercise_up(session, exercise_index)?)
        }
        WorkoutEvent::MoveExerciseDown { exercise_index } => {
            Ok(mutation::move_exercise_down(session, exercise_index)?)
        }
        WorkoutEvent::TemplateResolved { .. }
        | WorkoutEvent::TemplateResolutionFailed { .. }
        | WorkoutEvent::PauseWorkout
        | WorkoutEvent::ResumeWorkout
        | WorkoutEvent::RenameWorkout { .. }
        | WorkoutEvent::CompleteWorkout
        | WorkoutEvent::PublishSucceeded { .. }
        | WorkoutEvent::PublishFailed { .. }
        | WorkoutEvent::RetryOperation
        | WorkoutEvent::ReturnToWorkout
        | WorkoutEvent::CancelWorkout
        | WorkoutEvent::DismissSummary => Err(MachineError::NotAllowed {
            event: event.name(),
            phase: LifecyclePhase::Active,
        }),
    }
}
