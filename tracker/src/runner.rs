//! Session runner
//!
//! Channel-based actor that owns one `WorkoutMachine`. It is the single
//! writer of the session: user intents arrive through `SessionHandle`,
//! effect completions through an internal channel, and both are applied one
//! at a time in arrival order. Effects run as spawned tasks under a timeout
//! so the machine never waits on I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use powr_common::Address;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{MachineError, PublishFailure, ResolutionError};
use crate::events::{NoticeSender, WorkoutEvent};
use crate::machine::{Effect, MachineConfig, Transition, WorkoutMachine};
use crate::model::WorkoutSession;
use crate::publish::Signer;
use crate::resolver::TemplateResolver;
use crate::snapshot::{SessionSnapshot, SnapshotError};
use crate::view::WorkoutView;

// =============================================================================
// Clocks
// =============================================================================

/// Source of wall-clock time for the machine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Configuration and errors
// =============================================================================

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub resolve_timeout: Duration,
    pub publish_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(15),
            publish_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("{0} is produced by the runner and cannot be sent by callers")]
    InternalEvent(&'static str),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Session runner has stopped")]
    Stopped,
}

// =============================================================================
// Requests and handle
// =============================================================================

enum SessionRequest {
    Send {
        event: WorkoutEvent,
        reply: oneshot::Sender<Result<Transition, MachineError>>,
    },
    View {
        reply: oneshot::Sender<WorkoutView>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<SessionSnapshot, SnapshotError>>,
    },
    Shutdown,
}

/// Handle for talking to a running session
///
/// Cheap to clone; the session stops once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionRequest>,
    views: watch::Receiver<WorkoutView>,
}

impl SessionHandle {
    /// Apply a user event and wait for the outcome
    pub async fn send(&self, event: WorkoutEvent) -> Result<Transition, RunnerError> {
        if event.is_internal() {
            return Err(RunnerError::InternalEvent(event.name()));
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionRequest::Send { event, reply: tx })
            .await
            .map_err(|_| RunnerError::Stopped)?;
        Ok(rx.await.map_err(|_| RunnerError::Stopped)??)
    }

    /// Fresh projection at the runner clock's current time
    pub async fn view(&self) -> Result<WorkoutView, RunnerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionRequest::View { reply: tx })
            .await
            .map_err(|_| RunnerError::Stopped)?;
        rx.await.map_err(|_| RunnerError::Stopped)
    }

    /// Capture the session for later `resume`
    pub async fn snapshot(&self) -> Result<SessionSnapshot, RunnerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionRequest::Snapshot { reply: tx })
            .await
            .map_err(|_| RunnerError::Stopped)?;
        Ok(rx.await.map_err(|_| RunnerError::Stopped)??)
    }

    /// Views published after every state change
    pub fn subscribe(&self) -> watch::Receiver<WorkoutView> {
        self.views.clone()
    }

    /// Wait until a published view satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&WorkoutView) -> bool,
    ) -> Result<WorkoutView, RunnerError> {
        let mut views = self.views.clone();
        let view = views.wait_for(predicate).await.map_err(|_| RunnerError::Stopped)?;
        Ok(view.clone())
    }

    /// Wait until no resolution or publication is outstanding
    pub async fn settled(&self) -> Result<WorkoutView, RunnerError> {
        self.wait_for(|v| !v.is_pending()).await
    }

    pub async fn shutdown(&self) -> Result<(), RunnerError> {
        self.sender
            .send(SessionRequest::Shutdown)
            .await
            .map_err(|_| RunnerError::Stopped)
    }
}

// =============================================================================
// Runner (builder)
// =============================================================================

/// Builds and spawns a session actor
pub struct SessionRunner {
    resolver: Arc<dyn TemplateResolver>,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
    machine_config: MachineConfig,
    notices: NoticeSender,
}

impl SessionRunner {
    pub fn new(resolver: Arc<dyn TemplateResolver>, signer: Arc<dyn Signer>) -> Self {
        Self {
            resolver,
            signer,
            clock: Arc::new(SystemClock),
            config: RunnerConfig::default(),
            machine_config: MachineConfig::default(),
            notices: NoticeSender::none(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_machine_config(mut self, config: MachineConfig) -> Self {
        self.machine_config = config;
        self
    }

    pub fn with_notices(mut self, notices: NoticeSender) -> Self {
        self.notices = notices;
        self
    }

    /// Start a fresh session from a template
    pub fn start(self, template: Address, author: impl Into<String>) -> SessionHandle {
        let (machine, effect) = WorkoutMachine::start(template, author, self.machine_config.clone());
        self.spawn(machine, Some(effect))
    }

    /// Continue a previously saved session
    pub fn resume(self, session: WorkoutSession) -> SessionHandle {
        let machine = WorkoutMachine::restore(session, self.machine_config.clone());
        self.spawn(machine, None)
    }

    fn spawn(self, machine: WorkoutMachine, effect: Option<Effect>) -> SessionHandle {
        let (tx, rx) = mpsc::channel(32);
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let (views, views_rx) = watch::channel(WorkoutView::project(&machine, self.clock.now()));

        let mut actor = SessionActor {
            machine,
            resolver: self.resolver,
            signer: self.signer,
            clock: self.clock,
            config: self.config,
            notices: self.notices,
            completions,
            views,
        };
        if let Some(effect) = effect {
            actor.run_effect(effect);
        }

        tokio::spawn(async move {
            actor.run(rx, completions_rx).await;
        });

        SessionHandle {
            sender: tx,
            views: views_rx,
        }
    }
}

// =============================================================================
// Actor (internal)
// =============================================================================

struct SessionActor {
    machine: WorkoutMachine,
    resolver: Arc<dyn TemplateResolver>,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
    notices: NoticeSender,
    completions: mpsc::UnboundedSender<WorkoutEvent>,
    views: watch::Sender<WorkoutView>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<SessionRequest>,
        mut completions: mpsc::UnboundedReceiver<WorkoutEvent>,
    ) {
        tracing::debug!(workout = %self.machine.workout_id(), "Session runner started");

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    match request {
                        SessionRequest::Send { event, reply } => {
                            let _ = reply.send(self.apply(event));
                        }
                        SessionRequest::View { reply } => {
                            let _ = reply.send(WorkoutView::project(&self.machine, self.clock.now()));
                        }
                        SessionRequest::Snapshot { reply } => {
                            let _ = reply.send(SessionSnapshot::capture(&self.machine, self.clock.now()));
                        }
                        SessionRequest::Shutdown => break,
                    }
                }
                Some(event) = completions.recv() => self.complete(event),
            }
        }

        tracing::debug!(workout = %self.machine.workout_id(), phase = %self.machine.phase(), "Session runner stopped");
    }

    fn apply(&mut self, event: WorkoutEvent) -> Result<Transition, MachineError> {
        let name = event.name();
        match self.machine.send(event, self.clock.now()) {
            Ok(transition) => {
                if transition.from != transition.to {
                    self.notices.phase_changed(transition.from, transition.to);
                }
                if let Some(effect) = transition.effect.clone() {
                    self.run_effect(effect);
                }
                if transition.changed {
                    self.publish_view();
                }
                Ok(transition)
            }
            Err(e) => {
                self.notices.rejected(name, &e.to_string());
                Err(e)
            }
        }
    }

    /// Feed an effect outcome back into the machine
    fn complete(&mut self, event: WorkoutEvent) {
        let attempt = self.machine.attempts();
        let outcome = match &event {
            WorkoutEvent::PublishSucceeded { record_id } => Some(Ok(record_id.clone())),
            WorkoutEvent::PublishFailed { reason } => Some(Err(reason.to_string())),
            _ => None,
        };

        if self.apply(event).is_err() {
            // Outcome of work the session has since moved past
            return;
        }

        match outcome {
            Some(Ok(record_id)) => self.notices.published(&record_id),
            Some(Err(reason)) => {
                self.notices
                    .publish_failed(attempt, &reason, self.machine.retries_left())
            }
            None => {}
        }
    }

    fn publish_view(&self) {
        self.views
            .send_replace(WorkoutView::project(&self.machine, self.clock.now()));
    }

    fn run_effect(&self, effect: Effect) {
        let completions = self.completions.clone();
        match effect {
            Effect::ResolveTemplate { template } => {
                let resolver = self.resolver.clone();
                let limit = self.config.resolve_timeout;
                tracing::debug!(template = %template, "Resolving template");

                tokio::spawn(async move {
                    let event = match tokio::time::timeout(limit, resolver.resolve(&template)).await {
                        Ok(Ok(template)) => WorkoutEvent::TemplateResolved { template },
                        Ok(Err(error)) => WorkoutEvent::TemplateResolutionFailed { error },
                        Err(_) => WorkoutEvent::TemplateResolutionFailed {
                            error: ResolutionError::Timeout(limit.as_secs()),
                        },
                    };
                    let _ = completions.send(event);
                });
            }
            Effect::Publish { record, attempt } => {
                let signer = self.signer.clone();
                let limit = self.config.publish_timeout;
                self.notices.publish_attempt(attempt);
                tracing::debug!(attempt, "Publishing workout record");

                tokio::spawn(async move {
                    let event = match tokio::time::timeout(limit, signer.sign_and_broadcast(&record)).await {
                        Ok(Ok(record_id)) => WorkoutEvent::PublishSucceeded { record_id },
                        Ok(Err(reason)) => WorkoutEvent::PublishFailed { reason },
                        Err(_) => WorkoutEvent::PublishFailed {
                            reason: PublishFailure::Timeout(limit.as_secs()),
                        },
                    };
                    let _ = completions.send(event);
                });
            }
        }
    }
}
