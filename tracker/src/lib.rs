//! POWR active-workout engine
//!
//! Drives one workout session from template resolution through live
//! tracking to publication of an append-only workout record.
//!
//! # Architecture
//!
//! ```text
//! SessionHandle ──events──▶ SessionRunner (actor) ──▶ WorkoutMachine
//!       ▲                        │    ▲                   │
//!       │ watch<WorkoutView>     │    └── completions ◀── Effect
//!       └────────────────────────┘         (resolve / publish, with timeouts)
//! ```
//!
//! - `machine`: pure state machine; `send(event, now)` is the only write path
//! - `progress` / `mutation`: set completion and structural edits of a session
//! - `resolver`: template address → `ResolvedTemplate` via an `EventStore`
//! - `publish`: deterministic record serialization and the `Signer` seam
//! - `runner`: single-writer async actor interpreting machine effects

pub mod config;
pub mod error;
pub mod events;
pub mod machine;
pub mod model;
pub mod mutation;
pub mod progress;
pub mod publish;
pub mod resolver;
pub mod runner;
pub mod script;
pub mod snapshot;
pub mod summary;
pub mod timer;
pub mod view;

pub use config::{ConfigError, TrackerConfig};
pub use error::{MachineError, MutationError, PublishFailure, ResolutionError, ValidationError};
pub use events::{notice_channel, NoticeRx, NoticeSender, NoticeTx, SessionNotice, WorkoutEvent};
pub use machine::{
    Effect, FinishedSession, LifecyclePhase, MachineConfig, PublishResult, Transition,
    WorkoutMachine, WorkoutState,
};
pub use model::{
    CompletedSet, ExerciseRef, ExerciseSlot, Position, ResolvedTemplate, SetData, SetKey, SetType,
    TemplateExercise, WorkoutId, WorkoutSession,
};
pub use publish::{build_record, OutboxSigner, Signer};
pub use resolver::{EventStore, InMemoryStore, StoreResolver, TemplateResolver};
pub use runner::{Clock, ManualClock, RunnerConfig, RunnerError, SessionHandle, SessionRunner, SystemClock};
pub use snapshot::{SessionSnapshot, SnapshotError, SnapshotStore};
pub use summary::{ExerciseSummary, WorkoutSummary};
pub use view::WorkoutView;
