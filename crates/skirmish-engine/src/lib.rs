//! Skirmish Engine -- real-time, frame-stepped battle simulation.
//!
//! The engine is the time authority for one battle instance: a fixed-timestep
//! [`FrameLoop`](scheduler::FrameLoop) that accumulates scaled wall-clock
//! time, steps simulation frames, pulls due events from the frame-indexed
//! [`EventQueue`](queue::EventQueue), dispatches them to type-keyed handlers,
//! and advances every registered member. Buffs and status effects are
//! expanded by the [`EffectExecutor`](executor::EffectExecutor) into
//! pre-scheduled event sequences, so the whole effect timeline is
//! inspectable, replayable, and cancellable by action tag.
//!
//! One engine instance is one logical simulation thread: event dispatch,
//! member updates, and formula evaluation all run synchronously inside a
//! tick. Run battles in parallel by running instances in parallel, never by
//! sharing one.
//!
//! # Quick Start
//!
//! ```
//! use skirmish_engine::prelude::*;
//! use skirmish_core::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let mut engine = FrameLoop::new(SchedulerConfig::default(), 42);
//!
//! let slime = EntityDefinition {
//!     id: "slime".to_owned(),
//!     name: "Slime".to_owned(),
//!     kind: "monster".to_owned(),
//!     source_attributes: BTreeMap::from([("base_hp".to_owned(), 100.0)]),
//! };
//! let id = engine.register_member(slime, None).unwrap();
//!
//! engine.start().unwrap();
//! engine.enqueue_damage(id, 40, DamageType::Physical, MemberId(0)).unwrap();
//!
//! engine.pause().unwrap();
//! engine.step().unwrap();
//! assert_eq!(engine.member(id).unwrap().context.stats.hp, 60);
//! ```

#![deny(unsafe_code)]

pub mod executor;
pub mod handlers;
pub mod intent;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod scheduler;
pub mod snapshot;
pub mod telemetry;

use skirmish_core::event::{EventId, MemberId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by engine operations.
///
/// These are the fail-fast boundary errors. Dispatch and member-update
/// failures inside a tick are recorded in telemetry and logged, never
/// propagated -- a running battle degrades instead of freezing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An event id collided with an already-queued event.
    #[error("event {id} is already queued")]
    DuplicateEventId { id: EventId },

    /// The event id does not name a queued event.
    #[error("event {id} is not queued")]
    UnknownEvent { id: EventId },

    /// The member id does not name a registered member.
    #[error("member {id} is not registered")]
    UnknownMember { id: MemberId },

    /// The member id is already registered.
    #[error("member {id} is already registered")]
    DuplicateMember { id: MemberId },

    /// The loop is not in a state that permits the requested operation.
    #[error("cannot {operation} while {state}")]
    InvalidLoopState {
        operation: &'static str,
        state: &'static str,
    },

    /// A handler failed while processing an event.
    #[error("handler for '{event_type}' failed: {details}")]
    Handler {
        event_type: String,
        details: String,
    },

    #[error(transparent)]
    Core(#[from] skirmish_core::CoreError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::executor::{EffectExecutor, ExpressionOutcome};
    pub use crate::intent::{Intent, IntentAction};
    pub use crate::queue::EventQueue;
    pub use crate::registry::MemberRegistry;
    pub use crate::replay::{
        replay, ReplayDivergence, ReplayEntry, ReplayLog, ReplayRecorder, ReplayResult,
    };
    pub use crate::scheduler::{
        DispatchContext, EventHandler, FrameLoop, HandlerOutcome, LoopState, SchedulerConfig,
    };
    pub use crate::snapshot::EngineSnapshot;
    pub use crate::telemetry::{FrameReport, FrameTelemetry, TelemetryStats};
    pub use crate::EngineError;
    pub use skirmish_core::prelude::*;
    pub use skirmish_expr::eval::NativeFn;
    pub use skirmish_expr::ExprError;
}
