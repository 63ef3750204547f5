//! Skirmish Core -- battle domain model for the Skirmish engine.
//!
//! This crate holds the simulation-facing domain types: the layered attribute
//! model, member stats, the hierarchical member state machine, buff and
//! status-effect data definitions, queue event types, and the observer seam
//! the engine hooks into. It has no notion of frames-per-second or wall-clock
//! time -- scheduling lives in `skirmish-engine`.
//!
//! # Quick Start
//!
//! ```
//! use skirmish_core::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let definition = EntityDefinition {
//!     id: "slime".to_owned(),
//!     name: "Slime".to_owned(),
//!     kind: "monster".to_owned(),
//!     source_attributes: BTreeMap::from([("base_hp".to_owned(), 100.0)]),
//! };
//!
//! let mut member = Member::from_definition(MemberId(1), definition, None).unwrap();
//! assert!(member.state().is_alive());
//!
//! member.dispatch(
//!     &MemberEvent::Damage {
//!         amount: 100,
//!         damage_type: DamageType::Physical,
//!         source: MemberId(2),
//!     },
//!     &mut NoopObserver,
//! );
//! assert_eq!(member.state(), MemberState::Dead);
//! ```

#![deny(unsafe_code)]

pub mod attribute;
pub mod effect;
pub mod event;
pub mod kind;
pub mod member;
pub mod observer;
pub mod stats;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by domain-model operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An attribute was referenced that does not exist on the member.
    #[error("attribute '{name}' is not defined")]
    UndefinedAttribute { name: String },

    /// An entity definition names a kind with no registered behavior.
    #[error("unsupported entity kind '{kind}' (expected 'character' or 'monster')")]
    UnsupportedKind { kind: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::attribute::{AttrData, AttributeSet, BaseValue, Contribution, ModifierBucket};
    pub use crate::effect::{
        AttributeModifier, BuffData, ModifierOp, PeriodicEffect, PeriodicKind, StackMode,
        StackRule, StatusEffectData, StatusKind,
    };
    pub use crate::event::{ActionTag, EventId, EventPriority, EventType, MemberId, QueueEvent};
    pub use crate::kind::{EntityDefinition, EntityKind, KindBehavior, StatOverrides};
    pub use crate::member::{
        AliveState, DamageType, Member, MemberContext, MemberEvent, MemberEventKind, MemberState,
        TransitionOutcome,
    };
    pub use crate::observer::{NoopObserver, RecordingObserver, SimulationObserver};
    pub use crate::stats::{MemberStats, Position};
    pub use crate::CoreError;
}
