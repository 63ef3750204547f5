//! Queue event types shared between the core and the engine.
//!
//! A [`QueueEvent`] is one deferred effect: scheduled at an *absolute*
//! simulation frame (never relative), ordered within a frame by a priority
//! tier, dispatched by its [`EventType`], and optionally tagged with the
//! owning action for bulk cancellation. Payloads are [`serde_json::Value`]
//! so effect data of any shape travels through the same queue.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// Identifier of one combatant in a simulation instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EventId
// ---------------------------------------------------------------------------

/// Unique identifier of one queued event. Collisions are rejected by the
/// queue -- an id never refers to two events.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EventPriority
// ---------------------------------------------------------------------------

/// Ordering tier for events scheduled on the same frame.
///
/// Declaration order doubles as dispatch order: `Critical` sorts first.
/// Ties within a tier fall back to insertion order (pinned by the queue's
/// sequence number).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum EventPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Discriminates which handler an event is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    BuffApplied,
    BuffPeriodic,
    BuffRemoved,
    StatusApplied,
    StatusRemoved,
    Damage,
    Heal,
    /// Extension point for handlers registered by the host.
    Custom(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::BuffApplied => write!(f, "buff_applied"),
            EventType::BuffPeriodic => write!(f, "buff_periodic_effect"),
            EventType::BuffRemoved => write!(f, "buff_removed"),
            EventType::StatusApplied => write!(f, "status_effect_applied"),
            EventType::StatusRemoved => write!(f, "status_effect_removed"),
            EventType::Damage => write!(f, "damage"),
            EventType::Heal => write!(f, "heal"),
            EventType::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionTag
// ---------------------------------------------------------------------------

/// Links queued events to the in-progress member action that produced them.
///
/// Interrupting that action removes every not-yet-processed event sharing
/// its tag; already-processed effects are never undone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionTag(pub String);

impl ActionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// One deferred effect owned by the event queue.
///
/// `execute_frame` is an absolute simulation frame number. An event becomes
/// visible to the scheduler once `current_frame >= execute_frame`; after
/// dispatch it is marked processed and later purged -- it never re-fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub id: EventId,
    pub execute_frame: u64,
    pub priority: EventPriority,
    pub event_type: EventType,
    pub target: MemberId,
    pub payload: serde_json::Value,
    pub action_tag: Option<ActionTag>,
}

impl QueueEvent {
    /// A normal-priority, untagged event.
    pub fn new(
        id: EventId,
        execute_frame: u64,
        event_type: EventType,
        target: MemberId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            execute_frame,
            priority: EventPriority::Normal,
            event_type,
            target,
            payload,
            action_tag: None,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: ActionTag) -> Self {
        self.action_tag = Some(tag);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
