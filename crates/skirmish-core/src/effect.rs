//! Declarative buff and status-effect data.
//!
//! A buff's lifetime is never a live countdown object: the effect executor
//! expands it into a fixed sequence of scheduled queue events (apply now,
//! N periodic ticks, remove at `duration`). That makes every effect timeline
//! inspectable frame-by-frame, deterministically replayable, and cancellable
//! by dropping the tagged queue entries.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ModifierOp
// ---------------------------------------------------------------------------

/// How a buff modifier combines with the target attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierOp {
    /// Add `value` as a dynamic fixed contribution.
    Add,
    /// Multiply: `value` 1.1 becomes a +10% dynamic percentage contribution.
    Multiply,
    /// Force the dynamic total to `value` while the buff is active.
    Set,
}

// ---------------------------------------------------------------------------
// AttributeModifier
// ---------------------------------------------------------------------------

/// One attribute adjustment carried by a buff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModifier {
    pub attribute: String,
    pub value: f64,
    pub op: ModifierOp,
}

// ---------------------------------------------------------------------------
// PeriodicEffect
// ---------------------------------------------------------------------------

/// What a periodic tick of a buff does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicKind {
    Damage,
    Heal,
}

/// A recurring effect: every `interval` frames, evaluate `expression` and
/// enqueue the resulting damage or heal as a chained event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicEffect {
    /// Interval in frames between ticks. Must be nonzero.
    pub interval: u64,
    /// Formula producing the tick magnitude, evaluated at dispatch time.
    pub expression: String,
    pub kind: PeriodicKind,
}

// ---------------------------------------------------------------------------
// StackRule
// ---------------------------------------------------------------------------

/// How re-applying an already-active buff behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackMode {
    /// Drop the old application's modifiers, apply the new ones.
    Replace,
    /// Layer additional modifier contributions, up to `max_stacks`.
    Stack,
    /// Keep the modifiers, restart the timeline (old removal is cancelled).
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRule {
    pub mode: StackMode,
    pub max_stacks: u32,
}

impl Default for StackRule {
    fn default() -> Self {
        Self {
            mode: StackMode::Replace,
            max_stacks: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// BuffData
// ---------------------------------------------------------------------------

/// Declarative description of one buff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffData {
    /// Stable identifier; also the contribution source used to revert the
    /// buff's attribute modifiers exactly.
    pub id: String,
    /// Free-form category ("rage", "poison", ...).
    pub kind: String,
    /// Lifetime in frames.
    pub duration: u64,
    #[serde(default)]
    pub attribute_modifiers: Vec<AttributeModifier>,
    #[serde(default)]
    pub periodic: Option<PeriodicEffect>,
    #[serde(default)]
    pub stack_rule: StackRule,
}

// ---------------------------------------------------------------------------
// StatusEffect
// ---------------------------------------------------------------------------

/// Kinds of hard status effects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Stun,
    Fear,
    Silence,
    Immobilize,
    Invulnerable,
}

/// Declarative description of one status effect. Represented on the queue
/// as the same event sequence as buffs: one apply event now, one remove
/// event at `duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectData {
    pub kind: StatusKind,
    /// Lifetime in frames.
    pub duration: u64,
    #[serde(default)]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
