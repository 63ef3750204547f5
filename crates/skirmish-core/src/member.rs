//! Member state machine and context.
//!
//! One [`Member`] per combatant: a typed [`MemberContext`] (stats, flags,
//! status effects, a local pending-event buffer) plus a hierarchical state
//! graph:
//!
//! ```text
//! alive -- active | stunned | casting
//! dead  -- terminal, no outgoing transitions
//! ```
//!
//! Transitions are driven by an explicit rule table keyed by
//! (state family, event kind): each [`TransitionRule`] carries a pure guard
//! predicate, an ordered list of action functions (state mutation before
//! observation), and a target function evaluated against the post-action
//! context. The damage transition is the composite guarded case: the
//! damage-application action always runs first, then the target function
//! moves the member to `dead` if hp reached 0.
//!
//! Every transition is fully synchronous -- no action may suspend.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};

use crate::effect::{StatusEffectData, StatusKind};
use crate::event::{ActionTag, MemberId};
use crate::kind::{EntityDefinition, EntityKind, KindBehavior, StatOverrides};
use crate::observer::SimulationObserver;
use crate::stats::{MemberStats, Position};
use crate::CoreError;

// ---------------------------------------------------------------------------
// MemberState
// ---------------------------------------------------------------------------

/// Substates of `alive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliveState {
    Active,
    Stunned,
    Casting,
}

/// The hierarchical member state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Alive(AliveState),
    Dead,
}

impl MemberState {
    pub fn is_alive(&self) -> bool {
        matches!(self, MemberState::Alive(_))
    }
}

// ---------------------------------------------------------------------------
// MemberEvent
// ---------------------------------------------------------------------------

/// Damage classification carried by damage events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Physical,
    Magical,
    /// Bypasses mitigation entirely.
    True,
}

/// Events delivered to a member's state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MemberEvent {
    Damage {
        amount: i64,
        damage_type: DamageType,
        source: MemberId,
    },
    Heal {
        amount: i64,
        source: MemberId,
    },
    Move {
        position: Position,
    },
    /// Forced transition to `dead` regardless of hp (instant-kill effects).
    Death,
    SkillStart {
        skill: String,
        action_tag: ActionTag,
        mp_cost: i64,
    },
    SkillEnd {
        skill: String,
    },
    StatusApplied {
        effect: StatusEffectData,
    },
    StatusRemoved {
        kind: StatusKind,
    },
    Update {
        frame: u64,
    },
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

/// Event discriminant used to key the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEventKind {
    Damage,
    Heal,
    Move,
    Death,
    SkillStart,
    SkillEnd,
    StatusApplied,
    StatusRemoved,
    Update,
    Custom,
}

impl MemberEvent {
    pub fn kind(&self) -> MemberEventKind {
        match self {
            MemberEvent::Damage { .. } => MemberEventKind::Damage,
            MemberEvent::Heal { .. } => MemberEventKind::Heal,
            MemberEvent::Move { .. } => MemberEventKind::Move,
            MemberEvent::Death => MemberEventKind::Death,
            MemberEvent::SkillStart { .. } => MemberEventKind::SkillStart,
            MemberEvent::SkillEnd { .. } => MemberEventKind::SkillEnd,
            MemberEvent::StatusApplied { .. } => MemberEventKind::StatusApplied,
            MemberEvent::StatusRemoved { .. } => MemberEventKind::StatusRemoved,
            MemberEvent::Update { .. } => MemberEventKind::Update,
            MemberEvent::Custom { .. } => MemberEventKind::Custom,
        }
    }
}

// ---------------------------------------------------------------------------
// MemberContext
// ---------------------------------------------------------------------------

/// A buffered event waiting in the member's local delivery buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    /// Absolute frame at which the event becomes due.
    pub execute_frame: u64,
    pub event: MemberEvent,
}

/// The typed context owned by one member.
///
/// Mutated exclusively through state-machine transition actions and kind
/// hooks; the scheduler only holds a lookup reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContext {
    /// Immutable source entity definition.
    pub definition: EntityDefinition,
    /// Attribute model backing the stats.
    pub attributes: crate::attribute::AttributeSet,
    pub stats: MemberStats,
    pub is_alive: bool,
    pub is_active: bool,
    pub status_effects: BTreeSet<StatusKind>,
    /// Active buff id -> current stack count (maintained by buff handlers).
    pub active_buffs: BTreeMap<String, u32>,
    /// Tag of the in-flight action, if any. Used for bulk cancellation.
    pub current_action: Option<ActionTag>,
    /// Entity-local pending-event buffer, distinct from the global queue.
    pending: Vec<BufferedEvent>,
    pub last_update_frame: u64,
}

impl MemberContext {
    /// Defer an event into the local buffer until `execute_frame`.
    pub fn buffer_event(&mut self, execute_frame: u64, event: MemberEvent) {
        self.pending.push(BufferedEvent {
            execute_frame,
            event,
        });
    }

    /// Remove and return every buffered event due at `frame`, ordered by
    /// frame then insertion order.
    pub fn drain_due(&mut self, frame: u64) -> Vec<BufferedEvent> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for buffered in self.pending.drain(..) {
            if buffered.execute_frame <= frame {
                due.push(buffered);
            } else {
                remaining.push(buffered);
            }
        }
        self.pending = remaining;
        due.sort_by_key(|b| b.execute_frame); // stable: insertion order within a frame
        due
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Refresh a stat field from the attribute model's current totals.
    /// No-op if the attribute or stat field does not exist.
    pub fn refresh_stat(&mut self, attribute: &str) {
        let Ok(attr) = self.attributes.get(attribute) else {
            return;
        };
        let value = match attribute {
            "attack_speed" | "move_speed" => attr.dynamic_total_raw(),
            _ => attr.dynamic_total_value(),
        };
        self.stats.set_attribute(attribute, value);
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Pure predicate over context and event. Never side-effecting.
pub type Guard = fn(&MemberContext, &MemberEvent) -> bool;

/// A state-mutation action. Actions run in the order listed by the rule.
pub type ActionFn = fn(&mut MemberContext, &MemberEvent);

/// Computes the target state from the post-action context. `None` means
/// stay in the current state.
pub type TargetFn = fn(&MemberContext, &MemberState, &MemberEvent) -> Option<MemberState>;

/// One row of the transition table.
pub struct TransitionRule {
    pub event: MemberEventKind,
    pub guard: Guard,
    pub actions: &'static [ActionFn],
    pub target: TargetFn,
}

mod guards {
    use super::*;

    pub fn always(_: &MemberContext, _: &MemberEvent) -> bool {
        true
    }

    pub fn not_invulnerable(ctx: &MemberContext, _: &MemberEvent) -> bool {
        !ctx.status_effects.contains(&StatusKind::Invulnerable)
    }

    pub fn can_move(ctx: &MemberContext, _: &MemberEvent) -> bool {
        !ctx.status_effects.contains(&StatusKind::Stun)
            && !ctx.status_effects.contains(&StatusKind::Immobilize)
    }

    pub fn can_use_skill(ctx: &MemberContext, _: &MemberEvent) -> bool {
        !ctx.status_effects.contains(&StatusKind::Stun)
            && !ctx.status_effects.contains(&StatusKind::Silence)
    }
}

mod actions {
    use super::*;

    pub fn apply_damage(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::Damage { amount, .. } = event {
            ctx.stats.apply_damage(*amount);
        }
    }

    pub fn apply_heal(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::Heal { amount, .. } = event {
            ctx.stats.apply_heal(*amount);
        }
    }

    pub fn set_position(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::Move { position } = event {
            ctx.stats.position = *position;
        }
    }

    pub fn begin_action(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::SkillStart { action_tag, .. } = event {
            ctx.current_action = Some(action_tag.clone());
        }
    }

    pub fn end_action(ctx: &mut MemberContext, _: &MemberEvent) {
        ctx.current_action = None;
    }

    pub fn add_status(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::StatusApplied { effect } = event {
            ctx.status_effects.insert(effect.kind);
        }
    }

    pub fn remove_status(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::StatusRemoved { kind } = event {
            ctx.status_effects.remove(kind);
        }
    }

    pub fn touch_update(ctx: &mut MemberContext, event: &MemberEvent) {
        if let MemberEvent::Update { frame } = event {
            ctx.last_update_frame = *frame;
        }
    }

    /// Death entry action: runs after the rule's own actions whenever a
    /// transition lands on `dead`.
    pub fn enter_dead(ctx: &mut MemberContext) {
        ctx.is_alive = false;
        ctx.is_active = false;
        ctx.current_action = None;
    }
}

mod targets {
    use super::*;

    pub fn stay(_: &MemberContext, _: &MemberState, _: &MemberEvent) -> Option<MemberState> {
        None
    }

    pub fn dead_if_hp_zero(
        ctx: &MemberContext,
        _: &MemberState,
        _: &MemberEvent,
    ) -> Option<MemberState> {
        (ctx.stats.hp <= 0).then_some(MemberState::Dead)
    }

    pub fn dead(_: &MemberContext, _: &MemberState, _: &MemberEvent) -> Option<MemberState> {
        Some(MemberState::Dead)
    }

    pub fn casting(_: &MemberContext, _: &MemberState, _: &MemberEvent) -> Option<MemberState> {
        Some(MemberState::Alive(AliveState::Casting))
    }

    pub fn active_if_casting(
        _: &MemberContext,
        from: &MemberState,
        _: &MemberEvent,
    ) -> Option<MemberState> {
        (*from == MemberState::Alive(AliveState::Casting))
            .then_some(MemberState::Alive(AliveState::Active))
    }

    pub fn stunned_if_stun(
        _: &MemberContext,
        _: &MemberState,
        event: &MemberEvent,
    ) -> Option<MemberState> {
        match event {
            MemberEvent::StatusApplied { effect } if effect.kind == StatusKind::Stun => {
                Some(MemberState::Alive(AliveState::Stunned))
            }
            _ => None,
        }
    }

    pub fn active_if_unstunned(
        ctx: &MemberContext,
        from: &MemberState,
        event: &MemberEvent,
    ) -> Option<MemberState> {
        match event {
            MemberEvent::StatusRemoved {
                kind: StatusKind::Stun,
            } if *from == MemberState::Alive(AliveState::Stunned)
                && !ctx.status_effects.contains(&StatusKind::Stun) =>
            {
                Some(MemberState::Alive(AliveState::Active))
            }
            _ => None,
        }
    }
}

/// Transition rules for the `alive` composite state (any substate).
/// First matching rule (event kind + guard) wins.
const ALIVE_RULES: &[TransitionRule] = &[
    TransitionRule {
        event: MemberEventKind::Damage,
        guard: guards::not_invulnerable,
        actions: &[actions::apply_damage],
        target: targets::dead_if_hp_zero,
    },
    // Invulnerable members absorb the hit: handled, no mutation.
    TransitionRule {
        event: MemberEventKind::Damage,
        guard: guards::always,
        actions: &[],
        target: targets::stay,
    },
    TransitionRule {
        event: MemberEventKind::Heal,
        guard: guards::always,
        actions: &[actions::apply_heal],
        target: targets::stay,
    },
    TransitionRule {
        event: MemberEventKind::Move,
        guard: guards::can_move,
        actions: &[actions::set_position],
        target: targets::stay,
    },
    TransitionRule {
        event: MemberEventKind::Death,
        guard: guards::always,
        actions: &[],
        target: targets::dead,
    },
    TransitionRule {
        event: MemberEventKind::SkillStart,
        guard: guards::can_use_skill,
        actions: &[actions::begin_action],
        target: targets::casting,
    },
    TransitionRule {
        event: MemberEventKind::SkillEnd,
        guard: guards::always,
        actions: &[actions::end_action],
        target: targets::active_if_casting,
    },
    TransitionRule {
        event: MemberEventKind::StatusApplied,
        guard: guards::always,
        actions: &[actions::add_status],
        target: targets::stunned_if_stun,
    },
    TransitionRule {
        event: MemberEventKind::StatusRemoved,
        guard: guards::always,
        actions: &[actions::remove_status],
        target: targets::active_if_unstunned,
    },
    TransitionRule {
        event: MemberEventKind::Update,
        guard: guards::always,
        actions: &[actions::touch_update],
        target: targets::stay,
    },
    // Observed, no mandated state change in the base contract.
    TransitionRule {
        event: MemberEventKind::SkillStart,
        guard: guards::always,
        actions: &[],
        target: targets::stay,
    },
    TransitionRule {
        event: MemberEventKind::Custom,
        guard: guards::always,
        actions: &[],
        target: targets::stay,
    },
];

/// `dead` is terminal in the base contract: no outgoing rules.
const DEAD_RULES: &[TransitionRule] = &[];

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// Whether any rule matched (guard included).
    pub handled: bool,
    pub from: MemberState,
    pub to: MemberState,
}

impl TransitionOutcome {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

/// One combatant: context, state, and kind behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub context: MemberContext,
    state: MemberState,
    behavior: KindBehavior,
}

impl Member {
    /// Factory: resolve the definition's kind discriminator, compute base
    /// stats, and enter `alive.active` with seeded stats and cleared
    /// transients.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedKind`] for unknown kind discriminators.
    pub fn from_definition(
        id: MemberId,
        definition: EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> Result<Self, CoreError> {
        let kind = EntityKind::parse(&definition.kind)?;
        let behavior = KindBehavior::for_kind(kind);
        let base = behavior.compute_base_stats(&definition, overrides);

        let context = MemberContext {
            definition,
            attributes: base.attributes,
            stats: base.stats,
            is_alive: true,
            is_active: behavior.starts_active(),
            status_effects: BTreeSet::new(),
            active_buffs: BTreeMap::new(),
            current_action: None,
            pending: Vec::new(),
            last_update_frame: 0,
        };

        Ok(Self {
            id,
            context,
            state: MemberState::Alive(AliveState::Active),
            behavior,
        })
    }

    pub fn state(&self) -> MemberState {
        self.state
    }

    pub fn kind(&self) -> EntityKind {
        self.behavior.kind()
    }

    /// Deliver one event through the transition table.
    ///
    /// Order within a matched rule is fixed: rule actions (state mutation),
    /// then the kind hook, then target resolution, then observation. Events
    /// with no matching rule are still observed (`handled: false`).
    pub fn dispatch(
        &mut self,
        event: &MemberEvent,
        observer: &mut dyn SimulationObserver,
    ) -> TransitionOutcome {
        let rules = match self.state {
            MemberState::Alive(_) => ALIVE_RULES,
            MemberState::Dead => DEAD_RULES,
        };

        let rule = rules
            .iter()
            .find(|r| r.event == event.kind() && (r.guard)(&self.context, event));

        let from = self.state;
        let Some(rule) = rule else {
            observer.on_member_event(self.id, event);
            return TransitionOutcome {
                handled: false,
                from,
                to: from,
            };
        };

        for action in rule.actions {
            action(&mut self.context, event);
        }
        self.behavior.handle_kind_event(&mut self.context, event);

        let to = (rule.target)(&self.context, &from, event).unwrap_or(from);
        if to == MemberState::Dead && from != MemberState::Dead {
            actions::enter_dead(&mut self.context);
        }
        self.state = to;

        observer.on_member_event(self.id, event);
        if from != to {
            observer.on_transition(self.id, &from, &to, event);
        }

        TransitionOutcome {
            handled: true,
            from,
            to,
        }
    }

    /// Defer an event into the member's local buffer.
    pub fn buffer_event(&mut self, execute_frame: u64, event: MemberEvent) {
        self.context.buffer_event(execute_frame, event);
    }

    /// Per-tick advance: deliver every buffered event whose frame has
    /// arrived, then the time-advance notification.
    ///
    /// Returns the number of buffered events delivered.
    pub fn update(&mut self, frame: u64, observer: &mut dyn SimulationObserver) -> usize {
        let due = self.context.drain_due(frame);
        let delivered = due.len();
        for buffered in due {
            self.dispatch(&buffered.event, observer);
        }
        self.dispatch(&MemberEvent::Update { frame }, observer);
        delivered
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
