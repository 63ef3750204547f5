//! Built-in handlers for the engine's own event types.
//!
//! Each handler owns one [`EventType`] and runs synchronously inside the
//! tick. Handlers that act on a member translate the queue event into a
//! state-machine event and let the member's transition table decide what
//! actually happens; handlers that act on attributes mutate the target's
//! dynamic modifier buckets directly and refresh the derived stat.
//!
//! A handler may enqueue further events through its [`DispatchContext`] --
//! periodic buff ticks chain their damage or heal this way instead of
//! mutating hp themselves.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use skirmish_core::attribute::{Contribution, ModifierBucket};
use skirmish_core::effect::{BuffData, ModifierOp, PeriodicKind, StackMode, StatusEffectData};
use skirmish_core::event::{EventType, MemberId, QueueEvent};
use skirmish_core::member::{DamageType, Member, MemberEvent};

use crate::executor::MemberEvalContext;
use crate::scheduler::{DispatchContext, EventHandler, HandlerOutcome};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Wire payload of a [`EventType::Damage`] event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamagePayload {
    pub amount: i64,
    pub damage_type: DamageType,
    pub source: MemberId,
}

/// Wire payload of a [`EventType::Heal`] event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealPayload {
    pub amount: i64,
    pub source: MemberId,
}

fn parse_payload<T: serde::de::DeserializeOwned>(event: &QueueEvent) -> Result<T, EngineError> {
    serde_json::from_value(event.payload.clone()).map_err(|e| EngineError::Handler {
        event_type: event.event_type.to_string(),
        details: format!("malformed payload: {e}"),
    })
}

fn payload_field<T: serde::de::DeserializeOwned>(
    event: &QueueEvent,
    field: &str,
) -> Result<T, EngineError> {
    let value = event
        .payload
        .get(field)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|e| EngineError::Handler {
        event_type: event.event_type.to_string(),
        details: format!("malformed '{field}' payload: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Install the built-in handler set into a dispatch table.
pub fn register_defaults(map: &mut HashMap<EventType, Box<dyn EventHandler>>) {
    map.insert(EventType::Damage, Box::new(DamageHandler));
    map.insert(EventType::Heal, Box::new(HealHandler));
    map.insert(EventType::BuffApplied, Box::new(BuffAppliedHandler));
    map.insert(EventType::BuffPeriodic, Box::new(BuffPeriodicHandler));
    map.insert(EventType::BuffRemoved, Box::new(BuffRemovedHandler));
    map.insert(EventType::StatusApplied, Box::new(StatusAppliedHandler));
    map.insert(EventType::StatusRemoved, Box::new(StatusRemovedHandler));
}

// ---------------------------------------------------------------------------
// Damage / heal
// ---------------------------------------------------------------------------

/// Delivers damage to the target's state machine. If the hit kills the
/// target, its in-flight action is cancelled: every still-pending event
/// tagged to that action is dropped from the queue.
pub struct DamageHandler;

impl EventHandler for DamageHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let payload: DamagePayload = parse_payload(event)?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        let action = member.context.current_action.clone();
        member.dispatch(
            &MemberEvent::Damage {
                amount: payload.amount,
                damage_type: payload.damage_type,
                source: payload.source,
            },
            ctx.observer,
        );
        if !member.context.is_alive {
            if let Some(tag) = action {
                let cancelled = ctx.queue.cancel_tagged(&tag);
                if !cancelled.is_empty() {
                    tracing::debug!(
                        member = %event.target,
                        %tag,
                        cancelled = cancelled.len(),
                        "death cancelled pending action"
                    );
                }
            }
        }
        Ok(HandlerOutcome::Handled)
    }
}

pub struct HealHandler;

impl EventHandler for HealHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let payload: HealPayload = parse_payload(event)?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        member.dispatch(
            &MemberEvent::Heal {
                amount: payload.amount,
                source: payload.source,
            },
            ctx.observer,
        );
        Ok(HandlerOutcome::Handled)
    }
}

// ---------------------------------------------------------------------------
// Buffs
// ---------------------------------------------------------------------------

fn bucket_for(op: ModifierOp) -> ModifierBucket {
    match op {
        ModifierOp::Add | ModifierOp::Set => ModifierBucket::DynamicFixed,
        ModifierOp::Multiply => ModifierBucket::DynamicPercent,
    }
}

/// Add one application's worth of modifier contributions, keyed by the
/// buff id so removal can strip them wholesale.
fn apply_modifiers(member: &mut Member, buff: &BuffData) -> Result<(), EngineError> {
    for modifier in &buff.attribute_modifiers {
        {
            let attr = member.context.attributes.get_mut(&modifier.attribute)?;
            let contribution = match modifier.op {
                ModifierOp::Add => Contribution::new(modifier.value, &buff.id),
                ModifierOp::Multiply => {
                    Contribution::new((modifier.value - 1.0) * 100.0, &buff.id)
                }
                // Set pins the dynamic total by contributing the difference.
                ModifierOp::Set => {
                    Contribution::new(modifier.value - attr.dynamic_total_raw(), &buff.id)
                }
            };
            attr.add_contribution(bucket_for(modifier.op), contribution);
        }
        member.context.refresh_stat(&modifier.attribute);
    }
    Ok(())
}

/// Strip every contribution this buff ever made, all stacks at once.
fn remove_modifiers(member: &mut Member, buff: &BuffData) -> Result<(), EngineError> {
    for modifier in &buff.attribute_modifiers {
        {
            let attr = member.context.attributes.get_mut(&modifier.attribute)?;
            attr.remove_contributions(bucket_for(modifier.op), &buff.id);
        }
        member.context.refresh_stat(&modifier.attribute);
    }
    Ok(())
}

/// Applies a buff's attribute modifiers according to its stacking rule.
pub struct BuffAppliedHandler;

impl EventHandler for BuffAppliedHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let buff: BuffData = payload_field(event, "buff")?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        let stacks = member.context.active_buffs.get(&buff.id).copied().unwrap_or(0);

        let new_stacks = match buff.stack_rule.mode {
            StackMode::Replace => {
                if stacks > 0 {
                    remove_modifiers(member, &buff)?;
                }
                apply_modifiers(member, &buff)?;
                1
            }
            StackMode::Stack => {
                if stacks >= buff.stack_rule.max_stacks {
                    tracing::debug!(buff = %buff.id, stacks, "stack limit reached");
                    return Ok(HandlerOutcome::Handled);
                }
                apply_modifiers(member, &buff)?;
                stacks + 1
            }
            StackMode::Refresh => {
                // The host cancels the old timeline's tag when refreshing;
                // the modifiers themselves carry over unchanged.
                if stacks == 0 {
                    apply_modifiers(member, &buff)?;
                }
                stacks.max(1)
            }
        };
        member.context.active_buffs.insert(buff.id.clone(), new_stacks);
        Ok(HandlerOutcome::Handled)
    }
}

/// Evaluates a periodic buff tick and chains the result back into the
/// queue as a damage or heal event. The member's hp is never touched here.
pub struct BuffPeriodicHandler;

impl EventHandler for BuffPeriodicHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let buff: BuffData = payload_field(event, "buff")?;
        let Some(periodic) = &buff.periodic else {
            return Ok(HandlerOutcome::Ignored);
        };
        if !ctx.members.contains(event.target) {
            return Ok(HandlerOutcome::Ignored);
        }

        let outcome = {
            let eval_ctx = MemberEvalContext::new(ctx.members).bind("target", event.target);
            ctx.executor.execute_expression(&periodic.expression, &eval_ctx)
        };
        if !outcome.success {
            // Failed formulas contribute nothing rather than a zero-value hit.
            return Ok(HandlerOutcome::Handled);
        }
        let amount = outcome.value.round().max(0.0) as i64;

        let (event_type, payload) = match periodic.kind {
            PeriodicKind::Damage => (
                EventType::Damage,
                serde_json::to_value(DamagePayload {
                    amount,
                    damage_type: DamageType::Magical,
                    source: event.target,
                }),
            ),
            PeriodicKind::Heal => (
                EventType::Heal,
                serde_json::to_value(HealPayload {
                    amount,
                    source: event.target,
                }),
            ),
        };
        let payload = payload.map_err(|e| EngineError::Handler {
            event_type: event.event_type.to_string(),
            details: e.to_string(),
        })?;

        let id = ctx.queue.allocate_id();
        let mut chained = QueueEvent::new(id, ctx.current_frame, event_type, event.target, payload);
        if let Some(tag) = &event.action_tag {
            chained = chained.with_tag(tag.clone());
        }
        ctx.queue.insert(chained)?;
        Ok(HandlerOutcome::Handled)
    }
}

/// Strips a buff's contributions when its timeline expires.
pub struct BuffRemovedHandler;

impl EventHandler for BuffRemovedHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let buff: BuffData = payload_field(event, "buff")?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        if member.context.active_buffs.remove(&buff.id).is_none() {
            // Already replaced or cancelled; nothing to strip.
            return Ok(HandlerOutcome::Handled);
        }
        remove_modifiers(member, &buff)?;
        Ok(HandlerOutcome::Handled)
    }
}

// ---------------------------------------------------------------------------
// Status effects
// ---------------------------------------------------------------------------

/// Forwards a status application to the target's state machine, which
/// decides via its guards whether the status takes hold.
pub struct StatusAppliedHandler;

impl EventHandler for StatusAppliedHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let effect: StatusEffectData = payload_field(event, "effect")?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        member.dispatch(&MemberEvent::StatusApplied { effect }, ctx.observer);
        Ok(HandlerOutcome::Handled)
    }
}

pub struct StatusRemovedHandler;

impl EventHandler for StatusRemovedHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError> {
        let effect: StatusEffectData = payload_field(event, "effect")?;
        let Ok(member) = ctx.members.get_mut(event.target) else {
            return Ok(HandlerOutcome::Ignored);
        };
        member.dispatch(&MemberEvent::StatusRemoved { kind: effect.kind }, ctx.observer);
        Ok(HandlerOutcome::Handled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use skirmish_core::effect::{AttributeModifier, PeriodicEffect, StackRule, StatusKind};
    use skirmish_core::event::{ActionTag, EventId};
    use skirmish_core::kind::EntityDefinition;
    use skirmish_core::observer::NoopObserver;

    use crate::executor::EffectExecutor;
    use crate::queue::EventQueue;
    use crate::registry::MemberRegistry;

    struct Fixture {
        members: MemberRegistry,
        queue: EventQueue,
        executor: EffectExecutor,
        observer: NoopObserver,
        target: MemberId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut members = MemberRegistry::new();
            let target = members
                .spawn(
                    EntityDefinition {
                        id: "mob".to_owned(),
                        name: "Mob".to_owned(),
                        kind: "monster".to_owned(),
                        source_attributes: BTreeMap::from([
                            ("base_hp".to_owned(), 200.0),
                            ("base_physical_atk".to_owned(), 50.0),
                        ]),
                    },
                    None,
                )
                .unwrap();
            Self {
                members,
                queue: EventQueue::new(),
                executor: EffectExecutor::new(7),
                observer: NoopObserver,
                target,
            }
        }

        fn ctx(&mut self) -> DispatchContext<'_> {
            DispatchContext {
                current_frame: 100,
                members: &mut self.members,
                queue: &mut self.queue,
                executor: &mut self.executor,
                observer: &mut self.observer,
            }
        }

        fn target(&self) -> &Member {
            self.members.get(self.target).unwrap()
        }
    }

    fn damage_event(target: MemberId, amount: i64) -> QueueEvent {
        QueueEvent::new(
            EventId(1),
            100,
            EventType::Damage,
            target,
            serde_json::to_value(DamagePayload {
                amount,
                damage_type: DamageType::Physical,
                source: MemberId(0),
            })
            .unwrap(),
        )
    }

    fn buff_event(target: MemberId, event_type: EventType, buff: &BuffData) -> QueueEvent {
        QueueEvent::new(
            EventId(1),
            100,
            event_type,
            target,
            serde_json::json!({ "buff": buff }),
        )
    }

    fn atk_buff(mode: StackMode, max_stacks: u32) -> BuffData {
        BuffData {
            id: "war_cry".to_owned(),
            kind: "buff".to_owned(),
            duration: 300,
            attribute_modifiers: vec![AttributeModifier {
                attribute: "physical_atk".to_owned(),
                value: 10.0,
                op: ModifierOp::Add,
            }],
            periodic: None,
            stack_rule: StackRule { mode, max_stacks },
        }
    }

    // -- damage / heal ----------------------------------------------------------

    #[test]
    fn damage_handler_reduces_hp() {
        let mut fx = Fixture::new();
        let event = damage_event(fx.target, 60);
        let outcome = DamageHandler.handle(&event, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::Handled);
        assert_eq!(fx.target().context.stats.hp, 140);
    }

    #[test]
    fn lethal_damage_cancels_the_victims_pending_action() {
        let mut fx = Fixture::new();
        let tag = ActionTag::new("mob-cast");

        // The victim is mid-cast with two effects still queued.
        fx.members
            .get_mut(fx.target)
            .unwrap()
            .dispatch(
                &MemberEvent::SkillStart {
                    skill: "bite".to_owned(),
                    action_tag: tag.clone(),
                    mp_cost: 0,
                },
                &mut NoopObserver,
            );
        for frame in [110, 120] {
            let id = fx.queue.allocate_id();
            fx.queue
                .insert(
                    QueueEvent::new(
                        id,
                        frame,
                        EventType::Damage,
                        MemberId(99),
                        serde_json::Value::Null,
                    )
                    .with_tag(tag.clone()),
                )
                .unwrap();
        }

        let event = damage_event(fx.target, 500);
        DamageHandler.handle(&event, &mut fx.ctx()).unwrap();

        assert!(!fx.target().context.is_alive);
        assert_eq!(fx.queue.pending_len(), 0);
    }

    #[test]
    fn unknown_target_is_ignored_not_an_error() {
        let mut fx = Fixture::new();
        let event = damage_event(MemberId(404), 10);
        let outcome = DamageHandler.handle(&event, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::Ignored);
    }

    #[test]
    fn malformed_payload_is_a_handler_error() {
        let mut fx = Fixture::new();
        let event = QueueEvent::new(
            EventId(1),
            100,
            EventType::Damage,
            fx.target,
            serde_json::json!({ "amount": "lots" }),
        );
        let result = DamageHandler.handle(&event, &mut fx.ctx());
        assert!(matches!(result, Err(EngineError::Handler { .. })));
    }

    // -- buff stacking ------------------------------------------------------------

    #[test]
    fn add_modifier_raises_the_derived_stat() {
        let mut fx = Fixture::new();
        let buff = atk_buff(StackMode::Replace, 1);
        let event = buff_event(fx.target, EventType::BuffApplied, &buff);
        BuffAppliedHandler.handle(&event, &mut fx.ctx()).unwrap();

        let member = fx.target();
        assert_eq!(member.context.stats.physical_atk, 60);
        assert_eq!(member.context.active_buffs.get("war_cry"), Some(&1));
    }

    #[test]
    fn replace_mode_never_double_applies() {
        let mut fx = Fixture::new();
        let buff = atk_buff(StackMode::Replace, 1);
        let event = buff_event(fx.target, EventType::BuffApplied, &buff);
        BuffAppliedHandler.handle(&event, &mut fx.ctx()).unwrap();
        BuffAppliedHandler.handle(&event, &mut fx.ctx()).unwrap();

        assert_eq!(fx.target().context.stats.physical_atk, 60);
        assert_eq!(fx.target().context.active_buffs.get("war_cry"), Some(&1));
    }

    #[test]
    fn stack_mode_layers_up_to_the_limit() {
        let mut fx = Fixture::new();
        let buff = atk_buff(StackMode::Stack, 3);
        let event = buff_event(fx.target, EventType::BuffApplied, &buff);
        for _ in 0..5 {
            BuffAppliedHandler.handle(&event, &mut fx.ctx()).unwrap();
        }

        // 50 + 3 stacks of +10, the 4th and 5th applications are dropped.
        assert_eq!(fx.target().context.stats.physical_atk, 80);
        assert_eq!(fx.target().context.active_buffs.get("war_cry"), Some(&3));
    }

    #[test]
    fn removal_strips_every_stack_at_once() {
        let mut fx = Fixture::new();
        let buff = atk_buff(StackMode::Stack, 3);
        let applied = buff_event(fx.target, EventType::BuffApplied, &buff);
        for _ in 0..3 {
            BuffAppliedHandler.handle(&applied, &mut fx.ctx()).unwrap();
        }

        let removed = buff_event(fx.target, EventType::BuffRemoved, &buff);
        BuffRemovedHandler.handle(&removed, &mut fx.ctx()).unwrap();

        let member = fx.target();
        assert_eq!(member.context.stats.physical_atk, 50);
        assert!(!member.context.active_buffs.contains_key("war_cry"));
    }

    #[test]
    fn removal_of_an_inactive_buff_is_a_no_op() {
        let mut fx = Fixture::new();
        let buff = atk_buff(StackMode::Replace, 1);
        let removed = buff_event(fx.target, EventType::BuffRemoved, &buff);
        let outcome = BuffRemovedHandler.handle(&removed, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::Handled);
        assert_eq!(fx.target().context.stats.physical_atk, 50);
    }

    #[test]
    fn multiply_modifier_lands_in_the_percent_bucket() {
        let mut fx = Fixture::new();
        let mut buff = atk_buff(StackMode::Replace, 1);
        buff.attribute_modifiers[0].op = ModifierOp::Multiply;
        buff.attribute_modifiers[0].value = 1.2;

        let event = buff_event(fx.target, EventType::BuffApplied, &buff);
        BuffAppliedHandler.handle(&event, &mut fx.ctx()).unwrap();

        // 50 * 1.2 = 60.
        assert_eq!(fx.target().context.stats.physical_atk, 60);
    }

    // -- periodic ticks --------------------------------------------------------------

    #[test]
    fn periodic_tick_chains_a_damage_event() {
        let mut fx = Fixture::new();
        let mut buff = atk_buff(StackMode::Replace, 1);
        buff.attribute_modifiers.clear();
        buff.periodic = Some(PeriodicEffect {
            interval: 100,
            expression: "target.physical_atk / 2".to_owned(),
            kind: PeriodicKind::Damage,
        });

        let event = buff_event(fx.target, EventType::BuffPeriodic, &buff)
            .with_tag(ActionTag::new("poison"));
        BuffPeriodicHandler.handle(&event, &mut fx.ctx()).unwrap();

        assert_eq!(fx.queue.pending_len(), 1);
        let chained = &fx.queue.iter().next().unwrap().event;
        assert_eq!(chained.event_type, EventType::Damage);
        assert_eq!(chained.execute_frame, 100);
        assert_eq!(chained.action_tag, Some(ActionTag::new("poison")));
        let payload: DamagePayload = serde_json::from_value(chained.payload.clone()).unwrap();
        assert_eq!(payload.amount, 25);
    }

    #[test]
    fn failed_formula_chains_nothing() {
        let mut fx = Fixture::new();
        let mut buff = atk_buff(StackMode::Replace, 1);
        buff.periodic = Some(PeriodicEffect {
            interval: 100,
            expression: "target.no_such_attribute * 2".to_owned(),
            kind: PeriodicKind::Damage,
        });

        let event = buff_event(fx.target, EventType::BuffPeriodic, &buff);
        let outcome = BuffPeriodicHandler.handle(&event, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::Handled);
        assert_eq!(fx.queue.pending_len(), 0);
    }

    // -- status effects ----------------------------------------------------------------

    #[test]
    fn status_pair_toggles_the_member_flag() {
        let mut fx = Fixture::new();
        let effect = StatusEffectData {
            kind: StatusKind::Stun,
            duration: 120,
            intensity: None,
            data: None,
        };
        let payload = serde_json::json!({ "effect": effect });
        let applied = QueueEvent::new(
            EventId(1),
            100,
            EventType::StatusApplied,
            fx.target,
            payload.clone(),
        );
        StatusAppliedHandler.handle(&applied, &mut fx.ctx()).unwrap();
        assert!(fx.target().context.status_effects.contains(&StatusKind::Stun));

        let removed = QueueEvent::new(EventId(2), 220, EventType::StatusRemoved, fx.target, payload);
        StatusRemovedHandler.handle(&removed, &mut fx.ctx()).unwrap();
        assert!(!fx.target().context.status_effects.contains(&StatusKind::Stun));
    }
}
