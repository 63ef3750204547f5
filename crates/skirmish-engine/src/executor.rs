//! Effect executor: formulas in, time-stamped events out.
//!
//! Durable effects are represented as pre-scheduled discrete events, not
//! live countdown objects: [`apply_buff`](EffectExecutor::apply_buff) emits
//! the buff's entire lifetime (apply now, one periodic tick per completed
//! interval, remove at the duration boundary) into the queue in one shot.
//! The timeline is inspectable frame-by-frame and cancellable by dropping
//! its action tag. The executor never mutates member state itself; mutation
//! happens when the scheduler later dispatches the events to handlers.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use skirmish_core::effect::{BuffData, StatusEffectData};
use skirmish_core::event::{ActionTag, EventPriority, EventType, MemberId, QueueEvent};
use skirmish_expr::eval::{EvalContext, Evaluator, NativeFn};

use crate::queue::EventQueue;
use crate::registry::MemberRegistry;
use crate::EngineError;

// ---------------------------------------------------------------------------
// ExpressionOutcome
// ---------------------------------------------------------------------------

/// Result of a formula evaluation. On failure the value is zero and
/// `success` is false -- callers must check the flag, a bad formula never
/// halts a battle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpressionOutcome {
    pub value: f64,
    pub success: bool,
}

impl ExpressionOutcome {
    fn failed() -> Self {
        Self {
            value: 0.0,
            success: false,
        }
    }
}

// ---------------------------------------------------------------------------
// MemberEvalContext
// ---------------------------------------------------------------------------

/// Binds formula names against live member state.
///
/// Dotted paths (`target.max_hp`) resolve through an entity-ref binding
/// (`"target"` -> member id) to the member's current stats, falling back to
/// its attribute model. Bare variables come from a per-call map.
pub struct MemberEvalContext<'a> {
    registry: &'a MemberRegistry,
    bindings: BTreeMap<String, MemberId>,
    variables: BTreeMap<String, f64>,
}

impl<'a> MemberEvalContext<'a> {
    pub fn new(registry: &'a MemberRegistry) -> Self {
        Self {
            registry,
            bindings: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, member: MemberId) -> Self {
        self.bindings.insert(name.into(), member);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: f64) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

impl EvalContext for MemberEvalContext<'_> {
    fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    fn attribute(&self, entity: &str, attribute: &str) -> Option<f64> {
        let id = *self.bindings.get(entity)?;
        let member = self.registry.get(id).ok()?;
        member
            .context
            .stats
            .attribute(attribute)
            .or_else(|| member.context.attributes.dynamic_total(attribute).ok())
    }
}

// ---------------------------------------------------------------------------
// EffectExecutor
// ---------------------------------------------------------------------------

/// Expands declarative effect data into queue entries and evaluates
/// formulas. Owns the simulation's only random stream (inside the
/// [`Evaluator`]), which serializes with the engine snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectExecutor {
    evaluator: Evaluator,
}

impl EffectExecutor {
    pub fn new(seed: u64) -> Self {
        Self {
            evaluator: Evaluator::new(seed),
        }
    }

    /// Extend the formula function library. Not part of the snapshot; the
    /// host re-registers after restoring onto a fresh engine.
    pub fn register_function(&mut self, name: impl Into<String>, function: NativeFn) {
        self.evaluator.register_function(name, function);
    }

    /// Evaluate a formula. Failures are logged and converted to a zero
    /// outcome with `success: false`.
    pub fn execute_expression(
        &mut self,
        expression: &str,
        ctx: &dyn EvalContext,
    ) -> ExpressionOutcome {
        match self.evaluator.evaluate_str(expression, ctx) {
            Ok(value) => ExpressionOutcome {
                value,
                success: true,
            },
            Err(error) => {
                tracing::warn!(%expression, %error, "formula evaluation failed, yielding 0");
                ExpressionOutcome::failed()
            }
        }
    }

    /// Expand a buff into its full scheduled lifetime, all entries tagged
    /// with the returned action tag:
    ///
    /// - `buff_applied` at `current_frame`
    /// - one `buff_periodic_effect` per completed interval, at
    ///   `current_frame + interval * k` for `k = 1..=duration/interval`
    ///   (the duration boundary is inclusive, and a boundary tick is queued
    ///   before the removal so it fires first)
    /// - `buff_removed` at `current_frame + duration`
    pub fn apply_buff(
        &mut self,
        buff: &BuffData,
        target: MemberId,
        current_frame: u64,
        queue: &mut EventQueue,
    ) -> Result<ActionTag, EngineError> {
        let tag = ActionTag::new(format!("buff:{target}:{}:{current_frame}", buff.id));
        let payload = serde_json::json!({ "buff": buff });

        let id = queue.allocate_id();
        queue.insert(
            QueueEvent::new(
                id,
                current_frame,
                EventType::BuffApplied,
                target,
                payload.clone(),
            )
            .with_tag(tag.clone()),
        )?;

        if let Some(periodic) = &buff.periodic {
            if periodic.interval > 0 {
                for k in 1..=buff.duration / periodic.interval {
                    let id = queue.allocate_id();
                    queue.insert(
                        QueueEvent::new(
                            id,
                            current_frame + periodic.interval * k,
                            EventType::BuffPeriodic,
                            target,
                            payload.clone(),
                        )
                        .with_tag(tag.clone()),
                    )?;
                }
            }
        }

        let id = queue.allocate_id();
        queue.insert(
            QueueEvent::new(
                id,
                current_frame + buff.duration,
                EventType::BuffRemoved,
                target,
                payload,
            )
            .with_tag(tag.clone()),
        )?;

        tracing::debug!(%target, buff = %buff.id, frame = current_frame, "buff scheduled");
        Ok(tag)
    }

    /// Expand a status effect: one immediate `status_effect_applied` plus a
    /// `status_effect_removed` at the duration boundary. Removal is queued
    /// at high priority so recovery is never starved by same-frame noise.
    pub fn apply_status_effect(
        &mut self,
        effect: &StatusEffectData,
        target: MemberId,
        current_frame: u64,
        queue: &mut EventQueue,
    ) -> Result<ActionTag, EngineError> {
        let tag = ActionTag::new(format!(
            "status:{target}:{:?}:{current_frame}",
            effect.kind
        ));
        let payload = serde_json::json!({ "effect": effect });

        let id = queue.allocate_id();
        queue.insert(
            QueueEvent::new(
                id,
                current_frame,
                EventType::StatusApplied,
                target,
                payload.clone(),
            )
            .with_tag(tag.clone()),
        )?;

        let id = queue.allocate_id();
        queue.insert(
            QueueEvent::new(
                id,
                current_frame + effect.duration,
                EventType::StatusRemoved,
                target,
                payload,
            )
            .with_priority(EventPriority::High)
            .with_tag(tag.clone()),
        )?;

        Ok(tag)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
