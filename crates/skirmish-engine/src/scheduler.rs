//! Fixed-timestep frame scheduler for one battle instance.
//!
//! The [`FrameLoop`] is the time authority. Each call to
//! [`advance`](FrameLoop::advance) adds scaled wall-clock time to an
//! accumulator; while the accumulator holds at least one frame interval, a
//! simulation frame is processed and the interval subtracted. Simulation
//! rate is therefore decoupled from the caller's sampling rate, and event
//! timing is expressed in absolute simulation frames -- changing the target
//! fps or the time scale can never desynchronize pending effects.
//!
//! Per-frame sequence:
//!
//! 1. Pull due events from the queue (bounded by `max_events_per_frame`)
//!    and dispatch each synchronously to its type-keyed handler. A missing
//!    handler, a handler error, or a handler that tries to defer is
//!    recorded as a failed dispatch and the tick proceeds.
//! 2. Advance every registered member in id order: deliver its buffered
//!    events, then the time-advance notification. Failures are isolated per
//!    member.
//! 3. Record telemetry and emit the frame report to the attached listener
//!    unconditionally -- every frame reports, not only frames with change.
//!
//! Nothing inside a tick may suspend. The only way the loop terminates is
//! an explicit [`stop`](FrameLoop::stop) from outside.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use skirmish_core::event::{ActionTag, EventId, EventType, MemberId, QueueEvent};
use skirmish_core::kind::{EntityDefinition, StatOverrides};
use skirmish_core::member::{DamageType, Member, MemberEvent};
use skirmish_core::observer::{NoopObserver, SimulationObserver};

use crate::executor::EffectExecutor;
use crate::handlers;
use crate::intent::Intent;
use crate::queue::EventQueue;
use crate::registry::MemberRegistry;
use crate::telemetry::{FrameReport, FrameTelemetry, TelemetryStats};
use crate::EngineError;

// ---------------------------------------------------------------------------
// LoopState
// ---------------------------------------------------------------------------

/// Scheduler lifecycle. Transitions are linear:
/// `stopped -> running -> {paused <-> running, stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Stopped,
    Running,
    Paused,
}

impl LoopState {
    fn name(self) -> &'static str {
        match self {
            LoopState::Stopped => "stopped",
            LoopState::Running => "running",
            LoopState::Paused => "paused",
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Runtime-adjustable scheduler configuration. Every field may be changed
/// on a live engine without reconstructing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Simulation frames per second of simulated time.
    pub target_fps: u32,
    pub frame_skip_enabled: bool,
    /// Accumulator clamp threshold, in frame intervals.
    pub max_frame_skip: u32,
    /// Multiplier on incoming wall-clock deltas. 0 is equivalent to pausing.
    pub time_scale: f64,
    /// Per-frame dispatch cap, the only backpressure against unbounded
    /// event growth.
    pub max_events_per_frame: usize,
    /// Gates the telemetry ring; the frame listener fires regardless.
    pub performance_monitoring: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            frame_skip_enabled: true,
            max_frame_skip: 5,
            time_scale: 1.0,
            max_events_per_frame: 64,
            performance_monitoring: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Event handlers
// ---------------------------------------------------------------------------

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    /// The handler declined the event. Recorded as a skipped dispatch.
    Ignored,
    /// The handler wants to finish later. A fixed-budget tick cannot block
    /// on pending work, so this is recorded as a failed dispatch.
    Deferred,
}

/// Everything a handler may touch while processing one event. All mutation
/// of simulation state is funneled through here -- single-writer, no locks.
pub struct DispatchContext<'a> {
    pub current_frame: u64,
    pub members: &'a mut MemberRegistry,
    pub queue: &'a mut EventQueue,
    pub executor: &'a mut EffectExecutor,
    pub observer: &'a mut dyn SimulationObserver,
}

/// A type-keyed event handler. Must resolve synchronously.
pub trait EventHandler {
    fn handle(
        &mut self,
        event: &QueueEvent,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<HandlerOutcome, EngineError>;
}

type FrameListener = Box<dyn FnMut(&FrameReport)>;

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// The scheduler plus everything it owns: members, queue, executor,
/// handlers, telemetry. One instance is one logical simulation thread.
pub struct FrameLoop {
    pub(crate) config: SchedulerConfig,
    state: LoopState,
    pub(crate) current_frame: u64,
    /// Unconsumed scaled time, in seconds.
    pub(crate) accumulator: f64,
    pub(crate) members: MemberRegistry,
    pub(crate) queue: EventQueue,
    pub(crate) executor: EffectExecutor,
    handlers: HashMap<EventType, Box<dyn EventHandler>>,
    telemetry: FrameTelemetry,
    observer: Box<dyn SimulationObserver>,
    frame_listener: Option<FrameListener>,
}

impl FrameLoop {
    /// Build a stopped engine with the built-in effect handlers registered.
    /// `seed` drives the executor's random stream.
    pub fn new(config: SchedulerConfig, seed: u64) -> Self {
        let mut handler_map: HashMap<EventType, Box<dyn EventHandler>> = HashMap::new();
        handlers::register_defaults(&mut handler_map);
        Self {
            config,
            state: LoopState::Stopped,
            current_frame: 0,
            accumulator: 0.0,
            members: MemberRegistry::new(),
            queue: EventQueue::new(),
            executor: EffectExecutor::new(seed),
            handlers: handler_map,
            telemetry: FrameTelemetry::default(),
            observer: Box::new(NoopObserver),
            frame_listener: None,
        }
    }

    // -- lifecycle ------------------------------------------------------------

    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state != LoopState::Stopped {
            return Err(EngineError::InvalidLoopState {
                operation: "start",
                state: self.state.name(),
            });
        }
        self.state = LoopState::Running;
        tracing::info!(frame = self.current_frame, "frame loop started");
        Ok(())
    }

    /// Halt tick advancement. Queue and telemetry are preserved untouched;
    /// resuming picks up exactly where the loop left off.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state != LoopState::Running {
            return Err(EngineError::InvalidLoopState {
                operation: "pause",
                state: self.state.name(),
            });
        }
        self.state = LoopState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.state != LoopState::Paused {
            return Err(EngineError::InvalidLoopState {
                operation: "resume",
                state: self.state.name(),
            });
        }
        self.state = LoopState::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.state == LoopState::Stopped {
            return Err(EngineError::InvalidLoopState {
                operation: "stop",
                state: self.state.name(),
            });
        }
        self.state = LoopState::Stopped;
        self.accumulator = 0.0;
        tracing::info!(frame = self.current_frame, "frame loop stopped");
        Ok(())
    }

    // -- time advancement -------------------------------------------------------

    /// Feed scaled wall-clock time into the accumulator and process every
    /// frame it covers. Returns the number of frames processed. A paused or
    /// stopped loop consumes nothing and processes nothing.
    pub fn advance(&mut self, elapsed: Duration) -> u64 {
        if self.state != LoopState::Running {
            return 0;
        }
        let interval = self.frame_interval();
        self.accumulator += elapsed.as_secs_f64() * self.config.time_scale;

        // Frame-skip: a long stall is not replayed frame-by-frame. The
        // accumulator is clamped to one interval's worth and simulation time
        // silently jumps forward.
        if self.config.frame_skip_enabled {
            let limit = interval * self.config.max_frame_skip as f64;
            if self.accumulator > limit {
                tracing::warn!(
                    accumulated = self.accumulator,
                    limit,
                    "frame skip: clamping accumulator"
                );
                self.accumulator = interval;
            }
        }

        let mut frames = 0;
        while self.accumulator >= interval {
            self.process_frame();
            self.accumulator -= interval;
            frames += 1;
        }
        frames
    }

    /// Execute exactly one frame while not running, for frame-exact
    /// debugging and replay.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidLoopState`] if the loop is running -- a running
    /// loop's frames come from [`advance`](Self::advance) alone.
    pub fn step(&mut self) -> Result<FrameReport, EngineError> {
        if self.state == LoopState::Running {
            return Err(EngineError::InvalidLoopState {
                operation: "step",
                state: self.state.name(),
            });
        }
        Ok(self.process_frame())
    }

    /// The frame interval in seconds of simulated time.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.config.target_fps.max(1) as f64
    }

    // -- the tick ----------------------------------------------------------------

    fn process_frame(&mut self) -> FrameReport {
        let frame_start = Instant::now();
        self.current_frame += 1;
        let frame = self.current_frame;

        // Phase 1: dispatch due events, bounded by the per-frame cap.
        let due = self.queue.due_events(frame, self.config.max_events_per_frame);
        let events_processed = due.len();
        let mut failed_dispatches = 0;

        for event in due {
            let dispatch_start = Instant::now();
            let mut ctx = DispatchContext {
                current_frame: frame,
                members: &mut self.members,
                queue: &mut self.queue,
                executor: &mut self.executor,
                observer: self.observer.as_mut(),
            };

            let outcome = match self.handlers.get_mut(&event.event_type) {
                Some(handler) => handler.handle(&event, &mut ctx),
                None => {
                    tracing::warn!(event_type = %event.event_type, "no handler registered");
                    Ok(HandlerOutcome::Ignored)
                }
            };

            match outcome {
                Ok(HandlerOutcome::Handled) => {}
                Ok(HandlerOutcome::Ignored) => {
                    tracing::debug!(event = %event.id, event_type = %event.event_type, "dispatch skipped");
                    failed_dispatches += 1;
                }
                Ok(HandlerOutcome::Deferred) => {
                    tracing::warn!(
                        event = %event.id,
                        event_type = %event.event_type,
                        "handler tried to defer inside a fixed-budget tick"
                    );
                    failed_dispatches += 1;
                }
                Err(error) => {
                    tracing::warn!(event = %event.id, event_type = %event.event_type, %error, "dispatch failed");
                    failed_dispatches += 1;
                }
            }

            // Retire the event whatever the outcome -- it never re-fires.
            let _ = self
                .queue
                .mark_processed(event.id, Some(dispatch_start.elapsed()));
        }

        // Phase 2: advance every member in deterministic id order. A failing
        // member never blocks the rest of the frame.
        let ids = self.members.ids();
        let mut members_updated = 0;
        for id in ids {
            if let Ok(member) = self.members.get_mut(id) {
                member.update(frame, self.observer.as_mut());
                members_updated += 1;
            }
        }

        self.queue.cleanup();

        // Phase 3: telemetry and the unconditional frame report.
        let report = FrameReport {
            frame,
            events_processed,
            failed_dispatches,
            members_updated,
            processing_us: crate::telemetry::as_micros(frame_start.elapsed()),
        };
        if self.config.performance_monitoring {
            self.telemetry.record(report.clone());
        }
        if let Some(listener) = &mut self.frame_listener {
            listener(&report);
        }
        report
    }

    // -- members --------------------------------------------------------------------

    /// Bring an entity into the simulation. Stats are computed once from
    /// the definition plus optional overrides.
    pub fn register_member(
        &mut self,
        definition: EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> Result<MemberId, EngineError> {
        let id = self.members.spawn(definition, overrides)?;
        tracing::debug!(member = %id, "member registered");
        Ok(id)
    }

    /// Remove a member. Its not-yet-processed action events are cancelled
    /// with it.
    pub fn remove_member(&mut self, id: MemberId) -> Result<Member, EngineError> {
        let member = self.members.remove(id)?;
        if let Some(tag) = &member.context.current_action {
            let _ = self.queue.cancel_tagged(tag);
        }
        Ok(member)
    }

    pub fn member(&self, id: MemberId) -> Result<&Member, EngineError> {
        self.members.get(id)
    }

    pub fn members(&self) -> &MemberRegistry {
        &self.members
    }

    /// Deliver a state-machine event to a member immediately, outside the
    /// queue. Inbound intents and tests use this path.
    pub fn dispatch_member_event(
        &mut self,
        id: MemberId,
        event: &MemberEvent,
    ) -> Result<(), EngineError> {
        let member = self.members.get_mut(id)?;
        member.dispatch(event, self.observer.as_mut());
        Ok(())
    }

    /// Translate an inbound intent into a state-machine event and deliver
    /// it to the target member.
    pub fn submit_intent(&mut self, intent: &Intent) -> Result<(), EngineError> {
        let event = intent.to_member_event();
        self.dispatch_member_event(intent.target, &event)
    }

    /// Interrupt a member's in-flight action: every not-yet-processed event
    /// tagged to that action is dropped; already-processed effects stay.
    /// Returns how many events were cancelled.
    pub fn interrupt_member(&mut self, id: MemberId) -> Result<usize, EngineError> {
        let member = self.members.get_mut(id)?;
        let Some(tag) = member.context.current_action.take() else {
            return Ok(0);
        };
        let cancelled = self.queue.cancel_tagged(&tag).len();
        tracing::debug!(member = %id, %tag, cancelled, "action interrupted");
        Ok(cancelled)
    }

    // -- effects ---------------------------------------------------------------------

    /// Schedule a buff's full event timeline against `target`, starting at
    /// the current frame.
    pub fn apply_buff(
        &mut self,
        buff: &skirmish_core::effect::BuffData,
        target: MemberId,
    ) -> Result<ActionTag, EngineError> {
        if !self.members.contains(target) {
            return Err(EngineError::UnknownMember { id: target });
        }
        self.executor
            .apply_buff(buff, target, self.current_frame, &mut self.queue)
    }

    /// Schedule a status effect's apply/remove pair against `target`.
    pub fn apply_status_effect(
        &mut self,
        effect: &skirmish_core::effect::StatusEffectData,
        target: MemberId,
    ) -> Result<ActionTag, EngineError> {
        if !self.members.contains(target) {
            return Err(EngineError::UnknownMember { id: target });
        }
        self.executor
            .apply_status_effect(effect, target, self.current_frame, &mut self.queue)
    }

    /// Queue a damage event against `target` at the current frame.
    pub fn enqueue_damage(
        &mut self,
        target: MemberId,
        amount: i64,
        damage_type: DamageType,
        source: MemberId,
    ) -> Result<EventId, EngineError> {
        let payload = serde_json::to_value(handlers::DamagePayload {
            amount,
            damage_type,
            source,
        })
        .map_err(|e| EngineError::Handler {
            event_type: EventType::Damage.to_string(),
            details: e.to_string(),
        })?;
        let id = self.queue.allocate_id();
        self.queue.insert(QueueEvent::new(
            id,
            self.current_frame,
            EventType::Damage,
            target,
            payload,
        ))?;
        Ok(id)
    }

    /// Queue a heal event against `target` at the current frame.
    pub fn enqueue_heal(
        &mut self,
        target: MemberId,
        amount: i64,
        source: MemberId,
    ) -> Result<EventId, EngineError> {
        let payload = serde_json::json!({ "amount": amount, "source": source });
        let id = self.queue.allocate_id();
        self.queue.insert(QueueEvent::new(
            id,
            self.current_frame,
            EventType::Heal,
            target,
            payload,
        ))?;
        Ok(id)
    }

    /// Queue an arbitrary event.
    pub fn enqueue(&mut self, event: QueueEvent) -> Result<(), EngineError> {
        self.queue.insert(event)
    }

    /// Reserve an event id for a manually built [`QueueEvent`].
    pub fn allocate_event_id(&mut self) -> EventId {
        self.queue.allocate_id()
    }

    /// Drop every not-yet-processed event carrying `tag` (dispels, aborted
    /// effect timelines). Returns the cancelled events.
    pub fn cancel_tagged(&mut self, tag: &ActionTag) -> Vec<QueueEvent> {
        self.queue.cancel_tagged(tag)
    }

    // -- configuration -----------------------------------------------------------------

    /// Rescales subsequent time deltas. 0 is equivalent to pausing: the
    /// loop stays running but accumulates nothing.
    pub fn set_time_scale(&mut self, time_scale: f64) {
        self.config.time_scale = time_scale.max(0.0);
    }

    /// Changes only the frame interval. Already-scheduled event frames are
    /// absolute and unaffected.
    pub fn set_target_fps(&mut self, fps: u32) {
        self.config.target_fps = fps.max(1);
    }

    pub fn set_frame_skip(&mut self, enabled: bool, max_skip: u32) {
        self.config.frame_skip_enabled = enabled;
        self.config.max_frame_skip = max_skip.max(1);
    }

    pub fn set_max_events_per_frame(&mut self, max: usize) {
        self.config.max_events_per_frame = max.max(1);
    }

    pub fn set_performance_monitoring(&mut self, enabled: bool) {
        self.config.performance_monitoring = enabled;
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // -- observation -------------------------------------------------------------------

    /// Attach the observation sink for member events and transitions.
    pub fn set_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observer = observer;
    }

    /// Attach the per-frame report listener. Fires every frame.
    pub fn set_frame_listener(&mut self, listener: impl FnMut(&FrameReport) + 'static) {
        self.frame_listener = Some(Box::new(listener));
    }

    /// Register (or replace) the handler for an event type.
    pub fn register_handler(&mut self, event_type: EventType, handler: Box<dyn EventHandler>) {
        self.handlers.insert(event_type, handler);
    }

    /// Make `function` callable from effect formulas as `name(arg, ...)`.
    /// Like handlers, registered functions survive restoring onto the same
    /// instance but must be re-registered on a fresh one.
    pub fn register_expression_function(
        &mut self,
        name: impl Into<String>,
        function: skirmish_expr::eval::NativeFn,
    ) {
        self.executor.register_function(name, function);
    }

    // -- accessors ---------------------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn telemetry(&self) -> &FrameTelemetry {
        &self.telemetry
    }

    pub fn telemetry_stats(&self) -> TelemetryStats {
        self.telemetry.stats()
    }

    pub(crate) fn set_state(&mut self, state: LoopState) {
        self.state = state;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn monster_definition(hp: f64) -> EntityDefinition {
        EntityDefinition {
            id: "mob".to_owned(),
            name: "Mob".to_owned(),
            kind: "monster".to_owned(),
            source_attributes: BTreeMap::from([("base_hp".to_owned(), hp)]),
        }
    }

    fn engine() -> FrameLoop {
        FrameLoop::new(SchedulerConfig::default(), 1)
    }

    // -- lifecycle ------------------------------------------------------------

    #[test]
    fn linear_state_transitions() {
        let mut engine = engine();
        assert_eq!(engine.state(), LoopState::Stopped);
        engine.start().unwrap();
        assert_eq!(engine.state(), LoopState::Running);
        engine.pause().unwrap();
        assert_eq!(engine.state(), LoopState::Paused);
        engine.resume().unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.state(), LoopState::Stopped);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut engine = engine();
        assert!(matches!(
            engine.pause(),
            Err(EngineError::InvalidLoopState { .. })
        ));
        assert!(matches!(
            engine.resume(),
            Err(EngineError::InvalidLoopState { .. })
        ));
        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(EngineError::InvalidLoopState { .. })
        ));
    }

    // -- accumulator ------------------------------------------------------------

    #[test]
    fn advance_processes_whole_frames_and_keeps_remainder() {
        let mut engine = engine();
        engine.start().unwrap();

        // 2.5 frame intervals at 60 fps.
        let frames = engine.advance(Duration::from_secs_f64(2.5 / 60.0));
        assert_eq!(frames, 2);
        assert_eq!(engine.current_frame(), 2);

        // The half interval stayed in the accumulator; 0.75 more pushes
        // exactly one frame over.
        let frames = engine.advance(Duration::from_secs_f64(0.75 / 60.0));
        assert_eq!(frames, 1);
        assert_eq!(engine.current_frame(), 3);
    }

    #[test]
    fn time_scale_zero_accumulates_nothing() {
        let mut engine = engine();
        engine.start().unwrap();
        engine.set_time_scale(0.0);

        assert_eq!(engine.advance(Duration::from_secs(10)), 0);
        assert_eq!(engine.current_frame(), 0);

        engine.set_time_scale(1.0);
        assert_eq!(engine.advance(Duration::from_secs_f64(1.0 / 60.0)), 1);
    }

    #[test]
    fn time_scale_doubles_simulated_time() {
        let mut engine = engine();
        engine.start().unwrap();
        // 6 owed frames would trip the default frame-skip clamp.
        engine.set_frame_skip(false, 5);
        engine.set_time_scale(2.0);
        // 3.2 intervals of wall clock become 6.4 of simulated time; the 0.4
        // slack keeps float drift away from the frame boundary.
        let frames = engine.advance(Duration::from_secs_f64(3.2 / 60.0));
        assert_eq!(frames, 6);
    }

    #[test]
    fn frame_skip_clamps_long_stalls() {
        let mut engine = engine();
        engine.start().unwrap();
        engine.set_frame_skip(true, 5);

        // A 2-second stall at 60 fps would owe 120 frames; the clamp leaves
        // exactly one interval.
        let frames = engine.advance(Duration::from_secs(2));
        assert_eq!(frames, 1);
    }

    #[test]
    fn frame_skip_disabled_replays_every_frame() {
        let mut engine = engine();
        engine.start().unwrap();
        engine.set_frame_skip(false, 5);
        // Half an interval of slack absorbs the float error accumulated by
        // 60 interval subtractions.
        let frames = engine.advance(Duration::from_secs_f64(60.5 / 60.0));
        assert_eq!(frames, 60);
    }

    #[test]
    fn paused_loop_advances_nothing_and_preserves_state() {
        let mut engine = engine();
        let target = engine.register_member(monster_definition(100.0), None).unwrap();
        engine.start().unwrap();
        engine
            .enqueue_damage(target, 10, DamageType::Physical, MemberId(0))
            .unwrap();
        engine.pause().unwrap();

        assert_eq!(engine.advance(Duration::from_secs(1)), 0);
        assert_eq!(engine.queue().pending_len(), 1);

        engine.resume().unwrap();
        engine.advance(Duration::from_secs_f64(1.0 / 60.0));
        assert_eq!(engine.member(target).unwrap().context.stats.hp, 90);
    }

    // -- step -----------------------------------------------------------------------

    #[test]
    fn step_requires_not_running() {
        let mut engine = engine();
        engine.start().unwrap();
        assert!(matches!(
            engine.step(),
            Err(EngineError::InvalidLoopState { .. })
        ));
        engine.pause().unwrap();
        let report = engine.step().unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(engine.current_frame(), 1);
    }

    // -- dispatch ---------------------------------------------------------------------

    #[test]
    fn damage_event_flows_through_handler_to_member() {
        let mut engine = engine();
        let target = engine.register_member(monster_definition(100.0), None).unwrap();
        engine
            .enqueue_damage(target, 30, DamageType::Physical, MemberId(0))
            .unwrap();

        engine.step().unwrap();
        assert_eq!(engine.member(target).unwrap().context.stats.hp, 70);
    }

    #[test]
    fn per_frame_cap_spills_overflow_to_next_frame() {
        let mut engine = engine();
        let target = engine.register_member(monster_definition(1000.0), None).unwrap();
        engine.set_max_events_per_frame(3);

        for _ in 0..5 {
            engine
                .enqueue_damage(target, 10, DamageType::Physical, MemberId(0))
                .unwrap();
        }

        let report = engine.step().unwrap();
        assert_eq!(report.events_processed, 3);
        assert_eq!(engine.member(target).unwrap().context.stats.hp, 970);

        let report = engine.step().unwrap();
        assert_eq!(report.events_processed, 2);
        assert_eq!(engine.member(target).unwrap().context.stats.hp, 950);
    }

    #[test]
    fn missing_handler_is_a_failed_dispatch_not_a_crash() {
        let mut engine = engine();
        let target = engine.register_member(monster_definition(100.0), None).unwrap();
        let id = engine.queue.allocate_id();
        engine
            .enqueue(QueueEvent::new(
                id,
                0,
                EventType::Custom("ai_pause".to_owned()),
                target,
                serde_json::Value::Null,
            ))
            .unwrap();

        let report = engine.step().unwrap();
        assert_eq!(report.events_processed, 1);
        assert_eq!(report.failed_dispatches, 1);
        // Retired regardless; never re-fires.
        assert_eq!(engine.queue().pending_len(), 0);
    }

    // -- telemetry ---------------------------------------------------------------------

    #[test]
    fn frame_listener_fires_every_frame() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut engine = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.set_frame_listener(move |report| sink.borrow_mut().push(report.frame));

        engine.step().unwrap();
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn monitoring_toggle_gates_the_ring_not_the_listener() {
        let mut engine = engine();
        engine.set_performance_monitoring(false);
        engine.step().unwrap();
        assert_eq!(engine.telemetry().total_frames(), 0);

        engine.set_performance_monitoring(true);
        engine.step().unwrap();
        assert_eq!(engine.telemetry().total_frames(), 1);
    }

    // -- interruption -------------------------------------------------------------------

    #[test]
    fn interrupt_cancels_only_the_members_tagged_events() {
        let mut engine = engine();
        let caster = engine.register_member(monster_definition(100.0), None).unwrap();
        let other = engine.register_member(monster_definition(100.0), None).unwrap();

        let tag = ActionTag::new("cast");
        engine
            .dispatch_member_event(
                caster,
                &MemberEvent::SkillStart {
                    skill: "meteor".to_owned(),
                    action_tag: tag.clone(),
                    mp_cost: 0,
                },
            )
            .unwrap();

        // Two events belong to the cast, one belongs to someone else.
        for frame in [10, 20] {
            let id = engine.queue.allocate_id();
            engine
                .enqueue(
                    QueueEvent::new(id, frame, EventType::Damage, other, serde_json::Value::Null)
                        .with_tag(tag.clone()),
                )
                .unwrap();
        }
        let id = engine.queue.allocate_id();
        engine
            .enqueue(QueueEvent::new(
                id,
                10,
                EventType::Damage,
                other,
                serde_json::Value::Null,
            ))
            .unwrap();

        assert_eq!(engine.interrupt_member(caster).unwrap(), 2);
        assert_eq!(engine.queue().pending_len(), 1);
        assert_eq!(
            engine.member(caster).unwrap().context.current_action,
            None
        );
        // Interrupting again is a no-op.
        assert_eq!(engine.interrupt_member(caster).unwrap(), 0);
    }
}
