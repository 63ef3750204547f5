//! Injected observation sink.
//!
//! The core is side-effect-free toward the outside world except through this
//! channel: transition actions never log on their own, they report to the
//! attached [`SimulationObserver`]. The default [`NoopObserver`] discards
//! everything, so observation costs nothing unless the host opts in.

use crate::event::MemberId;
use crate::member::{MemberEvent, MemberState};

// ---------------------------------------------------------------------------
// SimulationObserver
// ---------------------------------------------------------------------------

/// Receives member-level observations as the simulation runs.
///
/// All methods have empty default bodies; implement only what you need.
/// Calls are synchronous and happen inside the frame, so implementations
/// must not block.
pub trait SimulationObserver {
    /// A member event was delivered to a state machine, whether or not it
    /// changed state.
    fn on_member_event(&mut self, _member: MemberId, _event: &MemberEvent) {}

    /// A state machine changed state. `from != to` is guaranteed.
    fn on_transition(
        &mut self,
        _member: MemberId,
        _from: &MemberState,
        _to: &MemberState,
        _event: &MemberEvent,
    ) {
    }
}

// ---------------------------------------------------------------------------
// NoopObserver
// ---------------------------------------------------------------------------

/// The default observer: discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SimulationObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Records transitions and events into vectors. Intended for tests and
/// debugging sessions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<(MemberId, MemberEvent)>,
    pub transitions: Vec<(MemberId, MemberState, MemberState)>,
}

impl SimulationObserver for RecordingObserver {
    fn on_member_event(&mut self, member: MemberId, event: &MemberEvent) {
        self.events.push((member, event.clone()));
    }

    fn on_transition(
        &mut self,
        member: MemberId,
        from: &MemberState,
        to: &MemberState,
        _event: &MemberEvent,
    ) {
        self.transitions.push((member, from.clone(), to.clone()));
    }
}
