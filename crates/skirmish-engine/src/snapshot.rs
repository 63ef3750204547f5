//! Engine-level snapshot and restore with BLAKE3 hashing.
//!
//! Provides [`EngineSnapshot`] -- a serializable representation of the full
//! simulation state (members, event queue, effect executor with its random
//! stream, scheduler position and config) with a BLAKE3 content hash for
//! integrity verification and determinism testing.
//!
//! # Usage
//!
//! ```
//! use skirmish_engine::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let mut engine = FrameLoop::new(SchedulerConfig::default(), 9);
//! let hero = engine.register_member(EntityDefinition {
//!     id: "hero".into(),
//!     name: "Hero".into(),
//!     kind: "character".into(),
//!     source_attributes: BTreeMap::new(),
//! }, None).unwrap();
//!
//! for _ in 0..10 {
//!     engine.step().unwrap();
//! }
//!
//! let snapshot = engine.capture_snapshot();
//! assert_eq!(snapshot.frame, 10);
//! assert_eq!(snapshot.hash.len(), 64); // BLAKE3 hex digest
//!
//! for _ in 0..10 {
//!     engine.step().unwrap();
//! }
//! assert_eq!(engine.current_frame(), 20);
//!
//! engine.restore_from_snapshot(&snapshot).unwrap();
//! assert_eq!(engine.current_frame(), 10);
//! assert!(engine.members().contains(hero));
//! ```
//!
//! # What Is NOT Serialized
//!
//! - **Event handlers** (trait objects) -- the built-in set is always
//!   present; the caller must re-register custom handlers on a fresh
//!   `FrameLoop`. Restoring on the *same* instance retains them.
//! - **Observer and frame listener** (closures) -- retained on the same
//!   instance, must be re-attached on a fresh one.
//! - **Registered expression functions** -- the evaluator's random stream
//!   serializes, its function table does not; a deserialized evaluator has
//!   the builtins, and custom functions are re-registered by the host.
//! - **Telemetry** -- per-frame timing is transient and not snapshotted.

use serde::{Deserialize, Serialize};

use crate::executor::EffectExecutor;
use crate::queue::EventQueue;
use crate::registry::MemberRegistry;
use crate::scheduler::{FrameLoop, LoopState, SchedulerConfig};

// ---------------------------------------------------------------------------
// EngineSnapshot
// ---------------------------------------------------------------------------

/// A serializable snapshot of the full simulation state.
///
/// Contains every input the next frame depends on: member state, pending
/// and retired events, the executor's random stream, and the scheduler's
/// exact position in time -- plus a BLAKE3 hex digest of the serialized
/// state for integrity checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Frame counter at the time of capture.
    pub frame: u64,
    /// Unconsumed accumulator time, in seconds.
    pub accumulator_secs: f64,
    pub config: SchedulerConfig,
    pub loop_state: LoopState,
    /// All registered members, state machines included.
    pub members: MemberRegistry,
    /// The event queue, pending and retired entries alike.
    pub queue: EventQueue,
    /// The effect executor, including its random stream position.
    pub executor: EffectExecutor,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the serialized state.
    /// Used for determinism verification.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 hex digest of the hashable engine state.
///
/// The hash covers everything that affects simulation determinism. The
/// hash field itself is NOT included (it is derived).
fn compute_hash(
    frame: u64,
    accumulator_secs: f64,
    config: &SchedulerConfig,
    loop_state: LoopState,
    members: &MemberRegistry,
    queue: &EventQueue,
    executor: &EffectExecutor,
) -> String {
    // Serialize the hashable parts to a canonical JSON byte stream. A
    // deterministic struct wrapper keeps the hash stable.
    #[derive(Serialize)]
    struct HashableState<'a> {
        frame: u64,
        accumulator_secs: f64,
        config: &'a SchedulerConfig,
        loop_state: LoopState,
        members: &'a MemberRegistry,
        queue: &'a EventQueue,
        executor: &'a EffectExecutor,
    }

    let hashable = HashableState {
        frame,
        accumulator_secs,
        config,
        loop_state,
        members,
        queue,
        executor,
    };

    let json_bytes = serde_json::to_vec(&hashable)
        .expect("EngineSnapshot state should always be JSON-serializable");

    blake3::hash(&json_bytes).to_hex().to_string()
}

// ---------------------------------------------------------------------------
// FrameLoop snapshot/restore methods
// ---------------------------------------------------------------------------

impl FrameLoop {
    /// Capture a complete snapshot of the simulation state.
    ///
    /// The resulting [`EngineSnapshot`] can be serialized to JSON for
    /// storage, shipped to another process, or used to restore this (or
    /// another) `FrameLoop` to the captured state.
    pub fn capture_snapshot(&self) -> EngineSnapshot {
        let frame = self.current_frame();
        let accumulator_secs = self.accumulator;
        let config = self.config().clone();
        let loop_state = self.state();

        let hash = compute_hash(
            frame,
            accumulator_secs,
            &config,
            loop_state,
            &self.members,
            &self.queue,
            &self.executor,
        );

        EngineSnapshot {
            frame,
            accumulator_secs,
            config,
            loop_state,
            members: self.members.clone(),
            queue: self.queue.clone(),
            executor: self.executor.clone(),
            hash,
        }
    }

    /// Restore the simulation state from a previously captured snapshot.
    ///
    /// Before restoring, the snapshot's BLAKE3 hash is verified by
    /// recomputing it from the snapshot's data. On mismatch the restore is
    /// aborted and the `FrameLoop` is left untouched.
    ///
    /// Registered handlers, the observer, and the frame listener are
    /// retained; telemetry continues recording across the restore.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot's accumulator is non-finite or its
    /// hash does not match (corruption or tampering).
    pub fn restore_from_snapshot(&mut self, snapshot: &EngineSnapshot) -> anyhow::Result<()> {
        // Pre-validate before any state mutation.
        if !snapshot.accumulator_secs.is_finite() || snapshot.accumulator_secs < 0.0 {
            anyhow::bail!(
                "snapshot has invalid accumulator: {}. Must be non-negative and finite.",
                snapshot.accumulator_secs
            );
        }

        let expected_hash = compute_hash(
            snapshot.frame,
            snapshot.accumulator_secs,
            &snapshot.config,
            snapshot.loop_state,
            &snapshot.members,
            &snapshot.queue,
            &snapshot.executor,
        );
        if expected_hash != snapshot.hash {
            anyhow::bail!(
                "snapshot hash mismatch: recorded {} but recomputed {}. \
                 The snapshot may be corrupted or tampered with.",
                snapshot.hash,
                expected_hash
            );
        }

        self.current_frame = snapshot.frame;
        self.accumulator = snapshot.accumulator_secs;
        self.config = snapshot.config.clone();
        self.set_state(snapshot.loop_state);
        self.members = snapshot.members.clone();
        self.queue = snapshot.queue.clone();
        self.executor = snapshot.executor.clone();

        tracing::debug!(frame = snapshot.frame, "engine state restored from snapshot");
        Ok(())
    }

    /// Compute and return the BLAKE3 state hash without building a full
    /// snapshot. Equivalent to `capture_snapshot().hash` minus the clones.
    pub fn state_hash(&self) -> String {
        compute_hash(
            self.current_frame(),
            self.accumulator,
            self.config(),
            self.state(),
            &self.members,
            &self.queue,
            &self.executor,
        )
    }

    /// Fork the current simulation state for branching scenarios.
    ///
    /// Semantically identical to [`capture_snapshot`](Self::capture_snapshot)
    /// but named for workflows where the snapshot marks a divergence point
    /// rather than a save point.
    pub fn fork_snapshot(&self) -> EngineSnapshot {
        self.capture_snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
