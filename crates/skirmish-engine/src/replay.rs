//! Deterministic replay with intent recording and checkpoint verification.
//!
//! The replay system records inbound [`Intent`]s and periodic state hash
//! checkpoints during a battle, producing a [`ReplayLog`]. The log can then
//! be replayed against a [`FrameLoop`] to verify determinism: the replay
//! function restores the initial snapshot, feeds the recorded intents
//! frame-by-frame, and compares state hashes at each checkpoint.
//!
//! # Recording
//!
//! ```no_run
//! use skirmish_engine::prelude::*;
//!
//! let mut engine = FrameLoop::new(SchedulerConfig::default(), 4);
//!
//! let snapshot = engine.capture_snapshot();
//! let mut recorder = ReplayRecorder::new(snapshot, 10); // checkpoint every 10 frames
//!
//! for _ in 0..100 {
//!     let intents: Vec<Intent> = Vec::new(); // from the host, normally
//!     let frame = engine.current_frame();
//!     recorder.record_frame(frame, &intents, Some(engine.state_hash())).unwrap();
//!     for intent in &intents {
//!         engine.submit_intent(intent).unwrap();
//!     }
//!     engine.step().unwrap();
//! }
//!
//! let log = recorder.finish();
//! ```
//!
//! # Replaying
//!
//! ```no_run
//! use skirmish_engine::prelude::*;
//!
//! # let log: ReplayLog = todo!();
//! let mut engine = FrameLoop::new(SchedulerConfig::default(), 4);
//!
//! let result = replay(&mut engine, &log).expect("replay should succeed");
//! assert!(result.completed);
//! assert!(result.first_divergence.is_none());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::scheduler::{FrameLoop, LoopState};
use crate::snapshot::EngineSnapshot;

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// A complete replay log: initial snapshot plus an ordered sequence of
/// intents and checkpoints.
///
/// Fully serializable to JSON for storage, transmission, or regression test
/// fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// The engine snapshot captured at the start of recording. Replay
    /// begins by restoring this snapshot.
    pub initial_snapshot: EngineSnapshot,

    /// Total number of frames that were recorded. Replay executes exactly
    /// this many frames from the initial snapshot, regardless of how many
    /// entries exist.
    pub total_frames: u64,

    /// Ordered sequence of replay entries.
    pub entries: Vec<ReplayEntry>,
}

// ---------------------------------------------------------------------------
// ReplayEntry
// ---------------------------------------------------------------------------

/// A single entry in a [`ReplayLog`]: the intents submitted at one frame,
/// or a state hash checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplayEntry {
    /// The intents submitted at the given frame, in submission order.
    Intents { frame: u64, intents: Vec<Intent> },
    /// A state hash checkpoint taken at the given frame, before any of
    /// that frame's intents were submitted.
    Checkpoint { frame: u64, state_hash: String },
}

// ---------------------------------------------------------------------------
// ReplayResult
// ---------------------------------------------------------------------------

/// The outcome of replaying a [`ReplayLog`] against a [`FrameLoop`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether the replay ran to completion without divergence.
    pub completed: bool,
    /// The total number of frames replayed.
    pub frames_replayed: u64,
    /// The first checkpoint where the replayed state hash did not match
    /// the recorded hash. `None` if every checkpoint matched.
    pub first_divergence: Option<ReplayDivergence>,
}

/// Details about a determinism failure detected during replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDivergence {
    /// The frame at which the divergence was detected.
    pub frame: u64,
    /// The state hash recorded in the replay log at this frame.
    pub expected_hash: String,
    /// The state hash computed during replay at this frame.
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Records a battle into a [`ReplayLog`].
///
/// Create a recorder with an initial snapshot and a checkpoint interval.
/// Call [`record_frame`](Self::record_frame) before each frame, passing the
/// intents about to be submitted and (optionally) the current state hash.
/// When done, call [`finish`](Self::finish) to produce the log.
///
/// Frame numbers must be strictly increasing across calls.
pub struct ReplayRecorder {
    log: ReplayLog,
    /// How often (in frames) to record a checkpoint. 0 means "checkpoint
    /// whenever a hash is provided".
    checkpoint_interval: u64,
    frames_recorded: u64,
    last_frame: Option<u64>,
}

impl ReplayRecorder {
    pub fn new(snapshot: EngineSnapshot, checkpoint_interval: u64) -> Self {
        Self {
            log: ReplayLog {
                initial_snapshot: snapshot,
                total_frames: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            frames_recorded: 0,
            last_frame: None,
        }
    }

    /// Record one frame, before executing it.
    ///
    /// Intents are recorded if non-empty. A checkpoint is recorded if
    /// `state_hash` is provided and the frame falls on the checkpoint
    /// interval. The hash must be taken *before* submitting the intents --
    /// replay verifies checkpoints at the same point.
    ///
    /// # Errors
    ///
    /// Rejects a frame that is not strictly greater than the previous call's.
    pub fn record_frame(
        &mut self,
        frame: u64,
        intents: &[Intent],
        state_hash: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(prev) = self.last_frame {
            if frame <= prev {
                anyhow::bail!(
                    "record_frame: frame {frame} is not strictly greater than previous frame {prev}"
                );
            }
        }
        self.last_frame = Some(frame);
        self.frames_recorded += 1;

        if let Some(hash) = state_hash {
            let on_interval =
                self.checkpoint_interval == 0 || frame % self.checkpoint_interval == 0;
            if on_interval {
                self.log.entries.push(ReplayEntry::Checkpoint {
                    frame,
                    state_hash: hash,
                });
            }
        }

        if !intents.is_empty() {
            self.log.entries.push(ReplayEntry::Intents {
                frame,
                intents: intents.to_vec(),
            });
        }
        Ok(())
    }

    /// Finish recording and return the completed [`ReplayLog`].
    pub fn finish(mut self) -> ReplayLog {
        self.log.total_frames = self.frames_recorded;
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Replay a [`ReplayLog`] against a [`FrameLoop`], verifying determinism at
/// each checkpoint.
///
/// The function:
///
/// 1. Validates the log (no duplicate entries, no frame overflow) before
///    touching the engine -- on a validation error the engine is untouched.
/// 2. Restores the initial snapshot and parks the loop in `stopped` so the
///    frames can be driven by [`step`](FrameLoop::step).
/// 3. For each frame: checks any checkpoint, submits the recorded intents,
///    then executes the frame.
///
/// Replay stops at the first divergence but still reports the frames it
/// completed up to that point.
///
/// # Errors
///
/// Returns an error if the log is malformed, the snapshot restore fails,
/// or a recorded intent can no longer be submitted.
pub fn replay(engine: &mut FrameLoop, log: &ReplayLog) -> anyhow::Result<ReplayResult> {
    // Validate before mutating.
    let mut intent_map: BTreeMap<u64, &Vec<Intent>> = BTreeMap::new();
    let mut checkpoint_map: BTreeMap<u64, &String> = BTreeMap::new();

    for entry in &log.entries {
        match entry {
            ReplayEntry::Intents { frame, intents } => {
                if intent_map.insert(*frame, intents).is_some() {
                    anyhow::bail!("replay log contains duplicate Intents entry at frame {frame}");
                }
            }
            ReplayEntry::Checkpoint { frame, state_hash } => {
                if checkpoint_map.insert(*frame, state_hash).is_some() {
                    anyhow::bail!(
                        "replay log contains duplicate Checkpoint entry at frame {frame}"
                    );
                }
            }
        }
    }

    let start_frame = log.initial_snapshot.frame;
    let total_frames = log.total_frames;
    if total_frames == 0 {
        return Ok(ReplayResult {
            completed: true,
            frames_replayed: 0,
            first_divergence: None,
        });
    }
    let end_frame = start_frame.checked_add(total_frames).ok_or_else(|| {
        anyhow::anyhow!(
            "frame range overflow: start ({start_frame}) + total ({total_frames}) exceeds u64::MAX"
        )
    })?;

    engine
        .restore_from_snapshot(&log.initial_snapshot)
        .map_err(|e| anyhow::anyhow!("failed to restore initial snapshot for replay: {e}"))?;
    // Frames are driven by step(), which requires a non-running loop.
    engine.set_state(LoopState::Stopped);

    let mut frames_replayed: u64 = 0;
    for frame in start_frame..end_frame {
        // Checkpoints were recorded before the frame's intents were
        // submitted; verify at the same point.
        if let Some(expected_hash) = checkpoint_map.get(&frame).copied() {
            let actual_hash = engine.state_hash();
            if &actual_hash != expected_hash {
                return Ok(ReplayResult {
                    completed: false,
                    frames_replayed,
                    first_divergence: Some(ReplayDivergence {
                        frame,
                        expected_hash: expected_hash.clone(),
                        actual_hash,
                    }),
                });
            }
        }

        if let Some(intents) = intent_map.get(&frame) {
            for intent in intents.iter() {
                engine.submit_intent(intent).map_err(|e| {
                    anyhow::anyhow!("failed to resubmit intent at frame {frame}: {e}")
                })?;
            }
        }

        engine
            .step()
            .map_err(|e| anyhow::anyhow!("failed to execute frame {frame}: {e}"))?;
        frames_replayed += 1;
    }

    Ok(ReplayResult {
        completed: true,
        frames_replayed,
        first_divergence: None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
