//! Frame-indexed, priority-ordered event queue.
//!
//! The queue owns every scheduled [`QueueEvent`] in a simulation instance.
//! Due events are returned ordered by execute frame, then priority tier
//! (critical > high > normal > low), then insertion order -- a monotonic
//! sequence number pins the tie-break so same-frame, same-tier ordering is
//! never left to incidental container order.
//!
//! Dispatched events are retired with [`mark_processed`](EventQueue::mark_processed)
//! rather than removed, so telemetry and debugging can inspect them until
//! the next [`cleanup`](EventQueue::cleanup). Tag-based cancellation drops
//! every not-yet-processed event of an interrupted action and never touches
//! processed ones.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use skirmish_core::event::{ActionTag, EventId, EventPriority, QueueEvent};

use crate::EngineError;

// ---------------------------------------------------------------------------
// StoredEvent
// ---------------------------------------------------------------------------

/// A queued event plus its dispatch bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event: QueueEvent,
    /// Insertion sequence, the final ordering tie-break.
    pub seq: u64,
    pub processed: bool,
    /// Dispatch duration in microseconds, recorded at mark-processed time.
    pub processing_us: Option<u64>,
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// The scheduler's sole source of "what must happen now".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueue {
    /// All stored events, keyed by insertion sequence.
    entries: BTreeMap<u64, StoredEvent>,
    /// Pending-event ordering index. Entries are removed on dispatch and
    /// cancellation, so a range scan yields exactly the pending set.
    index: BTreeSet<(u64, EventPriority, u64)>,
    /// Event id -> sequence, also the duplicate-id check.
    ids: BTreeMap<EventId, u64>,
    next_seq: u64,
    next_event_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next unique event id.
    pub fn allocate_id(&mut self) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        id
    }

    /// Schedule an event.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateEventId`] if the id is already queued --
    /// collisions are rejected, never overwritten.
    pub fn insert(&mut self, event: QueueEvent) -> Result<(), EngineError> {
        if self.ids.contains_key(&event.id) {
            return Err(EngineError::DuplicateEventId { id: event.id });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        // Keep id allocation ahead of externally-constructed ids so a later
        // allocate_id can never collide.
        self.next_event_id = self.next_event_id.max(event.id.0 + 1);

        self.index.insert((event.execute_frame, event.priority, seq));
        self.ids.insert(event.id, seq);
        self.entries.insert(
            seq,
            StoredEvent {
                event,
                seq,
                processed: false,
                processing_us: None,
            },
        );
        Ok(())
    }

    /// Return up to `max` due events (`execute_frame <= frame`), ordered by
    /// frame, then priority tier, then insertion order.
    ///
    /// Events stay pending until [`mark_processed`](Self::mark_processed);
    /// the cap bounds per-tick work, and the overflow is picked up by later
    /// ticks.
    pub fn due_events(&self, frame: u64, max: usize) -> Vec<QueueEvent> {
        self.index
            .range(..=(frame, EventPriority::Low, u64::MAX))
            .take(max)
            .filter_map(|(_, _, seq)| self.entries.get(seq))
            .map(|stored| stored.event.clone())
            .collect()
    }

    /// Retire a dispatched event. It stays inspectable in the store until
    /// [`cleanup`](Self::cleanup) but is no longer pending -- it never
    /// re-fires.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEvent`] if the id is not queued.
    pub fn mark_processed(
        &mut self,
        id: EventId,
        processing_time: Option<Duration>,
    ) -> Result<(), EngineError> {
        let seq = *self
            .ids
            .get(&id)
            .ok_or(EngineError::UnknownEvent { id })?;
        let stored = self.entries.get_mut(&seq).expect("ids and entries agree");
        stored.processed = true;
        stored.processing_us = processing_time.map(crate::telemetry::as_micros);
        self.index
            .remove(&(stored.event.execute_frame, stored.event.priority, seq));
        Ok(())
    }

    /// Purge retired events. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let retired: Vec<u64> = self
            .entries
            .values()
            .filter(|s| s.processed)
            .map(|s| s.seq)
            .collect();
        for seq in &retired {
            if let Some(stored) = self.entries.remove(seq) {
                self.ids.remove(&stored.event.id);
            }
        }
        retired.len()
    }

    /// Remove every not-yet-processed event carrying `tag`. Processed
    /// events are left untouched -- no retroactive undo. Returns the
    /// cancelled events, in insertion order.
    pub fn cancel_tagged(&mut self, tag: &ActionTag) -> Vec<QueueEvent> {
        let doomed: Vec<u64> = self
            .entries
            .values()
            .filter(|s| !s.processed && s.event.action_tag.as_ref() == Some(tag))
            .map(|s| s.seq)
            .collect();
        let mut cancelled = Vec::with_capacity(doomed.len());
        for seq in &doomed {
            if let Some(stored) = self.entries.remove(seq) {
                self.index
                    .remove(&(stored.event.execute_frame, stored.event.priority, *seq));
                self.ids.remove(&stored.event.id);
                cancelled.push(stored.event);
            }
        }
        cancelled
    }

    /// Number of pending (not yet processed) events.
    pub fn pending_len(&self) -> usize {
        self.index.len()
    }

    /// Number of stored events, retired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.ids.contains_key(&id)
    }

    /// Iterate stored events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> {
        self.entries.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::event::{EventType, MemberId};

    fn event(id: u64, frame: u64) -> QueueEvent {
        QueueEvent::new(
            EventId(id),
            frame,
            EventType::Damage,
            MemberId(1),
            serde_json::Value::Null,
        )
    }

    // -- insertion ----------------------------------------------------------

    #[test]
    fn duplicate_id_is_rejected() {
        let mut queue = EventQueue::new();
        queue.insert(event(7, 10)).unwrap();
        let err = queue.insert(event(7, 20)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DuplicateEventId { id: EventId(7) }
        ));
        // Original event untouched.
        assert_eq!(queue.due_events(20, 10)[0].execute_frame, 10);
    }

    #[test]
    fn allocate_id_never_collides_with_inserted_ids() {
        let mut queue = EventQueue::new();
        queue.insert(event(100, 1)).unwrap();
        let id = queue.allocate_id();
        assert!(id.0 > 100);
    }

    // -- ordering -------------------------------------------------------------

    #[test]
    fn due_events_ordered_by_frame_then_priority_then_insertion() {
        let mut queue = EventQueue::new();
        queue
            .insert(event(1, 20).with_priority(EventPriority::Critical))
            .unwrap();
        queue
            .insert(event(2, 10).with_priority(EventPriority::Low))
            .unwrap();
        queue
            .insert(event(3, 10).with_priority(EventPriority::Critical))
            .unwrap();
        queue
            .insert(event(4, 10).with_priority(EventPriority::Critical))
            .unwrap();

        let due = queue.due_events(20, 10);
        let ids: Vec<u64> = due.iter().map(|e| e.id.0).collect();
        // Frame 10 first; critical before low; 3 before 4 by insertion.
        assert_eq!(ids, vec![3, 4, 2, 1]);
    }

    #[test]
    fn due_events_respects_cap_and_frame_bound() {
        let mut queue = EventQueue::new();
        for i in 0..10 {
            queue.insert(event(i, i)).unwrap();
        }
        let due = queue.due_events(4, 3);
        assert_eq!(due.len(), 3);
        for e in &due {
            assert!(e.execute_frame <= 4);
        }
        // Nothing due yet at frame 0? Event 0 is.
        assert_eq!(queue.due_events(0, 10).len(), 1);
    }

    #[test]
    fn future_events_are_invisible() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 100)).unwrap();
        assert!(queue.due_events(99, 10).is_empty());
        assert_eq!(queue.due_events(100, 10).len(), 1);
    }

    // -- processing lifecycle ---------------------------------------------------

    #[test]
    fn processed_events_never_refire() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 5)).unwrap();
        queue
            .mark_processed(EventId(1), Some(Duration::from_micros(12)))
            .unwrap();

        assert!(queue.due_events(10, 10).is_empty());
        // Still inspectable until cleanup.
        assert!(queue.contains(EventId(1)));
        assert_eq!(queue.iter().next().unwrap().processing_us, Some(12));

        assert_eq!(queue.cleanup(), 1);
        assert!(!queue.contains(EventId(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn mark_processed_unknown_id_fails() {
        let mut queue = EventQueue::new();
        assert!(matches!(
            queue.mark_processed(EventId(9), None),
            Err(EngineError::UnknownEvent { .. })
        ));
    }

    // -- cancellation -------------------------------------------------------------

    #[test]
    fn cancel_tagged_removes_only_pending_tagged_events() {
        let mut queue = EventQueue::new();
        let tag = ActionTag::new("m1:fireball:0");

        queue.insert(event(1, 10).with_tag(tag.clone())).unwrap();
        queue.insert(event(2, 20).with_tag(tag.clone())).unwrap();
        queue
            .insert(event(3, 20).with_tag(ActionTag::new("m2:slash:0")))
            .unwrap();
        queue.insert(event(4, 20)).unwrap();

        // Event 1 already fired.
        queue.mark_processed(EventId(1), None).unwrap();

        let cancelled = queue.cancel_tagged(&tag);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, EventId(2));
        assert!(!queue.contains(EventId(2)));
        // Processed event untouched, other tags and untagged untouched.
        assert!(queue.contains(EventId(1)));
        assert!(queue.contains(EventId(3)));
        assert!(queue.contains(EventId(4)));
        assert_eq!(queue.pending_len(), 2);
    }

    // -- snapshot roundtrip ---------------------------------------------------------

    #[test]
    fn queue_survives_serialization() {
        let mut queue = EventQueue::new();
        queue
            .insert(event(1, 10).with_priority(EventPriority::High))
            .unwrap();
        queue.insert(event(2, 5)).unwrap();
        queue.mark_processed(EventId(2), None).unwrap();

        let json = serde_json::to_string(&queue).unwrap();
        let restored: EventQueue = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.pending_len(), 1);
        assert!(restored.contains(EventId(1)));
        assert!(restored.contains(EventId(2)));
        let due = restored.due_events(10, 10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, EventId(1));
    }
}
