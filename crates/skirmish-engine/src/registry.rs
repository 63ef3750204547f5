//! Member registry for one simulation instance.
//!
//! Members are stored in a BTreeMap so the scheduler's per-tick update pass
//! iterates in a deterministic id order. The registry is owned exclusively
//! by its engine instance; nothing outside mutates members directly.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use skirmish_core::event::MemberId;
use skirmish_core::kind::{EntityDefinition, StatOverrides};
use skirmish_core::member::Member;

use crate::EngineError;

// ---------------------------------------------------------------------------
// MemberRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberRegistry {
    members: BTreeMap<MemberId, Member>,
    next_member_id: u64,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a member from its entity definition and register it under a
    /// fresh id.
    ///
    /// # Errors
    ///
    /// Propagates [`skirmish_core::CoreError::UnsupportedKind`] for unknown
    /// kind discriminators.
    pub fn spawn(
        &mut self,
        definition: EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> Result<MemberId, EngineError> {
        self.next_member_id += 1;
        let id = MemberId(self.next_member_id);
        let member = Member::from_definition(id, definition, overrides)?;
        self.members.insert(id, member);
        Ok(id)
    }

    /// Register an already-constructed member under its own id.
    pub fn insert(&mut self, member: Member) -> Result<(), EngineError> {
        if self.members.contains_key(&member.id) {
            return Err(EngineError::DuplicateMember { id: member.id });
        }
        self.next_member_id = self.next_member_id.max(member.id.0);
        self.members.insert(member.id, member);
        Ok(())
    }

    /// Remove a member from the simulation. Its state machine stops and its
    /// pending buffer is dropped with it.
    pub fn remove(&mut self, id: MemberId) -> Result<Member, EngineError> {
        self.members
            .remove(&id)
            .ok_or(EngineError::UnknownMember { id })
    }

    pub fn get(&self, id: MemberId) -> Result<&Member, EngineError> {
        self.members
            .get(&id)
            .ok_or(EngineError::UnknownMember { id })
    }

    pub fn get_mut(&mut self, id: MemberId) -> Result<&mut Member, EngineError> {
        self.members
            .get_mut(&id)
            .ok_or(EngineError::UnknownMember { id })
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ids in deterministic (ascending) order.
    pub fn ids(&self) -> Vec<MemberId> {
        self.members.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &Member)> {
        self.members.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&MemberId, &mut Member)> {
        self.members.iter_mut()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
