//! Per-kind member behavior.
//!
//! Each concrete entity kind supplies two capabilities: computing base stats
//! from the entity definition, and reacting to events in a kind-specific way
//! on top of the base state machine. This is a closed tagged union, not open
//! dynamic dispatch: the [`EntityKind`] enum is the full set of kinds the
//! engine understands, and the factory fails fast on anything else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttrData, AttributeSet};
use crate::member::{MemberContext, MemberEvent};
use crate::stats::MemberStats;
use crate::CoreError;

// ---------------------------------------------------------------------------
// EntityDefinition
// ---------------------------------------------------------------------------

/// Read-only entity descriptor supplied by the external data layer.
///
/// Consumed once at member construction; the simulation never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    pub name: String,
    /// Kind discriminator ("character", "monster"). Unknown values are an
    /// unsupported-kind error at construction.
    pub kind: String,
    /// Kind-specific source attributes (a character's core stats, a
    /// monster's base hp, ...).
    pub source_attributes: BTreeMap<String, f64>,
}

/// Optional per-instance overrides applied on top of the definition's
/// source attributes before base stats are derived.
pub type StatOverrides = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Monster,
}

impl EntityKind {
    /// Parse the definition's kind discriminator.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedKind`] for unknown discriminators.
    pub fn parse(kind: &str) -> Result<Self, CoreError> {
        match kind {
            "character" => Ok(EntityKind::Character),
            "monster" => Ok(EntityKind::Monster),
            other => Err(CoreError::UnsupportedKind {
                kind: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemberBaseStats
// ---------------------------------------------------------------------------

/// The output of base-stat computation: the attribute model plus the stats
/// seeded from its computed totals.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBaseStats {
    pub attributes: AttributeSet,
    pub stats: MemberStats,
}

// ---------------------------------------------------------------------------
// KindBehavior
// ---------------------------------------------------------------------------

/// Tagged union of kind-specific capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KindBehavior {
    Character(CharacterBehavior),
    Monster(MonsterBehavior),
}

impl KindBehavior {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Character => KindBehavior::Character(CharacterBehavior),
            EntityKind::Monster => KindBehavior::Monster(MonsterBehavior),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            KindBehavior::Character(_) => EntityKind::Character,
            KindBehavior::Monster(_) => EntityKind::Monster,
        }
    }

    /// Compute the attribute model and seed stats for a fresh member.
    pub fn compute_base_stats(
        &self,
        definition: &EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> MemberBaseStats {
        match self {
            KindBehavior::Character(b) => b.compute_base_stats(definition, overrides),
            KindBehavior::Monster(b) => b.compute_base_stats(definition, overrides),
        }
    }

    /// Kind-specific reaction, invoked after the base transition actions of
    /// the same event. Fully synchronous.
    pub fn handle_kind_event(&self, context: &mut MemberContext, event: &MemberEvent) {
        match self {
            KindBehavior::Character(b) => b.handle_kind_event(context, event),
            KindBehavior::Monster(b) => b.handle_kind_event(context, event),
        }
    }

    /// Whether members of this kind enter the simulation active.
    pub fn starts_active(&self) -> bool {
        match self {
            KindBehavior::Character(_) => true,
            // Monsters idle until provoked by damage.
            KindBehavior::Monster(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// CharacterBehavior
// ---------------------------------------------------------------------------

/// Player characters: base stats derived from core stats (strength,
/// agility, intelligence, vitality); skills cost mp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterBehavior;

impl CharacterBehavior {
    fn compute_base_stats(
        &self,
        definition: &EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> MemberBaseStats {
        let core = |name: &str, default: f64| source_value(definition, overrides, name, default);

        let strength = core("strength", 10.0);
        let agility = core("agility", 10.0);
        let intelligence = core("intelligence", 10.0);
        let vitality = core("vitality", 10.0);

        let mut attributes = AttributeSet::new();
        attributes.insert(AttrData::new("max_hp", vitality * 10.0));
        attributes.insert(AttrData::new("max_mp", intelligence * 5.0));
        attributes.insert(AttrData::new("physical_atk", strength * 2.0));
        attributes.insert(AttrData::new("physical_def", (strength + vitality) / 2.0));
        attributes.insert(AttrData::new("magical_atk", intelligence * 2.0));
        attributes.insert(AttrData::new("magical_def", (intelligence + vitality) / 2.0));
        attributes.insert(AttrData::new("attack_speed", 1.0 + agility * 0.01));
        attributes.insert(AttrData::new("move_speed", 3.0 + agility * 0.02));

        MemberBaseStats {
            stats: seed_stats(&attributes),
            attributes,
        }
    }

    fn handle_kind_event(&self, context: &mut MemberContext, event: &MemberEvent) {
        // Characters pay the declared mp cost when a skill starts.
        if let MemberEvent::SkillStart { mp_cost, .. } = event {
            let cost = (*mp_cost).max(0);
            context.stats.mp = (context.stats.mp - cost).max(0);
        }
    }
}

// ---------------------------------------------------------------------------
// MonsterBehavior
// ---------------------------------------------------------------------------

/// Hostile creatures: base stats read directly from the definition; idle
/// until provoked by damage; skills cost nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterBehavior;

impl MonsterBehavior {
    fn compute_base_stats(
        &self,
        definition: &EntityDefinition,
        overrides: Option<&StatOverrides>,
    ) -> MemberBaseStats {
        let base = |name: &str, default: f64| source_value(definition, overrides, name, default);

        let mut attributes = AttributeSet::new();
        attributes.insert(AttrData::new("max_hp", base("base_hp", 100.0)));
        attributes.insert(AttrData::new("max_mp", base("base_mp", 0.0)));
        attributes.insert(AttrData::new("physical_atk", base("base_physical_atk", 10.0)));
        attributes.insert(AttrData::new("physical_def", base("base_physical_def", 0.0)));
        attributes.insert(AttrData::new("magical_atk", base("base_magical_atk", 0.0)));
        attributes.insert(AttrData::new("magical_def", base("base_magical_def", 0.0)));
        attributes.insert(AttrData::new("attack_speed", base("attack_speed", 1.0)));
        attributes.insert(AttrData::new("move_speed", base("move_speed", 2.0)));

        MemberBaseStats {
            stats: seed_stats(&attributes),
            attributes,
        }
    }

    fn handle_kind_event(&self, context: &mut MemberContext, event: &MemberEvent) {
        // Taking damage provokes an idle monster.
        if matches!(event, MemberEvent::Damage { .. }) && context.is_alive {
            context.is_active = true;
        }
    }
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn source_value(
    definition: &EntityDefinition,
    overrides: Option<&StatOverrides>,
    name: &str,
    default: f64,
) -> f64 {
    overrides
        .and_then(|o| o.get(name))
        .or_else(|| definition.source_attributes.get(name))
        .copied()
        .unwrap_or(default)
}

/// Seed live stats from the attribute model's computed totals. Integer
/// stats take the floored dynamic total; speeds take the raw total.
fn seed_stats(attributes: &AttributeSet) -> MemberStats {
    let int_total = |name: &str| {
        attributes
            .get(name)
            .map(|a| a.dynamic_total_value() as i64)
            .unwrap_or(0)
    };
    let raw_total = |name: &str| {
        attributes
            .get(name)
            .map(|a| a.dynamic_total_raw())
            .unwrap_or(0.0)
    };

    let max_hp = int_total("max_hp");
    let max_mp = int_total("max_mp");
    MemberStats {
        hp: max_hp,
        max_hp,
        mp: max_mp,
        max_mp,
        physical_atk: int_total("physical_atk"),
        physical_def: int_total("physical_def"),
        magical_atk: int_total("magical_atk"),
        magical_def: int_total("magical_def"),
        attack_speed: raw_total("attack_speed"),
        move_speed: raw_total("move_speed"),
        position: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
