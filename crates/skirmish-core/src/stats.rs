//! Combat stats owned by a member.
//!
//! [`MemberStats`] is the mutable numeric state of one combatant: resource
//! pools (hp/mp), offensive and defensive values, speeds, and position.
//! The values are seeded once from the attribute model when the member enters
//! the simulation and mutated exclusively through state-machine transition
//! actions afterwards.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A 2D position in simulation space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// MemberStats
// ---------------------------------------------------------------------------

/// The live numeric state of one combatant.
///
/// Resource pools are integers: damage and healing are applied in whole
/// points, with hp floored at 0 and capped at `max_hp`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberStats {
    pub hp: i64,
    pub max_hp: i64,
    pub mp: i64,
    pub max_mp: i64,
    pub physical_atk: i64,
    pub physical_def: i64,
    pub magical_atk: i64,
    pub magical_def: i64,
    pub attack_speed: f64,
    pub move_speed: f64,
    pub position: Position,
}

impl MemberStats {
    /// Apply `amount` points of damage. Hp never goes below 0.
    ///
    /// Returns the damage actually applied (may be less than `amount` if hp
    /// was already near 0). Negative amounts are treated as 0.
    pub fn apply_damage(&mut self, amount: i64) -> i64 {
        let applied = amount.max(0).min(self.hp);
        self.hp -= applied;
        applied
    }

    /// Apply `amount` points of healing. Hp never exceeds `max_hp`.
    ///
    /// Returns the healing actually applied. Negative amounts are treated
    /// as 0.
    pub fn apply_heal(&mut self, amount: i64) -> i64 {
        let applied = amount.max(0).min(self.max_hp - self.hp);
        self.hp += applied;
        applied
    }

    /// Look up a stat by its attribute name, as used in expression paths
    /// like `caster.physical_atk`.
    ///
    /// Returns `None` for names that do not map to a stat field.
    pub fn attribute(&self, name: &str) -> Option<f64> {
        let value = match name {
            "hp" => self.hp as f64,
            "max_hp" => self.max_hp as f64,
            "mp" => self.mp as f64,
            "max_mp" => self.max_mp as f64,
            "physical_atk" => self.physical_atk as f64,
            "physical_def" => self.physical_def as f64,
            "magical_atk" => self.magical_atk as f64,
            "magical_def" => self.magical_def as f64,
            "attack_speed" => self.attack_speed,
            "move_speed" => self.move_speed,
            "pos_x" => self.position.x,
            "pos_y" => self.position.y,
            _ => return None,
        };
        Some(value)
    }

    /// Overwrite a stat field by its attribute name with a freshly computed
    /// value. Integer stats are floored; hp/mp are re-clamped when their max
    /// changes.
    ///
    /// Returns `false` for names that do not map to a writable stat field.
    pub fn set_attribute(&mut self, name: &str, value: f64) -> bool {
        match name {
            "max_hp" => {
                self.max_hp = value.floor() as i64;
                self.hp = self.hp.min(self.max_hp);
            }
            "max_mp" => {
                self.max_mp = value.floor() as i64;
                self.mp = self.mp.min(self.max_mp);
            }
            "physical_atk" => self.physical_atk = value.floor() as i64,
            "physical_def" => self.physical_def = value.floor() as i64,
            "magical_atk" => self.magical_atk = value.floor() as i64,
            "magical_def" => self.magical_def = value.floor() as i64,
            "attack_speed" => self.attack_speed = value,
            "move_speed" => self.move_speed = value,
            _ => return false,
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
