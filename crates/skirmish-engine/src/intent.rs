//! Inbound command translation.
//!
//! Hosts drive members through [`Intent`]s: a target plus a requested
//! action. An intent is not a queue event -- it is translated into a
//! state-machine event and delivered to the target immediately, where the
//! member's own transition table (guards included) decides whether the
//! action actually happens. A stunned member receiving a `Move` intent
//! simply refuses it.

use serde::{Deserialize, Serialize};

use skirmish_core::event::{ActionTag, MemberId};
use skirmish_core::member::MemberEvent;
use skirmish_core::stats::Position;

// ---------------------------------------------------------------------------
// IntentAction
// ---------------------------------------------------------------------------

/// What the host is asking the member to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentAction {
    Move { x: f64, y: f64 },
    UseSkill { skill: String, mp_cost: i64 },
    UseItem { item: String },
    Guard,
    Dodge,
    SwitchTarget { new_target: MemberId },
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// One inbound command against one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub target: MemberId,
    pub action: IntentAction,
    /// Free-form extras forwarded with custom actions.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Intent {
    pub fn new(target: MemberId, action: IntentAction) -> Self {
        Self {
            target,
            action,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// The state-machine event this intent becomes. Skill use gets a fresh
    /// action tag so that the effects it later schedules can be cancelled
    /// together if the cast is interrupted.
    pub fn to_member_event(&self) -> MemberEvent {
        match &self.action {
            IntentAction::Move { x, y } => MemberEvent::Move {
                position: Position { x: *x, y: *y },
            },
            IntentAction::UseSkill { skill, mp_cost } => MemberEvent::SkillStart {
                skill: skill.clone(),
                action_tag: ActionTag::new(format!("skill:{}:{skill}", self.target)),
                mp_cost: *mp_cost,
            },
            IntentAction::UseItem { item } => MemberEvent::Custom {
                name: "use_item".to_owned(),
                data: serde_json::json!({ "item": item, "params": self.params }),
            },
            IntentAction::Guard => MemberEvent::Custom {
                name: "guard".to_owned(),
                data: self.params.clone(),
            },
            IntentAction::Dodge => MemberEvent::Custom {
                name: "dodge".to_owned(),
                data: self.params.clone(),
            },
            IntentAction::SwitchTarget { new_target } => MemberEvent::Custom {
                name: "switch_target".to_owned(),
                data: serde_json::json!({ "new_target": new_target }),
            },
        }
    }
}
