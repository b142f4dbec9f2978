//! v1 cross-boundary contracts for the kernel, API facade, and persistence.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod combat;
pub mod dice;
pub mod patch;
pub mod world;

pub use combat::*;
pub use dice::*;
pub use patch::*;
pub use world::*;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Sea level on the integer elevation scale. Tiles below this are ocean
/// regardless of the biome matrix.
pub const SEA_LEVEL: i64 = 20;

/// Feet per grid tile.
pub const FEET_PER_TILE: i64 = 5;

/// Failure taxonomy shared by every tool handler. The kind string is stable
/// wire vocabulary; messages are human-readable and unstable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    ActionEconomy,
    Movement,
    Spatial,
    Rules,
    Conflict,
    Persistence,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelError {
    pub schema_version: String,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl KernelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(kind: ErrorKind, message: impl Into<String>, details: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            kind,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    pub fn action_economy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ActionEconomy, message)
    }

    pub fn movement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Movement, message)
    }

    pub fn spatial(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Spatial, message)
    }

    pub fn rules(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rules, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{:?}: {} ({details})", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for KernelError {}

/// A tool invocation as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Response envelope. The text is prose for humans; machine consumers
/// extract the delimited STATE_JSON block when one is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<KernelError>,
}

pub const STATE_JSON_OPEN: &str = "<!-- STATE_JSON";
pub const STATE_JSON_CLOSE: &str = "STATE_JSON -->";

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            error: None,
        }
    }

    /// Prose plus an embedded machine-readable state block.
    pub fn with_state(text: impl Into<String>, state: &Value) -> Self {
        let body = format!(
            "{}\n\n{STATE_JSON_OPEN}\n{state}\n{STATE_JSON_CLOSE}",
            text.into()
        );
        Self::text(body)
    }

    pub fn failure(error: KernelError) -> Self {
        let mut response = Self::text(format!("error[{:?}]: {}", error.kind, error.message));
        response.error = Some(error);
        response
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extract the embedded STATE_JSON block, if any.
    pub fn state_json(&self) -> Option<Value> {
        let text = &self.content.first()?.text;
        let start = text.find(STATE_JSON_OPEN)? + STATE_JSON_OPEN.len();
        let end = text[start..].find(STATE_JSON_CLOSE)? + start;
        serde_json::from_str(text[start..end].trim()).ok()
    }
}

/// One recorded tool invocation. Timestamps come from the simulation clock,
/// never wall time, so a log replays identically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<KernelError>,
    pub duration_ms: u64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    World,
    Combat,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::World => "world",
            EventTopic::Combat => "combat",
        }
    }
}

/// Typed event payloads published on the in-process bus and appended to the
/// event log. Tagged so consumers can match without string dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    WorldGenerated {
        world_id: String,
        seed: String,
        width: i64,
        height: i64,
        region_count: usize,
        structure_count: usize,
    },
    PatchApplied {
        world_id: String,
        commands_executed: usize,
    },
    EncounterStarted {
        encounter_id: String,
        turn_order: Vec<String>,
        round: u32,
    },
    TurnAdvanced {
        encounter_id: String,
        previous: String,
        current: String,
        round: u32,
    },
    AttackExecuted {
        encounter_id: String,
        attacker_id: String,
        target_id: String,
        hit: bool,
        critical: bool,
        damage: i64,
        target_hp_before: i64,
        target_hp_after: i64,
    },
    HealExecuted {
        encounter_id: String,
        actor_id: String,
        target_id: String,
        healed: i64,
        overflow: i64,
    },
    MovementExecuted {
        encounter_id: String,
        actor_id: String,
        from: GridPoint,
        to: GridPoint,
        cost_feet: i64,
        opportunity_attacks: usize,
    },
    ConditionApplied {
        encounter_id: String,
        target_id: String,
        condition: ConditionKind,
    },
    ConditionExpired {
        encounter_id: String,
        target_id: String,
        condition: ConditionKind,
        reason: String,
    },
    ConcentrationBroken {
        encounter_id: String,
        owner_id: String,
        spell_name: String,
    },
    AuraTriggered {
        encounter_id: String,
        aura_id: String,
        target_id: String,
        trigger: AuraTrigger,
    },
    ParticipantDefeated {
        encounter_id: String,
        participant_id: String,
    },
    EncounterEnded {
        encounter_id: String,
        rounds: u32,
        synced_characters: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub topic: EventTopic,
    pub sequence: u64,
    pub timestamp: String,
    pub payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_json_block_round_trips() {
        let state = json!({ "hp": 12, "round": 3 });
        let response = ToolResponse::with_state("goblin takes 8 damage", &state);
        assert_eq!(response.state_json(), Some(state));
    }

    #[test]
    fn response_without_block_has_no_state() {
        let response = ToolResponse::text("plain prose");
        assert!(response.state_json().is_none());
        assert!(!response.is_error());
    }

    #[test]
    fn failure_carries_kind() {
        let response = ToolResponse::failure(KernelError::not_found("no such encounter"));
        assert!(response.is_error());
        assert_eq!(response.error.as_ref().map(|e| e.kind), Some(ErrorKind::NotFound));
    }

    #[test]
    fn error_kind_serializes_screaming() {
        let raw = serde_json::to_string(&ErrorKind::ActionEconomy).expect("serialize");
        assert_eq!(raw, "\"ACTION_ECONOMY\"");
    }
}
