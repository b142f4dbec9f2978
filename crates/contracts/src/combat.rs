//! Character, participant, condition, encounter, and aura records, plus the
//! action payloads and result traces exchanged with `combat.execute_action`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dice::{CheckResult, DiceRoll};
use crate::{KernelError, SCHEMA_VERSION_V1};

pub const DEFAULT_MOVEMENT_SPEED: i64 = 30;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

impl GridPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance in tiles — diagonal steps count as one.
    pub fn chebyshev(&self, other: &GridPoint) -> i64 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// True when `other` lies in this point's 8-neighborhood.
    pub fn adjacent(&self, other: &GridPoint) -> bool {
        self != other && self.chebyshev(other) <= 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbilityScores {
    pub str: i64,
    pub dex: i64,
    pub con: i64,
    pub int: i64,
    pub wis: i64,
    pub cha: i64,
}

impl AbilityScores {
    pub fn score(&self, ability: Ability) -> i64 {
        match ability {
            Ability::Str => self.str,
            Ability::Dex => self.dex,
            Ability::Con => self.con,
            Ability::Int => self.int,
            Ability::Wis => self.wis,
            Ability::Cha => self.cha,
        }
    }

    /// Standard 5e-style modifier: floor((score - 10) / 2).
    pub fn modifier(&self, ability: Ability) -> i64 {
        (self.score(ability) - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            str: 10,
            dex: 10,
            con: 10,
            int: 10,
            wis: 10,
            cha: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SpellSlot {
    pub current: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    pub schema_version: String,
    pub id: String,
    pub name: String,
    pub stats: AbilityScores,
    pub level: u32,
    pub hp: i64,
    pub max_hp: i64,
    pub ac: i64,
    #[serde(default)]
    pub proficiencies: Vec<String>,
    #[serde(default)]
    pub save_proficiencies: Vec<Ability>,
    #[serde(default)]
    pub spell_slots: BTreeMap<u8, SpellSlot>,
    #[serde(default)]
    pub resistances: BTreeSet<DamageType>,
    #[serde(default)]
    pub vulnerabilities: BTreeSet<DamageType>,
    #[serde(default)]
    pub immunities: BTreeSet<DamageType>,
}

impl Character {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.id.is_empty() || self.name.is_empty() {
            return Err(KernelError::validation("character id and name must be nonempty"));
        }
        if self.hp < 0 || self.max_hp < 1 || self.hp > self.max_hp {
            return Err(KernelError::validation(format!(
                "character {} hp {}/{} out of range",
                self.id, self.hp, self.max_hp
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Prone,
    Restrained,
    Stunned,
    Paralyzed,
    Unconscious,
    Petrified,
    Blinded,
    Deafened,
    Frightened,
    Grappled,
    Poisoned,
    Invisible,
    Incapacitated,
}

impl ConditionKind {
    /// Conditions that forbid taking actions and reactions entirely.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            ConditionKind::Stunned
                | ConditionKind::Paralyzed
                | ConditionKind::Unconscious
                | ConditionKind::Petrified
                | ConditionKind::Incapacitated
        )
    }

    /// Conditions that pin movement to zero.
    pub fn stops_movement(&self) -> bool {
        self.is_incapacitating()
            || matches!(self, ConditionKind::Restrained | ConditionKind::Grappled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DurationType {
    Rounds,
    StartOfTurn,
    EndOfTurn,
    SaveEnds,
    Permanent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EffectTrigger {
    StartOfTurn,
    EndOfTurn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OngoingEffectKind {
    Damage,
    Healing,
}

/// Recurring effect attached to a condition, fired at its trigger point.
/// Exactly one of `amount` / `dice` should be set; `dice` is rolled through
/// the kernel's seeded stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OngoingEffect {
    pub trigger: EffectTrigger,
    pub kind: OngoingEffectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub id: String,
    pub kind: ConditionKind,
    pub duration_type: DurationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_ability: Option<Ability>,
    #[serde(default)]
    pub ongoing_effects: Vec<OngoingEffect>,
}

impl Condition {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.duration_type == DurationType::Rounds && self.duration.is_none() {
            return Err(KernelError::validation(format!(
                "condition {}: rounds duration requires a duration count",
                self.id
            )));
        }
        if self.duration_type == DurationType::SaveEnds
            && (self.save_dc.is_none() || self.save_ability.is_none())
        {
            return Err(KernelError::validation(format!(
                "condition {}: save_ends requires save_dc and save_ability",
                self.id
            )));
        }
        for effect in &self.ongoing_effects {
            if effect.amount.is_none() && effect.dice.is_none() {
                return Err(KernelError::validation(format!(
                    "condition {}: ongoing effect needs amount or dice",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Caller-supplied participant seed for `combat.create_encounter`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantInit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub initiative_bonus: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enemy: Option<bool>,
    pub hp: i64,
    pub max_hp: i64,
    #[serde(default = "default_ac")]
    pub ac: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GridPoint>,
    #[serde(default = "default_speed")]
    pub movement_speed: i64,
    #[serde(default)]
    pub attack_bonus: i64,
    #[serde(default = "default_damage_expr")]
    pub damage_expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_character_id: Option<String>,
    #[serde(default)]
    pub save_bonuses: BTreeMap<Ability, i64>,
    #[serde(default)]
    pub resistances: BTreeSet<DamageType>,
    #[serde(default)]
    pub vulnerabilities: BTreeSet<DamageType>,
    #[serde(default)]
    pub immunities: BTreeSet<DamageType>,
}

fn default_ac() -> i64 {
    10
}

fn default_speed() -> i64 {
    DEFAULT_MOVEMENT_SPEED
}

fn default_damage_expr() -> String {
    "1d6".to_string()
}

impl ParticipantInit {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.id.is_empty() || self.name.is_empty() {
            return Err(KernelError::validation("participant id and name must be nonempty"));
        }
        if self.max_hp < 1 || self.hp < 0 || self.hp > self.max_hp {
            return Err(KernelError::validation(format!(
                "participant {} hp {}/{} out of range",
                self.id, self.hp, self.max_hp
            )));
        }
        if self.movement_speed < 0 {
            return Err(KernelError::validation(format!(
                "participant {} movement_speed must be >= 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// In-encounter shadow of a character. Lifetime is bounded by its encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub initiative_bonus: i64,
    pub initiative: i64,
    pub is_enemy: bool,
    pub hp: i64,
    pub max_hp: i64,
    pub ac: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GridPoint>,
    pub movement_speed: i64,
    pub movement_remaining: i64,
    pub action_used: bool,
    pub bonus_action_used: bool,
    pub reaction_used: bool,
    pub free_interaction_used: bool,
    pub has_dashed: bool,
    pub has_disengaged: bool,
    pub defeated: bool,
    pub attack_bonus: i64,
    pub damage_expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_character_id: Option<String>,
    #[serde(default)]
    pub save_bonuses: BTreeMap<Ability, i64>,
    #[serde(default)]
    pub resistances: BTreeSet<DamageType>,
    #[serde(default)]
    pub vulnerabilities: BTreeSet<DamageType>,
    #[serde(default)]
    pub immunities: BTreeSet<DamageType>,
}

impl Participant {
    pub fn save_bonus(&self, ability: Ability) -> i64 {
        self.save_bonuses.get(&ability).copied().unwrap_or(0)
    }

    pub fn has_condition(&self, kind: ConditionKind) -> bool {
        self.conditions.iter().any(|c| c.kind == kind)
    }

    pub fn is_incapacitated(&self) -> bool {
        self.conditions.iter().any(|c| c.kind.is_incapacitating())
    }

    pub fn effective_speed(&self) -> i64 {
        if self.conditions.iter().any(|c| c.kind.stops_movement()) {
            0
        } else {
            self.movement_speed
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerrainSpec {
    #[serde(default)]
    pub obstacles: BTreeSet<GridPoint>,
    #[serde(default)]
    pub difficult_terrain: BTreeSet<GridPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Active,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatState {
    pub schema_version: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<String>,
    pub seed: String,
    pub participants: BTreeMap<String, Participant>,
    pub turn_order: Vec<String>,
    pub current_turn_index: usize,
    pub round: u32,
    #[serde(default)]
    pub terrain: TerrainSpec,
    pub status: EncounterStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl CombatState {
    /// `turn_order` must be a permutation of participant ids and the cursor
    /// must index into it.
    pub fn validate(&self) -> Result<(), KernelError> {
        let order: BTreeSet<&String> = self.turn_order.iter().collect();
        let ids: BTreeSet<&String> = self.participants.keys().collect();
        if order != ids || self.turn_order.len() != self.participants.len() {
            return Err(KernelError::state(format!(
                "encounter {}: turn_order is not a permutation of participants",
                self.id
            )));
        }
        if self.turn_order.is_empty() || self.current_turn_index >= self.turn_order.len() {
            return Err(KernelError::state(format!(
                "encounter {}: turn index {} out of range",
                self.id, self.current_turn_index
            )));
        }
        Ok(())
    }

    pub fn current_turn_id(&self) -> &str {
        &self.turn_order[self.current_turn_index]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuraTrigger {
    Enter,
    Exit,
    StartOfTurn,
    EndOfTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuraEffect {
    pub trigger: AuraTrigger,
    pub kind: OngoingEffectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_ability: Option<Ability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aura {
    pub id: String,
    pub owner_id: String,
    pub spell_name: String,
    pub spell_level: u8,
    pub radius_feet: i64,
    pub affects_self: bool,
    pub affects_allies: bool,
    pub affects_enemies: bool,
    #[serde(default)]
    pub effects: Vec<AuraEffect>,
    pub requires_concentration: bool,
    pub started_at_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_rounds: Option<u32>,
}

/// Flat or dice-expression damage for an attack call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DamageSpec {
    Flat(i64),
    Expr(String),
}

/// Tagged action payload for `combat.execute_action`. String routing in the
/// wire form, exhaustive match in the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CombatAction {
    Attack {
        actor_id: String,
        target_id: String,
        attack_bonus: i64,
        dc: i64,
        damage: DamageSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        damage_type: Option<DamageType>,
        #[serde(default)]
        advantage: bool,
        #[serde(default)]
        disadvantage: bool,
        #[serde(default)]
        ranged: bool,
    },
    Heal {
        actor_id: String,
        target_id: String,
        amount: i64,
    },
    Move {
        actor_id: String,
        to: GridPoint,
    },
    Dash {
        actor_id: String,
    },
    Disengage {
        actor_id: String,
    },
}

impl CombatAction {
    pub fn actor_id(&self) -> &str {
        match self {
            CombatAction::Attack { actor_id, .. }
            | CombatAction::Heal { actor_id, .. }
            | CombatAction::Move { actor_id, .. }
            | CombatAction::Dash { actor_id }
            | CombatAction::Disengage { actor_id } => actor_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttackOutcome {
    pub attacker_id: String,
    pub target_id: String,
    pub check: CheckResult,
    pub hit: bool,
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_roll: Option<DiceRoll>,
    pub raw_damage: i64,
    pub damage_dealt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    pub target_hp_before: i64,
    pub target_hp_after: i64,
    pub target_defeated: bool,
    pub opportunity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealOutcome {
    pub actor_id: String,
    pub target_id: String,
    pub requested: i64,
    pub healed: i64,
    pub overflow: i64,
    pub target_hp_after: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveOutcome {
    pub actor_id: String,
    pub from: GridPoint,
    pub to: GridPoint,
    pub path: Vec<GridPoint>,
    pub cost_feet: i64,
    pub movement_remaining: i64,
    #[serde(default)]
    pub opportunity_attacks: Vec<AttackOutcome>,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutcome {
    Attack(AttackOutcome),
    Heal(HealOutcome),
    Move(MoveOutcome),
    Dash {
        actor_id: String,
        movement_remaining: i64,
    },
    Disengage {
        actor_id: String,
    },
}

/// Parameters for `combat.create_encounter`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateEncounterParams {
    pub seed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<String>,
    pub participants: Vec<ParticipantInit>,
    #[serde(default)]
    pub terrain: TerrainSpec,
}

impl CreateEncounterParams {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.seed.is_empty() {
            return Err(KernelError::validation("encounter seed must be nonempty"));
        }
        if self.participants.is_empty() {
            return Err(KernelError::validation("encounter needs at least one participant"));
        }
        let mut seen = BTreeSet::new();
        for init in &self.participants {
            init.validate()?;
            if !seen.insert(&init.id) {
                return Err(KernelError::validation(format!(
                    "duplicate participant id {}",
                    init.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: id.to_string(),
            initiative_bonus: 0,
            initiative: 10,
            is_enemy: false,
            hp: 10,
            max_hp: 10,
            ac: 10,
            conditions: Vec::new(),
            position: None,
            movement_speed: 30,
            movement_remaining: 30,
            action_used: false,
            bonus_action_used: false,
            reaction_used: false,
            free_interaction_used: false,
            has_dashed: false,
            has_disengaged: false,
            defeated: false,
            attack_bonus: 0,
            damage_expr: "1d6".to_string(),
            damage_type: None,
            source_character_id: None,
            save_bonuses: BTreeMap::new(),
            resistances: BTreeSet::new(),
            vulnerabilities: BTreeSet::new(),
            immunities: BTreeSet::new(),
        }
    }

    #[test]
    fn ability_modifier_floors() {
        let mut scores = AbilityScores::default();
        scores.dex = 15;
        assert_eq!(scores.modifier(Ability::Dex), 2);
        scores.dex = 8;
        assert_eq!(scores.modifier(Ability::Dex), -1);
        scores.dex = 7;
        assert_eq!(scores.modifier(Ability::Dex), -2);
    }

    #[test]
    fn turn_order_must_be_permutation() {
        let mut state = CombatState {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            id: "enc".to_string(),
            world_id: None,
            seed: "s".to_string(),
            participants: BTreeMap::new(),
            turn_order: Vec::new(),
            current_turn_index: 0,
            round: 1,
            terrain: TerrainSpec::default(),
            status: EncounterStatus::Active,
            created_at: "tick-000001".to_string(),
            updated_at: "tick-000001".to_string(),
        };
        state.participants.insert("a".to_string(), participant("a"));
        state.participants.insert("b".to_string(), participant("b"));
        state.turn_order = vec!["a".to_string()];
        assert!(state.validate().is_err());

        state.turn_order = vec!["b".to_string(), "a".to_string()];
        assert!(state.validate().is_ok());
    }

    #[test]
    fn action_payload_wire_shape() {
        let action: CombatAction = serde_json::from_value(serde_json::json!({
            "action": "attack",
            "actor_id": "hero",
            "target_id": "goblin",
            "attack_bonus": 5,
            "dc": 12,
            "damage": 8
        }))
        .expect("decodes");
        match action {
            CombatAction::Attack { damage: DamageSpec::Flat(8), .. } => {}
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn save_ends_requires_dc() {
        let condition = Condition {
            id: "c1".to_string(),
            kind: ConditionKind::Poisoned,
            duration_type: DurationType::SaveEnds,
            duration: None,
            save_dc: None,
            save_ability: None,
            ongoing_effects: Vec::new(),
        };
        assert!(condition.validate().is_err());
    }
}
