//! Combat engine. An [`Encounter`] owns its participants, turn order, auras,
//! and concentration slots; it is the sole authority over their mutation.
//! Every fallible operation validates completely before touching state, so a
//! failed call never leaves a half-applied action.

mod actions;
mod auras;
mod conditions;
mod turns;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use contracts::{
    CombatState, CreateEncounterParams, EncounterStatus, EventPayload, KernelError, Participant,
    SCHEMA_VERSION_V1,
};

use crate::dice;
use crate::rng::{hash_seed, SeedRng};

/// Name fragments that mark a participant as hostile when the caller does
/// not say. Advisory only; callers that care pass `is_enemy` explicitly.
const ENEMY_NAME_HINTS: [&str; 12] = [
    "goblin", "orc", "skeleton", "zombie", "bandit", "wolf", "kobold", "troll", "cultist",
    "spider", "wraith", "dragon",
];

pub fn guess_is_enemy(name: &str) -> bool {
    let lowered = name.to_lowercase();
    ENEMY_NAME_HINTS.iter().any(|hint| lowered.contains(hint))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnAdvance {
    pub previous: String,
    pub current: String,
    pub round: u32,
}

/// Hp synchronisation produced by `end_encounter`: participant final hp per
/// source character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncounterSummary {
    pub encounter_id: String,
    pub rounds: u32,
    pub synced_hp: BTreeMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct Encounter {
    pub state: CombatState,
    pub(crate) rng: SeedRng,
    pub(crate) auras: BTreeMap<String, contracts::Aura>,
    /// owner id -> spell name currently concentrated on.
    pub(crate) concentration: BTreeMap<String, String>,
    /// aura id -> participant ids currently inside.
    pub(crate) aura_membership: BTreeMap<String, std::collections::BTreeSet<String>>,
    pub(crate) next_aura_ordinal: u64,
    state_hash: u64,
}

impl Encounter {
    /// Roll initiative and assemble the turn order. The first participant's
    /// turn begins immediately, so its start-of-turn effects fire here.
    pub fn start(
        params: &CreateEncounterParams,
        created_at: String,
        sink: &mut Vec<EventPayload>,
    ) -> Result<Self, KernelError> {
        params.validate()?;

        let encounter_id = params
            .encounter_id
            .clone()
            .unwrap_or_else(|| format!("encounter:{:016x}", hash_seed(&params.seed)));

        let rng = SeedRng::from_seed(format!("{}-battle", params.seed));
        let mut initiative_rng = rng.fork("initiative");

        let mut participants = BTreeMap::new();
        let mut rolled: Vec<(i64, String)> = Vec::new();
        for init in &params.participants {
            let roll = dice::d20(&mut initiative_rng, init.initiative_bonus);
            let is_enemy = init.is_enemy.unwrap_or_else(|| guess_is_enemy(&init.name));
            rolled.push((roll.total, init.id.clone()));
            participants.insert(
                init.id.clone(),
                Participant {
                    id: init.id.clone(),
                    name: init.name.clone(),
                    initiative_bonus: init.initiative_bonus,
                    initiative: roll.total,
                    is_enemy,
                    hp: init.hp,
                    max_hp: init.max_hp,
                    ac: init.ac,
                    conditions: Vec::new(),
                    position: init.position,
                    movement_speed: init.movement_speed,
                    movement_remaining: init.movement_speed,
                    action_used: false,
                    bonus_action_used: false,
                    reaction_used: false,
                    free_interaction_used: false,
                    has_dashed: false,
                    has_disengaged: false,
                    defeated: init.hp == 0,
                    attack_bonus: init.attack_bonus,
                    damage_expr: init.damage_expr.clone(),
                    damage_type: init.damage_type,
                    source_character_id: init.source_character_id.clone(),
                    save_bonuses: init.save_bonuses.clone(),
                    resistances: init.resistances.clone(),
                    vulnerabilities: init.vulnerabilities.clone(),
                    immunities: init.immunities.clone(),
                },
            );
        }

        // Initiative descending, ties by id ascending.
        rolled.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let turn_order: Vec<String> = rolled.into_iter().map(|(_, id)| id).collect();

        let state = CombatState {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            id: encounter_id.clone(),
            world_id: params.world_id.clone(),
            seed: params.seed.clone(),
            participants,
            turn_order: turn_order.clone(),
            current_turn_index: 0,
            round: 1,
            terrain: params.terrain.clone(),
            status: EncounterStatus::Active,
            created_at: created_at.clone(),
            updated_at: created_at,
        };
        state.validate()?;

        let mut encounter = Self {
            state_hash: hash_seed(&encounter_id),
            state,
            rng,
            auras: BTreeMap::new(),
            concentration: BTreeMap::new(),
            aura_membership: BTreeMap::new(),
            next_aura_ordinal: 0,
        };

        sink.push(EventPayload::EncounterStarted {
            encounter_id,
            turn_order,
            round: 1,
        });

        let first = encounter.state.current_turn_id().to_string();
        encounter.process_start_of_turn(&first, sink)?;
        encounter.mix_hash(1);
        Ok(encounter)
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn state_hash(&self) -> u64 {
        self.state_hash
    }

    pub(crate) fn mix_hash(&mut self, salt: u64) {
        let mut hash = self.state_hash ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        for (id, participant) in &self.state.participants {
            hash ^= hash_seed(id).wrapping_mul(0x517c_c1b7_2722_0a95);
            hash = hash.rotate_left(17) ^ (participant.hp as u64);
            hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
            if let Some(position) = participant.position {
                hash ^= ((position.x as u64) << 32) | (position.y & 0xffff_ffff) as u64;
            }
            hash = hash.rotate_left(7) ^ participant.conditions.len() as u64;
        }
        hash ^= (self.state.round as u64) << 32 | self.state.current_turn_index as u64;
        self.state_hash = hash;
    }

    pub fn require_active(&self) -> Result<(), KernelError> {
        if self.state.status != EncounterStatus::Active {
            return Err(KernelError::state(format!(
                "encounter {} is not active",
                self.state.id
            )));
        }
        Ok(())
    }

    pub(crate) fn participant(&self, id: &str) -> Result<&Participant, KernelError> {
        self.state
            .participants
            .get(id)
            .ok_or_else(|| KernelError::not_found(format!("no participant {id}")))
    }

    pub(crate) fn participant_mut(&mut self, id: &str) -> Result<&mut Participant, KernelError> {
        self.state
            .participants
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(format!("no participant {id}")))
    }

    /// Sync hp back to source characters, clear auras, and mark completed.
    /// Participants without a source character drop silently.
    pub fn end(
        &mut self,
        updated_at: String,
        sink: &mut Vec<EventPayload>,
    ) -> Result<EncounterSummary, KernelError> {
        self.require_active()?;

        let mut synced_hp = BTreeMap::new();
        for participant in self.state.participants.values() {
            if let Some(character_id) = &participant.source_character_id {
                synced_hp.insert(character_id.clone(), participant.hp);
            }
        }

        self.auras.clear();
        self.aura_membership.clear();
        self.concentration.clear();
        self.state.status = EncounterStatus::Completed;
        self.state.updated_at = updated_at;

        sink.push(EventPayload::EncounterEnded {
            encounter_id: self.state.id.clone(),
            rounds: self.state.round,
            synced_characters: synced_hp.len(),
        });

        Ok(EncounterSummary {
            encounter_id: self.state.id.clone(),
            rounds: self.state.round,
            synced_hp,
        })
    }
}

/// Session-namespaced registry: the only shared mutable kernel state. Keys
/// are `session_id:encounter_id`.
#[derive(Debug, Default)]
pub struct EncounterRegistry {
    encounters: BTreeMap<String, Encounter>,
}

impl EncounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(session_id: &str, encounter_id: &str) -> String {
        format!("{session_id}:{encounter_id}")
    }

    pub fn insert(&mut self, session_id: &str, encounter: Encounter) -> Result<(), KernelError> {
        let key = Self::key(session_id, encounter.id());
        if self.encounters.contains_key(&key) {
            return Err(KernelError::conflict(format!(
                "encounter {} already exists in session {session_id}",
                encounter.id()
            )));
        }
        self.encounters.insert(key, encounter);
        Ok(())
    }

    pub fn get(&self, session_id: &str, encounter_id: &str) -> Result<&Encounter, KernelError> {
        self.encounters
            .get(&Self::key(session_id, encounter_id))
            .ok_or_else(|| KernelError::not_found(format!("no encounter {encounter_id}")))
    }

    pub fn get_mut(
        &mut self,
        session_id: &str,
        encounter_id: &str,
    ) -> Result<&mut Encounter, KernelError> {
        self.encounters
            .get_mut(&Self::key(session_id, encounter_id))
            .ok_or_else(|| KernelError::not_found(format!("no encounter {encounter_id}")))
    }

    pub fn remove(&mut self, session_id: &str, encounter_id: &str) -> Option<Encounter> {
        self.encounters.remove(&Self::key(session_id, encounter_id))
    }

    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }

    /// Combined digest over every live encounter, for replay verification.
    pub fn digest(&self) -> u64 {
        let mut digest = 0_u64;
        for (key, encounter) in &self.encounters {
            digest ^= hash_seed(key).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            digest = digest.rotate_left(13) ^ encounter.state_hash();
        }
        digest
    }
}
