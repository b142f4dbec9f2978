//! `combat.*` handlers. Encounters live in the session-namespaced registry;
//! the store keeps a snapshot per committed mutation so a crashed session
//! can be inspected, but the registry is authoritative while the encounter
//! is active.

use serde::Deserialize;
use serde_json::{json, Value};

use contracts::{CombatAction, CreateEncounterParams, KernelError};

use super::decode_args;
use crate::{KernelApi, StoreError};

#[derive(Debug, Deserialize)]
struct EncounterRefArgs {
    encounter_id: String,
}

impl KernelApi {
    pub(crate) fn handle_create_encounter(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: CreateEncounterParams = decode_args("combat.createEncounter", args)?;
        let created_at = self.clock.next_stamp();

        let mut sink = Vec::new();
        let encounter = kernel_core::combat::Encounter::start(&params, created_at, &mut sink)?;
        let state_record = encounter.state.clone();

        let session_id = self.session_id.clone();
        self.registry.insert(&session_id, encounter)?;

        // Store write is part of the commit; undo the registry insert if it
        // fails so no partial state survives.
        if let Err(err) = self.store.save_encounter(&state_record) {
            self.registry.remove(&session_id, &state_record.id);
            return Err(StoreError::into_kernel_error(err));
        }

        let prose = format!(
            "Encounter {} started: round 1, {} participants, {} acts first.",
            state_record.id,
            state_record.participants.len(),
            state_record.current_turn_id(),
        );
        let state = json!({
            "encounter_id": state_record.id,
            "turn_order": state_record.turn_order,
            "round": state_record.round,
            "current_turn": state_record.current_turn_id(),
            "initiative": state_record
                .turn_order
                .iter()
                .map(|id| json!({ "id": id, "initiative": state_record.participants[id].initiative }))
                .collect::<Vec<_>>(),
        });
        self.publish_all(sink);
        Ok((prose, state))
    }

    pub(crate) fn handle_get_encounter_state(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: EncounterRefArgs = decode_args("combat.getEncounterState", args)?;
        let encounter = self.registry.get(&self.session_id, &params.encounter_id)?;
        let record = &encounter.state;
        let prose = format!(
            "Encounter {}: round {}, {}'s turn, {} participants.",
            record.id,
            record.round,
            record.current_turn_id(),
            record.participants.len(),
        );
        let state = serde_json::to_value(record).map_err(|err| {
            KernelError::with_details(
                contracts::ErrorKind::Persistence,
                "failed to serialize encounter",
                err.to_string(),
            )
        })?;
        Ok((prose, state))
    }

    pub(crate) fn handle_execute_action(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let reference: EncounterRefArgs = decode_args("combat.executeAction", args)?;
        let action: CombatAction = decode_args("combat.executeAction", args)?;

        let stamp = self.clock.next_stamp();
        let session_id = self.session_id.clone();
        let mut sink = Vec::new();
        let encounter = self.registry.get_mut(&session_id, &reference.encounter_id)?;
        let outcome = encounter.execute(&action, &mut sink)?;
        encounter.state.updated_at = stamp;
        let snapshot = encounter.state.clone();

        if let Err(err) = self.store.save_encounter(&snapshot) {
            tracing::warn!(encounter = %snapshot.id, error = %err, "encounter snapshot failed");
        }

        let prose = describe_outcome(&outcome);
        let state = json!({
            "encounter_id": snapshot.id,
            "round": snapshot.round,
            "current_turn": snapshot.current_turn_id(),
            "outcome": outcome,
        });
        self.publish_all(sink);
        Ok((prose, state))
    }

    pub(crate) fn handle_advance_turn(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: EncounterRefArgs = decode_args("combat.advanceTurn", args)?;
        let stamp = self.clock.next_stamp();
        let session_id = self.session_id.clone();
        let mut sink = Vec::new();
        let encounter = self.registry.get_mut(&session_id, &params.encounter_id)?;
        let advance = encounter.advance_turn(&mut sink)?;
        encounter.state.updated_at = stamp;
        let snapshot = encounter.state.clone();

        if let Err(err) = self.store.save_encounter(&snapshot) {
            tracing::warn!(encounter = %snapshot.id, error = %err, "encounter snapshot failed");
        }

        let prose = format!(
            "Turn passes from {} to {}; round {}.",
            advance.previous, advance.current, advance.round,
        );
        let state = json!({
            "encounter_id": snapshot.id,
            "previous_turn": advance.previous,
            "current_turn": advance.current,
            "round": advance.round,
        });
        self.publish_all(sink);
        Ok((prose, state))
    }

    pub(crate) fn handle_end_encounter(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: EncounterRefArgs = decode_args("combat.endEncounter", args)?;
        let stamp = self.clock.next_stamp();
        let session_id = self.session_id.clone();
        let mut sink = Vec::new();

        let encounter = self.registry.get_mut(&session_id, &params.encounter_id)?;
        let summary = encounter.end(stamp, &mut sink)?;
        let snapshot = encounter.state.clone();

        // Synchronise final hp back onto source characters. A participant
        // whose character is unknown drops silently.
        let mut synced = 0_usize;
        for (character_id, hp) in &summary.synced_hp {
            match self.store.load_character(character_id) {
                Ok(Some(mut character)) => {
                    character.hp = (*hp).clamp(0, character.max_hp);
                    self.store
                        .upsert_character(&character)
                        .map_err(StoreError::into_kernel_error)?;
                    synced += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(character = %character_id, error = %err, "character sync failed");
                }
            }
        }

        if let Err(err) = self.store.save_encounter(&snapshot) {
            tracing::warn!(encounter = %snapshot.id, error = %err, "final encounter snapshot failed");
        }
        self.registry.remove(&session_id, &params.encounter_id);

        let prose = format!(
            "Encounter {} ended after {} round(s); {} character(s) synchronized.",
            summary.encounter_id, summary.rounds, synced,
        );
        let state = json!({
            "encounter_id": summary.encounter_id,
            "rounds": summary.rounds,
            "synced_hp": summary.synced_hp,
            "synced_characters": synced,
        });
        self.publish_all(sink);
        Ok((prose, state))
    }
}

fn describe_outcome(outcome: &contracts::ActionOutcome) -> String {
    use contracts::ActionOutcome;
    match outcome {
        ActionOutcome::Attack(attack) => {
            let verdict = if attack.critical {
                "a critical hit"
            } else if attack.hit {
                "a hit"
            } else {
                "a miss"
            };
            format!(
                "{} attacks {}: d20 rolled {} (total {}) vs DC {} - {}. Damage {} ({} -> {} hp){}",
                attack.attacker_id,
                attack.target_id,
                attack.check.roll.roll,
                attack.check.roll.total,
                attack.check.dc,
                verdict,
                attack.damage_dealt,
                attack.target_hp_before,
                attack.target_hp_after,
                if attack.target_defeated { "; target down." } else { "." },
            )
        }
        ActionOutcome::Heal(heal) => format!(
            "{} heals {} for {} ({} wasted); now {} hp.",
            heal.actor_id, heal.target_id, heal.healed, heal.overflow, heal.target_hp_after,
        ),
        ActionOutcome::Move(movement) => format!(
            "{} moves ({}, {}) -> ({}, {}) for {} ft; {} opportunity attack(s){}",
            movement.actor_id,
            movement.from.x,
            movement.from.y,
            movement.to.x,
            movement.to.y,
            movement.cost_feet,
            movement.opportunity_attacks.len(),
            if movement.halted { "; halted mid-move." } else { "." },
        ),
        ActionOutcome::Dash { actor_id, movement_remaining } => {
            format!("{actor_id} dashes; {movement_remaining} ft of movement available.")
        }
        ActionOutcome::Disengage { actor_id } => {
            format!("{actor_id} disengages; no opportunity attacks until next turn.")
        }
    }
}
