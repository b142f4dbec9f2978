//! Turn and round progression. Start-of-turn resets the action economy and
//! fires start-triggered conditions; end-of-turn fires end-triggered
//! conditions and save-ends rolls. Defeated participants keep their slot in
//! the order but their turns are skipped.

use contracts::{AuraTrigger, EffectTrigger, EventPayload, KernelError};

use super::{Encounter, TurnAdvance};

impl Encounter {
    pub(crate) fn process_start_of_turn(
        &mut self,
        participant_id: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        {
            let participant = self.participant_mut(participant_id)?;
            if participant.defeated {
                return Ok(());
            }
            participant.action_used = false;
            participant.bonus_action_used = false;
            // Reactions refresh at the owner's turn start: once per round.
            participant.reaction_used = false;
            participant.free_interaction_used = false;
            participant.has_dashed = false;
            participant.has_disengaged = false;
            participant.movement_remaining = participant.movement_speed;
        }
        self.process_conditions_at(participant_id, EffectTrigger::StartOfTurn, sink)?;
        self.fire_aura_turn_triggers(participant_id, AuraTrigger::StartOfTurn, sink)?;
        Ok(())
    }

    pub(crate) fn process_end_of_turn(
        &mut self,
        participant_id: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        if self.participant(participant_id)?.defeated {
            return Ok(());
        }
        self.process_conditions_at(participant_id, EffectTrigger::EndOfTurn, sink)?;
        self.fire_aura_turn_triggers(participant_id, AuraTrigger::EndOfTurn, sink)?;
        Ok(())
    }

    pub fn advance_turn(&mut self, sink: &mut Vec<EventPayload>) -> Result<TurnAdvance, KernelError> {
        self.require_active()?;
        let previous = self.state.current_turn_id().to_string();
        self.process_end_of_turn(&previous, sink)?;

        // Find the next living participant, wrapping at most one full cycle
        // so a fully-defeated order still terminates.
        let order_len = self.state.turn_order.len();
        for _ in 0..order_len {
            self.state.current_turn_index += 1;
            if self.state.current_turn_index >= order_len {
                self.state.current_turn_index = 0;
                self.state.round = self.state.round.saturating_add(1);
                self.expire_auras_for_round(sink)?;
            }
            let candidate = self.state.current_turn_id();
            if !self.state.participants[candidate].defeated {
                break;
            }
        }

        let current = self.state.current_turn_id().to_string();
        self.process_start_of_turn(&current, sink)?;
        self.reevaluate_auras(sink)?;

        let advance = TurnAdvance {
            previous: previous.clone(),
            current: current.clone(),
            round: self.state.round,
        };
        sink.push(EventPayload::TurnAdvanced {
            encounter_id: self.state.id.clone(),
            previous,
            current,
            round: self.state.round,
        });
        self.mix_hash(5);
        Ok(advance)
    }
}
