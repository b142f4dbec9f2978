//! Condition lifecycle and the authoritative modifier table.
//!
//! Durations resolve at precise points: `rounds` counts down at the owner's
//! turn start, `start_of_turn`/`end_of_turn` fire-then-expire at their
//! boundary, `save_ends` rolls at the owner's turn end, `permanent` waits
//! for an explicit removal.

use contracts::{
    Condition, ConditionKind, DurationType, EventPayload, KernelError, OngoingEffectKind,
    RollMode,
};

use super::Encounter;
use crate::dice;

impl Encounter {
    pub fn apply_condition(
        &mut self,
        target_id: &str,
        condition: Condition,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        self.require_active()?;
        condition.validate()?;
        let encounter_id = self.state.id.clone();
        let kind = condition.kind;
        let incapacitating = kind.is_incapacitating();

        let target = self.participant_mut(target_id)?;
        target.conditions.push(condition);

        sink.push(EventPayload::ConditionApplied {
            encounter_id,
            target_id: target_id.to_string(),
            condition: kind,
        });

        // An incapacitated concentrator drops the spell.
        if incapacitating && self.concentration.contains_key(target_id) {
            self.end_concentration(target_id, sink)?;
        }
        self.mix_hash(7);
        Ok(())
    }

    pub fn remove_condition(
        &mut self,
        target_id: &str,
        condition_id: &str,
        reason: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let encounter_id = self.state.id.clone();
        let target = self.participant_mut(target_id)?;
        let Some(index) = target.conditions.iter().position(|c| c.id == condition_id) else {
            return Err(KernelError::not_found(format!(
                "no condition {condition_id} on {target_id}"
            )));
        };
        let removed = target.conditions.remove(index);
        sink.push(EventPayload::ConditionExpired {
            encounter_id,
            target_id: target_id.to_string(),
            condition: removed.kind,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Fire ongoing effects for a trigger, then expire what that boundary
    /// expires. Called from turn processing with the owner of the turn.
    pub(crate) fn process_conditions_at(
        &mut self,
        participant_id: &str,
        trigger: contracts::EffectTrigger,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        use contracts::EffectTrigger;

        let snapshot: Vec<Condition> = self.participant(participant_id)?.conditions.clone();

        for condition in &snapshot {
            for effect in &condition.ongoing_effects {
                if effect.trigger != trigger {
                    continue;
                }
                let amount = match (&effect.amount, &effect.dice) {
                    (Some(flat), _) => *flat,
                    (None, Some(expr)) => dice::roll_expr(&mut self.rng, expr)?.total,
                    (None, None) => 0,
                };
                match effect.kind {
                    OngoingEffectKind::Damage => {
                        self.apply_raw_damage(participant_id, amount, effect.damage_type, sink)?;
                    }
                    OngoingEffectKind::Healing => {
                        self.apply_raw_heal(participant_id, amount)?;
                    }
                }
            }
        }

        // Expiry pass. Collect first; removal emits events.
        let mut expiring: Vec<(String, &'static str)> = Vec::new();
        {
            let participant = self.participant_mut(participant_id)?;
            for condition in participant.conditions.iter_mut() {
                match (trigger, condition.duration_type) {
                    (EffectTrigger::StartOfTurn, DurationType::StartOfTurn) => {
                        expiring.push((condition.id.clone(), "duration"));
                    }
                    (EffectTrigger::EndOfTurn, DurationType::EndOfTurn) => {
                        expiring.push((condition.id.clone(), "duration"));
                    }
                    (EffectTrigger::StartOfTurn, DurationType::Rounds) => {
                        let remaining = condition.duration.unwrap_or(0).saturating_sub(1);
                        condition.duration = Some(remaining);
                        if remaining == 0 {
                            expiring.push((condition.id.clone(), "duration"));
                        }
                    }
                    _ => {}
                }
            }
        }

        // Save-ends rolls happen at the owner's end of turn.
        if trigger == EffectTrigger::EndOfTurn {
            for condition in &snapshot {
                if condition.duration_type != DurationType::SaveEnds {
                    continue;
                }
                let (Some(dc), Some(ability)) = (condition.save_dc, condition.save_ability) else {
                    continue;
                };
                let owner = self.participant(participant_id)?;
                // Incapacitated creatures auto-fail strength and dexterity
                // saves.
                let auto_fail = owner.is_incapacitated()
                    && matches!(ability, contracts::Ability::Str | contracts::Ability::Dex);
                if auto_fail {
                    continue;
                }
                let bonus = owner.save_bonus(ability);
                let result = dice::check(&mut self.rng, bonus, dc, RollMode::Normal);
                if result.degree.is_success() {
                    expiring.push((condition.id.clone(), "save"));
                }
            }
        }

        for (condition_id, reason) in expiring {
            // The condition may already be gone if an effect removed it.
            let still_there = self
                .participant(participant_id)?
                .conditions
                .iter()
                .any(|c| c.id == condition_id);
            if still_there {
                self.remove_condition(participant_id, &condition_id, reason, sink)?;
            }
        }
        Ok(())
    }
}

/// Advantage/disadvantage derived from the condition table plus per-call
/// flags. `adjacent` decides melee-vs-range for prone targets; `ranged` is
/// the caller's declaration of the attack form.
pub(crate) fn attack_roll_mode(
    attacker: &contracts::Participant,
    target: &contracts::Participant,
    ranged: bool,
    adjacent: bool,
    flag_advantage: bool,
    flag_disadvantage: bool,
) -> RollMode {
    let mut advantage = flag_advantage;
    let mut disadvantage = flag_disadvantage;

    if attacker.has_condition(ConditionKind::Prone)
        || attacker.has_condition(ConditionKind::Restrained)
        || attacker.has_condition(ConditionKind::Blinded)
        || attacker.has_condition(ConditionKind::Frightened)
    {
        disadvantage = true;
    }
    if attacker.has_condition(ConditionKind::Invisible) {
        advantage = true;
    }

    if target.has_condition(ConditionKind::Prone) {
        if adjacent {
            advantage = true;
        } else if ranged {
            disadvantage = true;
        }
    }
    if target.is_incapacitated()
        || target.has_condition(ConditionKind::Restrained)
        || target.has_condition(ConditionKind::Blinded)
    {
        advantage = true;
    }
    if target.has_condition(ConditionKind::Invisible) {
        disadvantage = true;
    }

    RollMode::from_flags(advantage, disadvantage)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{basic_init, start_basic};
    use super::*;
    use contracts::{Ability, EffectTrigger, OngoingEffect};

    fn condition(kind: ConditionKind, duration_type: DurationType) -> Condition {
        Condition {
            id: format!("cond:{kind:?}"),
            kind,
            duration_type,
            duration: None,
            save_dc: None,
            save_ability: None,
            ongoing_effects: Vec::new(),
        }
    }

    #[test]
    fn rounds_duration_counts_down_at_turn_start() {
        let mut encounter = start_basic("cond-rounds", vec![basic_init("solo", 10, 0)]);
        let mut sink = Vec::new();
        let mut poisoned = condition(ConditionKind::Poisoned, DurationType::Rounds);
        poisoned.duration = Some(2);
        encounter.apply_condition("solo", poisoned, &mut sink).expect("applies");

        // First wrap-around turn start: 2 -> 1.
        encounter.advance_turn(&mut sink).expect("advance");
        assert!(encounter.state.participants["solo"].has_condition(ConditionKind::Poisoned));
        // Second: 1 -> 0, expires.
        encounter.advance_turn(&mut sink).expect("advance");
        assert!(!encounter.state.participants["solo"].has_condition(ConditionKind::Poisoned));
    }

    #[test]
    fn end_of_turn_condition_fires_then_expires() {
        let mut encounter = start_basic("cond-eot", vec![basic_init("solo", 10, 0)]);
        let mut sink = Vec::new();
        let mut burning = condition(ConditionKind::Poisoned, DurationType::EndOfTurn);
        burning.ongoing_effects.push(OngoingEffect {
            trigger: EffectTrigger::EndOfTurn,
            kind: OngoingEffectKind::Damage,
            amount: Some(3),
            dice: None,
            damage_type: None,
        });
        encounter.apply_condition("solo", burning, &mut sink).expect("applies");

        encounter.advance_turn(&mut sink).expect("advance");
        let solo = &encounter.state.participants["solo"];
        assert_eq!(solo.hp, 7);
        assert!(!solo.has_condition(ConditionKind::Poisoned));
    }

    #[test]
    fn save_ends_condition_clears_on_success() {
        let mut encounter = start_basic("cond-save", vec![basic_init("solo", 10, 5)]);
        let mut sink = Vec::new();
        let mut restrained = condition(ConditionKind::Restrained, DurationType::SaveEnds);
        restrained.save_dc = Some(1);
        restrained.save_ability = Some(Ability::Str);
        encounter.apply_condition("solo", restrained, &mut sink).expect("applies");

        // DC 1 cannot be failed except on a natural 1; give a few turns.
        for _ in 0..4 {
            encounter.advance_turn(&mut sink).expect("advance");
            if !encounter.state.participants["solo"].has_condition(ConditionKind::Restrained) {
                return;
            }
        }
        panic!("save-ends condition never cleared against DC 1");
    }

    #[test]
    fn permanent_conditions_survive_turns() {
        let mut encounter = start_basic("cond-perm", vec![basic_init("solo", 10, 0)]);
        let mut sink = Vec::new();
        encounter
            .apply_condition("solo", condition(ConditionKind::Blinded, DurationType::Permanent), &mut sink)
            .expect("applies");
        for _ in 0..3 {
            encounter.advance_turn(&mut sink).expect("advance");
        }
        assert!(encounter.state.participants["solo"].has_condition(ConditionKind::Blinded));

        encounter
            .remove_condition("solo", "cond:Blinded", "removed", &mut sink)
            .expect("explicit removal");
        assert!(!encounter.state.participants["solo"].has_condition(ConditionKind::Blinded));
    }

    #[test]
    fn modifier_table_prone() {
        let encounter = start_basic("mode", vec![basic_init("a", 10, 0), basic_init("b", 10, 0)]);
        let mut attacker = encounter.state.participants["a"].clone();
        let mut target = encounter.state.participants["b"].clone();

        target.conditions.push(condition(ConditionKind::Prone, DurationType::Permanent));
        assert_eq!(attack_roll_mode(&attacker, &target, false, true, false, false), RollMode::Advantage);
        assert_eq!(attack_roll_mode(&attacker, &target, true, false, false, false), RollMode::Disadvantage);

        // Attacker prone too: cancels to normal in melee.
        attacker.conditions.push(condition(ConditionKind::Prone, DurationType::Permanent));
        assert_eq!(attack_roll_mode(&attacker, &target, false, true, false, false), RollMode::Normal);
    }

    #[test]
    fn stunned_target_gives_advantage() {
        let encounter = start_basic("mode-2", vec![basic_init("a", 10, 0), basic_init("b", 10, 0)]);
        let attacker = encounter.state.participants["a"].clone();
        let mut target = encounter.state.participants["b"].clone();
        target.conditions.push(condition(ConditionKind::Stunned, DurationType::Permanent));
        assert_eq!(attack_roll_mode(&attacker, &target, false, false, false, false), RollMode::Advantage);
    }
}
