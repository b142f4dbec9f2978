//! Auras and concentration. A character concentrates on at most one effect;
//! starting a new one breaks the old, damage forces a Constitution save at
//! DC max(10, damage/2), and incapacitation ends it outright. Aura
//! membership is recomputed on movement commits and turn boundaries.

use std::collections::BTreeSet;

use contracts::{
    Ability, Aura, AuraEffect, AuraTrigger, EventPayload, KernelError, OngoingEffectKind,
    RollMode,
};

use super::Encounter;
use crate::dice;
use crate::spatial::AoeShape;

impl Encounter {
    /// Register an aura on its owner. Concentration-backed auras seize the
    /// owner's concentration slot, breaking whatever held it.
    pub fn register_aura(
        &mut self,
        mut aura: Aura,
        sink: &mut Vec<EventPayload>,
    ) -> Result<String, KernelError> {
        self.require_active()?;
        let owner = self.participant(&aura.owner_id)?;
        if owner.defeated {
            return Err(KernelError::rules(format!(
                "{} cannot hold an aura while defeated",
                aura.owner_id
            )));
        }
        if aura.radius_feet <= 0 {
            return Err(KernelError::validation("aura radius must be positive"));
        }
        for effect in &aura.effects {
            if effect.amount.is_none() && effect.dice.is_none() {
                return Err(KernelError::validation(format!(
                    "aura {}: effect needs amount or dice",
                    aura.spell_name
                )));
            }
            if let Some(expr) = &effect.dice {
                dice::parse_expr(expr)?;
            }
        }

        if aura.id.is_empty() {
            self.next_aura_ordinal += 1;
            aura.id = format!("aura:{}:{}", self.state.id, self.next_aura_ordinal);
        }
        if self.auras.contains_key(&aura.id) {
            return Err(KernelError::conflict(format!("aura {} already exists", aura.id)));
        }

        if aura.requires_concentration {
            self.start_concentration(&aura.owner_id.clone(), &aura.spell_name.clone(), sink)?;
        }

        aura.started_at_round = self.state.round;
        let aura_id = aura.id.clone();
        self.auras.insert(aura_id.clone(), aura);
        self.aura_membership.insert(aura_id.clone(), BTreeSet::new());
        self.reevaluate_auras(sink)?;
        self.mix_hash(11);
        Ok(aura_id)
    }

    /// Claim the owner's concentration slot for `spell_name`. Any previous
    /// concentration effect is torn down first.
    pub fn start_concentration(
        &mut self,
        owner_id: &str,
        spell_name: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let owner = self.participant(owner_id)?;
        if owner.is_incapacitated() {
            return Err(KernelError::rules(format!(
                "{owner_id} cannot concentrate while incapacitated"
            )));
        }
        if self.concentration.contains_key(owner_id) {
            self.end_concentration(owner_id, sink)?;
        }
        self.concentration
            .insert(owner_id.to_string(), spell_name.to_string());
        Ok(())
    }

    /// Drop the owner's concentration and expire every aura that depended
    /// on it.
    pub(crate) fn end_concentration(
        &mut self,
        owner_id: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let Some(spell_name) = self.concentration.remove(owner_id) else {
            return Ok(());
        };

        let expired: Vec<String> = self
            .auras
            .iter()
            .filter(|(_, aura)| aura.owner_id == owner_id && aura.requires_concentration)
            .map(|(id, _)| id.clone())
            .collect();
        for aura_id in expired {
            self.auras.remove(&aura_id);
            self.aura_membership.remove(&aura_id);
        }

        sink.push(EventPayload::ConcentrationBroken {
            encounter_id: self.state.id.clone(),
            owner_id: owner_id.to_string(),
            spell_name,
        });
        Ok(())
    }

    /// Constitution save against DC max(10, damage/2); failure breaks
    /// concentration.
    pub(crate) fn concentration_check(
        &mut self,
        owner_id: &str,
        damage: i64,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let dc = (damage / 2).max(10);
        let bonus = self.participant(owner_id)?.save_bonus(Ability::Con);
        let result = dice::check(&mut self.rng, bonus, dc, RollMode::Normal);
        if !result.degree.is_success() {
            self.end_concentration(owner_id, sink)?;
        }
        Ok(())
    }

    fn aura_member_set(&self, aura: &Aura) -> BTreeSet<String> {
        let Some(owner) = self.state.participants.get(&aura.owner_id) else {
            return BTreeSet::new();
        };
        let Some(center) = owner.position else {
            return BTreeSet::new();
        };
        let shape = AoeShape::Sphere {
            center,
            radius_feet: aura.radius_feet,
        };

        self.state
            .participants
            .values()
            .filter(|candidate| {
                if candidate.defeated {
                    return false;
                }
                let Some(position) = candidate.position else {
                    return false;
                };
                if !shape.contains(position) {
                    return false;
                }
                if candidate.id == aura.owner_id {
                    return aura.affects_self;
                }
                if candidate.is_enemy == owner.is_enemy {
                    aura.affects_allies
                } else {
                    aura.affects_enemies
                }
            })
            .map(|candidate| candidate.id.clone())
            .collect()
    }

    /// Diff membership for every aura and fire enter/exit triggers.
    pub(crate) fn reevaluate_auras(
        &mut self,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let aura_ids: Vec<String> = self.auras.keys().cloned().collect();
        for aura_id in aura_ids {
            let Some(aura) = self.auras.get(&aura_id) else {
                continue;
            };
            let next = self.aura_member_set(aura);
            let previous = self
                .aura_membership
                .get(&aura_id)
                .cloned()
                .unwrap_or_default();

            for entered in next.difference(&previous) {
                self.fire_aura_trigger(&aura_id, entered.clone(), AuraTrigger::Enter, sink)?;
            }
            for exited in previous.difference(&next) {
                self.fire_aura_trigger(&aura_id, exited.clone(), AuraTrigger::Exit, sink)?;
            }
            self.aura_membership.insert(aura_id, next);
        }
        Ok(())
    }

    /// Fire start/end-of-turn aura effects for one participant.
    pub(crate) fn fire_aura_turn_triggers(
        &mut self,
        participant_id: &str,
        trigger: AuraTrigger,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let aura_ids: Vec<String> = self
            .aura_membership
            .iter()
            .filter(|(_, members)| members.contains(participant_id))
            .map(|(id, _)| id.clone())
            .collect();
        for aura_id in aura_ids {
            self.fire_aura_trigger(&aura_id, participant_id.to_string(), trigger, sink)?;
        }
        Ok(())
    }

    fn fire_aura_trigger(
        &mut self,
        aura_id: &str,
        target_id: String,
        trigger: AuraTrigger,
        sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let Some(aura) = self.auras.get(aura_id) else {
            return Ok(());
        };
        let effects: Vec<AuraEffect> = aura
            .effects
            .iter()
            .filter(|effect| effect.trigger == trigger)
            .cloned()
            .collect();
        if effects.is_empty() {
            return Ok(());
        }
        let encounter_id = self.state.id.clone();

        for effect in effects {
            // A successful save negates the effect entirely.
            if let (Some(dc), Some(ability)) = (effect.save_dc, effect.save_ability) {
                let bonus = self.participant(&target_id)?.save_bonus(ability);
                let save = dice::check(&mut self.rng, bonus, dc, RollMode::Normal);
                if save.degree.is_success() {
                    continue;
                }
            }
            let amount = match (&effect.amount, &effect.dice) {
                (Some(flat), _) => *flat,
                (None, Some(expr)) => dice::roll_expr(&mut self.rng, expr)?.total,
                (None, None) => 0,
            };
            match effect.kind {
                OngoingEffectKind::Damage => {
                    self.apply_raw_damage(&target_id, amount, effect.damage_type, sink)?;
                }
                OngoingEffectKind::Healing => {
                    self.apply_raw_heal(&target_id, amount)?;
                }
            }
            sink.push(EventPayload::AuraTriggered {
                encounter_id: encounter_id.clone(),
                aura_id: aura_id.to_string(),
                target_id: target_id.clone(),
                trigger,
            });
        }
        Ok(())
    }

    /// Drop auras whose round budget has elapsed. Expiry releases the
    /// concentration slot without a break event.
    pub(crate) fn expire_auras_for_round(
        &mut self,
        _sink: &mut Vec<EventPayload>,
    ) -> Result<(), KernelError> {
        let round = self.state.round;
        let expired: Vec<(String, String, bool)> = self
            .auras
            .iter()
            .filter(|(_, aura)| {
                aura.max_duration_rounds
                    .map(|max| round.saturating_sub(aura.started_at_round) >= max)
                    .unwrap_or(false)
            })
            .map(|(id, aura)| (id.clone(), aura.owner_id.clone(), aura.requires_concentration))
            .collect();

        for (aura_id, owner_id, concentration) in expired {
            self.auras.remove(&aura_id);
            self.aura_membership.remove(&aura_id);
            if concentration {
                self.concentration.remove(&owner_id);
            }
        }
        Ok(())
    }
}
