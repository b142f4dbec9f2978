//! Action resolution: attack, heal, move, dash, disengage, and the
//! opportunity attacks movement can provoke. Validation happens before any
//! mutation; once state changes begin the rest of the path is infallible.

use std::collections::BTreeSet;

use contracts::{
    ActionOutcome, AttackOutcome, CheckDegree, CombatAction, DamageSpec, DamageType, EventPayload,
    GridPoint, HealOutcome, KernelError, MoveOutcome, RollMode,
};

use super::conditions::attack_roll_mode;
use super::Encounter;
use crate::dice;
use crate::spatial;

impl Encounter {
    pub fn execute(
        &mut self,
        action: &CombatAction,
        sink: &mut Vec<EventPayload>,
    ) -> Result<ActionOutcome, KernelError> {
        self.require_active()?;
        let outcome = match action {
            CombatAction::Attack {
                actor_id,
                target_id,
                attack_bonus,
                dc,
                damage,
                damage_type,
                advantage,
                disadvantage,
                ranged,
            } => self.execute_attack(
                actor_id,
                target_id,
                *attack_bonus,
                *dc,
                damage,
                *damage_type,
                *advantage,
                *disadvantage,
                *ranged,
                sink,
            )?,
            CombatAction::Heal { actor_id, target_id, amount } => {
                self.execute_heal(actor_id, target_id, *amount, sink)?
            }
            CombatAction::Move { actor_id, to } => self.execute_move(actor_id, *to, sink)?,
            CombatAction::Dash { actor_id } => self.execute_dash(actor_id)?,
            CombatAction::Disengage { actor_id } => self.execute_disengage(actor_id)?,
        };
        self.mix_hash(3);
        Ok(outcome)
    }

    fn require_turn(&self, actor_id: &str) -> Result<(), KernelError> {
        if self.state.current_turn_id() != actor_id {
            return Err(KernelError::action_economy(format!(
                "it is not {actor_id}'s turn"
            )));
        }
        Ok(())
    }

    fn require_action_slot(&self, actor_id: &str) -> Result<(), KernelError> {
        let actor = self.participant(actor_id)?;
        if actor.defeated {
            return Err(KernelError::action_economy(format!("{actor_id} is defeated")));
        }
        if actor.is_incapacitated() {
            return Err(KernelError::action_economy(format!(
                "{actor_id} is incapacitated"
            )));
        }
        if actor.action_used {
            return Err(KernelError::action_economy(format!(
                "{actor_id} has already used an action this turn"
            )));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_attack(
        &mut self,
        actor_id: &str,
        target_id: &str,
        attack_bonus: i64,
        dc: i64,
        damage: &DamageSpec,
        damage_type: Option<DamageType>,
        flag_advantage: bool,
        flag_disadvantage: bool,
        ranged: bool,
        sink: &mut Vec<EventPayload>,
    ) -> Result<ActionOutcome, KernelError> {
        self.require_turn(actor_id)?;
        self.require_action_slot(actor_id)?;
        let target = self.participant(target_id)?;
        let attacker = self.participant(actor_id)?;

        // Everything fallible happens before the action is consumed.
        if let DamageSpec::Expr(expr) = damage {
            dice::parse_expr(expr)?;
        }

        let adjacent = match (attacker.position, target.position) {
            (Some(a), Some(b)) => a.adjacent(&b),
            _ => false,
        };
        let mode = attack_roll_mode(attacker, target, ranged, adjacent, flag_advantage, flag_disadvantage);

        self.participant_mut(actor_id)?.action_used = true;

        let outcome = self.roll_attack(
            actor_id,
            target_id,
            attack_bonus,
            dc,
            damage,
            damage_type,
            mode,
            false,
            sink,
        )?;
        Ok(ActionOutcome::Attack(outcome))
    }

    /// Shared by normal and opportunity attacks: roll, classify, apply.
    #[allow(clippy::too_many_arguments)]
    fn roll_attack(
        &mut self,
        actor_id: &str,
        target_id: &str,
        attack_bonus: i64,
        dc: i64,
        damage: &DamageSpec,
        damage_type: Option<DamageType>,
        mode: RollMode,
        opportunity: bool,
        sink: &mut Vec<EventPayload>,
    ) -> Result<AttackOutcome, KernelError> {
        let check = dice::check(&mut self.rng, attack_bonus, dc, mode);
        let hit = check.degree.is_success();
        let critical = check.degree == CheckDegree::CriticalSuccess;

        let target_hp_before = self.participant(target_id)?.hp;
        let mut damage_roll = None;
        let mut raw_damage = 0;
        let mut damage_dealt = 0;
        if hit {
            raw_damage = match damage {
                DamageSpec::Flat(flat) => *flat,
                DamageSpec::Expr(expr) => {
                    // Critical hits double the dice, never the modifier.
                    let roll = if critical {
                        dice::roll_expr_crit(&mut self.rng, expr)?
                    } else {
                        dice::roll_expr(&mut self.rng, expr)?
                    };
                    let total = roll.total;
                    damage_roll = Some(roll);
                    total
                }
            };
            damage_dealt = self.apply_raw_damage(target_id, raw_damage, damage_type, sink)?;
        }

        let target = self.participant(target_id)?;
        let outcome = AttackOutcome {
            attacker_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            check,
            hit,
            critical,
            damage_roll,
            raw_damage,
            damage_dealt,
            damage_type,
            target_hp_before,
            target_hp_after: target.hp,
            target_defeated: target.defeated,
            opportunity,
        };

        sink.push(EventPayload::AttackExecuted {
            encounter_id: self.state.id.clone(),
            attacker_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            hit,
            critical,
            damage: damage_dealt,
            target_hp_before,
            target_hp_after: outcome.target_hp_after,
        });
        Ok(outcome)
    }

    /// Resistance math and hp clamp. Returns effective damage dealt. Public
    /// because stunt-style composers apply damage directly from validated
    /// caller records.
    pub fn apply_raw_damage(
        &mut self,
        target_id: &str,
        raw: i64,
        damage_type: Option<DamageType>,
        sink: &mut Vec<EventPayload>,
    ) -> Result<i64, KernelError> {
        let raw = raw.max(0);
        let target = self.participant_mut(target_id)?;
        let effective = match damage_type {
            Some(kind) if target.immunities.contains(&kind) => 0,
            Some(kind) if target.vulnerabilities.contains(&kind) => raw * 2,
            Some(kind) if target.resistances.contains(&kind) => raw.div_euclid(2),
            _ => raw,
        };

        let before = target.hp;
        target.hp = (target.hp - effective).clamp(0, target.max_hp);
        let dealt = before - target.hp;
        let newly_defeated = target.hp == 0 && !target.defeated;
        if newly_defeated {
            target.defeated = true;
        }

        if newly_defeated {
            sink.push(EventPayload::ParticipantDefeated {
                encounter_id: self.state.id.clone(),
                participant_id: target_id.to_string(),
            });
            // Dropping ends concentration outright.
            if self.concentration.contains_key(target_id) {
                self.end_concentration(target_id, sink)?;
            }
        } else if dealt > 0 && self.concentration.contains_key(target_id) {
            self.concentration_check(target_id, dealt, sink)?;
        }
        Ok(dealt)
    }

    pub fn apply_raw_heal(
        &mut self,
        target_id: &str,
        amount: i64,
    ) -> Result<(i64, i64), KernelError> {
        let amount = amount.max(0);
        let target = self.participant_mut(target_id)?;
        let before = target.hp;
        target.hp = (target.hp + amount).min(target.max_hp);
        let healed = target.hp - before;
        if target.hp > 0 {
            target.defeated = false;
        }
        Ok((healed, amount - healed))
    }

    fn execute_heal(
        &mut self,
        actor_id: &str,
        target_id: &str,
        amount: i64,
        sink: &mut Vec<EventPayload>,
    ) -> Result<ActionOutcome, KernelError> {
        self.require_turn(actor_id)?;
        self.require_action_slot(actor_id)?;
        if amount < 0 {
            return Err(KernelError::validation("heal amount must be >= 0"));
        }
        self.participant(target_id)?;

        self.participant_mut(actor_id)?.action_used = true;
        let (healed, overflow) = self.apply_raw_heal(target_id, amount)?;
        let target_hp_after = self.participant(target_id)?.hp;

        sink.push(EventPayload::HealExecuted {
            encounter_id: self.state.id.clone(),
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            healed,
            overflow,
        });

        Ok(ActionOutcome::Heal(HealOutcome {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            requested: amount,
            healed,
            overflow,
            target_hp_after,
        }))
    }

    fn execute_move(
        &mut self,
        actor_id: &str,
        to: GridPoint,
        sink: &mut Vec<EventPayload>,
    ) -> Result<ActionOutcome, KernelError> {
        self.require_turn(actor_id)?;
        let actor = self.participant(actor_id)?;
        if actor.defeated {
            return Err(KernelError::action_economy(format!("{actor_id} is defeated")));
        }
        let Some(from) = actor.position else {
            return Err(KernelError::spatial(format!("{actor_id} has no position")));
        };
        let has_disengaged = actor.has_disengaged;
        let actor_is_enemy = actor.is_enemy;

        // Zero-length moves succeed trivially and provoke nothing.
        if from == to {
            let movement_remaining = actor.movement_remaining;
            sink.push(EventPayload::MovementExecuted {
                encounter_id: self.state.id.clone(),
                actor_id: actor_id.to_string(),
                from,
                to,
                cost_feet: 0,
                opportunity_attacks: 0,
            });
            return Ok(ActionOutcome::Move(MoveOutcome {
                actor_id: actor_id.to_string(),
                from,
                to,
                path: vec![from],
                cost_feet: 0,
                movement_remaining,
                opportunity_attacks: Vec::new(),
                halted: false,
            }));
        }

        if actor.effective_speed() == 0 {
            return Err(KernelError::movement(format!("{actor_id}'s speed is 0")));
        }

        // Other bodies block tiles; the defeated still occupy theirs.
        let mut obstacles: BTreeSet<GridPoint> = self.state.terrain.obstacles.clone();
        for (id, other) in &self.state.participants {
            if id != actor_id {
                if let Some(position) = other.position {
                    obstacles.insert(position);
                }
            }
        }
        if obstacles.contains(&to) {
            return Err(KernelError::spatial(format!(
                "destination ({}, {}) is occupied",
                to.x, to.y
            )));
        }

        let difficult = self.state.terrain.difficult_terrain.clone();
        let Some(path) = spatial::find_path(from, to, &obstacles, &difficult) else {
            return Err(KernelError::spatial(format!(
                "no path from ({}, {}) to ({}, {})",
                from.x, from.y, to.x, to.y
            )));
        };
        let cost_feet = spatial::path_cost_feet(&path, &difficult);
        let movement_remaining = self.participant(actor_id)?.movement_remaining;
        if cost_feet > movement_remaining {
            return Err(KernelError::movement(format!(
                "insufficient movement: need {cost_feet} ft, have {movement_remaining} ft"
            )));
        }

        // Opportunity attacks resolve before the move commits, in turn-order
        // sequence. Leaving a threatened square provokes unless disengaged.
        let mut opportunity_attacks = Vec::new();
        if !has_disengaged {
            let attackers: Vec<String> = self
                .state
                .turn_order
                .iter()
                .filter(|id| {
                    let Some(other) = self.state.participants.get(*id) else {
                        return false;
                    };
                    other.id != actor_id
                        && other.is_enemy != actor_is_enemy
                        && !other.defeated
                        && !other.reaction_used
                        && !other.is_incapacitated()
                        && other
                            .position
                            .map(|p| p.adjacent(&from) && !p.adjacent(&to))
                            .unwrap_or(false)
                })
                .cloned()
                .collect();

            for attacker_id in attackers {
                let outcome = self.resolve_opportunity_attack(&attacker_id, actor_id, sink)?;
                opportunity_attacks.push(outcome);
                if self.participant(actor_id)?.hp == 0 {
                    // Dropped mid-move: halt at the pre-move cell.
                    sink.push(EventPayload::MovementExecuted {
                        encounter_id: self.state.id.clone(),
                        actor_id: actor_id.to_string(),
                        from,
                        to: from,
                        cost_feet: 0,
                        opportunity_attacks: opportunity_attacks.len(),
                    });
                    return Ok(ActionOutcome::Move(MoveOutcome {
                        actor_id: actor_id.to_string(),
                        from,
                        to: from,
                        path: vec![from],
                        cost_feet: 0,
                        movement_remaining,
                        opportunity_attacks,
                        halted: true,
                    }));
                }
            }
        }

        let actor = self.participant_mut(actor_id)?;
        actor.position = Some(to);
        actor.movement_remaining -= cost_feet;
        let movement_remaining = actor.movement_remaining;

        self.reevaluate_auras(sink)?;

        sink.push(EventPayload::MovementExecuted {
            encounter_id: self.state.id.clone(),
            actor_id: actor_id.to_string(),
            from,
            to,
            cost_feet,
            opportunity_attacks: opportunity_attacks.len(),
        });

        Ok(ActionOutcome::Move(MoveOutcome {
            actor_id: actor_id.to_string(),
            from,
            to,
            path,
            cost_feet,
            movement_remaining,
            opportunity_attacks,
            halted: false,
        }))
    }

    /// Reaction attack at the mover: the attacker's standing attack values
    /// against the mover's armor class.
    fn resolve_opportunity_attack(
        &mut self,
        attacker_id: &str,
        target_id: &str,
        sink: &mut Vec<EventPayload>,
    ) -> Result<AttackOutcome, KernelError> {
        let attacker = self.participant(attacker_id)?;
        let target = self.participant(target_id)?;
        let mode = attack_roll_mode(attacker, target, false, true, false, false);
        let attack_bonus = attacker.attack_bonus;
        let damage_expr = attacker.damage_expr.clone();
        let damage_type = attacker.damage_type;
        let dc = target.ac;

        self.participant_mut(attacker_id)?.reaction_used = true;
        self.roll_attack(
            attacker_id,
            target_id,
            attack_bonus,
            dc,
            &DamageSpec::Expr(damage_expr),
            damage_type,
            mode,
            true,
            sink,
        )
    }

    fn execute_dash(&mut self, actor_id: &str) -> Result<ActionOutcome, KernelError> {
        self.require_turn(actor_id)?;
        self.require_action_slot(actor_id)?;
        let actor = self.participant(actor_id)?;
        if actor.has_dashed {
            return Err(KernelError::action_economy(format!(
                "{actor_id} has already dashed this turn"
            )));
        }

        let actor = self.participant_mut(actor_id)?;
        actor.action_used = true;
        actor.has_dashed = true;
        actor.movement_remaining += actor.movement_speed;
        let movement_remaining = actor.movement_remaining;
        Ok(ActionOutcome::Dash {
            actor_id: actor_id.to_string(),
            movement_remaining,
        })
    }

    fn execute_disengage(&mut self, actor_id: &str) -> Result<ActionOutcome, KernelError> {
        self.require_turn(actor_id)?;
        self.require_action_slot(actor_id)?;
        let actor = self.participant_mut(actor_id)?;
        actor.action_used = true;
        actor.has_disengaged = true;
        Ok(ActionOutcome::Disengage {
            actor_id: actor_id.to_string(),
        })
    }
}
