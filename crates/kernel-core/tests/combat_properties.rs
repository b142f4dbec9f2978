use std::collections::BTreeMap;

use contracts::{
    CombatAction, CreateEncounterParams, DamageSpec, DamageType, EventPayload, GridPoint,
    ParticipantInit,
};
use kernel_core::combat::Encounter;
use proptest::prelude::*;

fn init(id: &str, hp: i64, bonus: i64, speed: i64) -> ParticipantInit {
    ParticipantInit {
        id: id.to_string(),
        name: id.to_string(),
        initiative_bonus: bonus,
        is_enemy: None,
        hp,
        max_hp: hp,
        ac: 12,
        position: Some(GridPoint::new(0, 0)),
        movement_speed: speed,
        attack_bonus: 3,
        damage_expr: "1d6".to_string(),
        damage_type: None,
        source_character_id: None,
        save_bonuses: BTreeMap::new(),
        resistances: Default::default(),
        vulnerabilities: Default::default(),
        immunities: Default::default(),
    }
}

fn start(seed: &str, inits: Vec<ParticipantInit>) -> (Encounter, Vec<EventPayload>) {
    let params = CreateEncounterParams {
        seed: seed.to_string(),
        encounter_id: None,
        world_id: None,
        participants: inits,
        terrain: Default::default(),
    };
    let mut sink = Vec::new();
    let encounter =
        Encounter::start(&params, "tick-000001".to_string(), &mut sink).expect("encounter starts");
    (encounter, sink)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Invariant: turn_order stays a permutation of participant ids and the
    /// cursor stays in range, whatever sequence of advances runs.
    #[test]
    fn turn_order_stays_a_permutation(advances in 0_usize..24, count in 1_usize..6) {
        let inits: Vec<ParticipantInit> = (0..count)
            .map(|i| {
                let mut p = init(&format!("p{i}"), 12, i as i64, 30);
                p.position = Some(GridPoint::new(i as i64 * 3, 0));
                p
            })
            .collect();
        let (mut encounter, mut sink) = start("perm-seed", inits);

        for _ in 0..advances {
            encounter.advance_turn(&mut sink).expect("advance");
            encounter.state.validate().expect("invariant holds");
        }
    }

    /// Invariant: movement_remaining never goes negative and never exceeds
    /// twice the speed (one dash per turn).
    #[test]
    fn movement_budget_is_bounded(speed in 0_i64..=60, steps in 1_i64..10) {
        let mut solo = init("solo", 20, 0, speed);
        solo.position = Some(GridPoint::new(0, 0));
        let (mut encounter, mut sink) = start("budget-seed", vec![solo]);

        let _ = encounter.execute(&CombatAction::Dash { actor_id: "solo".to_string() }, &mut sink);
        let check = |enc: &Encounter| {
            let p = &enc.state.participants["solo"];
            prop_assert!(p.movement_remaining >= 0);
            prop_assert!(p.movement_remaining <= 2 * p.movement_speed);
            Ok(())
        };
        check(&encounter)?;

        for step in 1..=steps {
            let _ = encounter.execute(
                &CombatAction::Move { actor_id: "solo".to_string(), to: GridPoint::new(step, 0) },
                &mut sink,
            );
            check(&encounter)?;
        }
    }

    /// Invariant: resistance halves (floor), vulnerability doubles, immunity
    /// zeroes; hp never leaves [0, max_hp].
    #[test]
    fn damage_type_arithmetic_holds(raw in 0_i64..60) {
        let mut resistant = init("res", 100, 0, 30);
        resistant.resistances.insert(DamageType::Cold);
        let mut vulnerable = init("vul", 100, 0, 30);
        vulnerable.vulnerabilities.insert(DamageType::Cold);
        let mut immune = init("imm", 100, 0, 30);
        immune.immunities.insert(DamageType::Cold);
        let mut order_anchor = init("zz", 100, 30, 30);
        order_anchor.position = Some(GridPoint::new(9, 9));
        resistant.position = Some(GridPoint::new(1, 0));
        vulnerable.position = Some(GridPoint::new(2, 0));
        immune.position = Some(GridPoint::new(3, 0));

        let (mut encounter, mut sink) =
            start("arith-seed", vec![order_anchor, resistant, vulnerable, immune]);

        let dealt_res = encounter
            .apply_raw_damage("res", raw, Some(DamageType::Cold), &mut sink)
            .expect("resist damage");
        prop_assert_eq!(dealt_res, raw.div_euclid(2).min(100));

        let dealt_vul = encounter
            .apply_raw_damage("vul", raw, Some(DamageType::Cold), &mut sink)
            .expect("vulnerable damage");
        prop_assert_eq!(dealt_vul, (raw * 2).min(100));

        let dealt_imm = encounter
            .apply_raw_damage("imm", raw, Some(DamageType::Cold), &mut sink)
            .expect("immune damage");
        prop_assert_eq!(dealt_imm, 0);

        for participant in encounter.state.participants.values() {
            prop_assert!(participant.hp >= 0 && participant.hp <= participant.max_hp);
        }
    }
}

#[test]
fn identical_seeds_reproduce_whole_fights() {
    let script = |encounter: &mut Encounter| {
        let mut sink = Vec::new();
        let order = encounter.state.turn_order.clone();
        let attacker = order[0].clone();
        let target = order[1].clone();
        let _ = encounter.execute(
            &CombatAction::Attack {
                actor_id: attacker,
                target_id: target,
                attack_bonus: 4,
                dc: 11,
                damage: DamageSpec::Expr("2d6+1".to_string()),
                damage_type: None,
                advantage: false,
                disadvantage: false,
                ranged: false,
            },
            &mut sink,
        );
        encounter.advance_turn(&mut sink).expect("advance");
        encounter.advance_turn(&mut sink).expect("advance");
    };

    let inits = || {
        vec![
            init("hero", 30, 3, 30),
            {
                let mut g = init("goblin", 10, 1, 30);
                g.position = Some(GridPoint::new(1, 0));
                g
            },
        ]
    };
    let (mut a, _) = start("verify-1", inits());
    let (mut b, _) = start("verify-1", inits());
    script(&mut a);
    script(&mut b);

    assert_eq!(a.state, b.state);
    assert_eq!(a.state_hash(), b.state_hash());
}

#[test]
fn goblin_takes_flat_eight_on_hit() {
    let hero = init("hero", 30, 3, 30);
    let mut goblin = init("goblin", 10, 1, 30);
    goblin.position = Some(GridPoint::new(1, 0));
    let (mut encounter, mut sink) = start("verify-1", vec![hero, goblin]);

    // Walk the order to the hero's turn if the goblin won initiative.
    if encounter.state.current_turn_id() != "hero" {
        encounter.advance_turn(&mut sink).expect("advance to hero");
    }

    let outcome = encounter
        .execute(
            &CombatAction::Attack {
                actor_id: "hero".to_string(),
                target_id: "goblin".to_string(),
                attack_bonus: 5,
                dc: 12,
                damage: DamageSpec::Flat(8),
                damage_type: None,
                advantage: false,
                disadvantage: false,
                ranged: false,
            },
            &mut sink,
        )
        .expect("attack resolves");

    match outcome {
        contracts::ActionOutcome::Attack(attack) => {
            assert_eq!(attack.check.dc, 12);
            if attack.hit {
                assert_eq!(attack.damage_dealt, 8);
                assert_eq!(encounter.state.participants["goblin"].hp, 2);
            } else {
                assert_eq!(encounter.state.participants["goblin"].hp, 10);
            }
            // The trace always carries the raw roll.
            assert!((1..=20).contains(&attack.check.roll.roll));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}
