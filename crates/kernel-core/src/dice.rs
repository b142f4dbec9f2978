//! Dice on top of [`SeedRng`]: d20 with advantage/disadvantage, `NdM[+K]`
//! expressions with per-die traces, and four-way check classification.

use contracts::{CheckDegree, CheckResult, D20Roll, DiceRoll, KernelError, RollMode};

use crate::rng::SeedRng;

pub fn d20(rng: &mut SeedRng, bonus: i64) -> D20Roll {
    let roll = rng.die(20);
    D20Roll {
        roll,
        total: roll + bonus,
        is_nat20: roll == 20,
        is_nat1: roll == 1,
    }
}

/// Roll under a mode. Advantage takes the max of two rolls, disadvantage the
/// min; when both were requested the mode has already collapsed to Normal.
pub fn d20_mode(rng: &mut SeedRng, bonus: i64, mode: RollMode) -> D20Roll {
    match mode {
        RollMode::Normal => d20(rng, bonus),
        RollMode::Advantage => {
            let first = d20(rng, bonus);
            let second = d20(rng, bonus);
            if second.roll > first.roll {
                second
            } else {
                first
            }
        }
        RollMode::Disadvantage => {
            let first = d20(rng, bonus);
            let second = d20(rng, bonus);
            if second.roll < first.roll {
                second
            } else {
                first
            }
        }
    }
}

/// Classify a total against a DC. Naturals override: a natural 20 is always
/// a critical success, a natural 1 always a critical failure.
pub fn classify(roll: D20Roll, dc: i64) -> CheckDegree {
    if roll.is_nat20 {
        return CheckDegree::CriticalSuccess;
    }
    if roll.is_nat1 {
        return CheckDegree::CriticalFailure;
    }
    if roll.total >= dc + 10 {
        CheckDegree::CriticalSuccess
    } else if roll.total >= dc {
        CheckDegree::Success
    } else if roll.total <= dc - 10 {
        CheckDegree::CriticalFailure
    } else {
        CheckDegree::Failure
    }
}

/// d20 check against a DC with full trace.
pub fn check(rng: &mut SeedRng, modifier: i64, dc: i64, mode: RollMode) -> CheckResult {
    let roll = d20_mode(rng, modifier, mode);
    CheckResult {
        roll,
        dc,
        degree: classify(roll, dc),
        mode,
    }
}

/// Parse an `NdM`, `NdM+K`, or `NdM-K` expression. A bare integer is
/// accepted as a flat amount.
pub fn parse_expr(expression: &str) -> Result<(i64, i64, i64), KernelError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(KernelError::validation("empty dice expression"));
    }
    if let Ok(flat) = trimmed.parse::<i64>() {
        return Ok((0, 0, flat));
    }

    let (dice_part, modifier) = match trimmed.find(['+', '-']) {
        Some(idx) if idx > 0 => {
            let (head, tail) = trimmed.split_at(idx);
            let modifier = tail.parse::<i64>().map_err(|_| {
                KernelError::validation(format!("bad dice modifier in '{expression}'"))
            })?;
            (head, modifier)
        }
        _ => (trimmed, 0),
    };

    let (count_raw, sides_raw) = dice_part.split_once(['d', 'D']).ok_or_else(|| {
        KernelError::validation(format!("expected NdM[+K], got '{expression}'"))
    })?;
    let count = if count_raw.is_empty() {
        1
    } else {
        count_raw
            .parse::<i64>()
            .map_err(|_| KernelError::validation(format!("bad die count in '{expression}'")))?
    };
    let sides = sides_raw
        .parse::<i64>()
        .map_err(|_| KernelError::validation(format!("bad die size in '{expression}'")))?;

    if !(1..=100).contains(&count) || !(2..=1000).contains(&sides) {
        return Err(KernelError::validation(format!(
            "dice expression out of range: '{expression}'"
        )));
    }
    Ok((count, sides, modifier))
}

/// Roll an expression, returning every die in the trace.
pub fn roll_expr(rng: &mut SeedRng, expression: &str) -> Result<DiceRoll, KernelError> {
    let (count, sides, modifier) = parse_expr(expression)?;
    roll_parsed(rng, expression, count, sides, modifier)
}

/// Roll an already-parsed expression with the dice count doubled. Only the
/// dice double on a critical hit; the flat modifier does not.
pub fn roll_expr_crit(rng: &mut SeedRng, expression: &str) -> Result<DiceRoll, KernelError> {
    let (count, sides, modifier) = parse_expr(expression)?;
    roll_parsed(rng, expression, count * 2, sides, modifier)
}

fn roll_parsed(
    rng: &mut SeedRng,
    expression: &str,
    count: i64,
    sides: i64,
    modifier: i64,
) -> Result<DiceRoll, KernelError> {
    let mut rolls = Vec::with_capacity(count as usize);
    for _ in 0..count {
        rolls.push(rng.die(sides));
    }
    let total = rolls.iter().sum::<i64>() + modifier;
    Ok(DiceRoll {
        expression: expression.to_string(),
        rolls,
        modifier,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat20_is_critical_success_regardless_of_dc() {
        let roll = D20Roll { roll: 20, total: 20, is_nat20: true, is_nat1: false };
        assert_eq!(classify(roll, 40), CheckDegree::CriticalSuccess);
    }

    #[test]
    fn nat1_is_critical_failure_regardless_of_modifier() {
        let roll = D20Roll { roll: 1, total: 16, is_nat20: false, is_nat1: true };
        assert_eq!(classify(roll, 5), CheckDegree::CriticalFailure);
    }

    #[test]
    fn degree_bands() {
        let at = |total: i64| D20Roll { roll: 10, total, is_nat20: false, is_nat1: false };
        assert_eq!(classify(at(25), 15), CheckDegree::CriticalSuccess);
        assert_eq!(classify(at(15), 15), CheckDegree::Success);
        assert_eq!(classify(at(14), 15), CheckDegree::Failure);
        assert_eq!(classify(at(5), 15), CheckDegree::CriticalFailure);
    }

    #[test]
    fn advantage_never_loses_to_normal_pairing() {
        let mut a = SeedRng::from_seed("adv");
        let mut b = SeedRng::from_seed("adv");
        for _ in 0..200 {
            let one = d20(&mut a, 0);
            let two = d20(&mut a, 0);
            let best = d20_mode(&mut b, 0, RollMode::Advantage);
            assert_eq!(best.roll, one.roll.max(two.roll));
        }
    }

    #[test]
    fn expr_trace_sums() {
        let mut rng = SeedRng::from_seed("expr");
        let roll = roll_expr(&mut rng, "3d6+2").expect("parses");
        assert_eq!(roll.rolls.len(), 3);
        assert!(roll.rolls.iter().all(|d| (1..=6).contains(d)));
        assert_eq!(roll.total, roll.rolls.iter().sum::<i64>() + 2);
    }

    #[test]
    fn crit_doubles_dice_not_modifier() {
        let mut rng = SeedRng::from_seed("crit");
        let roll = roll_expr_crit(&mut rng, "2d8+3").expect("parses");
        assert_eq!(roll.rolls.len(), 4);
        assert_eq!(roll.modifier, 3);
    }

    #[test]
    fn flat_and_negative_modifiers() {
        assert_eq!(parse_expr("7").expect("flat"), (0, 0, 7));
        assert_eq!(parse_expr("d8").expect("implicit count"), (1, 8, 0));
        assert_eq!(parse_expr("2d6-1").expect("negative"), (2, 6, -1));
        assert!(parse_expr("2x6").is_err());
        assert!(parse_expr("0d6").is_err());
    }
}
