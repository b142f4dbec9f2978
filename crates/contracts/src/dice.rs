//! Roll trace records. Every roll the kernel makes is returned to the caller
//! in full, so clients can show their work.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct D20Roll {
    pub roll: i64,
    pub total: i64,
    pub is_nat20: bool,
    pub is_nat1: bool,
}

/// How the d20 was sampled. Advantage and disadvantage cancel when both are
/// requested.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => RollMode::Advantage,
            (false, true) => RollMode::Disadvantage,
            _ => RollMode::Normal,
        }
    }
}

/// Trace of an `NdM[+K]` expression roll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiceRoll {
    pub expression: String,
    pub rolls: Vec<i64>,
    pub modifier: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CheckDegree {
    CriticalFailure,
    Failure,
    Success,
    CriticalSuccess,
}

impl CheckDegree {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckDegree::Success | CheckDegree::CriticalSuccess)
    }
}

/// A classified d20 check against a DC, with the underlying roll attached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub roll: D20Roll,
    pub dc: i64,
    pub degree: CheckDegree,
    pub mode: RollMode,
}
