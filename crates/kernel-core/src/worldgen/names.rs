//! Deterministic name tables for regions and structures.

use crate::rng::SeedRng;

const ONSETS: [&str; 16] = [
    "ald", "bren", "cal", "dor", "el", "fen", "gar", "hal", "isen", "kor", "lim", "mor", "nor",
    "or", "sel", "thar",
];

const BRIDGES: [&str; 8] = ["a", "e", "i", "o", "u", "ae", "ia", "ou"];

const CODAS: [&str; 16] = [
    "bury", "dale", "fell", "ford", "gate", "haven", "hold", "march", "mere", "mont", "moor",
    "stead", "ton", "vale", "wick", "worth",
];

const REGION_EPITHETS: [&str; 12] = [
    "Verdant", "Shattered", "Silent", "Golden", "Ashen", "Windswept", "Sunken", "Frozen",
    "Blistered", "Old", "Outer", "High",
];

const REGION_NOUNS: [&str; 12] = [
    "Reach", "Expanse", "March", "Wilds", "Lowlands", "Highlands", "Barrens", "Heartland",
    "Coast", "Hollows", "Steppes", "Thickets",
];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn place_name(rng: &mut SeedRng) -> String {
    let onset = ONSETS[rng.range_usize(0, ONSETS.len())];
    let coda = CODAS[rng.range_usize(0, CODAS.len())];
    if rng.range_i64(0, 2) == 0 {
        let bridge = BRIDGES[rng.range_usize(0, BRIDGES.len())];
        capitalize(&format!("{onset}{bridge}{coda}"))
    } else {
        capitalize(&format!("{onset}{coda}"))
    }
}

pub fn region_name(rng: &mut SeedRng) -> String {
    let epithet = REGION_EPITHETS[rng.range_usize(0, REGION_EPITHETS.len())];
    let noun = REGION_NOUNS[rng.range_usize(0, REGION_NOUNS.len())];
    format!("The {epithet} {noun}")
}

pub fn world_name(rng: &mut SeedRng) -> String {
    place_name(rng)
}
