//! Structure placement. Candidates are scored per kind from terrain
//! features (coast, rivers, confluences, habitability) and placed greedily
//! in score order under a minimum-separation rule.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{Biome, GridPoint, RiverSegment, Structure, StructureKind, SEA_LEVEL};

use super::names;
use crate::rng::SeedRng;

pub struct PlacementInput<'a> {
    pub world_id: &'a str,
    pub width: i64,
    pub height: i64,
    pub elevation: &'a [i64],
    pub moisture: &'a [i64],
    pub temperature: &'a [i64],
    pub biomes: &'a [Biome],
    pub rivers: &'a [RiverSegment],
}

fn idx(width: i64, x: i64, y: i64) -> usize {
    (y * width + x) as usize
}

fn is_coast(input: &PlacementInput<'_>, x: i64, y: i64) -> bool {
    for (dx, dy) in [(0_i64, -1_i64), (-1, 0), (1, 0), (0, 1)] {
        let nx = x + dx;
        let ny = y + dy;
        if nx < 0 || ny < 0 || nx >= input.width || ny >= input.height {
            continue;
        }
        if input.elevation[idx(input.width, nx, ny)] < SEA_LEVEL {
            return true;
        }
    }
    false
}

/// Suitability of the local climate and biome for settlement, in [0, 60].
fn habitability(input: &PlacementInput<'_>, x: i64, y: i64) -> i64 {
    let i = idx(input.width, x, y);
    let mut score = if input.biomes[i].is_habitable() { 35 } else { 0 };
    if (30..=75).contains(&input.moisture[i]) {
        score += 12;
    }
    if (5..=25).contains(&input.temperature[i]) {
        score += 13;
    }
    score
}

fn separation_ok(placed: &[Structure], x: i64, y: i64, min_sep: i64) -> bool {
    placed
        .iter()
        .all(|s| GridPoint::new(s.x, s.y).chebyshev(&GridPoint::new(x, y)) >= min_sep)
}

pub fn place_structures(input: &PlacementInput<'_>, rng: &mut SeedRng) -> Vec<Structure> {
    let area = input.width * input.height;
    let min_sep = (input.width.min(input.height) / 10).max(3);

    let mut river_cells: BTreeSet<GridPoint> = BTreeSet::new();
    let mut inflow: BTreeMap<GridPoint, usize> = BTreeMap::new();
    for segment in input.rivers {
        river_cells.insert(GridPoint::new(segment.from_x, segment.from_y));
        *inflow
            .entry(GridPoint::new(segment.to_x, segment.to_y))
            .or_default() += 1;
    }
    // A confluence is a cell fed by at least two tributaries.
    let confluences: BTreeSet<GridPoint> = inflow
        .iter()
        .filter(|(_, feeds)| **feeds >= 2)
        .map(|(point, _)| *point)
        .collect();

    let quota: [(StructureKind, i64); 7] = [
        (StructureKind::City, (area / 600).clamp(1, 4)),
        (StructureKind::Town, (area / 350).clamp(1, 6)),
        (StructureKind::Village, (area / 200).clamp(2, 10)),
        (StructureKind::Castle, (area / 800).clamp(1, 3)),
        (StructureKind::Temple, (area / 900).clamp(1, 2)),
        (StructureKind::Ruins, (area / 700).clamp(1, 3)),
        (StructureKind::Dungeon, (area / 700).clamp(1, 3)),
    ];

    let mut placed: Vec<Structure> = Vec::new();
    for (kind, count) in quota {
        // Candidates scored in scan order; ties keep the earlier cell.
        let mut candidates: Vec<(i64, i64, i64)> = Vec::new();
        for y in 0..input.height {
            for x in 0..input.width {
                let i = idx(input.width, x, y);
                if input.elevation[i] < SEA_LEVEL {
                    continue;
                }
                let here = GridPoint::new(x, y);
                let habit = habitability(input, x, y);
                let score = match kind {
                    StructureKind::City => {
                        let mut s = habit;
                        if is_coast(input, x, y) {
                            s += 50;
                        }
                        if confluences.contains(&here)
                            || confluences.iter().any(|c| c.adjacent(&here))
                        {
                            s += 30;
                        }
                        s
                    }
                    StructureKind::Town => {
                        let mut s = habit;
                        if river_cells.contains(&here) {
                            s += 45;
                        }
                        s
                    }
                    StructureKind::Village => habit + input.moisture[i] / 10,
                    StructureKind::Castle => {
                        let mut s = input.elevation[i] / 2;
                        if input.biomes[i] != Biome::Glacier {
                            s += 10;
                        }
                        s
                    }
                    StructureKind::Temple => habit / 2 + input.elevation[i] / 4,
                    StructureKind::Ruins | StructureKind::Dungeon => {
                        // Remote, inhospitable corners.
                        60 - habit + input.elevation[i] / 5
                    }
                };
                if score > 0 {
                    candidates.push((score, y, x));
                }
            }
        }
        candidates.sort_by_key(|&(score, y, x)| (std::cmp::Reverse(score), y, x));

        let mut taken = 0;
        for (_, y, x) in candidates {
            if taken >= count {
                break;
            }
            // Towns require a river; skip scoreless fits.
            if kind == StructureKind::Town && !river_cells.contains(&GridPoint::new(x, y)) {
                continue;
            }
            if kind == StructureKind::Village
                && !input.biomes[idx(input.width, x, y)].is_habitable()
            {
                continue;
            }
            if !separation_ok(&placed, x, y, min_sep) {
                continue;
            }
            let ordinal = placed.len();
            let population = match kind {
                StructureKind::City => Some(rng.range_i64(2_000, 20_000)),
                StructureKind::Town => Some(rng.range_i64(500, 2_000)),
                StructureKind::Village => Some(rng.range_i64(50, 500)),
                _ => None,
            };
            placed.push(Structure {
                id: format!("structure:{}:{ordinal}", input.world_id),
                world_id: input.world_id.to_string(),
                kind,
                x,
                y,
                name: names::place_name(rng),
                population,
            });
            taken += 1;
        }
    }
    placed
}
