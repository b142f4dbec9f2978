//! Region segmentation: contiguous land components sharing a biome and an
//! elevation band, named and colored deterministically.

use std::collections::VecDeque;

use contracts::{Biome, Region, RegionKind, SEA_LEVEL};

use super::names;
use crate::rng::SeedRng;

const PALETTE: [&str; 10] = [
    "#8c6d46", "#4f7942", "#2e6f6c", "#7a4f9d", "#b0563b", "#3d5a80", "#9a8c98", "#588157",
    "#bc6c25", "#6d6875",
];

const MIN_REGION_TILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElevBand {
    Lowland,
    Upland,
    Highland,
}

fn elev_band(elevation: i64) -> ElevBand {
    if elevation >= 70 {
        ElevBand::Highland
    } else if elevation >= 40 {
        ElevBand::Upland
    } else {
        ElevBand::Lowland
    }
}

fn region_kind(biome: Biome, band: ElevBand) -> RegionKind {
    match band {
        ElevBand::Highland => RegionKind::Highlands,
        ElevBand::Upland => {
            if biome.is_habitable() {
                RegionKind::Marches
            } else {
                RegionKind::Frontier
            }
        }
        ElevBand::Lowland => {
            if biome.is_habitable() {
                RegionKind::Kingdom
            } else {
                RegionKind::Wilderness
            }
        }
    }
}

/// Flood-fill over 4-connected land cells keyed by (biome, band). Scan order
/// is (y, x), so component discovery and region ids are deterministic.
pub fn segment_regions(
    world_id: &str,
    width: i64,
    height: i64,
    elevation: &[i64],
    biomes: &[Biome],
    rng: &mut SeedRng,
) -> Vec<Region> {
    let len = elevation.len();
    let mut visited = vec![false; len];
    let mut regions = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if visited[idx] || elevation[idx] < SEA_LEVEL {
                continue;
            }
            let key = (biomes[idx], elev_band(elevation[idx]));
            let mut members = Vec::new();
            let mut queue = VecDeque::from([idx]);
            visited[idx] = true;

            while let Some(current) = queue.pop_front() {
                members.push(current);
                let cx = current as i64 % width;
                let cy = current as i64 / width;
                for (dx, dy) in [(0_i64, -1_i64), (-1, 0), (1, 0), (0, 1)] {
                    let nx = cx + dx;
                    let ny = cy + dy;
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    let nidx = (ny * width + nx) as usize;
                    if visited[nidx] || elevation[nidx] < SEA_LEVEL {
                        continue;
                    }
                    if (biomes[nidx], elev_band(elevation[nidx])) != key {
                        continue;
                    }
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }

            if members.len() < MIN_REGION_TILES {
                continue;
            }

            let count = members.len() as i64;
            let sum_x: i64 = members.iter().map(|&m| m as i64 % width).sum();
            let sum_y: i64 = members.iter().map(|&m| m as i64 / width).sum();
            let ordinal = regions.len();
            regions.push(Region {
                id: format!("region:{world_id}:{ordinal}"),
                world_id: world_id.to_string(),
                name: names::region_name(rng),
                kind: region_kind(key.0, key.1),
                center_x: sum_x / count,
                center_y: sum_y / count,
                color: PALETTE[ordinal % PALETTE.len()].to_string(),
                tile_count: members.len(),
            });
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_by_biome_boundary() {
        // 6x2 strip: left half grassland, right half desert, all lowland.
        let width = 6;
        let height = 2;
        let elevation = vec![25; 12];
        let mut biomes = vec![Biome::Grassland; 12];
        for y in 0..2 {
            for x in 3..6 {
                biomes[(y * 6 + x) as usize] = Biome::Desert;
            }
        }
        let mut rng = SeedRng::from_seed("regions");
        let regions = segment_regions("w", width, height, &elevation, &biomes, &mut rng);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].kind, RegionKind::Kingdom);
        assert_eq!(regions[1].kind, RegionKind::Wilderness);
        assert_eq!(regions[0].tile_count, 6);
    }

    #[test]
    fn small_fragments_are_dropped() {
        let elevation = vec![25, 25, 5, 5];
        let biomes = vec![Biome::Grassland, Biome::Grassland, Biome::Ocean, Biome::Ocean];
        let mut rng = SeedRng::from_seed("tiny");
        let regions = segment_regions("w", 2, 2, &elevation, &biomes, &mut rng);
        assert!(regions.is_empty());
    }

    #[test]
    fn segmentation_is_deterministic() {
        let width = 8;
        let height = 8;
        let elevation: Vec<i64> = (0..64).map(|i| 20 + (i % 50)).collect();
        let biomes = vec![Biome::Grassland; 64];
        let mut rng_a = SeedRng::from_seed("det");
        let mut rng_b = SeedRng::from_seed("det");
        let a = segment_regions("w", width, height, &elevation, &biomes, &mut rng_a);
        let b = segment_regions("w", width, height, &elevation, &biomes, &mut rng_b);
        assert_eq!(a, b);
    }
}
