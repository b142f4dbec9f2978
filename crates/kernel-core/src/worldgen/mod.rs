//! Procedural world generation. The pipeline is a pure function of
//! [`GenerateParams`]: heightmap, optional tectonic ridges, climate, biome
//! lookup, rivers, regions, and structures, in that order. Every stage
//! draws from its own forked seed stream.

mod biome;
mod climate;
mod names;
mod noise;
mod regions;
mod rivers;
mod structures;

pub use biome::{lookup as biome_lookup, moisture_level, temp_band, TempBand};
pub use rivers::{compute_flow, river_threshold, FlowMap};

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use contracts::{
    Annotation, Biome, GenerateParams, GridPoint, KernelError, Region, RiverSegment, Structure,
    Tile, World, WorldSummary, SCHEMA_VERSION_V1, SEA_LEVEL,
};

use crate::rng::{hash_seed, SeedRng};
use noise::NoiseField;

const FBM_PERSISTENCE: f64 = 0.5;
const FBM_LACUNARITY: f64 = 2.0;

/// A fully generated (or loaded) world: the owning record plus everything
/// it contains. This is the in-memory form the patch DSL mutates and the
/// store persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldData {
    pub world: World,
    pub tiles: Vec<Tile>,
    pub regions: Vec<Region>,
    pub rivers: Vec<RiverSegment>,
    pub structures: Vec<Structure>,
    #[serde(default)]
    pub roads: Vec<Vec<GridPoint>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl WorldData {
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.world.width && y < self.world.height
    }

    pub fn tile_at(&self, x: i64, y: i64) -> Option<&Tile> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.tiles.get((y * self.world.width + x) as usize)
    }

    pub fn tile_at_mut(&mut self, x: i64, y: i64) -> Option<&mut Tile> {
        if !self.in_bounds(x, y) {
            return None;
        }
        let width = self.world.width;
        self.tiles.get_mut((y * width + x) as usize)
    }

    pub fn biome_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for tile in &self.tiles {
            *histogram.entry(tile.biome.as_str().to_string()).or_default() += 1;
        }
        histogram
    }

    pub fn summary(&self) -> WorldSummary {
        let mut summary = WorldSummary::new(&self.world);
        summary.biome_histogram = self.biome_histogram();
        summary.region_count = self.regions.len();
        summary.structure_count = self.structures.len();
        summary.river_segment_count = self.rivers.len();
        summary
    }

    /// Order-sensitive digest of everything observable: used by replay to
    /// check reconstructed state against the original.
    pub fn state_hash(&self) -> u64 {
        let mut hash = hash_seed(&self.world.id) ^ hash_seed(&self.world.seed);
        for tile in &self.tiles {
            hash = mix(hash, tile.elevation as u64);
            hash = mix(hash, tile.moisture as u64);
            hash = mix(hash, (tile.temperature + 64) as u64);
            hash = mix(hash, tile.biome as u64);
        }
        for structure in &self.structures {
            hash = mix(hash, hash_seed(&structure.id));
            hash = mix(hash, hash_seed(&structure.name));
            hash = mix(hash, (structure.x as u64) << 32 | structure.y as u64);
        }
        for region in &self.regions {
            hash = mix(hash, hash_seed(&region.id));
        }
        for road in &self.roads {
            hash = mix(hash, road.len() as u64);
        }
        for annotation in &self.annotations {
            hash = mix(hash, hash_seed(&annotation.label));
        }
        hash
    }
}

fn mix(hash: u64, value: u64) -> u64 {
    let mut mixed = hash ^ value.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    mixed ^= mixed.rotate_left(29);
    mixed.wrapping_mul(0x517c_c1b7_2722_0a95)
}

/// Deterministic world id: the same params name the same world.
pub fn world_id_for(params: &GenerateParams) -> String {
    format!(
        "world:{:016x}",
        hash_seed(&format!("{}:{}x{}", params.seed, params.width, params.height))
    )
}

pub fn generate(params: &GenerateParams, created_at: String) -> Result<WorldData, KernelError> {
    params.validate()?;

    let width = params.width;
    let height = params.height;
    let root = SeedRng::from_seed(params.seed.clone());

    let mut raw = raw_heightmap(params);
    if params.ridges {
        apply_ridges(&mut raw, width, height, &mut root.fork("ridges"));
    }
    let elevation = normalize_heightmap(&raw, params.land_ratio);

    let temp_noise = NoiseField::new(hash_seed(&format!("{}-temp", params.seed)));
    let temperature = climate::temperature_field(
        width,
        height,
        &elevation,
        &temp_noise,
        params.temperature_offset,
    );
    let moisture_noise = NoiseField::new(hash_seed(&format!("{}-moisture", params.seed)));
    let moisture = climate::moisture_field(
        width,
        height,
        &elevation,
        &moisture_noise,
        params.moisture_offset,
    );

    let biomes: Vec<Biome> = elevation
        .iter()
        .zip(temperature.iter().zip(moisture.iter()))
        .map(|(&elev, (&temp, &moist))| {
            if elev < SEA_LEVEL {
                Biome::Ocean
            } else {
                biome::lookup(temp, moist)
            }
        })
        .collect();

    let world_id = world_id_for(params);
    let flow = rivers::compute_flow(width, height, &elevation, &moisture);
    let river_segments = rivers::river_segments(
        &world_id,
        width,
        &elevation,
        &flow,
        rivers::river_threshold(width, height),
    );

    let regions = regions::segment_regions(
        &world_id,
        width,
        height,
        &elevation,
        &biomes,
        &mut root.fork("regions"),
    );

    let placement = structures::PlacementInput {
        world_id: &world_id,
        width,
        height,
        elevation: &elevation,
        moisture: &moisture,
        temperature: &temperature,
        biomes: &biomes,
        rivers: &river_segments,
    };
    let placed = structures::place_structures(&placement, &mut root.fork("structures"));

    let name = params
        .name
        .clone()
        .unwrap_or_else(|| names::world_name(&mut root.fork("name")));

    let world = World {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        id: world_id.clone(),
        name,
        seed: params.seed.clone(),
        width,
        height,
        created_at: created_at.clone(),
        updated_at: created_at,
        environment: None,
    };
    world.validate()?;

    let mut tiles = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let tile = Tile {
                world_id: world_id.clone(),
                x,
                y,
                biome: biomes[idx],
                elevation: elevation[idx],
                moisture: moisture[idx],
                temperature: temperature[idx],
            };
            tile.validate()?;
            tiles.push(tile);
        }
    }

    Ok(WorldData {
        world,
        tiles,
        regions,
        rivers: river_segments,
        structures: placed,
        roads: Vec::new(),
        annotations: Vec::new(),
    })
}

/// Layered noise sampled per cell. Rows evaluate in parallel; each cell is a
/// pure function of (seed, x, y), so the parallelism cannot perturb output.
fn raw_heightmap(params: &GenerateParams) -> Vec<f64> {
    let field = NoiseField::new(hash_seed(&format!("{}-height", params.seed)));
    let width = params.width;
    let scale = 8.0 / params.width.max(params.height) as f64;
    let octaves = params.octaves;

    let rows: Vec<Vec<f64>> = (0..params.height)
        .into_par_iter()
        .map(|y| {
            (0..width)
                .map(|x| {
                    field.fbm(
                        x as f64 * scale,
                        y as f64 * scale,
                        octaves,
                        FBM_PERSISTENCE,
                        FBM_LACUNARITY,
                    )
                })
                .collect()
        })
        .collect();
    rows.into_iter().flatten().collect()
}

/// Oriented ridge segments with radial falloff, layered onto the raw field
/// before normalization so the land ratio still holds exactly.
fn apply_ridges(raw: &mut [f64], width: i64, height: i64, rng: &mut SeedRng) {
    let count = ((width + height) / 24).max(1);
    let radius = (width.min(height) as f64 / 6.0).max(2.0);

    for _ in 0..count {
        let x1 = rng.range_i64(0, width - 1) as f64;
        let y1 = rng.range_i64(0, height - 1) as f64;
        let x2 = rng.range_i64(0, width - 1) as f64;
        let y2 = rng.range_i64(0, height - 1) as f64;
        let strength = 0.25 + rng.next_f64() * 0.5;

        for y in 0..height {
            for x in 0..width {
                let d = point_segment_distance(x as f64, y as f64, x1, y1, x2, y2);
                let falloff = (1.0 - d / radius).max(0.0);
                raw[(y * width + x) as usize] += strength * falloff;
            }
        }
    }
}

fn point_segment_distance(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        (((px - x1) * dx + (py - y1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = x1 + t * dx;
    let cy = y1 + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Sort-and-requantize: the (1 - land_ratio) quantile maps to sea level and
/// the remainder scales linearly onto [20, 100].
fn normalize_heightmap(raw: &[f64], land_ratio: f64) -> Vec<i64> {
    let mut sorted: Vec<f64> = raw.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let sea_index = (((1.0 - land_ratio) * n as f64) as usize).min(n.saturating_sub(1));
    let quantile = sorted[sea_index];
    let min = sorted[0];
    let max = sorted[n - 1];

    raw.iter()
        .map(|&value| {
            if value < quantile {
                let span = quantile - min;
                if span <= f64::EPSILON {
                    0
                } else {
                    (((value - min) / span) * (SEA_LEVEL - 1) as f64) as i64
                }
            } else {
                let span = max - quantile;
                if span <= f64::EPSILON {
                    SEA_LEVEL
                } else {
                    SEA_LEVEL + (((value - quantile) / span) * (100 - SEA_LEVEL) as f64) as i64
                }
            }
            .clamp(0, 100)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_seed_deterministic() {
        let params = GenerateParams::new("determinism-001", 15, 15);
        let a = generate(&params, "tick-000001".to_string()).expect("generate");
        let b = generate(&params, "tick-000001".to_string()).expect("generate");
        assert_eq!(a, b);
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn distinct_seeds_diverge_in_most_cells() {
        let a = generate(&GenerateParams::new("seed-alpha", 15, 15), "t".to_string())
            .expect("generate");
        let b = generate(&GenerateParams::new("seed-beta", 15, 15), "t".to_string())
            .expect("generate");
        let differing = a
            .tiles
            .iter()
            .zip(b.tiles.iter())
            .filter(|(ta, tb)| ta.elevation != tb.elevation)
            .count();
        assert!(differing >= 113, "only {differing}/225 cells differ");
    }

    #[test]
    fn land_ratio_is_honored() {
        let mut params = GenerateParams::new("ratio-check", 40, 40);
        params.land_ratio = 0.4;
        let data = generate(&params, "t".to_string()).expect("generate");
        let land = data.tiles.iter().filter(|t| t.elevation >= SEA_LEVEL).count();
        let fraction = land as f64 / data.tiles.len() as f64;
        assert!((0.3..=0.5).contains(&fraction), "land fraction {fraction}");
    }

    #[test]
    fn ocean_tiles_are_ocean_biome() {
        let data = generate(&GenerateParams::new("ocean-biome", 20, 20), "t".to_string())
            .expect("generate");
        for tile in &data.tiles {
            if tile.elevation < SEA_LEVEL {
                assert_eq!(tile.biome, Biome::Ocean);
            } else {
                assert_ne!(tile.biome, Biome::Ocean);
            }
        }
    }

    #[test]
    fn rivers_flow_downhill_in_generated_worlds() {
        let data = generate(&GenerateParams::new("river-check", 30, 30), "t".to_string())
            .expect("generate");
        for segment in &data.rivers {
            let from = data.tile_at(segment.from_x, segment.from_y).expect("from tile");
            let to = data.tile_at(segment.to_x, segment.to_y).expect("to tile");
            assert!(to.elevation < from.elevation);
        }
    }

    #[test]
    fn invalid_params_fail_before_any_work() {
        let mut params = GenerateParams::new("bad", 0, 10);
        assert!(generate(&params, "t".to_string()).is_err());
        params.width = 10;
        params.land_ratio = 2.0;
        assert!(generate(&params, "t".to_string()).is_err());
    }

    #[test]
    fn world_id_depends_on_seed_and_size() {
        let a = world_id_for(&GenerateParams::new("s", 10, 10));
        let b = world_id_for(&GenerateParams::new("s", 10, 11));
        let c = world_id_for(&GenerateParams::new("t", 10, 10));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
