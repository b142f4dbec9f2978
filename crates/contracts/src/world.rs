//! World, tile, region, river, and structure records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{KernelError, SCHEMA_VERSION_V1};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Ocean,
    Desert,
    Savanna,
    Shrubland,
    Grassland,
    SeasonalForest,
    Rainforest,
    Swamp,
    DeciduousForest,
    TemperateRainforest,
    ConiferForest,
    Steppe,
    Taiga,
    Bog,
    ColdDesert,
    Tundra,
    Glacier,
}

impl Biome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Biome::Ocean => "ocean",
            Biome::Desert => "desert",
            Biome::Savanna => "savanna",
            Biome::Shrubland => "shrubland",
            Biome::Grassland => "grassland",
            Biome::SeasonalForest => "seasonal_forest",
            Biome::Rainforest => "rainforest",
            Biome::Swamp => "swamp",
            Biome::DeciduousForest => "deciduous_forest",
            Biome::TemperateRainforest => "temperate_rainforest",
            Biome::ConiferForest => "conifer_forest",
            Biome::Steppe => "steppe",
            Biome::Taiga => "taiga",
            Biome::Bog => "bog",
            Biome::ColdDesert => "cold_desert",
            Biome::Tundra => "tundra",
            Biome::Glacier => "glacier",
        }
    }

    /// Biomes where villages can take root.
    pub fn is_habitable(&self) -> bool {
        matches!(
            self,
            Biome::Grassland
                | Biome::SeasonalForest
                | Biome::DeciduousForest
                | Biome::Shrubland
                | Biome::Savanna
                | Biome::ConiferForest
                | Biome::Steppe
        )
    }

    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        serde_json::from_value(Value::String(raw.to_string()))
            .map_err(|_| KernelError::validation(format!("unknown biome: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct World {
    pub schema_version: String,
    pub id: String,
    pub name: String,
    pub seed: String,
    pub width: i64,
    pub height: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl World {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.seed.is_empty() {
            return Err(KernelError::validation("world seed must be nonempty"));
        }
        if self.width < 1 || self.height < 1 {
            return Err(KernelError::validation(format!(
                "world dimensions must be >= 1, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tile {
    pub world_id: String,
    pub x: i64,
    pub y: i64,
    pub biome: Biome,
    pub elevation: i64,
    pub moisture: i64,
    pub temperature: i64,
}

impl Tile {
    pub fn validate(&self) -> Result<(), KernelError> {
        if !(0..=100).contains(&self.elevation) {
            return Err(KernelError::validation(format!(
                "tile ({},{}) elevation {} outside [0,100]",
                self.x, self.y, self.elevation
            )));
        }
        if !(0..=100).contains(&self.moisture) {
            return Err(KernelError::validation(format!(
                "tile ({},{}) moisture {} outside [0,100]",
                self.x, self.y, self.moisture
            )));
        }
        if !(-20..=40).contains(&self.temperature) {
            return Err(KernelError::validation(format!(
                "tile ({},{}) temperature {} outside [-20,40]",
                self.x, self.y, self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Kingdom,
    Wilderness,
    Frontier,
    Highlands,
    Marches,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub world_id: String,
    pub name: String,
    pub kind: RegionKind,
    pub center_x: i64,
    pub center_y: i64,
    pub color: String,
    pub tile_count: usize,
}

/// One directed edge of a river. Edges always point strictly downhill, so
/// the full set forms a DAG from sources to mouths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiverSegment {
    pub world_id: String,
    pub from_x: i64,
    pub from_y: i64,
    pub to_x: i64,
    pub to_y: i64,
    pub flux: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    City,
    Town,
    Village,
    Castle,
    Ruins,
    Dungeon,
    Temple,
}

impl StructureKind {
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        serde_json::from_value(Value::String(raw.to_string()))
            .map_err(|_| KernelError::validation(format!("unknown structure type: {raw}")))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::City => "city",
            StructureKind::Town => "town",
            StructureKind::Village => "village",
            StructureKind::Castle => "castle",
            StructureKind::Ruins => "ruins",
            StructureKind::Dungeon => "dungeon",
            StructureKind::Temple => "temple",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Structure {
    pub id: String,
    pub world_id: String,
    pub kind: StructureKind,
    pub x: i64,
    pub y: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<i64>,
}

/// Free-form map annotation placed through the patch DSL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    pub id: String,
    pub world_id: String,
    pub x: i64,
    pub y: i64,
    pub label: String,
}

/// Parameters for `world.generate`. Optional knobs default to the published
/// pipeline constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateParams {
    pub seed: String,
    pub width: i64,
    pub height: i64,
    #[serde(default = "default_land_ratio")]
    pub land_ratio: f64,
    #[serde(default = "default_octaves")]
    pub octaves: u32,
    #[serde(default)]
    pub temperature_offset: i64,
    #[serde(default)]
    pub moisture_offset: i64,
    #[serde(default = "default_ridges")]
    pub ridges: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_land_ratio() -> f64 {
    0.45
}

fn default_octaves() -> u32 {
    6
}

fn default_ridges() -> bool {
    true
}

impl GenerateParams {
    pub fn new(seed: impl Into<String>, width: i64, height: i64) -> Self {
        Self {
            seed: seed.into(),
            width,
            height,
            land_ratio: default_land_ratio(),
            octaves: default_octaves(),
            temperature_offset: 0,
            moisture_offset: 0,
            ridges: default_ridges(),
            name: None,
        }
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        if self.seed.is_empty() {
            return Err(KernelError::validation("seed must be nonempty"));
        }
        if self.width < 1 || self.height < 1 {
            return Err(KernelError::validation(format!(
                "dimensions must be >= 1, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.land_ratio > 0.0 && self.land_ratio < 1.0) {
            return Err(KernelError::validation(format!(
                "land_ratio must lie in (0,1), got {}",
                self.land_ratio
            )));
        }
        if self.octaves == 0 || self.octaves > 12 {
            return Err(KernelError::validation(format!(
                "octaves must lie in [1,12], got {}",
                self.octaves
            )));
        }
        Ok(())
    }
}

/// Summary record returned by `world.get_state`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSummary {
    pub schema_version: String,
    pub world_id: String,
    pub name: String,
    pub seed: String,
    pub width: i64,
    pub height: i64,
    pub biome_histogram: BTreeMap<String, usize>,
    pub region_count: usize,
    pub structure_count: usize,
    pub river_segment_count: usize,
}

impl WorldSummary {
    pub fn new(world: &World) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            world_id: world.id.clone(),
            name: world.name.clone(),
            seed: world.seed.clone(),
            width: world.width,
            height: world.height,
            biome_histogram: BTreeMap::new(),
            region_count: 0,
            structure_count: 0,
            river_segment_count: 0,
        }
    }
}
