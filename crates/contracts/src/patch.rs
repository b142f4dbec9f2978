//! Map patch command records: the decoded, schema-validated form of the
//! line-oriented patch DSL.

use serde::{Deserialize, Serialize};

use crate::world::{Biome, StructureKind};
use crate::GridPoint;

/// One decoded patch command. The parser guarantees coordinates and enums
/// are well-typed; bounds checks against a concrete world happen at apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MapPatchCommand {
    AddStructure {
        kind: StructureKind,
        x: i64,
        y: i64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        population: Option<i64>,
    },
    SetBiome {
        x: i64,
        y: i64,
        biome: Biome,
    },
    EditTile {
        x: i64,
        y: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elevation: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moisture: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<i64>,
    },
    AddRoad {
        path: Vec<GridPoint>,
    },
    MoveStructure {
        id: String,
        x: i64,
        y: i64,
    },
    AddAnnotation {
        x: i64,
        y: i64,
        label: String,
    },
}

impl MapPatchCommand {
    /// Whether executing this command mutates world state. Every current
    /// variant does; the flag feeds `preview.will_modify`.
    pub fn modifies_world(&self) -> bool {
        true
    }
}

/// Ordered command sequence decoded from one script.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MapPatch {
    pub commands: Vec<MapPatchCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchPreview {
    pub commands: Vec<MapPatchCommand>,
    pub will_modify: bool,
}

/// Counters returned by a successful atomic apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchReport {
    pub commands_executed: usize,
    pub tiles_modified: usize,
    pub structures_added: usize,
    pub structures_moved: usize,
    pub roads_added: usize,
    pub annotations_added: usize,
}
