//! Map patch DSL: a line-oriented command language with preview/commit
//! separation.
//!
//! ```text
//! # build out the coast
//! ADD_STRUCTURE type="city" x=10 y=10 name="Preview City" population=5000
//! SET_BIOME x=4 y=9 biome=swamp
//! ADD_ROAD path="10,10;11,10;12,11"
//! ```
//!
//! Parsing validates shape and types per line; `apply` revalidates every
//! command against a concrete world and commits all-or-nothing.

use std::collections::BTreeMap;

use contracts::{
    Annotation, Biome, GridPoint, KernelError, MapPatch, MapPatchCommand, PatchPreview,
    PatchReport, Structure, StructureKind,
};

use crate::worldgen::WorldData;

fn line_error(line_no: usize, message: impl Into<String>) -> KernelError {
    KernelError::validation(format!("line {line_no}: {}", message.into()))
}

/// Split one line into whitespace-separated tokens, honoring double quotes.
fn tokenize(line: &str, line_no: usize) -> Result<Vec<String>, KernelError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ch if ch.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            ch => current.push(ch),
        }
    }
    if in_quotes {
        return Err(line_error(line_no, "unterminated quote"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

struct ArgMap {
    line_no: usize,
    values: BTreeMap<String, String>,
}

impl ArgMap {
    fn from_tokens(tokens: &[String], line_no: usize) -> Result<Self, KernelError> {
        let mut values = BTreeMap::new();
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                return Err(line_error(line_no, format!("expected key=value, got '{token}'")));
            };
            if key.is_empty() {
                return Err(line_error(line_no, format!("empty key in '{token}'")));
            }
            if values.insert(key.to_string(), value.to_string()).is_some() {
                return Err(line_error(line_no, format!("duplicate argument '{key}'")));
            }
        }
        Ok(Self { line_no, values })
    }

    fn take_string(&mut self, key: &str) -> Result<String, KernelError> {
        self.values
            .remove(key)
            .ok_or_else(|| line_error(self.line_no, format!("missing required argument '{key}'")))
    }

    fn take_int(&mut self, key: &str) -> Result<i64, KernelError> {
        let raw = self.take_string(key)?;
        raw.parse::<i64>()
            .map_err(|_| line_error(self.line_no, format!("argument '{key}' must be an integer, got '{raw}'")))
    }

    fn take_opt_int(&mut self, key: &str) -> Result<Option<i64>, KernelError> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| line_error(self.line_no, format!("argument '{key}' must be an integer, got '{raw}'"))),
        }
    }

    fn finish(self) -> Result<(), KernelError> {
        if let Some(key) = self.values.keys().next() {
            return Err(line_error(self.line_no, format!("unknown argument '{key}'")));
        }
        Ok(())
    }
}

/// `"x1,y1;x2,y2;..."`.
fn parse_path(raw: &str, line_no: usize) -> Result<Vec<GridPoint>, KernelError> {
    let mut points = Vec::new();
    for pair in raw.split(';') {
        let Some((x_raw, y_raw)) = pair.split_once(',') else {
            return Err(line_error(line_no, format!("bad path segment '{pair}', expected x,y")));
        };
        let x = x_raw
            .trim()
            .parse::<i64>()
            .map_err(|_| line_error(line_no, format!("bad path x '{x_raw}'")))?;
        let y = y_raw
            .trim()
            .parse::<i64>()
            .map_err(|_| line_error(line_no, format!("bad path y '{y_raw}'")))?;
        points.push(GridPoint::new(x, y));
    }
    if points.len() < 2 {
        return Err(line_error(line_no, "a road needs at least two points"));
    }
    Ok(points)
}

fn decode_command(
    command: &str,
    tokens: &[String],
    line_no: usize,
) -> Result<MapPatchCommand, KernelError> {
    let mut args = ArgMap::from_tokens(tokens, line_no)?;
    let decoded = match command {
        "ADD_STRUCTURE" => {
            let kind_raw = args.take_string("type")?;
            let kind = StructureKind::parse(&kind_raw)
                .map_err(|err| line_error(line_no, err.message))?;
            MapPatchCommand::AddStructure {
                kind,
                x: args.take_int("x")?,
                y: args.take_int("y")?,
                name: args.take_string("name")?,
                population: args.take_opt_int("population")?,
            }
        }
        "SET_BIOME" => {
            let x = args.take_int("x")?;
            let y = args.take_int("y")?;
            let biome_raw = args.take_string("biome")?;
            let biome =
                Biome::parse(&biome_raw).map_err(|err| line_error(line_no, err.message))?;
            MapPatchCommand::SetBiome { x, y, biome }
        }
        "EDIT_TILE" => {
            let x = args.take_int("x")?;
            let y = args.take_int("y")?;
            let elevation = args.take_opt_int("elevation")?;
            let moisture = args.take_opt_int("moisture")?;
            let temperature = args.take_opt_int("temperature")?;
            if elevation.is_none() && moisture.is_none() && temperature.is_none() {
                return Err(line_error(line_no, "EDIT_TILE needs at least one field"));
            }
            MapPatchCommand::EditTile { x, y, elevation, moisture, temperature }
        }
        "ADD_ROAD" => {
            let raw = args.take_string("path")?;
            MapPatchCommand::AddRoad { path: parse_path(&raw, line_no)? }
        }
        "MOVE_STRUCTURE" => MapPatchCommand::MoveStructure {
            id: args.take_string("id")?,
            x: args.take_int("x")?,
            y: args.take_int("y")?,
        },
        "ADD_ANNOTATION" => MapPatchCommand::AddAnnotation {
            x: args.take_int("x")?,
            y: args.take_int("y")?,
            label: args.take_string("label")?,
        },
        other => {
            return Err(line_error(line_no, format!("unknown command '{other}'")));
        }
    };
    args.finish()?;
    Ok(decoded)
}

/// Parse a whole script. Line numbers are 1-based in every error.
pub fn parse(script: &str) -> Result<MapPatch, KernelError> {
    let mut commands = Vec::new();
    for (index, line) in script.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens = tokenize(trimmed, line_no)?;
        let Some((command, args)) = tokens.split_first() else {
            continue;
        };
        commands.push(decode_command(command, args, line_no)?);
    }
    Ok(MapPatch { commands })
}

/// Decode without touching the world.
pub fn preview(script: &str) -> Result<PatchPreview, KernelError> {
    let patch = parse(script)?;
    let will_modify = patch.commands.iter().any(MapPatchCommand::modifies_world);
    Ok(PatchPreview { commands: patch.commands, will_modify })
}

fn require_bounds(world: &WorldData, x: i64, y: i64, ordinal: usize) -> Result<(), KernelError> {
    if !world.in_bounds(x, y) {
        return Err(KernelError::validation(format!(
            "command {ordinal}: ({x}, {y}) is outside the {}x{} world",
            world.world.width, world.world.height
        )));
    }
    Ok(())
}

/// Execute a parsed patch against a snapshot of the world. Returns the
/// mutated copy and counters; the input world is untouched, so a failure
/// anywhere leaves no trace.
pub fn apply(world: &WorldData, patch: &MapPatch) -> Result<(WorldData, PatchReport), KernelError> {
    let mut next = world.clone();
    let mut report = PatchReport::default();

    for (index, command) in patch.commands.iter().enumerate() {
        let ordinal = index + 1;
        match command {
            MapPatchCommand::AddStructure { kind, x, y, name, population } => {
                require_bounds(&next, *x, *y, ordinal)?;
                let id = format!("structure:{}:{}", next.world.id, next.structures.len());
                next.structures.push(Structure {
                    id,
                    world_id: next.world.id.clone(),
                    kind: *kind,
                    x: *x,
                    y: *y,
                    name: name.clone(),
                    population: *population,
                });
                report.structures_added += 1;
            }
            MapPatchCommand::SetBiome { x, y, biome } => {
                require_bounds(&next, *x, *y, ordinal)?;
                if let Some(tile) = next.tile_at_mut(*x, *y) {
                    tile.biome = *biome;
                }
                report.tiles_modified += 1;
            }
            MapPatchCommand::EditTile { x, y, elevation, moisture, temperature } => {
                require_bounds(&next, *x, *y, ordinal)?;
                if let Some(tile) = next.tile_at_mut(*x, *y) {
                    if let Some(value) = elevation {
                        tile.elevation = *value;
                    }
                    if let Some(value) = moisture {
                        tile.moisture = *value;
                    }
                    if let Some(value) = temperature {
                        tile.temperature = *value;
                    }
                    tile.validate().map_err(|err| {
                        KernelError::validation(format!("command {ordinal}: {}", err.message))
                    })?;
                }
                report.tiles_modified += 1;
            }
            MapPatchCommand::AddRoad { path } => {
                for point in path {
                    require_bounds(&next, point.x, point.y, ordinal)?;
                }
                next.roads.push(path.clone());
                report.roads_added += 1;
            }
            MapPatchCommand::MoveStructure { id, x, y } => {
                require_bounds(&next, *x, *y, ordinal)?;
                let Some(structure) = next.structures.iter_mut().find(|s| &s.id == id) else {
                    return Err(KernelError::not_found(format!(
                        "command {ordinal}: no structure '{id}'"
                    )));
                };
                structure.x = *x;
                structure.y = *y;
                report.structures_moved += 1;
            }
            MapPatchCommand::AddAnnotation { x, y, label } => {
                require_bounds(&next, *x, *y, ordinal)?;
                let id = format!("annotation:{}:{}", next.world.id, next.annotations.len());
                next.annotations.push(Annotation {
                    id,
                    world_id: next.world.id.clone(),
                    x: *x,
                    y: *y,
                    label: label.clone(),
                });
                report.annotations_added += 1;
            }
        }
        report.commands_executed += 1;
    }
    Ok((next, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::GenerateParams;

    fn test_world() -> WorldData {
        crate::worldgen::generate(&GenerateParams::new("patch-test", 20, 20), "tick-000001".to_string())
            .expect("world generates")
    }

    #[test]
    fn parses_commands_with_quotes_and_comments() {
        let script = r#"
# coastal build-out
ADD_STRUCTURE type="city" x=10 y=10 name="Preview City" population=5000

SET_BIOME x=4 y=9 biome=swamp
"#;
        let patch = parse(script).expect("parses");
        assert_eq!(patch.commands.len(), 2);
        match &patch.commands[0] {
            MapPatchCommand::AddStructure { name, population, .. } => {
                assert_eq!(name, "Preview City");
                assert_eq!(*population, Some(5000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_command_cites_its_line() {
        let err = parse("SET_BIOME x=1 y=1 biome=swamp\nINVALID_COMMAND x=5 y=5").expect_err("rejects");
        assert_eq!(err.kind, contracts::ErrorKind::Validation);
        assert!(err.message.contains("line 2"), "got: {}", err.message);
        assert!(err.message.contains("INVALID_COMMAND"));
    }

    #[test]
    fn missing_argument_cites_line_and_key() {
        let err = parse("ADD_STRUCTURE type=city x=3 y=4").expect_err("rejects");
        assert!(err.message.contains("line 1"));
        assert!(err.message.contains("'name'"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = parse("SET_BIOME x=1 y=1 biome=swamp sparkle=yes").expect_err("rejects");
        assert!(err.message.contains("'sparkle'"));
    }

    #[test]
    fn preview_reports_without_mutation() {
        let world = test_world();
        let structure_count = world.structures.len();
        let decoded =
            preview("ADD_STRUCTURE type=\"city\" x=10 y=10 name=\"Preview City\"").expect("previews");
        assert_eq!(decoded.commands.len(), 1);
        assert!(decoded.will_modify);
        assert_eq!(world.structures.len(), structure_count);
    }

    #[test]
    fn apply_matches_preview_counts() {
        let world = test_world();
        let script = "ADD_STRUCTURE type=\"city\" x=10 y=10 name=\"Preview City\"";
        let decoded = preview(script).expect("previews");
        let patch = parse(script).expect("parses");
        let (next, report) = apply(&world, &patch).expect("applies");
        assert_eq!(report.structures_added, decoded.commands.len());
        assert_eq!(next.structures.len(), world.structures.len() + 1);
    }

    #[test]
    fn apply_is_atomic_on_out_of_bounds() {
        let world = test_world();
        let patch = parse(
            "ADD_STRUCTURE type=town x=1 y=1 name=Okay\nSET_BIOME x=99 y=99 biome=swamp",
        )
        .expect("parses");
        let err = apply(&world, &patch).expect_err("second command out of bounds");
        assert!(err.message.contains("command 2"));
        // Caller keeps the original snapshot; nothing observable changed.
        assert_eq!(world.structures.len(), test_world().structures.len());
    }

    #[test]
    fn edit_tile_rejects_out_of_range_values() {
        let world = test_world();
        let patch = parse("EDIT_TILE x=1 y=1 elevation=300").expect("parses");
        let err = apply(&world, &patch).expect_err("elevation out of range");
        assert_eq!(err.kind, contracts::ErrorKind::Validation);
    }

    #[test]
    fn roads_and_annotations_land() {
        let world = test_world();
        let patch = parse(
            "ADD_ROAD path=\"1,1;2,1;3,2\"\nADD_ANNOTATION x=3 y=2 label=\"old battlefield\"",
        )
        .expect("parses");
        let (next, report) = apply(&world, &patch).expect("applies");
        assert_eq!(report.roads_added, 1);
        assert_eq!(report.annotations_added, 1);
        assert_eq!(next.roads[0].len(), 3);
        assert_eq!(next.annotations[0].label, "old battlefield");
    }

    #[test]
    fn move_structure_requires_existing_id() {
        let world = test_world();
        let patch = parse("MOVE_STRUCTURE id=structure:nope:0 x=2 y=2").expect("parses");
        let err = apply(&world, &patch).expect_err("missing structure");
        assert_eq!(err.kind, contracts::ErrorKind::NotFound);
    }
}
