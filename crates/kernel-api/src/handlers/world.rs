//! `world.*` handlers: generation, state inspection, and the map patch
//! preview/apply pair.

use serde::Deserialize;
use serde_json::{json, Value};

use contracts::{EventPayload, GenerateParams, KernelError};
use kernel_core::{patch, worldgen};

use super::decode_args;
use crate::{KernelApi, StoreError};

#[derive(Debug, Deserialize)]
struct WorldRefArgs {
    world_id: String,
}

#[derive(Debug, Deserialize)]
struct PatchArgs {
    world_id: String,
    script: String,
}

impl KernelApi {
    pub(crate) fn handle_world_generate(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: GenerateParams = decode_args("world.generate", args)?;
        let created_at = self.clock.next_stamp();
        let data = worldgen::generate(&params, created_at)?;

        self.store
            .save_world(&data)
            .map_err(StoreError::into_kernel_error)?;

        let summary = data.summary();
        let payload = EventPayload::WorldGenerated {
            world_id: data.world.id.clone(),
            seed: data.world.seed.clone(),
            width: data.world.width,
            height: data.world.height,
            region_count: summary.region_count,
            structure_count: summary.structure_count,
        };
        let prose = format!(
            "Generated world \"{}\" ({}) from seed \"{}\": {}x{} tiles, {} regions, {} structures, {} river segments.",
            data.world.name,
            data.world.id,
            data.world.seed,
            data.world.width,
            data.world.height,
            summary.region_count,
            summary.structure_count,
            summary.river_segment_count,
        );
        let state = json!({
            "world_id": data.world.id,
            "name": data.world.name,
            "seed": data.world.seed,
            "width": data.world.width,
            "height": data.world.height,
            "tile_count": data.tiles.len(),
            "region_count": summary.region_count,
            "structure_count": summary.structure_count,
            "biome_distribution": summary.biome_histogram,
        });

        self.worlds.insert(data.world.id.clone(), data);
        self.publish_all(vec![payload]);
        Ok((prose, state))
    }

    pub(crate) fn handle_world_get_state(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: WorldRefArgs = decode_args("world.getState", args)?;
        let data = self.world_data(&params.world_id)?;
        let summary = data.summary();
        let prose = format!(
            "World \"{}\" ({}): seed \"{}\", {}x{}, {} structures across {} regions.",
            summary.name,
            summary.world_id,
            summary.seed,
            summary.width,
            summary.height,
            summary.structure_count,
            summary.region_count,
        );
        let state = serde_json::to_value(&summary)
            .map_err(|err| KernelError::with_details(
                contracts::ErrorKind::Persistence,
                "failed to serialize world summary",
                err.to_string(),
            ))?;
        Ok((prose, state))
    }

    pub(crate) fn handle_patch_preview(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: PatchArgs = decode_args("world.mapPatch.preview", args)?;
        // The world must exist even though preview never touches it.
        self.world_data(&params.world_id)?;
        let preview = patch::preview(&params.script)?;
        let prose = format!(
            "Previewed {} command(s); will_modify={}.",
            preview.commands.len(),
            preview.will_modify,
        );
        let state = json!({
            "world_id": params.world_id,
            "commands": preview.commands,
            "will_modify": preview.will_modify,
        });
        Ok((prose, state))
    }

    pub(crate) fn handle_patch_apply(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: PatchArgs = decode_args("world.mapPatch.apply", args)?;
        let decoded = patch::parse(&params.script)?;
        let current = self.world_data(&params.world_id)?;

        let (mut next, report) = patch::apply(current, &decoded)?;
        next.world.updated_at = self.clock.next_stamp();

        // The store write is the commit point; on failure the cached world
        // is untouched and nothing is observable.
        self.store
            .save_world(&next)
            .map_err(StoreError::into_kernel_error)?;

        let summary = next.summary();
        let payload = EventPayload::PatchApplied {
            world_id: next.world.id.clone(),
            commands_executed: report.commands_executed,
        };
        let prose = format!(
            "Applied {} command(s): {} tiles modified, {} structures added, {} moved, {} roads, {} annotations.",
            report.commands_executed,
            report.tiles_modified,
            report.structures_added,
            report.structures_moved,
            report.roads_added,
            report.annotations_added,
        );
        let state = json!({
            "world_id": next.world.id,
            "commands_executed": report.commands_executed,
            "report": report,
            "structure_count": summary.structure_count,
            "tile_count": next.tiles.len(),
        });

        self.worlds.insert(next.world.id.clone(), next);
        self.publish_all(vec![payload]);
        Ok((prose, state))
    }
}
