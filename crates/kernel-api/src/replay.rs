//! Replay: reconstruct kernel state by re-dispatching a recorded audit log
//! against a fresh session. With the same seeds and the same entry order the
//! post-state digest matches the original exactly.

use contracts::{AuditEntry, ToolRequest};

use crate::KernelApi;

/// Every tool the dispatcher understands. Log entries naming anything else
/// are skipped with a warning rather than failing the replay.
pub const KNOWN_TOOLS: [&str; 10] = [
    "world.generate",
    "world.getState",
    "world.mapPatch.preview",
    "world.mapPatch.apply",
    "combat.createEncounter",
    "combat.getEncounterState",
    "combat.executeAction",
    "combat.advanceTurn",
    "combat.endEncounter",
    "events.subscribe",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// Entry ids skipped because no handler exists for their action.
    pub skipped: Vec<String>,
    /// Entries whose handler returned an error; replay continues past them.
    pub errors: Vec<(String, String)>,
    pub digest: u64,
}

/// Feed each entry, in recorded order, to its handler on `api`. The caller
/// provides a fresh session (same session id, empty store) and compares the
/// returned digest against the original session's.
pub fn replay_log(entries: &[AuditEntry], api: &mut KernelApi) -> ReplayReport {
    let mut replayed = 0_usize;
    let mut skipped = Vec::new();
    let mut errors = Vec::new();

    for entry in entries {
        if !KNOWN_TOOLS.contains(&entry.action.as_str()) {
            tracing::warn!(action = %entry.action, entry = %entry.id, "skipping unknown action in replay");
            skipped.push(entry.id.clone());
            continue;
        }
        let request = ToolRequest {
            tool: entry.action.clone(),
            arguments: entry.arguments.clone(),
            request_id: entry.request_id.clone(),
        };
        let response = api.dispatch(&request);
        match response.error {
            Some(error) => {
                // The original call may have failed too; either way the
                // failure is recorded and replay continues.
                errors.push((entry.id.clone(), error.message));
            }
            None => replayed += 1,
        }
    }

    ReplayReport {
        replayed,
        skipped,
        errors,
        digest: api.state_digest(),
    }
}
