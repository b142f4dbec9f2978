//! In-process API facade. Every tool call flows through [`KernelApi::dispatch`]:
//! the audit wrapper records the invocation, the handler validates and
//! executes against the kernel, events publish before the handler returns,
//! and the response envelope carries prose plus a STATE_JSON block.

mod handlers;
mod persistence;
mod replay;

use std::collections::BTreeMap;

use serde_json::Value;

use contracts::{
    AuditEntry, Character, Event, EventPayload, EventTopic, KernelError, ToolRequest,
    ToolResponse,
};
use kernel_core::clock::{tick_stamp, SimClock};
use kernel_core::combat::EncounterRegistry;
use kernel_core::events::EventBus;
use kernel_core::rng::hash_seed;
use kernel_core::worldgen::WorldData;

pub use persistence::{SqliteStore, StoreError, DATA_DIR_ENV, DEFAULT_DB_PATH, ENV_MODE};
pub use replay::{replay_log, ReplayReport, KNOWN_TOOLS};

pub struct KernelApi {
    session_id: String,
    store: SqliteStore,
    clock: SimClock,
    bus: EventBus,
    registry: EncounterRegistry,
    worlds: BTreeMap<String, WorldData>,
    audit_seq: u64,
    subscription_seq: u64,
    audit_mirror: Vec<AuditEntry>,
}

impl KernelApi {
    pub fn new(session_id: impl Into<String>, store: SqliteStore) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            clock: SimClock::new(),
            bus: EventBus::new(),
            registry: EncounterRegistry::new(),
            worlds: BTreeMap::new(),
            audit_seq: 0,
            subscription_seq: 0,
            audit_mirror: Vec::new(),
        }
    }

    pub fn in_memory(session_id: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self::new(session_id, SqliteStore::open_in_memory()?))
    }

    /// Store selection via `RPG_ENV` / `RPG_DATA_DIR`.
    pub fn from_env(session_id: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self::new(session_id, SqliteStore::from_env()?))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The audit wrapper. Records the invocation before dispatch and the
    /// result or error after; a failure to log never affects the dispatch
    /// result. Timestamps and durations come from the simulation clock.
    pub fn dispatch(&mut self, request: &ToolRequest) -> ToolResponse {
        let started = self.clock.advance();
        let result = self.dispatch_inner(&request.tool, &request.arguments);
        let finished = self.clock.advance();

        self.audit_seq += 1;
        let entry = AuditEntry {
            id: format!("audit:{:06}", self.audit_seq),
            action: request.tool.clone(),
            arguments: request.arguments.clone(),
            result: result.as_ref().ok().map(|(_, state)| state.clone()),
            error: result.as_ref().err().cloned(),
            duration_ms: finished.saturating_sub(started),
            timestamp: tick_stamp(finished),
            request_id: request.request_id.clone(),
        };
        if let Err(err) = self.store.append_audit(&entry) {
            tracing::warn!(action = %entry.action, error = %err, "audit append failed");
        }
        self.audit_mirror.push(entry);

        match result {
            Ok((prose, state)) => ToolResponse::with_state(prose, &state),
            Err(error) => ToolResponse::failure(error),
        }
    }

    fn dispatch_inner(&mut self, tool: &str, args: &Value) -> Result<(String, Value), KernelError> {
        match tool {
            "world.generate" => self.handle_world_generate(args),
            "world.getState" => self.handle_world_get_state(args),
            "world.mapPatch.preview" => self.handle_patch_preview(args),
            "world.mapPatch.apply" => self.handle_patch_apply(args),
            "combat.createEncounter" => self.handle_create_encounter(args),
            "combat.getEncounterState" => self.handle_get_encounter_state(args),
            "combat.executeAction" => self.handle_execute_action(args),
            "combat.advanceTurn" => self.handle_advance_turn(args),
            "combat.endEncounter" => self.handle_end_encounter(args),
            "events.subscribe" => self.handle_events_subscribe(args),
            other => Err(KernelError::not_found(format!("no handler for tool '{other}'"))),
        }
    }

    /// Publish payloads on the bus (synchronously, in order) and append them
    /// to the event log. Subscriber and log failures are isolated.
    fn publish_all(&mut self, payloads: Vec<EventPayload>) -> Vec<Event> {
        let mut events = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let topic = match payload {
                EventPayload::WorldGenerated { .. } | EventPayload::PatchApplied { .. } => {
                    EventTopic::World
                }
                _ => EventTopic::Combat,
            };
            events.push(self.bus.publish(topic, payload, &mut self.clock));
        }
        for (subscriber, message) in self.bus.take_subscriber_errors() {
            tracing::warn!(%subscriber, %message, "event subscriber failed");
        }
        if let Err(err) = self.store.append_events(&events) {
            tracing::warn!(error = %err, "event log append failed");
        }
        events
    }

    pub fn drain_subscription(&mut self, subscription_id: &str) -> Vec<Event> {
        self.bus.drain(subscription_id)
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_mirror
    }

    /// Reload the audit log from the store (replay entry point).
    pub fn persisted_audit_log(&self) -> Result<Vec<AuditEntry>, KernelError> {
        self.store.load_audit_log().map_err(StoreError::into_kernel_error)
    }

    pub(crate) fn world_data(&mut self, world_id: &str) -> Result<&WorldData, KernelError> {
        if !self.worlds.contains_key(world_id) {
            let loaded = self
                .store
                .load_world(world_id)
                .map_err(StoreError::into_kernel_error)?
                .ok_or_else(|| KernelError::not_found(format!("no world {world_id}")))?;
            self.worlds.insert(world_id.to_string(), loaded);
        }
        Ok(&self.worlds[world_id])
    }

    /// Boundary contract for the external character CRUD collaborator:
    /// characters enter and leave the kernel only through these two calls.
    pub fn upsert_character(&mut self, character: &Character) -> Result<(), KernelError> {
        self.store
            .upsert_character(character)
            .map_err(StoreError::into_kernel_error)
    }

    pub fn get_character(&self, character_id: &str) -> Result<Option<Character>, KernelError> {
        self.store
            .load_character(character_id)
            .map_err(StoreError::into_kernel_error)
    }

    /// Digest of all observable state: persisted worlds and characters plus
    /// live encounters. Replay compares digests to prove reconstruction.
    pub fn state_digest(&mut self) -> u64 {
        let mut digest = hash_seed(&self.session_id);

        let world_ids = self.store.list_world_ids().unwrap_or_default();
        for world_id in world_ids {
            if let Ok(data) = self.world_data(&world_id) {
                digest ^= data.state_hash().rotate_left(11);
            }
        }

        for character_id in self.store.list_character_ids().unwrap_or_default() {
            if let Ok(Some(character)) = self.store.load_character(&character_id) {
                digest ^= hash_seed(&character.id).wrapping_mul(0x9e37_79b9_7f4a_7c15);
                digest = digest.rotate_left(7) ^ (character.hp as u64);
            }
        }

        digest ^ self.registry.digest()
    }
}
