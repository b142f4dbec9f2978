//! SQLite persistence: one table per entity, JSON payload columns for
//! composite fields, schema-only migrations, and validation at every
//! store/load boundary. All access goes through the typed methods here; no
//! ad-hoc SQL lives outside this module.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use contracts::{
    AuditEntry, Character, CombatState, Event, KernelError, Tile, World, SCHEMA_VERSION_V1,
};
use kernel_core::worldgen::WorldData;

pub const DEFAULT_DB_PATH: &str = "./rpg.db";
pub const DATA_DIR_ENV: &str = "RPG_DATA_DIR";
pub const ENV_MODE: &str = "RPG_ENV";

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    Invalid(KernelError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::Invalid(err) => write!(f, "invalid record: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<KernelError> for StoreError {
    fn from(value: KernelError) -> Self {
        Self::Invalid(value)
    }
}

impl StoreError {
    pub fn into_kernel_error(self) -> KernelError {
        match self {
            Self::Invalid(err) => err,
            other => KernelError::with_details(
                contracts::ErrorKind::Persistence,
                "store operation failed",
                other.to_string(),
            ),
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// `RPG_ENV=test` selects an in-memory store; otherwise `RPG_DATA_DIR`
    /// (default `./rpg.db`) selects the database path.
    pub fn from_env() -> Result<Self, StoreError> {
        if std::env::var(ENV_MODE).map(|v| v == "test").unwrap_or(false) {
            return Self::open_in_memory();
        }
        let path = std::env::var(DATA_DIR_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        Self::open(path)
    }

    fn configure(&mut self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worlds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                seed TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                environment TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tiles (
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                biome TEXT NOT NULL,
                elevation INTEGER NOT NULL,
                moisture INTEGER NOT NULL,
                temperature INTEGER NOT NULL,
                PRIMARY KEY (world_id, x, y)
            );

            CREATE TABLE IF NOT EXISTS regions (
                id TEXT PRIMARY KEY,
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rivers (
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                from_x INTEGER NOT NULL,
                from_y INTEGER NOT NULL,
                to_x INTEGER NOT NULL,
                to_y INTEGER NOT NULL,
                flux INTEGER NOT NULL,
                PRIMARY KEY (world_id, ordinal)
            );

            CREATE TABLE IF NOT EXISTS structures (
                id TEXT PRIMARY KEY,
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                kind TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                name TEXT NOT NULL,
                population INTEGER
            );

            CREATE TABLE IF NOT EXISTS roads (
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                path_json TEXT NOT NULL,
                PRIMARY KEY (world_id, ordinal)
            );

            CREATE TABLE IF NOT EXISTS annotations (
                id TEXT PRIMARY KEY,
                world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                label TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                level INTEGER NOT NULL,
                hp INTEGER NOT NULL,
                max_hp INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS encounters (
                id TEXT PRIMARY KEY,
                world_id TEXT,
                status TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                arguments_json TEXT NOT NULL,
                result_json TEXT,
                error_json TEXT,
                duration_ms INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                request_id TEXT
            );

            CREATE TABLE IF NOT EXISTS event_log (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tiles_world ON tiles(world_id);
            CREATE INDEX IF NOT EXISTS idx_structures_world ON structures(world_id, ordinal);
            CREATE INDEX IF NOT EXISTS idx_event_log_topic ON event_log(topic, sequence);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'tick-000000')",
            [],
        )?;
        Ok(())
    }

    /// Persist a whole world in one transaction, replacing any prior rows.
    pub fn save_world(&mut self, data: &WorldData) -> Result<(), StoreError> {
        data.world.validate()?;
        for tile in &data.tiles {
            tile.validate()?;
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO worlds (id, name, seed, width, height, environment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                seed = excluded.seed,
                width = excluded.width,
                height = excluded.height,
                environment = excluded.environment,
                updated_at = excluded.updated_at",
            params![
                data.world.id,
                data.world.name,
                data.world.seed,
                data.world.width,
                data.world.height,
                data.world.environment,
                data.world.created_at,
                data.world.updated_at,
            ],
        )?;

        for table in ["tiles", "regions", "rivers", "structures", "roads", "annotations"] {
            tx.execute(&format!("DELETE FROM {table} WHERE world_id = ?1"), params![data.world.id])?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tiles (world_id, x, y, biome, elevation, moisture, temperature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for tile in &data.tiles {
                stmt.execute(params![
                    tile.world_id,
                    tile.x,
                    tile.y,
                    tile.biome.as_str(),
                    tile.elevation,
                    tile.moisture,
                    tile.temperature,
                ])?;
            }
        }

        for (ordinal, region) in data.regions.iter().enumerate() {
            tx.execute(
                "INSERT INTO regions (id, world_id, ordinal, payload_json) VALUES (?1, ?2, ?3, ?4)",
                params![region.id, region.world_id, ordinal as i64, serde_json::to_string(region)?],
            )?;
        }
        for (ordinal, river) in data.rivers.iter().enumerate() {
            tx.execute(
                "INSERT INTO rivers (world_id, ordinal, from_x, from_y, to_x, to_y, flux)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    river.world_id,
                    ordinal as i64,
                    river.from_x,
                    river.from_y,
                    river.to_x,
                    river.to_y,
                    river.flux,
                ],
            )?;
        }
        for (ordinal, structure) in data.structures.iter().enumerate() {
            tx.execute(
                "INSERT INTO structures (id, world_id, ordinal, kind, x, y, name, population)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    structure.id,
                    structure.world_id,
                    ordinal as i64,
                    structure.kind.as_str(),
                    structure.x,
                    structure.y,
                    structure.name,
                    structure.population,
                ],
            )?;
        }
        for (ordinal, road) in data.roads.iter().enumerate() {
            tx.execute(
                "INSERT INTO roads (world_id, ordinal, path_json) VALUES (?1, ?2, ?3)",
                params![data.world.id, ordinal as i64, serde_json::to_string(road)?],
            )?;
        }
        for (ordinal, annotation) in data.annotations.iter().enumerate() {
            tx.execute(
                "INSERT INTO annotations (id, world_id, ordinal, x, y, label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    annotation.id,
                    annotation.world_id,
                    ordinal as i64,
                    annotation.x,
                    annotation.y,
                    annotation.label,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_world_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM worlds ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn world_exists(&self, world_id: &str) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .query_row("SELECT id FROM worlds WHERE id = ?1", params![world_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn load_world(&self, world_id: &str) -> Result<Option<WorldData>, StoreError> {
        let world = self
            .conn
            .query_row(
                "SELECT id, name, seed, width, height, environment, created_at, updated_at
                 FROM worlds WHERE id = ?1",
                params![world_id],
                |row| {
                    Ok(World {
                        schema_version: SCHEMA_VERSION_V1.to_string(),
                        id: row.get(0)?,
                        name: row.get(1)?,
                        seed: row.get(2)?,
                        width: row.get(3)?,
                        height: row.get(4)?,
                        environment: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        let Some(world) = world else {
            return Ok(None);
        };
        world.validate()?;

        let mut tiles = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT x, y, biome, elevation, moisture, temperature
                 FROM tiles WHERE world_id = ?1 ORDER BY y, x",
            )?;
            let rows = stmt.query_map(params![world_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;
            for row in rows {
                let (x, y, biome_raw, elevation, moisture, temperature) = row?;
                let tile = Tile {
                    world_id: world_id.to_string(),
                    x,
                    y,
                    biome: contracts::Biome::parse(&biome_raw)?,
                    elevation,
                    moisture,
                    temperature,
                };
                tile.validate()?;
                tiles.push(tile);
            }
        }

        let mut regions = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT payload_json FROM regions WHERE world_id = ?1 ORDER BY ordinal",
            )?;
            let rows = stmt.query_map(params![world_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                regions.push(serde_json::from_str(&row?)?);
            }
        }

        let mut rivers = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT from_x, from_y, to_x, to_y, flux
                 FROM rivers WHERE world_id = ?1 ORDER BY ordinal",
            )?;
            let rows = stmt.query_map(params![world_id], |row| {
                Ok(contracts::RiverSegment {
                    world_id: world_id.to_string(),
                    from_x: row.get(0)?,
                    from_y: row.get(1)?,
                    to_x: row.get(2)?,
                    to_y: row.get(3)?,
                    flux: row.get(4)?,
                })
            })?;
            for row in rows {
                rivers.push(row?);
            }
        }

        let mut structures = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT id, kind, x, y, name, population
                 FROM structures WHERE world_id = ?1 ORDER BY ordinal",
            )?;
            let rows = stmt.query_map(params![world_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })?;
            for row in rows {
                let (id, kind_raw, x, y, name, population) = row?;
                structures.push(contracts::Structure {
                    id,
                    world_id: world_id.to_string(),
                    kind: contracts::StructureKind::parse(&kind_raw)?,
                    x,
                    y,
                    name,
                    population,
                });
            }
        }

        let mut roads = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT path_json FROM roads WHERE world_id = ?1 ORDER BY ordinal")?;
            let rows = stmt.query_map(params![world_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                roads.push(serde_json::from_str(&row?)?);
            }
        }

        let mut annotations = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT id, x, y, label FROM annotations WHERE world_id = ?1 ORDER BY ordinal",
            )?;
            let rows = stmt.query_map(params![world_id], |row| {
                Ok(contracts::Annotation {
                    id: row.get(0)?,
                    world_id: world_id.to_string(),
                    x: row.get(1)?,
                    y: row.get(2)?,
                    label: row.get(3)?,
                })
            })?;
            for row in rows {
                annotations.push(row?);
            }
        }

        Ok(Some(WorldData {
            world,
            tiles,
            regions,
            rivers,
            structures,
            roads,
            annotations,
        }))
    }

    pub fn upsert_character(&mut self, character: &Character) -> Result<(), StoreError> {
        character.validate()?;
        self.conn.execute(
            "INSERT INTO characters (id, name, level, hp, max_hp, payload_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                level = excluded.level,
                hp = excluded.hp,
                max_hp = excluded.max_hp,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
            params![
                character.id,
                character.name,
                character.level,
                character.hp,
                character.max_hp,
                serde_json::to_string(character)?,
                "tick-sync",
            ],
        )?;
        Ok(())
    }

    pub fn load_character(&self, character_id: &str) -> Result<Option<Character>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM characters WHERE id = ?1",
                params![character_id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(raw) => {
                let character: Character = serde_json::from_str(&raw)?;
                character.validate()?;
                Ok(Some(character))
            }
            None => Ok(None),
        }
    }

    pub fn list_character_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM characters ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Snapshot the full encounter record; last write wins.
    pub fn save_encounter(&mut self, state: &CombatState) -> Result<(), StoreError> {
        state.validate()?;
        self.conn.execute(
            "INSERT INTO encounters (id, world_id, status, payload_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
            params![
                state.id,
                state.world_id,
                serde_json::to_string(&state.status)?,
                serde_json::to_string(state)?,
                state.created_at,
                state.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn load_encounter(&self, encounter_id: &str) -> Result<Option<CombatState>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM encounters WHERE id = ?1",
                params![encounter_id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(raw) => {
                let state: CombatState = serde_json::from_str(&raw)?;
                state.validate()?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO audit_log
                (id, action, arguments_json, result_json, error_json, duration_ms, timestamp, request_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.action,
                serde_json::to_string(&entry.arguments)?,
                entry.result.as_ref().map(serde_json::to_string).transpose()?,
                entry.error.as_ref().map(serde_json::to_string).transpose()?,
                entry.duration_ms as i64,
                entry.timestamp,
                entry.request_id,
            ],
        )?;
        Ok(())
    }

    pub fn load_audit_log(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, arguments_json, result_json, error_json, duration_ms, timestamp, request_id
             FROM audit_log ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, action, arguments_raw, result_raw, error_raw, duration_ms, timestamp, request_id) =
                row?;
            entries.push(AuditEntry {
                id,
                action,
                arguments: serde_json::from_str(&arguments_raw)?,
                result: result_raw.map(|raw| serde_json::from_str(&raw)).transpose()?,
                error: error_raw.map(|raw| serde_json::from_str(&raw)).transpose()?,
                duration_ms: duration_ms.max(0) as u64,
                timestamp,
                request_id,
            });
        }
        Ok(entries)
    }

    pub fn append_events(&mut self, events: &[Event]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for event in events {
            tx.execute(
                "INSERT OR IGNORE INTO event_log (id, topic, sequence, timestamp, payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.id,
                    event.topic.as_str(),
                    event.sequence as i64,
                    event.timestamp,
                    serde_json::to_string(&event.payload)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn event_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
