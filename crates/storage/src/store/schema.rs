#![forbid(unsafe_code)]

use super::StoreError;
use crm_core::EntityType;
use rusqlite::{Connection, OptionalExtension, params};

const SCHEMA_VERSION: &str = "crm.v1";

/// Refuses to open a database written by an incompatible schema.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let has_meta = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='meta'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !has_meta {
        return Ok(());
    }

    let version = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match version.as_deref() {
        None | Some(SCHEMA_VERSION) => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported schema version",
        )),
    }
}

pub(super) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&full_schema_sql())?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}

fn full_schema_sql() -> String {
    let mut sql = String::from(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          entity_type TEXT NOT NULL,
          year INTEGER NOT NULL,
          value INTEGER NOT NULL,
          PRIMARY KEY (entity_type, year)
        );

        CREATE TABLE IF NOT EXISTS external_ids (
          external_id TEXT PRIMARY KEY,
          entity_type TEXT NOT NULL,
          surrogate_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entity_events (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_type TEXT NOT NULL,
          surrogate_id INTEGER NOT NULL,
          actor_id TEXT NOT NULL,
          type TEXT NOT NULL,
          payload_json TEXT NOT NULL,
          ts_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entity_events_target
          ON entity_events(entity_type, surrogate_id, seq);

        CREATE TABLE IF NOT EXISTS contacts (
          contact_id INTEGER PRIMARY KEY AUTOINCREMENT,
          owner_id TEXT NOT NULL,
          display_name TEXT NOT NULL,
          email TEXT,
          phone TEXT,
          revision INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contact_roles (
          contact_id INTEGER NOT NULL REFERENCES contacts(contact_id),
          role_type TEXT NOT NULL,
          is_primary INTEGER NOT NULL CHECK (is_primary IN (0, 1)),
          added_at_ms INTEGER NOT NULL,
          ordinal INTEGER NOT NULL,
          PRIMARY KEY (contact_id, role_type)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_contact_roles_one_primary
          ON contact_roles(contact_id) WHERE is_primary = 1;
        "#,
    );

    for entity_type in EntityType::ALL {
        sql.push_str(&entity_table_sql(entity_type));
    }
    sql
}

fn entity_table_sql(entity_type: EntityType) -> String {
    let table = entity_type.table_name();
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
          surrogate_id INTEGER PRIMARY KEY AUTOINCREMENT,
          display_id TEXT NOT NULL UNIQUE,
          external_id TEXT NOT NULL UNIQUE,
          owner_id TEXT NOT NULL,
          title TEXT NOT NULL,
          raw_status TEXT NOT NULL,
          volume TEXT,
          commission TEXT,
          revision INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          archived_at_ms INTEGER,
          deleted_at_ms INTEGER,
          updated_by TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id, surrogate_id);
        CREATE INDEX IF NOT EXISTS idx_{table}_deleted ON {table}(deleted_at_ms);
        "#
    )
}
