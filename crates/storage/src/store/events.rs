#![forbid(unsafe_code)]

use super::entities::fetch_entity;
use super::{EntityRef, SqliteStore, StoreError, resolve_error};
use crm_core::{CallerContext, EntityType, resolve};
use rusqlite::{Transaction, params};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRow {
    pub seq: i64,
    pub ts_ms: i64,
    pub entity_type: EntityType,
    pub surrogate_id: i64,
    pub actor_id: String,
    pub event_type: String,
    pub payload_json: String,
}

impl EventRow {
    pub fn event_id(&self) -> String {
        format!("evt_{:016}", self.seq)
    }
}

pub(super) struct NewEvent<'a> {
    pub(super) entity_type: EntityType,
    pub(super) surrogate_id: i64,
    pub(super) actor_id: &'a str,
    pub(super) event_type: &'a str,
    pub(super) payload_json: &'a str,
    pub(super) ts_ms: i64,
}

pub(super) fn insert_event_tx(
    tx: &Transaction<'_>,
    event: NewEvent<'_>,
) -> Result<EventRow, StoreError> {
    let NewEvent {
        entity_type,
        surrogate_id,
        actor_id,
        event_type,
        payload_json,
        ts_ms,
    } = event;
    tx.execute(
        r#"
        INSERT INTO entity_events(entity_type, surrogate_id, actor_id, type, payload_json, ts_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            entity_type.as_str(),
            surrogate_id,
            actor_id,
            event_type,
            payload_json,
            ts_ms
        ],
    )?;
    Ok(EventRow {
        seq: tx.last_insert_rowid(),
        ts_ms,
        entity_type,
        surrogate_id,
        actor_id: actor_id.to_string(),
        event_type: event_type.to_string(),
        payload_json: payload_json.to_string(),
    })
}

impl SqliteStore {
    /// Audit trail of one entity, oldest first. Deleted entities stay auditable.
    pub fn list_entity_events(
        &self,
        ctx: &CallerContext,
        target: &EntityRef,
    ) -> Result<Vec<EventRow>, StoreError> {
        let entity_type = target.entity_type;
        let predicate =
            resolve(entity_type, &target.id).map_err(|err| resolve_error(entity_type, err))?;
        let entity = fetch_entity(&self.conn, entity_type, &predicate, ctx.owner_filter(), true)?
            .ok_or_else(|| StoreError::NotFound {
                kind: entity_type.as_str(),
                id: target.id.trim().to_string(),
            })?;

        let mut stmt = self.conn.prepare(
            "SELECT seq, ts_ms, actor_id, type, payload_json FROM entity_events \
             WHERE entity_type=?1 AND surrogate_id=?2 \
             ORDER BY seq ASC",
        )?;
        let mut rows = stmt.query(params![entity_type.as_str(), entity.surrogate_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(EventRow {
                seq: row.get(0)?,
                ts_ms: row.get(1)?,
                entity_type,
                surrogate_id: entity.surrogate_id,
                actor_id: row.get(2)?,
                event_type: row.get(3)?,
                payload_json: row.get(4)?,
            });
        }
        Ok(out)
    }
}
