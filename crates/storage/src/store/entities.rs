#![forbid(unsafe_code)]

use super::events::{NewEvent, insert_event_tx};
use super::{
    CreateEntityRequest, EntityRef, ListEntitiesRequest, ListTrashRequest, SqliteStore,
    StoreError, calendar_year, is_constraint_violation, now_ms, resolve_error, to_sqlite_i64,
};
use crm_core::ids::{format_display_id, new_external_id};
use crm_core::status::normalize_status;
use crm_core::{
    ActorId, CallerContext, Entity, EntityType, LookupPredicate, category_of, list_by_category,
    resolve,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rust_decimal::Decimal;
use std::str::FromStr;

const MAX_TITLE_LEN: usize = 256;
const MAX_PAGE_LIMIT: usize = 500;
/// Upper bound for a single amount (10^15). Keeps per-category sums far inside `Decimal` range.
const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

pub(super) const ENTITY_COLUMNS: &str = "surrogate_id, display_id, external_id, owner_id, title, raw_status, volume, commission, revision, created_at_ms, updated_at_ms, archived_at_ms, deleted_at_ms, updated_by";

/// An entity after a mutation. `changed` is false when the request was a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityChange {
    pub entity: Entity,
    pub changed: bool,
}

/// Which rows a bulk read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RowSet {
    Live { include_archived: bool },
    Trash,
    All,
}

impl RowSet {
    fn where_sql(self) -> &'static str {
        match self {
            RowSet::Live {
                include_archived: false,
            } => "deleted_at_ms IS NULL AND archived_at_ms IS NULL",
            RowSet::Live {
                include_archived: true,
            } => "deleted_at_ms IS NULL",
            RowSet::Trash => "deleted_at_ms IS NOT NULL",
            RowSet::All => "1=1",
        }
    }

    fn order_sql(self) -> &'static str {
        match self {
            RowSet::Trash => "deleted_at_ms DESC, surrogate_id ASC",
            _ => "surrogate_id ASC",
        }
    }
}

struct EntityRow {
    surrogate_id: i64,
    display_id: String,
    external_id: String,
    owner_id: String,
    title: String,
    raw_status: String,
    volume: Option<String>,
    commission: Option<String>,
    revision: i64,
    created_at_ms: i64,
    updated_at_ms: i64,
    archived_at_ms: Option<i64>,
    deleted_at_ms: Option<i64>,
    updated_by: Option<String>,
}

impl EntityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            surrogate_id: row.get(0)?,
            display_id: row.get(1)?,
            external_id: row.get(2)?,
            owner_id: row.get(3)?,
            title: row.get(4)?,
            raw_status: row.get(5)?,
            volume: row.get(6)?,
            commission: row.get(7)?,
            revision: row.get(8)?,
            created_at_ms: row.get(9)?,
            updated_at_ms: row.get(10)?,
            archived_at_ms: row.get(11)?,
            deleted_at_ms: row.get(12)?,
            updated_by: row.get(13)?,
        })
    }

    fn into_entity(self, entity_type: EntityType) -> Result<Entity, StoreError> {
        Ok(Entity {
            entity_type,
            surrogate_id: self.surrogate_id,
            display_id: self.display_id,
            external_id: self.external_id,
            owner_id: self.owner_id,
            title: self.title,
            raw_status: self.raw_status,
            volume: parse_money(self.volume)?,
            commission: parse_money(self.commission)?,
            revision: self.revision,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
            archived_at_ms: self.archived_at_ms,
            deleted_at_ms: self.deleted_at_ms,
            updated_by: self.updated_by,
        })
    }
}

fn parse_money(value: Option<String>) -> Result<Option<Decimal>, StoreError> {
    value
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|_| StoreError::InvariantViolation("stored amount is not a decimal"))
        })
        .transpose()
}

fn predicate_value(predicate: &LookupPredicate) -> Value {
    match predicate {
        LookupPredicate::Surrogate(id) => Value::Integer(*id),
        LookupPredicate::Display(code) => Value::Text(code.clone()),
        LookupPredicate::External(id) => Value::Text(id.clone()),
    }
}

/// Single parameterized lookup. Rows outside `owner` behave as absent.
pub(super) fn fetch_entity(
    conn: &Connection,
    entity_type: EntityType,
    predicate: &LookupPredicate,
    owner: Option<&str>,
    include_deleted: bool,
) -> Result<Option<Entity>, StoreError> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM {table} \
         WHERE {column} = ?1 AND (?2 IS NULL OR owner_id = ?2) AND (?3 OR deleted_at_ms IS NULL)",
        table = entity_type.table_name(),
        column = predicate.column(),
    );
    let row = conn
        .query_row(
            &sql,
            params![predicate_value(predicate), owner, include_deleted],
            EntityRow::read,
        )
        .optional()?;
    row.map(|row| row.into_entity(entity_type)).transpose()
}

pub(super) fn load_entities(
    conn: &Connection,
    entity_type: EntityType,
    owner: Option<&str>,
    rows: RowSet,
    limit: i64,
    offset: i64,
) -> Result<Vec<Entity>, StoreError> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM {table} \
         WHERE (?1 IS NULL OR owner_id = ?1) AND {filter} \
         ORDER BY {order} \
         LIMIT ?2 OFFSET ?3",
        table = entity_type.table_name(),
        filter = rows.where_sql(),
        order = rows.order_sql(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut cursor = stmt.query(params![owner, limit, offset])?;
    let mut out = Vec::new();
    while let Some(row) = cursor.next()? {
        out.push(EntityRow::read(row)?.into_entity(entity_type)?);
    }
    Ok(out)
}

fn next_display_sequence_tx(
    tx: &Transaction<'_>,
    entity_type: EntityType,
    year: i32,
) -> Result<u64, StoreError> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE entity_type=?1 AND year=?2",
            params![entity_type.as_str(), year],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        r#"
        INSERT INTO counters(entity_type, year, value) VALUES (?1, ?2, ?3)
        ON CONFLICT(entity_type, year) DO UPDATE SET value=excluded.value
        "#,
        params![entity_type.as_str(), year, next],
    )?;
    u64::try_from(next).map_err(|_| StoreError::InvariantViolation("display counter overflow"))
}

fn validate_page(limit: usize, offset: usize) -> Result<(i64, i64), StoreError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(StoreError::InvalidInput("limit must be between 1 and 500"));
    }
    Ok((to_sqlite_i64(limit)?, to_sqlite_i64(offset)?))
}

fn validate_money(
    entity_type: EntityType,
    value: Option<Decimal>,
) -> Result<Option<Decimal>, StoreError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if !entity_type.tracks_money() {
        return Err(StoreError::InvalidInput(
            "volume and commission apply to escrows and listings only",
        ));
    }
    if value.is_sign_negative() {
        return Err(StoreError::InvalidInput("amounts must not be negative"));
    }
    if value > Decimal::from(MAX_AMOUNT_UNITS) {
        return Err(StoreError::InvalidInput("amounts must not exceed 10^15"));
    }
    Ok(Some(value))
}

impl SqliteStore {
    pub fn create_entity(
        &mut self,
        ctx: &CallerContext,
        request: CreateEntityRequest,
    ) -> Result<Entity, StoreError> {
        let entity_type = request.entity_type;
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(StoreError::InvalidInput("title is too long"));
        }

        let owner_id = match request.owner_id.as_deref() {
            None => ctx.actor_id.clone(),
            Some(owner) => ActorId::try_new(owner.trim())
                .map_err(|err| StoreError::InvalidInput(err.message()))?,
        };
        if !ctx.can_see(owner_id.as_str()) {
            return Err(StoreError::InvalidInput(
                "owner scope may only create records it owns",
            ));
        }

        let raw_status = match request.raw_status.as_deref() {
            Some(status) => normalize_status(status),
            None => crm_core::status::status_table(entity_type)
                .default_status
                .to_string(),
        };
        if category_of(entity_type, &raw_status).is_err() {
            return Err(StoreError::InvalidInput(
                "status is not defined for this entity type",
            ));
        }

        let volume = validate_money(entity_type, request.volume)?;
        let commission = validate_money(entity_type, request.commission)?;
        let now = now_ms();
        let year = calendar_year(now)?;
        let actor = ctx.actor_id.as_str();

        let entity = self.run_tx("entity.create", |tx| {
            let sequence = next_display_sequence_tx(tx, entity_type, year)?;
            let display_id = format_display_id(entity_type, year, sequence);
            let external_id = new_external_id(entity_type);

            tx.execute(
                &format!(
                    "INSERT INTO {table}(display_id, external_id, owner_id, title, raw_status, volume, commission, \
                     revision, created_at_ms, updated_at_ms, updated_by) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8, ?9)",
                    table = entity_type.table_name()
                ),
                params![
                    display_id,
                    external_id,
                    owner_id.as_str(),
                    title,
                    raw_status,
                    volume.map(|v| v.to_string()),
                    commission.map(|v| v.to_string()),
                    now,
                    actor,
                ],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    StoreError::InvariantViolation("identifier collision on insert")
                } else {
                    StoreError::Sql(err)
                }
            })?;
            let surrogate_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO external_ids(external_id, entity_type, surrogate_id) VALUES (?1, ?2, ?3)",
                params![external_id, entity_type.as_str(), surrogate_id],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    StoreError::InvariantViolation("external id already registered")
                } else {
                    StoreError::Sql(err)
                }
            })?;

            let payload = serde_json::json!({
                "display_id": display_id,
                "external_id": external_id,
                "status": raw_status,
                "owner_id": owner_id.as_str(),
            });
            insert_event_tx(
                tx,
                NewEvent {
                    entity_type,
                    surrogate_id,
                    actor_id: actor,
                    event_type: "created",
                    payload_json: &payload.to_string(),
                    ts_ms: now,
                },
            )?;

            Ok(Entity {
                entity_type,
                surrogate_id,
                display_id,
                external_id,
                owner_id: owner_id.as_str().to_string(),
                title: title.clone(),
                raw_status: raw_status.clone(),
                volume,
                commission,
                revision: 1,
                created_at_ms: now,
                updated_at_ms: now,
                archived_at_ms: None,
                deleted_at_ms: None,
                updated_by: Some(actor.to_string()),
            })
        })?;

        log::debug!(
            "entity created (type={entity_type}, id={}, display_id={})",
            entity.surrogate_id,
            entity.display_id
        );
        Ok(entity)
    }

    /// Resolves any identifier form and returns the live row it names.
    pub fn resolve_and_fetch(
        &self,
        ctx: &CallerContext,
        target: &EntityRef,
    ) -> Result<Entity, StoreError> {
        let predicate = resolve(target.entity_type, &target.id)
            .map_err(|err| resolve_error(target.entity_type, err))?;
        fetch_entity(
            &self.conn,
            target.entity_type,
            &predicate,
            ctx.owner_filter(),
            false,
        )?
        .ok_or_else(|| StoreError::NotFound {
            kind: target.entity_type.as_str(),
            id: target.id.trim().to_string(),
        })
    }

    pub fn list_entities(
        &self,
        ctx: &CallerContext,
        request: ListEntitiesRequest,
    ) -> Result<Vec<Entity>, StoreError> {
        let (limit, offset) = validate_page(request.limit, request.offset)?;
        let rows = RowSet::Live {
            include_archived: request.include_archived,
        };

        let Some(category) = request.category else {
            return load_entities(
                &self.conn,
                request.entity_type,
                ctx.owner_filter(),
                rows,
                limit,
                offset,
            );
        };

        let all = load_entities(&self.conn, request.entity_type, ctx.owner_filter(), rows, -1, 0)?;
        let matching = list_by_category(
            request.entity_type,
            category,
            &all,
            request.include_archived,
        )
        .inspect_err(|err| log::error!("category partition failed: {err}"))?;
        Ok(matching
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .cloned()
            .collect())
    }

    pub fn list_trash(
        &self,
        ctx: &CallerContext,
        request: ListTrashRequest,
    ) -> Result<Vec<Entity>, StoreError> {
        let (limit, offset) = validate_page(request.limit, request.offset)?;
        load_entities(
            &self.conn,
            request.entity_type,
            ctx.owner_filter(),
            RowSet::Trash,
            limit,
            offset,
        )
    }
}
