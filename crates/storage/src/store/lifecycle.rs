#![forbid(unsafe_code)]

use super::entities::{EntityChange, fetch_entity};
use super::events::{NewEvent, insert_event_tx};
use super::{
    BulkDeleteRequest, EntityRef, SetArchivedRequest, SqliteStore, StoreError, TransitionRequest,
    advance_ms, check_revision, now_ms, resolve_error,
};
use crm_core::lifecycle::plan;
use crm_core::{
    CallerContext, Entity, EntityType, LifecycleAction, LifecycleError, LifecycleOutcome,
    LifecycleState, resolve,
};
use rusqlite::{OptionalExtension, Transaction, params};

pub const MAX_BULK_IDS: usize = 200;

#[derive(Debug)]
pub enum BulkItemStatus {
    Deleted { surrogate_id: i64 },
    AlreadyDeleted { surrogate_id: i64 },
    Failed(StoreError),
}

/// Per-identifier result of a bulk delete, in request order.
#[derive(Debug)]
pub struct BulkOutcome {
    pub id: String,
    pub status: BulkItemStatus,
}

fn lifecycle_error(surrogate_id: i64, err: LifecycleError) -> StoreError {
    match err {
        LifecycleError::IllegalTransition {
            entity_type,
            from,
            to,
        } => StoreError::IllegalTransition {
            entity_type,
            surrogate_id,
            from,
            to,
        },
        LifecycleError::EntityDeleted {
            entity_type,
            deleted_at_ms,
        } => StoreError::EntityDeleted {
            entity_type,
            surrogate_id,
            deleted_at_ms,
        },
        LifecycleError::UnmappedStatus {
            entity_type,
            raw_status,
        } => {
            log::error!(
                "stored status has no category (type={entity_type}, id={surrogate_id}, status={raw_status})"
            );
            StoreError::UnmappedStatus {
                entity_type,
                raw_status,
            }
        }
    }
}

fn current_revision_tx(
    tx: &Transaction<'_>,
    entity_type: EntityType,
    surrogate_id: i64,
) -> Result<Option<i64>, StoreError> {
    Ok(tx
        .query_row(
            &format!(
                "SELECT revision FROM {} WHERE surrogate_id=?1",
                entity_type.table_name()
            ),
            params![surrogate_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?)
}

/// Plans `action` against the locked row and writes the result with its audit event.
fn apply_action_tx(
    tx: &Transaction<'_>,
    ctx: &CallerContext,
    entity: Entity,
    action: &LifecycleAction,
    expected_revision: Option<i64>,
    now: i64,
) -> Result<EntityChange, StoreError> {
    check_revision(expected_revision, entity.revision)?;

    let state = LifecycleState {
        raw_status: entity.raw_status.clone(),
        archived_at_ms: entity.archived_at_ms,
        deleted_at_ms: entity.deleted_at_ms,
    };
    let next = match plan(entity.entity_type, &state, action, now)
        .map_err(|err| lifecycle_error(entity.surrogate_id, err))?
    {
        LifecycleOutcome::Unchanged => {
            return Ok(EntityChange {
                entity,
                changed: false,
            });
        }
        LifecycleOutcome::Changed(next) => next,
    };

    let entity_type = entity.entity_type;
    let updated_at_ms = advance_ms(entity.updated_at_ms, now);
    let actor = ctx.actor_id.as_str();
    let updated = tx.execute(
        &format!(
            "UPDATE {} SET raw_status=?1, archived_at_ms=?2, deleted_at_ms=?3, \
             revision=revision+1, updated_at_ms=?4, updated_by=?5 \
             WHERE surrogate_id=?6 AND revision=?7",
            entity_type.table_name()
        ),
        params![
            next.raw_status,
            next.archived_at_ms,
            next.deleted_at_ms,
            updated_at_ms,
            actor,
            entity.surrogate_id,
            entity.revision,
        ],
    )?;
    if updated != 1 {
        let actual = current_revision_tx(tx, entity_type, entity.surrogate_id)?.unwrap_or(-1);
        return Err(StoreError::RevisionMismatch {
            expected: entity.revision,
            actual,
        });
    }

    let payload = serde_json::json!({
        "from": {
            "status": state.raw_status,
            "archived_at_ms": state.archived_at_ms,
            "deleted_at_ms": state.deleted_at_ms,
        },
        "to": {
            "status": next.raw_status,
            "archived_at_ms": next.archived_at_ms,
            "deleted_at_ms": next.deleted_at_ms,
        },
    });
    insert_event_tx(
        tx,
        NewEvent {
            entity_type,
            surrogate_id: entity.surrogate_id,
            actor_id: actor,
            event_type: action.event_type(),
            payload_json: &payload.to_string(),
            ts_ms: updated_at_ms,
        },
    )?;

    log::debug!(
        "entity {} (type={entity_type}, id={}, revision={})",
        action.event_type(),
        entity.surrogate_id,
        entity.revision + 1
    );

    Ok(EntityChange {
        entity: Entity {
            raw_status: next.raw_status,
            archived_at_ms: next.archived_at_ms,
            deleted_at_ms: next.deleted_at_ms,
            revision: entity.revision + 1,
            updated_at_ms,
            updated_by: Some(actor.to_string()),
            ..entity
        },
        changed: true,
    })
}

impl SqliteStore {
    fn apply_action(
        &mut self,
        ctx: &CallerContext,
        target: &EntityRef,
        action: LifecycleAction,
        expected_revision: Option<i64>,
    ) -> Result<EntityChange, StoreError> {
        let entity_type = target.entity_type;
        let predicate =
            resolve(entity_type, &target.id).map_err(|err| resolve_error(entity_type, err))?;
        let now = now_ms();

        self.run_tx("entity.lifecycle", |tx| {
            let entity = fetch_entity(tx, entity_type, &predicate, ctx.owner_filter(), true)?
                .ok_or_else(|| StoreError::NotFound {
                    kind: entity_type.as_str(),
                    id: target.id.trim().to_string(),
                })?;
            apply_action_tx(tx, ctx, entity, &action, expected_revision, now)
        })
    }

    /// Moves the raw status along the type's transition graph.
    pub fn transition(
        &mut self,
        ctx: &CallerContext,
        request: TransitionRequest,
    ) -> Result<EntityChange, StoreError> {
        if request.to_status.trim().is_empty() {
            return Err(StoreError::InvalidInput("to_status must not be empty"));
        }
        self.apply_action(
            ctx,
            &request.target,
            LifecycleAction::Transition {
                target: request.to_status,
            },
            request.expected_revision,
        )
    }

    pub fn set_archived(
        &mut self,
        ctx: &CallerContext,
        request: SetArchivedRequest,
    ) -> Result<EntityChange, StoreError> {
        let action = if request.archived {
            LifecycleAction::Archive
        } else {
            LifecycleAction::Unarchive
        };
        self.apply_action(ctx, &request.target, action, request.expected_revision)
    }

    pub fn soft_delete(
        &mut self,
        ctx: &CallerContext,
        target: &EntityRef,
        expected_revision: Option<i64>,
    ) -> Result<EntityChange, StoreError> {
        self.apply_action(ctx, target, LifecycleAction::Delete, expected_revision)
    }

    pub fn restore(
        &mut self,
        ctx: &CallerContext,
        target: &EntityRef,
        expected_revision: Option<i64>,
    ) -> Result<EntityChange, StoreError> {
        self.apply_action(ctx, target, LifecycleAction::Restore, expected_revision)
    }

    /// One transaction per identifier; a failure on one row leaves the others applied.
    pub fn bulk_soft_delete(
        &mut self,
        ctx: &CallerContext,
        request: BulkDeleteRequest,
    ) -> Result<Vec<BulkOutcome>, StoreError> {
        if request.ids.is_empty() {
            return Err(StoreError::InvalidInput("ids must not be empty"));
        }
        if request.ids.len() > MAX_BULK_IDS {
            return Err(StoreError::InvalidInput("bulk delete accepts at most 200 ids"));
        }

        let mut out = Vec::with_capacity(request.ids.len());
        for id in request.ids {
            let target = EntityRef::new(request.entity_type, id.clone());
            let status = match self.soft_delete(ctx, &target, None) {
                Ok(EntityChange {
                    entity,
                    changed: true,
                }) => BulkItemStatus::Deleted {
                    surrogate_id: entity.surrogate_id,
                },
                Ok(EntityChange {
                    entity,
                    changed: false,
                }) => BulkItemStatus::AlreadyDeleted {
                    surrogate_id: entity.surrogate_id,
                },
                Err(err) => BulkItemStatus::Failed(err),
            };
            out.push(BulkOutcome { id, status });
        }
        Ok(out)
    }
}
