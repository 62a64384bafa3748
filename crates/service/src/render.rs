#![forbid(unsafe_code)]

use crm_core::{Contact, Entity, RoleChange, Summary, TabCounts, category_of};
use crm_storage::{BulkItemStatus, BulkOutcome, EntityChange, EventRow, RoleOpResult};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn rfc3339(ms: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
}

fn money(value: Option<Decimal>) -> Value {
    match value {
        Some(amount) => Value::String(amount.to_string()),
        None => Value::Null,
    }
}

pub(crate) fn entity(entity: &Entity) -> Value {
    let category = match category_of(entity.entity_type, &entity.raw_status) {
        Ok(category) => Some(category.as_str()),
        Err(err) => {
            log::error!(
                "rendering {} {} without a category: {err}",
                entity.entity_type,
                entity.surrogate_id
            );
            None
        }
    };
    json!({
        "entity_type": entity.entity_type.as_str(),
        "surrogate_id": entity.surrogate_id,
        "display_id": entity.display_id,
        "external_id": entity.external_id,
        "owner_id": entity.owner_id,
        "title": entity.title,
        "status": entity.raw_status,
        "category": category,
        "volume": money(entity.volume),
        "commission": money(entity.commission),
        "revision": entity.revision,
        "created_at_ms": entity.created_at_ms,
        "updated_at_ms": entity.updated_at_ms,
        "updated_at": rfc3339(entity.updated_at_ms),
        "archived_at_ms": entity.archived_at_ms,
        "deleted_at_ms": entity.deleted_at_ms,
        "updated_by": entity.updated_by,
    })
}

pub(crate) fn entity_change(change: &EntityChange) -> Value {
    json!({ "entity": entity(&change.entity), "changed": change.changed })
}

pub(crate) fn entity_page(entities: &[Entity]) -> Value {
    json!({
        "entities": entities.iter().map(entity).collect::<Vec<_>>(),
        "count": entities.len(),
    })
}

pub(crate) fn bulk_outcomes(outcomes: &[BulkOutcome]) -> Value {
    let mut deleted = 0usize;
    let mut failed = 0usize;
    let items = outcomes
        .iter()
        .map(|outcome| match &outcome.status {
            BulkItemStatus::Deleted { surrogate_id } => {
                deleted += 1;
                json!({ "id": outcome.id, "status": "deleted", "surrogate_id": surrogate_id })
            }
            BulkItemStatus::AlreadyDeleted { surrogate_id } => json!({
                "id": outcome.id,
                "status": "already_deleted",
                "surrogate_id": surrogate_id,
            }),
            BulkItemStatus::Failed(err) => {
                failed += 1;
                json!({
                    "id": outcome.id,
                    "status": "failed",
                    "error": {
                        "code": err.code(),
                        "status": err.status_class().as_u16(),
                        "message": err.to_string(),
                    }
                })
            }
        })
        .collect::<Vec<_>>();
    json!({ "results": items, "deleted": deleted, "failed": failed })
}

pub(crate) fn events(rows: &[EventRow]) -> Value {
    let items = rows
        .iter()
        .map(|row| {
            let payload = serde_json::from_str::<Value>(&row.payload_json)
                .unwrap_or_else(|_| Value::String(row.payload_json.clone()));
            json!({
                "event_id": row.event_id(),
                "ts_ms": row.ts_ms,
                "ts": rfc3339(row.ts_ms),
                "type": row.event_type,
                "actor_id": row.actor_id,
                "payload": payload,
            })
        })
        .collect::<Vec<_>>();
    json!({ "events": items })
}

pub(crate) fn contact(contact: &Contact) -> Value {
    json!({
        "contact_id": contact.contact_id,
        "owner_id": contact.owner_id,
        "display_name": contact.display_name,
        "email": contact.email,
        "phone": contact.phone,
        "revision": contact.revision,
        "created_at_ms": contact.created_at_ms,
        "updated_at_ms": contact.updated_at_ms,
        "primary_role": contact.primary_role().map(|role| role.role_type.as_str()),
        "roles": contact.roles,
    })
}

fn role_change(change: &RoleChange) -> Value {
    match change {
        RoleChange::Inserted {
            role_type,
            is_primary,
            ..
        } => json!({ "kind": "inserted", "role_type": role_type, "is_primary": is_primary }),
        RoleChange::Removed {
            role_type,
            promoted,
        } => json!({ "kind": "removed", "role_type": role_type, "promoted": promoted }),
        RoleChange::PrimaryMoved { from, to } => {
            json!({ "kind": "primary_moved", "from": from, "to": to })
        }
        RoleChange::Unchanged => json!({ "kind": "unchanged" }),
    }
}

pub(crate) fn role_op(result: &RoleOpResult) -> Value {
    json!({ "contact": contact(&result.contact), "change": role_change(&result.change) })
}

pub(crate) fn summary(summary: &Summary) -> Value {
    let categories = summary
        .categories
        .iter()
        .map(|(category, totals)| {
            let card = json!({
                "count": totals.count,
                "volume": totals.volume.to_string(),
                "commission": totals.commission.to_string(),
                "priced_count": totals.priced_count,
                "average_volume": totals.average_volume().map(|avg| avg.round_dp(2).to_string()),
            });
            (category.as_str().to_string(), card)
        })
        .collect::<serde_json::Map<_, _>>();
    json!({
        "entity_type": summary.entity_type.as_str(),
        "tracks_money": summary.tracks_money,
        "total_count": summary.total_count(),
        "categories": categories,
    })
}

pub(crate) fn tabs(tabs: &TabCounts) -> Value {
    json!({
        "active": tabs.active,
        "won": tabs.won,
        "lost": tabs.lost,
        "archived": tabs.archived,
    })
}
