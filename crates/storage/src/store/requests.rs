#![forbid(unsafe_code)]

use crm_core::{Category, EntityType, RoleOp, RoleType};
use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateEntityRequest {
    pub entity_type: EntityType,
    pub title: String,
    /// Defaults to the caller when absent. Only `all` scope may assign another owner.
    pub owner_id: Option<String>,
    pub raw_status: Option<String>,
    pub volume: Option<Decimal>,
    pub commission: Option<Decimal>,
}

/// Addresses one entity by any of its identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    pub target: EntityRef,
    pub to_status: String,
    pub expected_revision: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetArchivedRequest {
    pub target: EntityRef,
    pub archived: bool,
    pub expected_revision: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntitiesRequest {
    pub entity_type: EntityType,
    pub category: Option<Category>,
    pub include_archived: bool,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListTrashRequest {
    pub entity_type: EntityType,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkDeleteRequest {
    pub entity_type: EntityType,
    pub ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateContactRequest {
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub initial_role: Option<RoleType>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleOpRequest {
    pub contact_id: i64,
    pub op: RoleOp,
    pub expected_revision: Option<i64>,
}
