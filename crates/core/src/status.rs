#![forbid(unsafe_code)]

use crate::entity::{Entity, EntityType};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Active,
    Won,
    Lost,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Active, Category::Won, Category::Lost];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Active => "active",
            Category::Won => "won",
            Category::Lost => "lost",
        }
    }
}

#[derive(Debug)]
pub struct StatusSpec {
    pub key: &'static str,
    pub category: Category,
    pub next: &'static [&'static str],
}

/// One entity type's raw statuses and their transition graph.
#[derive(Debug)]
pub struct StatusTable {
    pub entity_type: EntityType,
    pub default_status: &'static str,
    pub statuses: &'static [StatusSpec],
}

impl StatusTable {
    pub fn get(&self, raw_status: &str) -> Option<&StatusSpec> {
        self.statuses.iter().find(|spec| spec.key == raw_status)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.statuses.iter().map(|spec| spec.key)
    }

    pub fn can_transition(&self, from: &str, to: &str) -> bool {
        self.get(from)
            .is_some_and(|spec| spec.next.iter().any(|candidate| *candidate == to))
    }
}

const fn status(
    key: &'static str,
    category: Category,
    next: &'static [&'static str],
) -> StatusSpec {
    StatusSpec {
        key,
        category,
        next,
    }
}

static ESCROW: StatusTable = StatusTable {
    entity_type: EntityType::Escrow,
    default_status: "active",
    statuses: &[
        status("active", Category::Active, &["pending", "closed", "cancelled"]),
        status("pending", Category::Active, &["active", "closed", "cancelled"]),
        status("closed", Category::Won, &["active"]),
        status("cancelled", Category::Lost, &["active"]),
    ],
};

static LISTING: StatusTable = StatusTable {
    entity_type: EntityType::Listing,
    default_status: "active",
    statuses: &[
        status("coming_soon", Category::Active, &["active", "withdrawn"]),
        status("active", Category::Active, &["pending", "withdrawn", "expired"]),
        status("pending", Category::Active, &["active", "sold"]),
        status("sold", Category::Won, &[]),
        status("withdrawn", Category::Lost, &["active"]),
        status("expired", Category::Lost, &["active"]),
    ],
};

static CLIENT: StatusTable = StatusTable {
    entity_type: EntityType::Client,
    default_status: "active",
    statuses: &[
        status("active", Category::Active, &["inactive", "closed"]),
        status("inactive", Category::Lost, &["active"]),
        status("closed", Category::Won, &["active"]),
    ],
};

static LEAD: StatusTable = StatusTable {
    entity_type: EntityType::Lead,
    default_status: "new",
    statuses: &[
        status("new", Category::Active, &["contacted", "unqualified", "lost"]),
        status("contacted", Category::Active, &["qualified", "unqualified", "lost"]),
        status("qualified", Category::Active, &["converted", "lost"]),
        status("unqualified", Category::Lost, &["contacted"]),
        status("converted", Category::Won, &[]),
        status("lost", Category::Lost, &["contacted"]),
    ],
};

static APPOINTMENT: StatusTable = StatusTable {
    entity_type: EntityType::Appointment,
    default_status: "scheduled",
    statuses: &[
        status(
            "scheduled",
            Category::Active,
            &["confirmed", "completed", "cancelled", "no_show"],
        ),
        status(
            "confirmed",
            Category::Active,
            &["scheduled", "completed", "cancelled", "no_show"],
        ),
        status("completed", Category::Won, &[]),
        status("cancelled", Category::Lost, &["scheduled"]),
        status("no_show", Category::Lost, &["scheduled"]),
    ],
};

pub fn status_table(entity_type: EntityType) -> &'static StatusTable {
    match entity_type {
        EntityType::Escrow => &ESCROW,
        EntityType::Listing => &LISTING,
        EntityType::Client => &CLIENT,
        EntityType::Lead => &LEAD,
        EntityType::Appointment => &APPOINTMENT,
    }
}

/// Lower-cases and joins words with `_` so `"No Show"` and `"no_show"` name the same status.
pub fn normalize_status(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryError {
    UnmappedStatus {
        entity_type: EntityType,
        raw_status: String,
    },
    EntityTypeMismatch {
        expected: EntityType,
        found: EntityType,
    },
}

impl CategoryError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnmappedStatus { .. } => "raw status has no category mapping",
            Self::EntityTypeMismatch { .. } => "entity belongs to a different entity type",
        }
    }
}

impl std::fmt::Display for CategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmappedStatus {
                entity_type,
                raw_status,
            } => write!(
                f,
                "unmapped status (entity_type={entity_type}, raw_status={raw_status})"
            ),
            Self::EntityTypeMismatch { expected, found } => write!(
                f,
                "entity type mismatch (expected={expected}, found={found})"
            ),
        }
    }
}

pub fn category_of(entity_type: EntityType, raw_status: &str) -> Result<Category, CategoryError> {
    status_table(entity_type)
        .get(raw_status)
        .map(|spec| spec.category)
        .ok_or_else(|| CategoryError::UnmappedStatus {
            entity_type,
            raw_status: raw_status.to_string(),
        })
}

pub fn entity_category(entity_type: EntityType, entity: &Entity) -> Result<Category, CategoryError> {
    if entity.entity_type != entity_type {
        return Err(CategoryError::EntityTypeMismatch {
            expected: entity_type,
            found: entity.entity_type,
        });
    }
    category_of(entity_type, &entity.raw_status)
}

/// Entities of `category`, in input order. Deleted entities never appear; archived ones only
/// when `include_archived` is set.
pub fn list_by_category<'a>(
    entity_type: EntityType,
    category: Category,
    entities: &'a [Entity],
    include_archived: bool,
) -> Result<Vec<&'a Entity>, CategoryError> {
    let mut out = Vec::new();
    for entity in entities {
        let entity_category = entity_category(entity_type, entity)?;
        if entity.is_deleted() || (entity.is_archived() && !include_archived) {
            continue;
        }
        if entity_category == category {
            out.push(entity);
        }
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TabCounts {
    pub active: u64,
    pub won: u64,
    pub lost: u64,
    pub archived: u64,
}

pub fn tab_counts(entity_type: EntityType, entities: &[Entity]) -> Result<TabCounts, CategoryError> {
    let mut counts = TabCounts::default();
    for entity in entities {
        let category = entity_category(entity_type, entity)?;
        if entity.is_deleted() {
            continue;
        }
        if entity.is_archived() {
            counts.archived += 1;
            continue;
        }
        match category {
            Category::Active => counts.active += 1,
            Category::Won => counts.won += 1,
            Category::Lost => counts.lost += 1,
        }
    }
    Ok(counts)
}
