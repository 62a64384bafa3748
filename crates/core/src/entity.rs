#![forbid(unsafe_code)]

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Escrow,
    Listing,
    Client,
    Lead,
    Appointment,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Escrow,
        EntityType::Listing,
        EntityType::Client,
        EntityType::Lead,
        EntityType::Appointment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Escrow => "escrow",
            EntityType::Listing => "listing",
            EntityType::Client => "client",
            EntityType::Lead => "lead",
            EntityType::Appointment => "appointment",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            EntityType::Escrow => "escrows",
            EntityType::Listing => "listings",
            EntityType::Client => "clients",
            EntityType::Lead => "leads",
            EntityType::Appointment => "appointments",
        }
    }

    pub fn display_prefix(self) -> &'static str {
        match self {
            EntityType::Escrow => "ESC",
            EntityType::Listing => "LST",
            EntityType::Client => "CLT",
            EntityType::Lead => "LED",
            EntityType::Appointment => "APT",
        }
    }

    pub fn external_prefix(self) -> &'static str {
        match self {
            EntityType::Escrow => "escrow-",
            EntityType::Listing => "listing-",
            EntityType::Client => "client-",
            EntityType::Lead => "lead-",
            EntityType::Appointment => "appointment-",
        }
    }

    /// Escrows and listings carry a price and a commission; the other types are counted only.
    pub fn tracks_money(self) -> bool {
        matches!(self, EntityType::Escrow | EntityType::Listing)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub entity_type: EntityType,
    pub surrogate_id: i64,
    pub display_id: String,
    pub external_id: String,
    pub owner_id: String,
    pub title: String,
    pub raw_status: String,
    pub volume: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub revision: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub archived_at_ms: Option<i64>,
    pub deleted_at_ms: Option<i64>,
    pub updated_by: Option<String>,
}

impl Entity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at_ms.is_some()
    }

    /// Deletion supersedes archiving: a deleted row never counts as archived.
    pub fn is_archived(&self) -> bool {
        self.archived_at_ms.is_some() && !self.is_deleted()
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted() && !self.is_archived()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_distinct_per_type() {
        let mut display = EntityType::ALL
            .iter()
            .map(|t| t.display_prefix())
            .collect::<Vec<_>>();
        display.sort();
        display.dedup();
        assert_eq!(display.len(), EntityType::ALL.len());

        for a in EntityType::ALL {
            for b in EntityType::ALL {
                if a != b {
                    assert!(!a.external_prefix().starts_with(b.external_prefix()));
                }
            }
        }
    }
}
