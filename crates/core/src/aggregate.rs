#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::entity::{Entity, EntityType};
use crate::status::{Category, CategoryError, entity_category};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryFilter {
    pub include_archived: bool,
    pub include_deleted: bool,
}

impl SummaryFilter {
    fn admits(&self, entity: &Entity) -> bool {
        if entity.is_deleted() {
            return self.include_deleted;
        }
        if entity.is_archived() {
            return self.include_archived;
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub count: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    /// Entities that carried a volume; the denominator of `average_volume`.
    pub priced_count: u64,
}

impl CategorySummary {
    pub fn average_volume(&self) -> Option<Decimal> {
        if self.priced_count == 0 {
            return None;
        }
        Some(self.volume / Decimal::from(self.priced_count))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub entity_type: EntityType,
    pub tracks_money: bool,
    pub categories: BTreeMap<Category, CategorySummary>,
}

impl Summary {
    pub fn empty(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            tracks_money: entity_type.tracks_money(),
            categories: Category::ALL
                .into_iter()
                .map(|category| (category, CategorySummary::default()))
                .collect(),
        }
    }

    pub fn get(&self, category: Category) -> &CategorySummary {
        // Every category is inserted by `empty`.
        &self.categories[&category]
    }

    pub fn total_count(&self) -> u64 {
        self.categories.values().map(|summary| summary.count).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SummaryError {
    Category(CategoryError),
    /// A money sum left the representable decimal range.
    Overflow {
        entity_type: EntityType,
        category: Category,
        field: &'static str,
    },
}

impl SummaryError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Category(err) => err.message(),
            Self::Overflow { .. } => "money sum overflowed",
        }
    }
}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category(err) => write!(f, "{err}"),
            Self::Overflow {
                entity_type,
                category,
                field,
            } => write!(
                f,
                "{field} sum overflowed (entity_type={entity_type}, category={})",
                category.as_str()
            ),
        }
    }
}

impl std::error::Error for SummaryError {}

impl From<CategoryError> for SummaryError {
    fn from(value: CategoryError) -> Self {
        Self::Category(value)
    }
}

/// Per-category counts and money sums. Money is only summed for types that track it.
pub fn summarize(
    entity_type: EntityType,
    entities: &[Entity],
    filter: SummaryFilter,
) -> Result<Summary, SummaryError> {
    let mut summary = Summary::empty(entity_type);
    for entity in entities {
        let category = entity_category(entity_type, entity)?;
        if !filter.admits(entity) {
            continue;
        }
        let Some(bucket) = summary.categories.get_mut(&category) else {
            continue;
        };
        bucket.count += 1;
        if !entity_type.tracks_money() {
            continue;
        }
        let overflow = |field| SummaryError::Overflow {
            entity_type,
            category,
            field,
        };
        if let Some(volume) = entity.volume {
            bucket.volume = bucket
                .volume
                .checked_add(volume)
                .ok_or_else(|| overflow("volume"))?;
            bucket.priced_count += 1;
        }
        if let Some(commission) = entity.commission {
            bucket.commission = bucket
                .commission
                .checked_add(commission)
                .ok_or_else(|| overflow("commission"))?;
        }
    }
    Ok(summary)
}
