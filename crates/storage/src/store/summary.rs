#![forbid(unsafe_code)]

use super::entities::{RowSet, load_entities};
use super::{SqliteStore, StoreError};
use crm_core::{CallerContext, EntityType, Summary, SummaryFilter, TabCounts, summarize, tab_counts};

impl SqliteStore {
    /// Stat cards for one entity type, derived from raw state on every call.
    pub fn summarize(
        &self,
        ctx: &CallerContext,
        entity_type: EntityType,
        filter: SummaryFilter,
    ) -> Result<Summary, StoreError> {
        let rows = if filter.include_deleted {
            RowSet::All
        } else {
            RowSet::Live {
                include_archived: filter.include_archived,
            }
        };
        let entities = load_entities(&self.conn, entity_type, ctx.owner_filter(), rows, -1, 0)?;
        Ok(summarize(entity_type, &entities, filter)
            .inspect_err(|err| log::error!("summary failed: {err}"))?)
    }

    pub fn tab_counts(
        &self,
        ctx: &CallerContext,
        entity_type: EntityType,
    ) -> Result<TabCounts, StoreError> {
        let entities = load_entities(
            &self.conn,
            entity_type,
            ctx.owner_filter(),
            RowSet::Live {
                include_archived: true,
            },
            -1,
            0,
        )?;
        Ok(tab_counts(entity_type, &entities)
            .inspect_err(|err| log::error!("tab counts failed: {err}"))?)
    }
}
