#![forbid(unsafe_code)]

use crate::entity::EntityType;
use crate::status::{category_of, normalize_status, status_table};

/// The mutable part of an entity as the lifecycle sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleState {
    pub raw_status: String,
    pub archived_at_ms: Option<i64>,
    pub deleted_at_ms: Option<i64>,
}

impl LifecycleState {
    pub fn initial(entity_type: EntityType) -> Self {
        Self {
            raw_status: status_table(entity_type).default_status.to_string(),
            archived_at_ms: None,
            deleted_at_ms: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    Transition { target: String },
    Archive,
    Unarchive,
    Delete,
    Restore,
}

impl LifecycleAction {
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleAction::Transition { .. } => "status_changed",
            LifecycleAction::Archive => "archived",
            LifecycleAction::Unarchive => "unarchived",
            LifecycleAction::Delete => "deleted",
            LifecycleAction::Restore => "restored",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Changed(LifecycleState),
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    IllegalTransition {
        entity_type: EntityType,
        from: String,
        to: String,
    },
    EntityDeleted {
        entity_type: EntityType,
        deleted_at_ms: i64,
    },
    UnmappedStatus {
        entity_type: EntityType,
        raw_status: String,
    },
}

impl LifecycleError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } => "target status is not reachable from the current one",
            Self::EntityDeleted { .. } => "entity is deleted; restore it first",
            Self::UnmappedStatus { .. } => "stored status has no category mapping",
        }
    }
}

/// Validates `action` against `state` and returns the state to persist.
///
/// `now_ms` becomes the new `archived_at_ms`/`deleted_at_ms` where the action sets one.
pub fn plan(
    entity_type: EntityType,
    state: &LifecycleState,
    action: &LifecycleAction,
    now_ms: i64,
) -> Result<LifecycleOutcome, LifecycleError> {
    let deleted_gate = |deleted_at_ms: i64| LifecycleError::EntityDeleted {
        entity_type,
        deleted_at_ms,
    };

    match action {
        LifecycleAction::Transition { target } => {
            if let Some(deleted_at_ms) = state.deleted_at_ms {
                return Err(deleted_gate(deleted_at_ms));
            }
            if category_of(entity_type, &state.raw_status).is_err() {
                return Err(LifecycleError::UnmappedStatus {
                    entity_type,
                    raw_status: state.raw_status.clone(),
                });
            }

            let target = normalize_status(target);
            if target == state.raw_status {
                return Ok(LifecycleOutcome::Unchanged);
            }
            if !status_table(entity_type).can_transition(&state.raw_status, &target) {
                return Err(LifecycleError::IllegalTransition {
                    entity_type,
                    from: state.raw_status.clone(),
                    to: target,
                });
            }
            Ok(LifecycleOutcome::Changed(LifecycleState {
                raw_status: target,
                ..state.clone()
            }))
        }
        LifecycleAction::Archive => {
            if let Some(deleted_at_ms) = state.deleted_at_ms {
                return Err(deleted_gate(deleted_at_ms));
            }
            if state.archived_at_ms.is_some() {
                return Ok(LifecycleOutcome::Unchanged);
            }
            Ok(LifecycleOutcome::Changed(LifecycleState {
                archived_at_ms: Some(now_ms),
                ..state.clone()
            }))
        }
        LifecycleAction::Unarchive => {
            if let Some(deleted_at_ms) = state.deleted_at_ms {
                return Err(deleted_gate(deleted_at_ms));
            }
            if state.archived_at_ms.is_none() {
                return Ok(LifecycleOutcome::Unchanged);
            }
            Ok(LifecycleOutcome::Changed(LifecycleState {
                archived_at_ms: None,
                ..state.clone()
            }))
        }
        LifecycleAction::Delete => {
            if state.deleted_at_ms.is_some() {
                return Ok(LifecycleOutcome::Unchanged);
            }
            Ok(LifecycleOutcome::Changed(LifecycleState {
                deleted_at_ms: Some(now_ms),
                ..state.clone()
            }))
        }
        LifecycleAction::Restore => {
            if state.deleted_at_ms.is_none() {
                return Ok(LifecycleOutcome::Unchanged);
            }
            Ok(LifecycleOutcome::Changed(LifecycleState {
                deleted_at_ms: None,
                ..state.clone()
            }))
        }
    }
}
