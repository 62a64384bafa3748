#![forbid(unsafe_code)]

use crm_core::{Category, CategoryError, EntityType, SummaryError};
use rusqlite::ErrorCode;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    Malformed {
        token: String,
        reason: &'static str,
    },
    NotFound {
        kind: &'static str,
        id: String,
    },
    IllegalTransition {
        entity_type: EntityType,
        surrogate_id: i64,
        from: String,
        to: String,
    },
    EntityDeleted {
        entity_type: EntityType,
        surrogate_id: i64,
        deleted_at_ms: i64,
    },
    DuplicateRole {
        contact_id: i64,
        role_type: String,
    },
    RoleNotFound {
        contact_id: i64,
        role_type: String,
    },
    UnmappedStatus {
        entity_type: EntityType,
        raw_status: String,
    },
    RevisionMismatch {
        expected: i64,
        actual: i64,
    },
    AmountOverflow {
        entity_type: EntityType,
        category: Category,
        field: &'static str,
    },
    InvariantViolation(&'static str),
}

/// Coarse error classes, numbered like their HTTP counterparts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest = 400,
    NotFound = 404,
    Conflict = 409,
    Internal = 500,
}

impl StatusClass {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::Sql(_) => "STORE_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Malformed { .. } => "MALFORMED_ID",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::EntityDeleted { .. } => "ENTITY_DELETED",
            Self::DuplicateRole { .. } => "DUPLICATE_ROLE",
            Self::RoleNotFound { .. } => "ROLE_NOT_FOUND",
            Self::UnmappedStatus { .. } => "UNMAPPED_STATUS",
            Self::RevisionMismatch { .. } => "REVISION_MISMATCH",
            Self::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::InvalidInput(_) | Self::Malformed { .. } => StatusClass::BadRequest,
            Self::NotFound { .. } => StatusClass::NotFound,
            Self::IllegalTransition { .. }
            | Self::EntityDeleted { .. }
            | Self::DuplicateRole { .. }
            | Self::RoleNotFound { .. }
            | Self::RevisionMismatch { .. } => StatusClass::Conflict,
            Self::Io(_)
            | Self::Sql(_)
            | Self::UnmappedStatus { .. }
            | Self::AmountOverflow { .. }
            | Self::InvariantViolation(_) => StatusClass::Internal,
        }
    }

    /// Busy/locked database. The only class retried at the transaction boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Malformed { token, reason } => {
                write!(f, "malformed identifier {token:?}: {reason}")
            }
            Self::NotFound { kind, id } => write!(f, "{kind} not found (id={id})"),
            Self::IllegalTransition {
                entity_type,
                surrogate_id,
                from,
                to,
            } => write!(
                f,
                "illegal transition ({entity_type} {surrogate_id}: {from} -> {to})"
            ),
            Self::EntityDeleted {
                entity_type,
                surrogate_id,
                deleted_at_ms,
            } => write!(
                f,
                "{entity_type} {surrogate_id} is deleted (deleted_at_ms={deleted_at_ms})"
            ),
            Self::DuplicateRole {
                contact_id,
                role_type,
            } => write!(
                f,
                "duplicate role (contact_id={contact_id}, role_type={role_type})"
            ),
            Self::RoleNotFound {
                contact_id,
                role_type,
            } => write!(
                f,
                "role not found (contact_id={contact_id}, role_type={role_type})"
            ),
            Self::UnmappedStatus {
                entity_type,
                raw_status,
            } => write!(
                f,
                "unmapped status (entity_type={entity_type}, raw_status={raw_status})"
            ),
            Self::RevisionMismatch { expected, actual } => {
                write!(
                    f,
                    "revision mismatch (expected={expected}, actual={actual})"
                )
            }
            Self::AmountOverflow {
                entity_type,
                category,
                field,
            } => write!(
                f,
                "{field} sum overflowed (entity_type={entity_type}, category={})",
                category.as_str()
            ),
            Self::InvariantViolation(message) => write!(f, "invariant violation: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<CategoryError> for StoreError {
    fn from(value: CategoryError) -> Self {
        match value {
            CategoryError::UnmappedStatus {
                entity_type,
                raw_status,
            } => Self::UnmappedStatus {
                entity_type,
                raw_status,
            },
            CategoryError::EntityTypeMismatch { .. } => {
                Self::InvariantViolation("row loaded for the wrong entity type")
            }
        }
    }
}

impl From<SummaryError> for StoreError {
    fn from(value: SummaryError) -> Self {
        match value {
            SummaryError::Category(err) => err.into(),
            SummaryError::Overflow {
                entity_type,
                category,
                field,
            } => Self::AmountOverflow {
                entity_type,
                category,
                field,
            },
        }
    }
}
