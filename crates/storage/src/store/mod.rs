#![forbid(unsafe_code)]

mod contacts;
mod entities;
mod error;
mod events;
mod lifecycle;
mod requests;
mod schema;
mod summary;

pub use contacts::RoleOpResult;
pub use entities::EntityChange;
pub use error::{StatusClass, StoreError};
pub use events::EventRow;
pub use lifecycle::{BulkItemStatus, BulkOutcome, MAX_BULK_IDS};
pub use requests::*;

use crm_core::{EntityType, ResolveError};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE_NAME: &str = "crm_rust.db";
const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub busy_timeout: Duration,
    /// Total attempts for a write transaction that hits a busy/locked database.
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(storage_dir, StoreConfig::default())
    }

    pub fn open_with_config(
        storage_dir: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn)?;

        let config = StoreConfig {
            retry_attempts: config.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS),
            ..config
        };
        Ok(Self {
            conn,
            storage_dir,
            config,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs `body` in one IMMEDIATE transaction, retrying only busy/locked failures.
    fn run_tx<T>(
        &mut self,
        op: &'static str,
        mut body: impl FnMut(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1u32;
        loop {
            match self.try_tx(&mut body) {
                Err(err) if err.is_transient() && attempt < self.config.retry_attempts => {
                    log::warn!(
                        "transient storage failure, retrying (op={op}, attempt={attempt}, err={err})"
                    );
                    std::thread::sleep(self.config.retry_backoff * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn try_tx<T>(
        &mut self,
        body: &mut impl FnMut(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn resolve_error(entity_type: EntityType, err: ResolveError) -> StoreError {
    match err {
        ResolveError::Malformed { token, reason } => StoreError::Malformed { token, reason },
        ResolveError::NotFound { token } => StoreError::NotFound {
            kind: entity_type.as_str(),
            id: token,
        },
    }
}

fn check_revision(expected: Option<i64>, actual: i64) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(StoreError::RevisionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Mutations always move `updated_at_ms` forward, even if the wall clock does not.
fn advance_ms(previous_ms: i64, now_ms: i64) -> i64 {
    now_ms.max(previous_ms.saturating_add(1))
}

fn calendar_year(ts_ms: i64) -> Result<i32, StoreError> {
    time::OffsetDateTime::from_unix_timestamp(ts_ms.div_euclid(1000))
        .map(|moment| moment.year())
        .map_err(|_| StoreError::InvalidInput("clock is out of range"))
}
