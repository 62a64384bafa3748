#![forbid(unsafe_code)]

use super::{
    CreateContactRequest, RoleOpRequest, SqliteStore, StoreError, advance_ms, check_revision,
    is_constraint_violation, now_ms,
};
use crm_core::{
    CallerContext, Contact, ContactRole, RoleChange, RoleError, RoleOp, RoleSet, RoleType,
};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const MAX_NAME_LEN: usize = 256;
const MAX_CONTACT_FIELD_LEN: usize = 320;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleOpResult {
    pub contact: Contact,
    pub change: RoleChange,
}

fn role_error(contact_id: i64, err: RoleError) -> StoreError {
    match err {
        RoleError::DuplicateRole { role_type } => StoreError::DuplicateRole {
            contact_id,
            role_type: role_type.to_string(),
        },
        RoleError::RoleNotFound { role_type } => StoreError::RoleNotFound {
            contact_id,
            role_type: role_type.to_string(),
        },
        RoleError::PrimaryInvariant { primaries, roles } => {
            log::error!(
                "contact role set is inconsistent (contact_id={contact_id}, primaries={primaries}, roles={roles})"
            );
            StoreError::InvariantViolation("contact must have exactly one primary role")
        }
    }
}

fn optional_field(value: Option<String>) -> Result<Option<String>, StoreError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > MAX_CONTACT_FIELD_LEN {
        return Err(StoreError::InvalidInput("contact field is too long"));
    }
    Ok(Some(value))
}

fn load_roles(conn: &Connection, contact_id: i64) -> Result<Vec<ContactRole>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT role_type, is_primary, added_at_ms, ordinal FROM contact_roles \
         WHERE contact_id=?1 ORDER BY ordinal ASC",
    )?;
    let mut rows = stmt.query(params![contact_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let role_type = RoleType::try_new(row.get::<_, String>(0)?)
            .map_err(|_| StoreError::InvariantViolation("stored role type is invalid"))?;
        out.push(ContactRole {
            role_type,
            is_primary: row.get::<_, i64>(1)? != 0,
            added_at_ms: row.get(2)?,
            ordinal: row.get(3)?,
        });
    }
    Ok(out)
}

fn load_contact(
    conn: &Connection,
    ctx: &CallerContext,
    contact_id: i64,
) -> Result<Contact, StoreError> {
    let contact = conn
        .query_row(
            "SELECT contact_id, owner_id, display_name, email, phone, revision, created_at_ms, updated_at_ms \
             FROM contacts WHERE contact_id=?1 AND (?2 IS NULL OR owner_id = ?2)",
            params![contact_id, ctx.owner_filter()],
            |row| {
                Ok(Contact {
                    contact_id: row.get(0)?,
                    owner_id: row.get(1)?,
                    display_name: row.get(2)?,
                    email: row.get(3)?,
                    phone: row.get(4)?,
                    revision: row.get(5)?,
                    created_at_ms: row.get(6)?,
                    updated_at_ms: row.get(7)?,
                    roles: Vec::new(),
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            kind: "contact",
            id: contact_id.to_string(),
        })?;
    let roles = load_roles(conn, contact_id)?;
    Ok(Contact { roles, ..contact })
}

fn insert_role_tx(
    tx: &Transaction<'_>,
    contact_id: i64,
    role: &ContactRole,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO contact_roles(contact_id, role_type, is_primary, added_at_ms, ordinal) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            contact_id,
            role.role_type.as_str(),
            role.is_primary,
            role.added_at_ms,
            role.ordinal
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            StoreError::DuplicateRole {
                contact_id,
                role_type: role.role_type.to_string(),
            }
        } else {
            StoreError::Sql(err)
        }
    })?;
    Ok(())
}

/// Writes the rows a planned change touches. Primary is cleared before it is set again so
/// the partial unique index never sees two primaries.
fn persist_change_tx(
    tx: &Transaction<'_>,
    contact_id: i64,
    set: &RoleSet,
    change: &RoleChange,
) -> Result<(), StoreError> {
    match change {
        RoleChange::Unchanged => {}
        RoleChange::Inserted { role_type, .. } => {
            let role = set
                .roles()
                .iter()
                .find(|role| &role.role_type == role_type)
                .ok_or(StoreError::InvariantViolation("inserted role is missing"))?;
            insert_role_tx(tx, contact_id, role)?;
        }
        RoleChange::Removed {
            role_type,
            promoted,
        } => {
            tx.execute(
                "DELETE FROM contact_roles WHERE contact_id=?1 AND role_type=?2",
                params![contact_id, role_type.as_str()],
            )?;
            if let Some(promoted) = promoted {
                tx.execute(
                    "UPDATE contact_roles SET is_primary=1 WHERE contact_id=?1 AND role_type=?2",
                    params![contact_id, promoted.as_str()],
                )?;
            }
        }
        RoleChange::PrimaryMoved { to, .. } => {
            tx.execute(
                "UPDATE contact_roles SET is_primary=0 WHERE contact_id=?1 AND is_primary=1",
                params![contact_id],
            )?;
            tx.execute(
                "UPDATE contact_roles SET is_primary=1 WHERE contact_id=?1 AND role_type=?2",
                params![contact_id, to.as_str()],
            )?;
        }
    }
    Ok(())
}

/// Re-counts primaries from the table itself before commit.
fn verify_primary_tx(tx: &Transaction<'_>, contact_id: i64) -> Result<(), StoreError> {
    let (roles, primaries) = tx.query_row(
        "SELECT COUNT(1), COALESCE(SUM(is_primary), 0) FROM contact_roles WHERE contact_id=?1",
        params![contact_id],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;
    let ok = if roles == 0 {
        primaries == 0
    } else {
        primaries == 1
    };
    if ok {
        Ok(())
    } else {
        Err(role_error(
            contact_id,
            RoleError::PrimaryInvariant {
                primaries: usize::try_from(primaries).unwrap_or(usize::MAX),
                roles: usize::try_from(roles).unwrap_or(usize::MAX),
            },
        ))
    }
}

impl SqliteStore {
    pub fn create_contact(
        &mut self,
        ctx: &CallerContext,
        request: CreateContactRequest,
    ) -> Result<Contact, StoreError> {
        let display_name = request.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(StoreError::InvalidInput("display_name must not be empty"));
        }
        if display_name.chars().count() > MAX_NAME_LEN {
            return Err(StoreError::InvalidInput("display_name is too long"));
        }
        let email = optional_field(request.email)?;
        let phone = optional_field(request.phone)?;
        let now = now_ms();

        let contact_id = self.run_tx("contact.create", |tx| {
            tx.execute(
                "INSERT INTO contacts(owner_id, display_name, email, phone, revision, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
                params![ctx.actor_id.as_str(), display_name, email, phone, now],
            )?;
            let contact_id = tx.last_insert_rowid();

            if let Some(role_type) = request.initial_role.clone() {
                let mut set = RoleSet::default();
                let change = set
                    .add(role_type, now)
                    .map_err(|err| role_error(contact_id, err))?;
                persist_change_tx(tx, contact_id, &set, &change)?;
                verify_primary_tx(tx, contact_id)?;
            }
            Ok(contact_id)
        })?;

        log::debug!("contact created (contact_id={contact_id})");
        load_contact(&self.conn, ctx, contact_id)
    }

    pub fn get_contact(&self, ctx: &CallerContext, contact_id: i64) -> Result<Contact, StoreError> {
        load_contact(&self.conn, ctx, contact_id)
    }

    /// Applies one role operation in a single transaction.
    pub fn role_op(
        &mut self,
        ctx: &CallerContext,
        request: RoleOpRequest,
    ) -> Result<RoleOpResult, StoreError> {
        let contact_id = request.contact_id;
        let now = now_ms();

        let result = self.run_tx("contact.role", |tx| {
            let contact = load_contact(tx, ctx, contact_id)?;
            check_revision(request.expected_revision, contact.revision)?;

            let mut set = RoleSet::new(contact.roles.clone());
            let change = set
                .apply(&request.op, now)
                .map_err(|err| role_error(contact_id, err))?;
            if change == RoleChange::Unchanged {
                return Ok(RoleOpResult { contact, change });
            }

            persist_change_tx(tx, contact_id, &set, &change)?;
            set.check_invariant()
                .map_err(|err| role_error(contact_id, err))?;
            verify_primary_tx(tx, contact_id)?;

            let updated_at_ms = advance_ms(contact.updated_at_ms, now);
            tx.execute(
                "UPDATE contacts SET revision=revision+1, updated_at_ms=?1 WHERE contact_id=?2",
                params![updated_at_ms, contact_id],
            )?;

            Ok(RoleOpResult {
                contact: Contact {
                    revision: contact.revision + 1,
                    updated_at_ms,
                    roles: set.into_roles(),
                    ..contact
                },
                change,
            })
        })?;

        log::debug!(
            "contact role {} applied (contact_id={contact_id}, role={}, changed={})",
            request.op.as_str(),
            request.op.role_type(),
            result.change != RoleChange::Unchanged
        );
        Ok(result)
    }

    pub fn add_role(
        &mut self,
        ctx: &CallerContext,
        contact_id: i64,
        role_type: RoleType,
    ) -> Result<RoleOpResult, StoreError> {
        self.role_op(
            ctx,
            RoleOpRequest {
                contact_id,
                op: RoleOp::Add(role_type),
                expected_revision: None,
            },
        )
    }

    pub fn remove_role(
        &mut self,
        ctx: &CallerContext,
        contact_id: i64,
        role_type: RoleType,
    ) -> Result<RoleOpResult, StoreError> {
        self.role_op(
            ctx,
            RoleOpRequest {
                contact_id,
                op: RoleOp::Remove(role_type),
                expected_revision: None,
            },
        )
    }

    pub fn set_primary_role(
        &mut self,
        ctx: &CallerContext,
        contact_id: i64,
        role_type: RoleType,
    ) -> Result<RoleOpResult, StoreError> {
        self.role_op(
            ctx,
            RoleOpRequest {
                contact_id,
                op: RoleOp::SetPrimary(role_type),
                expected_revision: None,
            },
        )
    }
}
