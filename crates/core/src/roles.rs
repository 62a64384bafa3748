#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const MAX_ROLE_TYPE_LEN: usize = 64;

/// Validated role tag such as `buyer`, `seller` or `vendor`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RoleType(String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleTypeError {
    Empty,
    TooLong,
    InvalidFormat,
}

impl RoleTypeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "role type must not be empty",
            Self::TooLong => "role type is too long",
            Self::InvalidFormat => {
                "role type must start with a letter and contain only [a-z0-9_]"
            }
        }
    }
}

impl RoleType {
    pub fn try_new(value: impl AsRef<str>) -> Result<Self, RoleTypeError> {
        let value = value.as_ref().trim().to_ascii_lowercase();
        if value.is_empty() {
            return Err(RoleTypeError::Empty);
        }
        if value.len() > MAX_ROLE_TYPE_LEN {
            return Err(RoleTypeError::TooLong);
        }
        let mut bytes = value.bytes();
        let starts_with_letter = bytes.next().is_some_and(|b| b.is_ascii_lowercase());
        if !starts_with_letter
            || !bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(RoleTypeError::InvalidFormat);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RoleType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RoleType::try_new(raw).map_err(|err| serde::de::Error::custom(err.message()))
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One role held by a contact. `ordinal` is the assignment order and breaks `added_at_ms` ties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactRole {
    pub role_type: RoleType,
    pub is_primary: bool,
    pub added_at_ms: i64,
    pub ordinal: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub contact_id: i64,
    pub owner_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub revision: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub roles: Vec<ContactRole>,
}

impl Contact {
    pub fn primary_role(&self) -> Option<&ContactRole> {
        self.roles.iter().find(|role| role.is_primary)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleOp {
    Add(RoleType),
    Remove(RoleType),
    SetPrimary(RoleType),
}

impl RoleOp {
    pub fn role_type(&self) -> &RoleType {
        match self {
            RoleOp::Add(role) | RoleOp::Remove(role) | RoleOp::SetPrimary(role) => role,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleOp::Add(_) => "add",
            RoleOp::Remove(_) => "remove",
            RoleOp::SetPrimary(_) => "set_primary",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleError {
    DuplicateRole { role_type: RoleType },
    RoleNotFound { role_type: RoleType },
    /// More than one primary, or none while roles exist.
    PrimaryInvariant { primaries: usize, roles: usize },
}

impl RoleError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::DuplicateRole { .. } => "contact already holds this role",
            Self::RoleNotFound { .. } => "contact does not hold this role",
            Self::PrimaryInvariant { .. } => "contact must have exactly one primary role",
        }
    }
}

/// Row-level effect of a role operation, applied by storage in one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleChange {
    Inserted {
        role_type: RoleType,
        is_primary: bool,
        ordinal: i64,
    },
    Removed {
        role_type: RoleType,
        promoted: Option<RoleType>,
    },
    PrimaryMoved {
        from: Option<RoleType>,
        to: RoleType,
    },
    Unchanged,
}

/// In-memory view of one contact's roles. Enforces the single-primary rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<ContactRole>,
}

impl RoleSet {
    pub fn new(roles: Vec<ContactRole>) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &[ContactRole] {
        &self.roles
    }

    pub fn into_roles(self) -> Vec<ContactRole> {
        self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn primary(&self) -> Option<&ContactRole> {
        self.roles.iter().find(|role| role.is_primary)
    }

    pub fn contains(&self, role_type: &RoleType) -> bool {
        self.position(role_type).is_some()
    }

    fn position(&self, role_type: &RoleType) -> Option<usize> {
        self.roles.iter().position(|role| &role.role_type == role_type)
    }

    pub fn check_invariant(&self) -> Result<(), RoleError> {
        let primaries = self.roles.iter().filter(|role| role.is_primary).count();
        let ok = if self.roles.is_empty() {
            primaries == 0
        } else {
            primaries == 1
        };
        if ok {
            Ok(())
        } else {
            Err(RoleError::PrimaryInvariant {
                primaries,
                roles: self.roles.len(),
            })
        }
    }

    pub fn apply(&mut self, op: &RoleOp, now_ms: i64) -> Result<RoleChange, RoleError> {
        match op {
            RoleOp::Add(role_type) => self.add(role_type.clone(), now_ms),
            RoleOp::Remove(role_type) => self.remove(role_type),
            RoleOp::SetPrimary(role_type) => self.set_primary(role_type),
        }
    }

    pub fn add(&mut self, role_type: RoleType, now_ms: i64) -> Result<RoleChange, RoleError> {
        if self.contains(&role_type) {
            return Err(RoleError::DuplicateRole { role_type });
        }
        let is_primary = self.roles.is_empty();
        let ordinal = self
            .roles
            .iter()
            .map(|role| role.ordinal)
            .max()
            .map_or(1, |max| max + 1);
        self.roles.push(ContactRole {
            role_type: role_type.clone(),
            is_primary,
            added_at_ms: now_ms,
            ordinal,
        });
        Ok(RoleChange::Inserted {
            role_type,
            is_primary,
            ordinal,
        })
    }

    pub fn remove(&mut self, role_type: &RoleType) -> Result<RoleChange, RoleError> {
        let Some(index) = self.position(role_type) else {
            return Err(RoleError::RoleNotFound {
                role_type: role_type.clone(),
            });
        };
        let removed = self.roles.remove(index);

        let mut promoted = None;
        if removed.is_primary {
            if let Some(next) = self
                .roles
                .iter_mut()
                .min_by_key(|role| (role.added_at_ms, role.ordinal))
            {
                next.is_primary = true;
                promoted = Some(next.role_type.clone());
            }
        }
        Ok(RoleChange::Removed {
            role_type: removed.role_type,
            promoted,
        })
    }

    pub fn set_primary(&mut self, role_type: &RoleType) -> Result<RoleChange, RoleError> {
        let Some(index) = self.position(role_type) else {
            return Err(RoleError::RoleNotFound {
                role_type: role_type.clone(),
            });
        };
        if self.roles[index].is_primary {
            return Ok(RoleChange::Unchanged);
        }
        let from = self.primary().map(|role| role.role_type.clone());
        for (i, role) in self.roles.iter_mut().enumerate() {
            role.is_primary = i == index;
        }
        Ok(RoleChange::PrimaryMoved {
            from,
            to: role_type.clone(),
        })
    }
}
