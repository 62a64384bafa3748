#![forbid(unsafe_code)]

use crate::entity::EntityType;

const MAX_TOKEN_LEN: usize = 128;
const MIN_SEQUENCE_DIGITS: usize = 3;
const UUID_LEN: usize = 36;

/// Canonical single-row lookup. Each variant names a unique column of the entity table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupPredicate {
    Surrogate(i64),
    Display(String),
    External(String),
}

impl LookupPredicate {
    pub fn column(&self) -> &'static str {
        match self {
            LookupPredicate::Surrogate(_) => "surrogate_id",
            LookupPredicate::Display(_) => "display_id",
            LookupPredicate::External(_) => "external_id",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    Malformed { token: String, reason: &'static str },
    NotFound { token: String },
}

impl ResolveError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Malformed { reason, .. } => reason,
            Self::NotFound { .. } => "identifier cannot name an existing row",
        }
    }
}

/// Classifies `token` for `entity_type` and returns the canonical lookup predicate.
///
/// Precedence is numeric, then display code, then external id. The entity type always comes from
/// the caller; a token shaped for another type is rejected rather than reinterpreted.
pub fn resolve(entity_type: EntityType, token: &str) -> Result<LookupPredicate, ResolveError> {
    let trimmed = token.trim();
    let malformed = |reason: &'static str| ResolveError::Malformed {
        token: trimmed.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(malformed("identifier must not be empty"));
    }
    if trimmed.len() > MAX_TOKEN_LEN {
        return Err(malformed("identifier is too long"));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return match trimmed.parse::<i64>() {
            Ok(value) if value > 0 => Ok(LookupPredicate::Surrogate(value)),
            _ => Err(ResolveError::NotFound {
                token: trimmed.to_string(),
            }),
        };
    }

    if let Some(display) = parse_display_id(entity_type, trimmed) {
        return Ok(LookupPredicate::Display(display));
    }

    if let Some(uuid) = strip_ascii_prefix(trimmed, entity_type.external_prefix()) {
        return match canonical_uuid(uuid) {
            Some(uuid) => Ok(LookupPredicate::External(external_id_for(entity_type, &uuid))),
            None => Err(malformed("external id must carry a uuid after the type prefix")),
        };
    }

    if let Some(uuid) = canonical_uuid(trimmed) {
        return Ok(LookupPredicate::External(external_id_for(entity_type, &uuid)));
    }

    if foreign_prefix(entity_type, trimmed) {
        return Err(malformed("identifier belongs to a different entity type"));
    }

    Err(malformed("identifier matches no known shape"))
}

/// Formats the human-readable code, e.g. `ESC-2025-003`.
pub fn format_display_id(entity_type: EntityType, year: i32, sequence: u64) -> String {
    format!(
        "{}-{year:04}-{sequence:0width$}",
        entity_type.display_prefix(),
        width = MIN_SEQUENCE_DIGITS
    )
}

pub fn external_id_for(entity_type: EntityType, uuid: &str) -> String {
    format!("{}{uuid}", entity_type.external_prefix())
}

pub fn new_external_id(entity_type: EntityType) -> String {
    external_id_for(entity_type, &uuid::Uuid::new_v4().to_string())
}

fn parse_display_id(entity_type: EntityType, token: &str) -> Option<String> {
    let mut parts = token.split('-');
    let prefix = parts.next()?;
    let year = parts.next()?;
    let sequence = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if !prefix.eq_ignore_ascii_case(entity_type.display_prefix()) {
        return None;
    }
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if sequence.len() < MIN_SEQUENCE_DIGITS || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{year}-{sequence}", entity_type.display_prefix()))
}

/// Only the 36-character hyphenated form is accepted; simple, braced and urn forms are not.
fn canonical_uuid(value: &str) -> Option<String> {
    if value.len() != UUID_LEN {
        return None;
    }
    uuid::Uuid::try_parse(value)
        .ok()
        .map(|uuid| uuid.hyphenated().to_string())
}

fn strip_ascii_prefix<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = value.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}

fn foreign_prefix(entity_type: EntityType, token: &str) -> bool {
    EntityType::ALL
        .into_iter()
        .filter(|other| *other != entity_type)
        .any(|other| {
            strip_ascii_prefix(token, other.external_prefix()).is_some()
                || parse_display_id(other, token).is_some()
        })
}
