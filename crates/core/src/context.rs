#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const MAX_ACTOR_ID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, ActorIdError> {
        let value = value.into();
        validate_actor_id(&value)?;
        Ok(Self(value))
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ActorId::try_new(raw).map_err(|err| serde::de::Error::custom(err.message()))
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActorIdError {
    Empty,
    TooLong,
    InvalidChar { ch: char, index: usize },
}

impl ActorIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "actor_id must not be empty",
            Self::TooLong => "actor_id is too long",
            Self::InvalidChar { .. } => "actor_id may contain only [A-Za-z0-9._@-]",
        }
    }
}

fn validate_actor_id(value: &str) -> Result<(), ActorIdError> {
    if value.is_empty() {
        return Err(ActorIdError::Empty);
    }
    if value.len() > MAX_ACTOR_ID_LEN {
        return Err(ActorIdError::TooLong);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '@' | '-') {
            continue;
        }
        return Err(ActorIdError::InvalidChar { ch, index });
    }
    Ok(())
}

/// `Owner` sees only rows whose `owner_id` is the actor; `All` is the broker/admin view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    #[default]
    Owner,
    All,
}

/// Who is calling. Passed explicitly into every store operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub actor_id: ActorId,
    #[serde(default)]
    pub scope: AccessScope,
}

impl CallerContext {
    pub fn owner(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            scope: AccessScope::Owner,
        }
    }

    pub fn all(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            scope: AccessScope::All,
        }
    }

    pub fn can_see(&self, owner_id: &str) -> bool {
        match self.scope {
            AccessScope::All => true,
            AccessScope::Owner => self.actor_id.as_str() == owner_id,
        }
    }

    /// `None` when the caller sees every owner.
    pub fn owner_filter(&self) -> Option<&str> {
        match self.scope {
            AccessScope::All => None,
            AccessScope::Owner => Some(self.actor_id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_validation() {
        assert!(ActorId::try_new("agent.maria@brokerage").is_ok());
        assert_eq!(ActorId::try_new(""), Err(ActorIdError::Empty));
        assert_eq!(
            ActorId::try_new("a b"),
            Err(ActorIdError::InvalidChar { ch: ' ', index: 1 })
        );
        assert_eq!(ActorId::try_new("x".repeat(129)), Err(ActorIdError::TooLong));
    }

    #[test]
    fn owner_scope_filters_foreign_rows() {
        let ctx = CallerContext::owner(ActorId::try_new("u1").unwrap());
        assert!(ctx.can_see("u1"));
        assert!(!ctx.can_see("u2"));
        assert_eq!(ctx.owner_filter(), Some("u1"));

        let broker = CallerContext::all(ActorId::try_new("b1").unwrap());
        assert!(broker.can_see("u2"));
        assert_eq!(broker.owner_filter(), None);
    }

    #[test]
    fn caller_deserializes_with_default_scope() {
        let ctx: CallerContext = serde_json::from_str(r#"{"actor_id":"u1"}"#).unwrap();
        assert_eq!(ctx.scope, AccessScope::Owner);
        let ctx: CallerContext =
            serde_json::from_str(r#"{"actor_id":"b1","scope":"all"}"#).unwrap();
        assert_eq!(ctx.scope, AccessScope::All);
        assert!(serde_json::from_str::<CallerContext>(r#"{"actor_id":""}"#).is_err());
    }
}
