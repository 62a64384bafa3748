#![forbid(unsafe_code)]

use crate::protocol::ServiceError;
use crm_core::{CallerContext, Category, EntityType, RoleOp, RoleType};
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

const DEFAULT_PAGE_LIMIT: usize = 50;

pub(crate) fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ServiceError> {
    Ok(serde_json::from_value(params)?)
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

/// Identifiers travel as strings; a bare surrogate id may also be sent as a JSON integer.
fn token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(D::Error::custom("identifier must be a string or an integer")),
    }
}

fn tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|value| token(value).map_err(D::Error::custom))
        .collect()
}

/// Money is accepted as a decimal string or a JSON number and never goes through float math:
/// integers convert exactly, fractional numbers are parsed from their shortest textual form.
fn money<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => Decimal::from_str(s.trim()),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
            (Some(v), _) => Ok(Decimal::from(v)),
            (None, Some(v)) => Ok(Decimal::from(v)),
            (None, None) => {
                let text = n.to_string();
                Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text))
            }
        },
        Some(_) => return Err(D::Error::custom("money must be a decimal string or number")),
    };
    parsed
        .map(Some)
        .map_err(|err| D::Error::custom(format!("invalid money amount: {err}")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateEntityParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) owner_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default, deserialize_with = "money")]
    pub(crate) volume: Option<Decimal>,
    #[serde(default, deserialize_with = "money")]
    pub(crate) commission: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TargetParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(deserialize_with = "token")]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) expected_revision: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(default)]
    pub(crate) category: Option<Category>,
    #[serde(default)]
    pub(crate) include_archived: bool,
    #[serde(default = "default_limit")]
    pub(crate) limit: usize,
    #[serde(default)]
    pub(crate) offset: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrashParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(default = "default_limit")]
    pub(crate) limit: usize,
    #[serde(default)]
    pub(crate) offset: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(deserialize_with = "token")]
    pub(crate) id: String,
    pub(crate) to_status: String,
    #[serde(default)]
    pub(crate) expected_revision: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetArchivedParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(deserialize_with = "token")]
    pub(crate) id: String,
    pub(crate) archived: bool,
    #[serde(default)]
    pub(crate) expected_revision: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkDeleteParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(deserialize_with = "tokens")]
    pub(crate) ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateContactParams {
    pub(crate) caller: CallerContext,
    pub(crate) display_name: String,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) initial_role: Option<RoleType>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactParams {
    pub(crate) caller: CallerContext,
    pub(crate) contact_id: i64,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RoleOpKind {
    Add,
    Remove,
    SetPrimary,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleParams {
    pub(crate) caller: CallerContext,
    pub(crate) contact_id: i64,
    pub(crate) op: RoleOpKind,
    pub(crate) role_type: RoleType,
    #[serde(default)]
    pub(crate) expected_revision: Option<i64>,
}

impl RoleParams {
    pub(crate) fn role_op(&self) -> RoleOp {
        let role_type = self.role_type.clone();
        match self.op {
            RoleOpKind::Add => RoleOp::Add(role_type),
            RoleOpKind::Remove => RoleOp::Remove(role_type),
            RoleOpKind::SetPrimary => RoleOp::SetPrimary(role_type),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummarizeParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
    #[serde(default)]
    pub(crate) include_archived: bool,
    #[serde(default)]
    pub(crate) include_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TabsParams {
    pub(crate) caller: CallerContext,
    pub(crate) entity_type: EntityType,
}
