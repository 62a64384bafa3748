#![forbid(unsafe_code)]

use crm_storage::StoreError;
use serde::Deserialize;
use serde_json::{Value, json};

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcRequest {
    #[serde(default)]
    #[serde(rename = "jsonrpc")]
    pub(crate) _jsonrpc: Option<String>,
    pub(crate) method: String,
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) params: Option<Value>,
}

pub(crate) fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

pub(crate) fn success(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "success": true, "result": result })
}

pub(crate) fn failure(id: Option<Value>, err: &ServiceError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "success": false,
        "error": {
            "code": err.code(),
            "status": err.status(),
            "message": err.message(),
        }
    })
}

/// Failure of one method call, before or after it reaches the store.
#[derive(Debug)]
pub(crate) enum ServiceError {
    InvalidParams(String),
    Store(StoreError),
}

impl ServiceError {
    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::Store(err) => err.code(),
        }
    }

    pub(crate) fn status(&self) -> u16 {
        match self {
            Self::InvalidParams(_) => 400,
            Self::Store(err) => err.status_class().as_u16(),
        }
    }

    pub(crate) fn message(&self) -> String {
        match self {
            Self::InvalidParams(msg) => msg.clone(),
            Self::Store(err) => err.to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidParams(format!("invalid params: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_carries_code_and_status() {
        let err = ServiceError::Store(StoreError::NotFound {
            kind: "escrow",
            id: "ESC-2025-009".to_string(),
        });
        let resp = failure(Some(json!(7)), &err);
        assert_eq!(resp["success"], json!(false));
        assert_eq!(resp["error"]["code"], json!("NOT_FOUND"));
        assert_eq!(resp["error"]["status"], json!(404));
        assert_eq!(resp["id"], json!(7));
    }

    #[test]
    fn params_errors_are_bad_requests() {
        let err: ServiceError = serde_json::from_str::<u8>("\"x\"").unwrap_err().into();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "INVALID_PARAMS");
    }
}
