//! JSON-RPC 2.0 envelope types and method dispatch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::services::user_info;

use super::RpcState;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const NOT_FOUND: i64 = -32004;
pub const SERVER_ERROR: i64 = -32000;

/// Incoming request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::InvalidInput { .. } => INVALID_PARAMS,
            AppError::NotFound { .. } => NOT_FOUND,
            _ => SERVER_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
            data: serde_json::to_value(&err).ok(),
        }
    }
}

/// Outgoing response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    organization: String,
}

#[derive(Debug, Deserialize)]
struct UserInformationParams {
    org: String,
    user: String,
    year: i32,
    month: u32,
}

/// Decode params given either by name (object) or by position (array).
fn decode_params<T: DeserializeOwned>(params: Value, names: &[&str]) -> Result<T, RpcError> {
    let object = match params {
        Value::Array(values) => {
            if values.len() != names.len() {
                return Err(RpcError::new(
                    INVALID_PARAMS,
                    format!("expected {} positional params, got {}", names.len(), values.len()),
                ));
            }
            Value::Object(
                names
                    .iter()
                    .map(|n| n.to_string())
                    .zip(values)
                    .collect(),
            )
        }
        other => other,
    };
    serde_json::from_value(object)
        .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid params: {}", e)))
}

/// Run one request to completion.
pub async fn dispatch(state: &RpcState, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return RpcResponse::failure(id, RpcError::new(INVALID_REQUEST, "unsupported jsonrpc version"));
    }

    log::debug!("[rpc] {} id={}", request.method, id);
    match call(state, &request.method, request.params).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => {
            log::warn!("[rpc] {} failed: {}", request.method, error.message);
            RpcResponse::failure(id, error)
        }
    }
}

async fn call(state: &RpcState, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "update" => {
            let p: UpdateParams = decode_params(params, &["organization"])?;
            if p.organization.is_empty() {
                return Err(RpcError::new(INVALID_PARAMS, "organization must not be empty"));
            }
            let _writer = state.update_lock.lock().await;
            let report = state
                .engine
                .synchronize(&p.organization, None, &state.shutdown)
                .await?;
            Ok(serde_json::to_value(report).map_err(AppError::from)?)
        }
        "userinformation" => {
            let p: UserInformationParams =
                decode_params(params, &["org", "user", "year", "month"])?;
            let result =
                user_info::user_information(&state.store, &p.org, &p.user, p.year, p.month).await?;
            Ok(serde_json::to_value(result).map_err(AppError::from)?)
        }
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("unknown method '{}'", other),
        )),
    }
}
