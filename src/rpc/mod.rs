//! JSON-RPC HTTP endpoint.
//!
//! Embeds an axum server exposing `update` and `userinformation` on `POST /`
//! behind HTTP basic auth. TLS is expected to be terminated in front of it.

pub mod auth;
pub mod methods;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::db::RecordStore;
use crate::error::AppError;
use crate::services::sync_engine::SyncEngine;

pub use auth::RpcCredentials;
pub use methods::{RpcError, RpcRequest, RpcResponse};

/// Shared state for the RPC routes.
#[derive(Clone)]
pub struct RpcState {
    pub store: RecordStore,
    pub engine: Arc<SyncEngine>,

    /// Serializes `update` calls; the sync engine is the only writer.
    pub update_lock: Arc<Mutex<()>>,

    /// Cancelled on shutdown; running syncs stop at the next repository.
    pub shutdown: CancellationToken,
}

impl RpcState {
    pub fn new(engine: Arc<SyncEngine>, shutdown: CancellationToken) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
            update_lock: Arc::new(Mutex::new(())),
            shutdown,
        }
    }
}

/// Build the RPC router.
pub fn router(state: RpcState, credentials: RpcCredentials) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::basic_auth,
        ))
}

/// POST / — one JSON-RPC request per body.
async fn handle_rpc(State(state): State<RpcState>, body: String) -> Response {
    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError::new(methods::PARSE_ERROR, format!("parse error: {}", e)),
            ))
            .into_response();
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Json(RpcResponse::failure(
                id,
                RpcError::new(methods::INVALID_REQUEST, format!("invalid request: {}", e)),
            ))
            .into_response();
        }
    };

    Json(methods::dispatch(&state, request).await).into_response()
}

/// Serve the RPC endpoint on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: RpcState,
    credentials: RpcCredentials,
) -> Result<(), AppError> {
    let shutdown = state.shutdown.clone();
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    let app = router(state, credentials);

    if let Some(addr) = addr {
        log::info!("[rpc] Server listening on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .map_err(|e| AppError::internal(format!("RPC server error: {}", e)))?;

    log::info!("[rpc] Server stopped");
    Ok(())
}
