//! HTTP server: push endpoint and sync triggers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhook` | Bot API push delivery; always answers `200 OK` |
//! | `POST` | `/sync` | Run one pull pass (`{"from_beginning": true}` optional) |
//! | `GET`  | `/inspect` | Per-chat counts of the pending inbox |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Errors from `/sync` and `/inspect` use one JSON shape:
//!
//! ```json
//! { "error": { "code": "sync_in_progress", "message": "a sync pass is already running" } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `config_missing` (400),
//! `sync_in_progress` (409), `remote_unavailable` (502), anything else (500).
//!
//! `/webhook` acknowledges every delivery it accepts, including ones it
//! cannot parse, so the remote never redelivers. Imports happen afterwards
//! on the push worker. When a webhook secret is configured, deliveries
//! without the matching `X-Telegram-Bot-Api-Secret-Token` header get `401`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::inbox_telegram::TgUpdate;
use crate::models::{InboxReport, RawInboxMessage, SyncReport};
use crate::progress::NoProgress;
use crate::push::{spawn_worker, PushHandle};
use crate::sync::{SyncEngine, SyncOptions};

/// Header the Bot API uses to echo the webhook secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct AppState {
    engine: Arc<SyncEngine>,
    push: PushHandle,
    webhook_secret: Option<Arc<str>>,
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(SyncEngine::from_config(config).await?);
    let (push, _worker) = spawn_worker(engine.clone());
    let app = router(engine, push, config.server.webhook_secret.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router around an engine and its push queue.
pub fn router(engine: Arc<SyncEngine>, push: PushHandle, webhook_secret: Option<String>) -> Router {
    let state = AppState {
        engine,
        push,
        webhook_secret: webhook_secret.filter(|s| !s.is_empty()).map(Arc::from),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/sync", post(handle_sync))
        .route("/inspect", get(handle_inspect))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: "webhook secret mismatch".to_string(),
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::ConfigMissing(_) => StatusCode::BAD_REQUEST,
            SyncError::SyncInProgress => StatusCode::CONFLICT,
            SyncError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /webhook ============

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, AppError> {
    if let Some(secret) = &state.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_ref()) {
            warn!("webhook delivery rejected: secret mismatch");
            return Err(unauthorized());
        }
    }

    match serde_json::from_slice::<TgUpdate>(&body) {
        Ok(update) => {
            state.push.submit(RawInboxMessage::from(update));
        }
        Err(e) => warn!(error = %e, "unparseable webhook delivery acknowledged"),
    }
    Ok("OK")
}

// ============ POST /sync ============

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    from_beginning: bool,
}

async fn handle_sync(State(state): State<AppState>, body: Bytes) -> Result<Json<SyncReport>, AppError> {
    let req: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };

    let report = state
        .engine
        .run_sync(
            SyncOptions {
                from_beginning: req.from_beginning,
            },
            &NoProgress,
        )
        .await?;
    Ok(Json(report))
}

// ============ GET /inspect ============

async fn handle_inspect(State(state): State<AppState>) -> Result<Json<InboxReport>, AppError> {
    Ok(Json(state.engine.inspect_inbox().await?))
}
