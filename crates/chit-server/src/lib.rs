//! Chit Web Server
//!
//! Axum-based REST API for the Chit receipt matching engine.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Full audit logging for all state-changing API access
//! - Sanitized error responses
//!
//! Every request is scoped to an owner via the `x-chit-owner` header; all
//! state-mutating operations for one owner are serialized through the shared
//! lock registry in [`AppState`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use chit_core::db::Database;
use chit_core::{MatchingConfig, OwnerLocks};

mod handlers;
mod scheduler;

pub use scheduler::{start_automatch_scheduler, AutoMatchScheduleConfig};

/// Header carrying the owner scope for a request
pub const OWNER_HEADER: &str = "x-chit-owner";

/// Owner used when the header is absent (single-user/local deployments)
pub const DEFAULT_OWNER: &str = "local";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for service authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Matching calibration shared by scoring, selection, and the finder
    pub matching: MatchingConfig,
    /// Per-owner write serialization for lifecycle and auto-match calls
    pub locks: OwnerLocks,
}

/// Authentication middleware - validates API keys
///
/// API keys are compared using constant-time comparison to prevent timing
/// attacks. With `require_auth` disabled (local development) every request
/// passes through.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured set using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    valid_keys.iter().any(|valid| {
        provided.len() == valid.len()
            && provided.as_bytes().ct_eq(valid.as_bytes()).into()
    })
}

/// Extract the owner scope from request headers
pub fn get_owner(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_OWNER)
        .to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, matching: MatchingConfig, config: ServerConfig) -> Router {
    create_router_with_locks(db, matching, config, OwnerLocks::new())
}

/// Create the application router over a shared lock registry (used by
/// `serve` so the background scheduler and the API serialize on the same
/// per-owner locks)
pub fn create_router_with_locks(
    db: Database,
    matching: MatchingConfig,
    config: ServerConfig,
    locks: OwnerLocks,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        matching,
        locks,
    });

    let api_routes = Router::new()
        // Receipts (ingress from the upload/OCR pipeline + review reads)
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::create_receipt),
        )
        .route("/receipts/:id", get(handlers::get_receipt))
        .route("/receipts/:id/candidates", get(handlers::get_candidates))
        // Transactions (ingress from the statement-import pipeline)
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route(
            "/transactions/groups",
            get(handlers::list_groups).post(handlers::create_group),
        )
        .route(
            "/transactions/groups/:id",
            get(handlers::get_group).delete(handlers::delete_group),
        )
        // Matching
        .route("/matches", get(handlers::list_matches))
        .route("/matches/auto", post(handlers::trigger_auto_match))
        .route("/matches/manual", post(handlers::create_manual_match))
        .route("/matches/approve", post(handlers::batch_approve))
        .route("/matches/runs", get(handlers::list_match_runs))
        .route("/matches/:id/confirm", post(handlers::confirm_match))
        .route("/matches/:id/reject", post(handlers::reject_match));

    // CORS: same-origin only unless origins are explicitly allowed
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(
    db: Database,
    matching: MatchingConfig,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let locks = OwnerLocks::new();

    // Optional scheduled auto-match sweeps across all owners, sharing the
    // API's per-owner locks
    if let Some(schedule) = AutoMatchScheduleConfig::from_env() {
        start_automatch_scheduler(db.clone(), matching.clone(), locks.clone(), schedule);
    }

    let app = create_router_with_locks(db, matching, config, locks);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Chit server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// API error with a sanitized client message
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<chit_core::Error> for AppError {
    fn from(err: chit_core::Error) -> Self {
        use chit_core::Error;

        let status = match &err {
            Error::Validation(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            Self {
                status,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(err.into()),
            }
        } else {
            Self {
                status,
                message: err.to_string(),
                internal: None,
            }
        }
    }
}
