use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod notify;
pub mod routes;
pub mod verify;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: db::DbPool,
    pub cfg: Arc<Config>,
    pub decider: verify::Decider,
    pub extractor: Arc<dyn extract::ReceiptExtractor>,
    pub notifier: notify::Notifier,
    pub http: reqwest::Client,
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// Guard /api/admin routes with the configured bearer token. Identity
/// provisioning itself lives outside this service.
async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/api/admin/") {
        return next.run(req).await;
    }

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == state.cfg.admin_token)
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Public submission + transparency surface
        .route("/api/donations", post(routes::donations::submit_donation))
        .route("/api/donations/stats", get(routes::donations::donation_stats))
        .route("/api/donors", get(routes::donations::list_donors))
        .route("/api/receipts/extract", post(routes::receipts::extract_preview))
        // Admin surface
        .route("/api/admin/donations", get(routes::donations::list_donations))
        .route(
            "/api/admin/donations/{id}/status",
            put(routes::donations::update_status),
        )
        .route(
            "/api/admin/donations/{id}/extract",
            post(routes::receipts::reextract_receipt),
        )
        .route(
            "/api/admin/reports/donations.csv",
            get(routes::reports::export_donations_csv),
        )
        .route(
            "/api/admin/reports/audit.csv",
            get(routes::reports::export_audit_csv),
        )
        .layer(from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}
