//! Public HTTP surface: router wiring plus the landing, health, stats, and
//! not-found handlers

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{adapter, session, AppState};

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>LocalHosted</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 4rem auto; padding: 0 1rem; color: #222; }
    code { background: #f2f2f2; padding: 0.15rem 0.35rem; border-radius: 3px; }
  </style>
</head>
<body>
  <h1>LocalHosted</h1>
  <p>Expose a local HTTP server through this relay.</p>
  <p>Connect the forwarder agent, then reach your tunnel at
     <code>https://&lt;subdomain&gt;.&lt;domain&gt;</code> or
     <code>/t/&lt;subdomain&gt;/...</code>.</p>
  <p>See <code>/health</code> and <code>/stats</code> for relay status.</p>
</body>
</html>
"#;

/// Assemble the application router. The host-based middleware runs ahead of
/// every fixed route, so tunnel traffic on `*.{domain}` never reaches them.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/tunnel", get(session::tunnel_upgrade))
        .route("/t", any(adapter::missing_subdomain))
        .route("/t/", any(adapter::missing_subdomain))
        .route("/t/{subdomain}", any(adapter::path_tunnel_root))
        .route("/t/{subdomain}/{*rest}", any(adapter::path_tunnel))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            adapter::host_router,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs(),
        "domain": state.config.domain,
        "env": state.config.env,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tunnels = state.registry.stats().await;
    Json(json!({
        "activeTunnels": tunnels.len(),
        "tunnels": tunnels,
        "domain": state.config.domain,
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("No route for {}", uri.path()),
            "domain": state.config.domain,
        })),
    )
        .into_response()
}
