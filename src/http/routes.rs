//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.client_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed_origins: Vec<HeaderValue> = state
            .config
            .client_origins
            .iter()
            .filter_map(|s| s.parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new().allow_origin(allowed_origins)
    }
    .allow_methods([Method::GET, Method::OPTIONS])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Arena server running"
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    players_online: usize,
    connections: usize,
    uptime_secs: u64,
    geometry_backend: &'static str,
    timestamp: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health(&state))
}

fn health(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        players_online: state.registry.len(),
        connections: state.hub.len(),
        uptime_secs: uptime_secs(),
        geometry_backend: state.geometry.backend_name(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use uuid::Uuid;

    #[test]
    fn health_reports_players_and_backend() {
        let state = AppState::new(Config::default());
        state.registry.register(Uuid::new_v4());

        let report = health(&state);
        assert_eq!(report.status, "healthy");
        assert_eq!(report.players_online, 1);
        assert_eq!(report.connections, 0);
        assert_eq!(report.geometry_backend, "packed");
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[tokio::test]
    async fn router_builds_with_origin_list() {
        let state = AppState::new(Config {
            client_origins: vec!["http://localhost:3000".to_string()],
            ..Config::default()
        });
        let _router = build_router(state);
        assert_eq!(root_handler().await, "Arena server running");
    }
}
