mod health;
mod queue;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_path);

    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(crate::gateway::ws_upgrade))
        .nest("/api/v1", api_routes())
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/queue", get(queue::get_queue))
        .route("/version", get(health::version))
}
