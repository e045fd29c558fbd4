use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState, api_port: u16) -> Router {
    Router::new()
        .route("/api/ask", post(handlers::ask_endpoint))
        .route(
            "/api/tickets",
            get(handlers::list_tickets_endpoint).post(handlers::create_ticket_endpoint),
        )
        .route("/api/summary", get(handlers::summary_endpoint))
        .layer(build_localhost_cors(api_port))
        .with_state(state)
}
