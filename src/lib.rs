pub mod config;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(routes::websocket::websocket_route))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
