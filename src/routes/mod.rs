pub mod api;
pub mod auth_middleware;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::websocket::websocket_handler;
use crate::AppState;

/// Path of the realtime websocket endpoint
pub const REALTIME_PATH: &str = "/realtime/v1/websocket";

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origin_list()
        .into_iter()
        .filter_map(|o| match HeaderValue::from_str(&o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    }
}

/// Build the full application router
pub fn create_app(state: Arc<AppState>) -> Router {
    let api_routes = api::create_api_routes(state.clone());

    Router::new()
        .nest("/api", api_routes)
        .route(REALTIME_PATH, get(websocket_handler))
        .with_state(state.clone())
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state)),
        )
}
