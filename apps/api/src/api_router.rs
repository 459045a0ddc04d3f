use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/request",
            post(handlers::access_requests::create_request_handler),
        )
        .route(
            "/status/{request_id}",
            get(handlers::access_requests::request_status_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/telegram/webhook",
            post(handlers::telegram_webhook::telegram_webhook_handler),
        )
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
