use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

/// Builds the HTTP router.
///
/// Layers, innermost first: request body decoding, response compression,
/// signature checking and signing, request logging.
pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::list_metrics))
        .route("/ping", get(api::ping))
        .route("/update/", post(api::update_from_json))
        .route("/updates/", post(api::update_batch))
        .route("/update/{kind}/{name}/{value}", post(api::update_from_path))
        .route("/value/", post(api::value_from_json))
        .route("/value/{kind}/{name}", get(api::value_from_path))
        .route("/key/", post(api::receive_key))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::decode_body,
        ))
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::verify_and_sign,
        ))
        .layer(axum::middleware::from_fn(logging::request_logging))
        .with_state(state)
}
