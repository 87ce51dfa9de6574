pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let records = get(get_records)
        .post(upsert_record)
        .patch(patch_record)
        .delete(delete_record)
        .fallback(method_not_allowed);

    Router::new()
        .route("/", get(health).fallback(method_not_allowed))
        .route("/records", records.clone())
        // Path used by existing bot deployments.
        .route("/api/whitelist", records)
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
