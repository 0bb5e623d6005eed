//! Router configuration for the control plane.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::{handler, middleware as app_middleware, state::AppState};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Create a new router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/create", post(handler::create))
        .route("/remove", post(handler::remove))
        .route("/list", get(handler::list_query).post(handler::list_body))
        .route("/purge", post(handler::purge))
        .route("/health", get(handler::health))
        .fallback(handler::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::logging_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    app_middleware::timeout_middleware,
                )),
        )
        .with_state(state)
}
