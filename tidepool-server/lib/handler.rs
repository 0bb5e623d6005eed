//! Request handlers of the control plane.
//!
//! Every handler is a thin adapter: it decodes the request, calls the lifecycle controller and
//! encodes the result. Failures are turned into `{"error": ...}` bodies by [`ServerError`].

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tidepool_core::models::{SandboxInfo, SandboxRequest};

use crate::{
    payload::{EmptyResponse, ListQuery, MessageResponse},
    state::AppState,
    ServerError, ServerResult,
};

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for health check
pub async fn health() -> ServerResult<impl IntoResponse> {
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Service is healthy".to_string(),
        }),
    ))
}

/// Creates a sandbox.
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<SandboxRequest>, JsonRejection>,
) -> ServerResult<Json<SandboxInfo>> {
    let Json(request) = payload?;
    let info = state.get_lifecycle().create(&request).await?;
    Ok(Json(info))
}

/// Removes a sandbox.
pub async fn remove(
    State(state): State<AppState>,
    payload: Result<Json<SandboxRequest>, JsonRejection>,
) -> ServerResult<Json<EmptyResponse>> {
    let Json(request) = payload?;
    state.get_lifecycle().remove(&request).await?;
    Ok(Json(EmptyResponse {}))
}

/// Lists sandboxes, with the filter JSON-encoded in the `opts` query parameter.
pub async fn list_query(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ServerResult<Json<Vec<SandboxInfo>>> {
    let filter = match query.opts.as_deref().map(str::trim) {
        None | Some("") => SandboxRequest::default(),
        Some(opts) => serde_json::from_str(opts)
            .map_err(|e| ServerError::BadRequest(format!("invalid opts: {}", e)))?,
    };

    let sandboxes = state.get_lifecycle().list(&filter).await?;
    Ok(Json(sandboxes))
}

/// Lists sandboxes, with the filter in the request body.
pub async fn list_body(
    State(state): State<AppState>,
    payload: Result<Json<SandboxRequest>, JsonRejection>,
) -> ServerResult<Json<Vec<SandboxInfo>>> {
    let Json(filter) = payload?;
    let sandboxes = state.get_lifecycle().list(&filter).await?;
    Ok(Json(sandboxes))
}

/// Removes every expired sandbox and returns the ones selected for removal.
///
/// Removals that fail are logged; the sandboxes are still reported as selected and will be
/// retried by the next purge.
pub async fn purge(State(state): State<AppState>) -> ServerResult<Json<Vec<SandboxInfo>>> {
    let report = state.get_lifecycle().purge().await?;

    if let Some(errors) = &report.errors {
        tracing::warn!(
            "{} of {} expired sandboxes could not be purged",
            errors.len(),
            report.selected.len()
        );
        for failure in errors.iter() {
            tracing::warn!("purge: {}", failure);
        }
    }

    Ok(Json(report.selected))
}

/// Fallback for unknown paths.
pub async fn not_found() -> ServerError {
    ServerError::RouteNotFound
}
