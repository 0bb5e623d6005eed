//! Request and response payloads of the control plane that are not sandbox models.

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Query string of `GET /list`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// A JSON-encoded sandbox request whose non-zero fields act as filters.
    pub opts: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A human-readable description of the failure.
    pub error: String,
}

/// A plain status message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// The message.
    pub message: String,
}

/// The empty object returned by operations without a result.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}
