//! Unified error kinds for all relay operations (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Pre-init lookup: the relay has not yet received its initial
    /// configuration snapshot.
    #[error("relay not yet fully configured")]
    NotReady,

    /// Credential does not match any known environment.
    #[error("unrecognized environment credential")]
    UnrecognizedEnvironment,

    /// Credential matches an environment but the payload filter is unknown.
    #[error("payload filter not found")]
    PayloadFilterNotFound,

    /// Startup with no environments configured from any source.
    #[error("no environments configured")]
    NoEnvironmentsConfigured,

    /// `wait_for_all_clients` expired before every initial environment
    /// reported success or failure.
    #[error("initialization timed out waiting for all clients")]
    InitializationTimeout,

    /// At least one initial environment failed to connect.
    #[error("one or more environments failed to initialize")]
    SomeEnvironmentFailed,

    /// A mutation was attempted after `close()`.
    #[error("relay already closed")]
    AlreadyClosed,

    /// Context/user JSON failed to decode.
    #[error("malformed context: {0}")]
    MalformedContext(String),

    /// REPORT request without `application/json`.
    #[error("unsupported media type")]
    UnsupportedMediaType,

    /// JS eval secure-mode `h=` hash mismatch or absence.
    #[error("secure mode hash mismatch")]
    SecureModeHashMismatch,

    /// Requested flag/segment key does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Flag/segment store read failure.
    #[error("store error: {0}")]
    Store(String),

    /// Caught at middleware; recovered rather than propagated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnrecognizedEnvironment => StatusCode::UNAUTHORIZED,
            Self::PayloadFilterNotFound => StatusCode::NOT_FOUND,
            Self::NoEnvironmentsConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InitializationTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SomeEnvironmentFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AlreadyClosed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedContext(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::SecureModeHashMismatch => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render `UnrecognizedEnvironment` as 404 instead of 401 when the
    /// credential came from a URL path segment (env ID) rather than a
    /// header-borne key — per spec §6, key-bearing requests get 401, env-ID
    /// requests get 404.
    pub fn status_code_for_env_id_lookup(&self) -> StatusCode {
        match self {
            Self::UnrecognizedEnvironment => StatusCode::NOT_FOUND,
            other => other.status_code(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // §6: 401 bodies are empty for unrecognized credentials.
        if matches!(self, Self::UnrecognizedEnvironment) {
            return (status, ()).into_response();
        }
        let body = json!({ "message": self.to_string() });
        (
            status,
            [("content-type", "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
