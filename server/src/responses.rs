use axum::{
    Json,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Header the hosting gateway routes function calls with. Forwarded as is.
pub(crate) const ROUTING_HEADER: &str = "apikey";

pub(crate) const CORS_HEADERS: [(HeaderName, &str); 2] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "authorization, x-client-info, apikey, content-type",
    ),
];

/// Backend function error, rendered as `{"message": ...}`.
pub(crate) struct Error {
    status_code: StatusCode,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.status_code,
            CORS_HEADERS,
            Json(json!({
                "message": self.message,
            })),
        )
            .into_response()
    }
}

impl Error {
    pub(crate) fn new(status_code: StatusCode, message: String) -> Self {
        Self {
            status_code,
            message,
        }
    }
}

/// Proxy error, rendered as `{"error": ...}`.
pub(crate) struct ProxyFailure {
    status_code: StatusCode,
    error: String,
}

impl ProxyFailure {
    pub(crate) fn new(status_code: StatusCode, error: String) -> Self {
        Self { status_code, error }
    }
}

impl IntoResponse for ProxyFailure {
    fn into_response(self) -> Response {
        (
            self.status_code,
            CORS_HEADERS,
            Json(blocks::ProxyError { error: self.error }),
        )
            .into_response()
    }
}

/// Empty answer to a CORS preflight.
pub(crate) async fn preflight() -> Response {
    (StatusCode::OK, CORS_HEADERS).into_response()
}
