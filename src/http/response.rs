//! Mapping routing failures to client responses.
//!
//! Successful responses are relayed as the backend sent them (minus
//! hop-by-hop headers); this module only covers the error side.

use axum::response::{IntoResponse, Response};

use crate::proxy::{ForwardError, RouteError};

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let body = match &self {
            RouteError::AccessDenied(_) => "Access Denied",
            RouteError::QueueFull | RouteError::Unavailable => "Service unavailable",
            RouteError::Upstream(ForwardError::Build(_)) => "Failed to create request",
            RouteError::Upstream(_) => "Server error",
        };
        (self.status(), body).into_response()
    }
}
