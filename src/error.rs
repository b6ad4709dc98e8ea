//! Error types and the request error boundary.
//!
//! Two families live here. [`Error`] surfaces process-level failures: binding
//! the listener, building HTTP clients, rejecting configuration. [`ApiError`]
//! is what middleware and handlers return when a request cannot proceed; it
//! only ever reaches the client through [`boundary`], which picks the status
//! code and a body that does not leak internals.

use std::net::SocketAddr;

use http::StatusCode;
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::{error, warn};

use crate::response::Response;

/// Body message for requests that matched no route.
pub const NOT_FOUND_MESSAGE: &str = "endpoint called does not exist";

/// Startup and infrastructure failures.
///
/// These are fatal to the component that hit them. The front door logs them
/// and returns; restarting the process is the supervisor's job.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(String),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("token signing: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// Per-request failures.
///
/// Every variant carries a message that is safe to show the client and,
/// where useful, an `origin` naming the check that failed. The origin is
/// logged, never serialised.
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// No credential, or the credential failed signature verification.
    #[error("{message}")]
    Unauthenticated { message: String, origin: &'static str },

    /// The request is well-formed but a precondition is unmet, for example a
    /// protected route reached without an attached identity.
    #[error("{message}")]
    BadRequest { message: String, origin: &'static str },

    /// A verified identity that is not allowed to do this.
    #[error("{message}")]
    AccessDenied { message: String, origin: &'static str },

    /// Nothing in the route table matched. `url` is fully qualified.
    #[error("{url} endpoint does not exist")]
    RouteNotFound { url: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Anything else. `detail` is logged, the client sees a generic message.
    #[error("{origin}: {detail}")]
    Internal { detail: String, origin: &'static str },
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>, origin: &'static str) -> Self {
        Self::Unauthenticated { message: message.into(), origin }
    }

    pub fn bad_request(message: impl Into<String>, origin: &'static str) -> Self {
        Self::BadRequest { message: message.into(), origin }
    }

    pub fn access_denied(message: impl Into<String>, origin: &'static str) -> Self {
        Self::AccessDenied { message: message.into(), origin }
    }

    pub fn internal(detail: impl Into<String>, origin: &'static str) -> Self {
        Self::Internal { detail: detail.into(), origin }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message the client is allowed to see.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated { message, .. }
            | Self::BadRequest { message, .. }
            | Self::AccessDenied { message, .. } => message.clone(),
            Self::RouteNotFound { .. } => NOT_FOUND_MESSAGE.to_owned(),
            Self::PayloadTooLarge { .. } => "request entity too large".to_owned(),
            Self::Internal { .. } => "internal server error".to_owned(),
        }
    }

    fn origin(&self) -> &'static str {
        match self {
            Self::Unauthenticated { origin, .. }
            | Self::BadRequest { origin, .. }
            | Self::AccessDenied { origin, .. }
            | Self::Internal { origin, .. } => origin,
            Self::RouteNotFound { .. } => "fallback",
            Self::PayloadTooLarge { .. } => "body",
        }
    }
}

/// Renders an [`ApiError`] into the response the client receives.
///
/// This is the only place an `ApiError` turns into bytes on the wire. Every
/// middleware result and every handler `Err` is funnelled through here.
pub fn boundary(err: ApiError) -> Response {
    let status = err.status();

    let body = match &err {
        ApiError::RouteNotFound { url } => {
            error!("{url} endpoint does not exist");
            json!({ "message": NOT_FOUND_MESSAGE })
        }
        other => {
            if status.is_server_error() {
                error!(status = status.as_u16(), origin = other.origin(), "{other}");
            } else {
                warn!(status = status.as_u16(), origin = other.origin(), "{other}");
            }
            json!({
                "message": other.public_message(),
                "statusCode": status.as_u16(),
                "status": "error",
            })
        }
    };

    Response::builder().status(status).json_value(&body)
}
