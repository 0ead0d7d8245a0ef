//! Response envelope and error mapping for the HTTP API.
//!
//! Every body is a JSON object carrying `success` and `message`. Errors are
//! mapped by [`ErrorKind`]; internal faults are logged and reported without
//! detail.

use crate::errors::{Error, ErrorKind};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::multipart::MultipartError,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, warn};

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A domain error from the core layer
    Domain(Error),
    /// The admin identity header was missing
    Unauthorized,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Domain(Error::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Domain(Error::validation(rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Domain(Error::validation(format!("Invalid form data: {}", err.body_text())))
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyRegistered | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Unauthorized => {
                return failure(StatusCode::UNAUTHORIZED, "Admin authentication required");
            }
            Self::Domain(err) => err,
        };

        let status = status_for(err.kind());
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", err);
            return failure(status, "Internal server error");
        }
        warn!(%status, "Request rejected: {}", err);

        let mut response = failure(status, &err.to_string());
        if let Error::RateLimited { retry_after_secs } = err {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Handler result type.
pub type ApiResult = Result<Response, ApiError>;

/// Builds a success envelope: `{ success: true, message, ...fields }`.
///
/// `fields` is serialized and merged in when it is an object; any other value
/// lands under `data`.
pub fn success<T: Serialize>(message: impl Into<String>, fields: T) -> ApiResult {
    respond(StatusCode::OK, message, fields)
}

/// Same as [`success`] with `201 Created`.
pub fn created<T: Serialize>(message: impl Into<String>, fields: T) -> ApiResult {
    respond(StatusCode::CREATED, message, fields)
}

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, fields: T) -> ApiResult {
    let value = serde_json::to_value(fields).map_err(|e| {
        ApiError::Domain(Error::Storage {
            message: format!("Failed to encode response: {e}"),
        })
    })?;

    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert("message".into(), Value::String(message.into()));
    match value {
        Value::Object(fields) => body.extend(fields),
        Value::Null => {}
        other => {
            body.insert("data".into(), other);
        }
    }
    Ok((status, Json(Value::Object(body))).into_response())
}
