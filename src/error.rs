//! Error handling and JSON error responses for the edge service

use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Error codes surfaced by request handlers
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeErrorCode {
    /// Missing or invalid access token, or no credentials configured.
    /// Deliberately indistinguishable from an unknown path.
    NotFound,
    /// Store operation attempted without a configured store
    StoreUnbound,
    /// Uncaught handler fault
    InternalError,
}

impl EdgeErrorCode {
    /// Get the default HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            EdgeErrorCode::NotFound => StatusCode::NOT_FOUND,
            EdgeErrorCode::StoreUnbound => StatusCode::BAD_REQUEST,
            EdgeErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code as a string for the X-Subgate-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            EdgeErrorCode::NotFound => "NOT_FOUND",
            EdgeErrorCode::StoreUnbound => "STORE_UNBOUND",
            EdgeErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// The error code
    pub code: EdgeErrorCode,
    /// Human-readable error message
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: EdgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code.as_header_value(),
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// The response body type used by every handler
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Create a JSON error response with X-Subgate-Error header
pub fn json_error_response(
    code: EdgeErrorCode,
    message: impl Into<String>,
) -> Response<ResponseBody> {
    let error = ErrorResponse::new(code, message);
    let status = code.status_code();
    let body = error.to_json();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Subgate-Error", code.as_header_value())
        .body(full_body(body))
        .expect("valid response with StatusCode enum and static headers")
}

/// Build a boxed body from owned bytes or a string
pub fn full_body(content: impl Into<Bytes>) -> ResponseBody {
    Full::new(content.into()).map_err(|never| match never {}).boxed()
}

/// Build a plain-text response with the given status
pub fn text_response(status: StatusCode, content: impl Into<Bytes>) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(full_body(content))
        .expect("valid response builder")
}

/// Build an HTML response with status 200
pub fn html_response(content: impl Into<Bytes>) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(full_body(content))
        .expect("valid response builder")
}
