use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Service-side failure: a remote read/write/upload that did not go through.
/// The cause is logged at the failure site; callers only see a short marker.
#[derive(Debug)]
pub struct AppError(pub &'static str);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AppError {
    fn description(&self) -> &str {
        self.0
    }
}

/// Bad input from the caller, surfaced inline before any network call is made.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// What a handler can fail with.  Validation failures carry their message to
/// the caller; service failures degrade to a generic message, never a panic.
#[derive(Debug)]
pub enum HandlerError {
    Validation(ValidationError),
    Service(AppError),
    Unauthorized,
}

impl From<ValidationError> for HandlerError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<AppError> for HandlerError {
    fn from(e: AppError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong. Please try again later.".to_string(),
        )
            .into_response()
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => e.into_response(),
            Self::Service(e) => e.into_response(),
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string()).into_response()
            }
        }
    }
}
