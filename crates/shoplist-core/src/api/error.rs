use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How a failed remote call should be treated by the write path and the flush loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unreachable or timed out: queue and retry later.
    Network,
    /// The target no longer exists upstream: drop the write.
    NotFound,
    /// Anything else: surface to the user, do not retry automatically.
    Other,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(truncated),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 | 410 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Unreachable(_) => ErrorClass::Network,
            ApiError::NetworkError(e) => reqwest_class(e),
            ApiError::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::Other,
        }
    }
}

fn reqwest_class(e: &reqwest::Error) -> ErrorClass {
    if let Some(status) = e.status() {
        return ApiError::from_status(status, "").class();
    }
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ErrorClass::Network
    } else {
        ErrorClass::Other
    }
}

/// Classify an error returned by a `RemoteListApi` call.
///
/// Looks through the whole context chain, so errors wrapped with
/// `.context(..)` still classify by their root cause.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return api.class();
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return reqwest_class(e);
        }
    }
    ErrorClass::Other
}
