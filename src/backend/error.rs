use thiserror::Error;

use crate::util::UrlValidationError;

/// Failures talking to the hosted backend (data store, storage or auth).
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection, TLS or body read failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx response; `message` is the server's explanation when it sent one.
    #[error("HTTP error: status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Insecure project URL: HTTPS required (except localhost for testing)")]
    InsecureUrl,
}

impl From<UrlValidationError> for BackendError {
    fn from(e: UrlValidationError) -> Self {
        match e {
            UrlValidationError::InvalidUrl(e) => BackendError::InvalidUrl(e),
            UrlValidationError::UnsupportedScheme(_) | UrlValidationError::Insecure => {
                BackendError::InsecureUrl
            }
        }
    }
}

impl BackendError {
    /// True for 401/403: the session is missing, expired or not allowed to do this.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, BackendError::HttpStatus { status: 401 | 403, .. })
    }

    /// True for any 4xx: retrying the same request will not help.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BackendError::HttpStatus { status: 400..=499, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::HttpStatus { status: 404, .. })
    }
}
