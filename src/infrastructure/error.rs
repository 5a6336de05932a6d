use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl InfraError {
    /// Failures worth another attempt: connectivity problems, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            InfraError::Network(_) => true,
            InfraError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(context: &str, error: reqwest::Error) -> Self {
        InfraError::Network(format!("{context}: {error}"))
    }

    pub(crate) fn http_status(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            context.to_string()
        } else {
            format!("{context}; body={body}")
        };
        InfraError::HttpStatus {
            status: status.as_u16(),
            message,
        }
    }
}
