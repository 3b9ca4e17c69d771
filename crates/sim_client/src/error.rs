use sim_core::RawFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing credential: no auth token available")]
    MissingCredential,
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    /// The backend answered, but not with the shape we expect.
    pub fn is_malformed(&self) -> bool {
        matches!(self, BackendError::Json(_))
    }

    /// The observable failure handed to the classifier.
    pub fn raw_failure(&self) -> RawFailure {
        match self {
            // reqwest's own text says "error sending request", which would
            // read as a network failure.
            BackendError::Http(e) if e.is_timeout() => RawFailure::new("request timed out"),
            BackendError::Http(e) if e.is_connect() => {
                RawFailure::new(format!("network connection failed: {e}"))
            }
            BackendError::Http(e) => match e.status() {
                Some(status) => RawFailure::with_status(e.to_string(), status.as_u16()),
                None => RawFailure::new(format!("network request failed: {e}")),
            },
            BackendError::Status { status, .. } => {
                RawFailure::with_status(self.to_string(), *status)
            }
            other => RawFailure::new(other.to_string()),
        }
    }
}
