use std::time::Duration;

use sim_core::RawFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No active session to stream from")]
    NoActiveSession,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream connection lost: {0}")]
    Stream(String),

    #[error("Stream timed out after {}s without events", .0.as_secs())]
    Timeout(Duration),

    #[error("Stream closed unexpectedly before completion")]
    ClosedUnexpectedly,
}

impl TransportError {
    /// The observable failure handed to the classifier.
    pub fn raw_failure(&self) -> RawFailure {
        match self {
            // reqwest's own text says "error sending request", which would
            // read as a network failure.
            TransportError::Http(e) if e.is_timeout() => RawFailure::new("request timed out"),
            TransportError::Http(e) if e.is_connect() => {
                RawFailure::new(format!("network connection failed: {e}"))
            }
            TransportError::Http(e) => match e.status() {
                Some(status) => RawFailure::with_status(e.to_string(), status.as_u16()),
                None => RawFailure::new(format!("network request failed: {e}")),
            },
            TransportError::Status { status, .. } => {
                RawFailure::with_status(self.to_string(), *status)
            }
            other => RawFailure::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_keep_their_code() {
        let raw = TransportError::Status {
            status: 401,
            body: "token expired".to_string(),
        }
        .raw_failure();

        assert_eq!(raw.status, Some(401));
        assert_eq!(raw.message, "HTTP 401: token expired");
    }

    #[test]
    fn watchdog_timeout_mentions_timeout() {
        let raw = TransportError::Timeout(Duration::from_secs(60)).raw_failure();
        assert_eq!(raw.message, "Stream timed out after 60s without events");
    }
}
