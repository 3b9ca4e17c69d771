//! Failure taxonomy shared by the controller and its collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidCase,
    Network,
    Auth,
    Server,
    Timeout,
    Unknown,
    /// The backend answered but a required field was missing.
    MalformedResponse,
}

impl ErrorKind {
    /// Kinds whose retries wait for a backoff delay first.
    pub fn is_network_class(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidCase => "invalid-case",
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
            ErrorKind::MalformedResponse => "malformed-response",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    Retry,
    Redirect,
    Reauthenticate,
    None,
}

/// A failure as it was observed, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFailure {
    pub message: String,
    /// HTTP-like status code when the failure carried one.
    pub status: Option<u16>,
}

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A classified failure, ready to be shown and acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub recommended_action: RecommendedAction,
    pub redirect_target: Option<String>,
    /// User-facing explanation.
    pub message: String,
    /// The raw failure text this error was built from.
    pub detail: String,
}

impl SimulationError {
    /// A backend response lacking a required field. Never retryable; the
    /// detail is reported as-is.
    pub fn malformed(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            kind: ErrorKind::MalformedResponse,
            retryable: false,
            recommended_action: RecommendedAction::None,
            redirect_target: None,
            message: detail.clone(),
            detail,
        }
    }

    pub fn needs_navigation(&self) -> bool {
        matches!(
            self.recommended_action,
            RecommendedAction::Redirect | RecommendedAction::Reauthenticate
        ) && self.redirect_target.is_some()
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for SimulationError {}
