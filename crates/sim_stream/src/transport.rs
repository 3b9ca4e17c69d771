use async_trait::async_trait;

use crate::error::TransportError;
use crate::handle::StreamHandle;

/// Parameters of one streamed question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub session_id: Option<String>,
    pub question: String,
    /// Auth credential forwarded to the streaming endpoint.
    pub token: Option<String>,
}

impl StreamRequest {
    pub fn new(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            question: question.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// The session id, or [`TransportError::NoActiveSession`] when absent.
    pub fn require_session(&self) -> Result<&str, TransportError> {
        self.session_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(TransportError::NoActiveSession)
    }
}

/// A push channel that can stream one reply per call to [`open`](Self::open).
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Establish the channel. Fails when the request has no session.
    async fn open(&self, request: StreamRequest) -> Result<StreamHandle, TransportError>;
}
