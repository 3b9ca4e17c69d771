//! Server-Sent Events implementation of [`StreamTransport`].

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};

use crate::error::TransportError;
use crate::event::parse_frame;
use crate::handle::{StreamHandle, StreamSender, DEFAULT_SILENCE_TIMEOUT};
use crate::transport::{StreamRequest, StreamTransport};

pub struct SseTransport {
    client: Client,
    base_url: String,
    silence_timeout: Duration,
}

impl SseTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    fn stream_url(&self) -> String {
        format!("{}/simulation/stream", self.base_url)
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    async fn open(&self, request: StreamRequest) -> Result<StreamHandle, TransportError> {
        let session_id = request.require_session()?.to_string();

        let mut query = vec![
            ("session_id", session_id.clone()),
            ("question", request.question.clone()),
        ];
        if let Some(token) = &request.token {
            query.push(("token", token.clone()));
        }

        log::debug!("[{}] Opening SSE stream", session_id);
        // The watchdog only starts once a handle exists, so the wait for
        // response headers gets the same limit.
        let send = self
            .client
            .get(self.stream_url())
            .header(ACCEPT, "text/event-stream")
            .query(&query)
            .send();
        let response = match tokio::time::timeout(self.silence_timeout, send).await {
            Ok(response) => response?,
            Err(_elapsed) => {
                log::warn!(
                    "[{}] No response headers within {:?}",
                    session_id,
                    self.silence_timeout
                );
                return Err(TransportError::Timeout(self.silence_timeout));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let (sender, handle) = StreamHandle::channel(self.silence_timeout);
        tokio::spawn(pump_events(response, sender, session_id));
        Ok(handle)
    }
}

/// Forward SSE frames to the handle until a terminal frame, a transport
/// failure, or cancellation.
async fn pump_events(response: Response, sender: StreamSender, session_id: String) {
    let mut events = response.bytes_stream().eventsource();

    loop {
        let next = tokio::select! {
            _ = sender.cancelled() => {
                log::debug!("[{}] SSE stream cancelled", session_id);
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => match parse_frame(&event.event, &event.data) {
                Ok(Some(stream_event)) => {
                    let terminal = stream_event.is_terminal();
                    if !sender.send(stream_event).await || terminal {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("[{}] Skipping malformed frame: {}", session_id, e);
                }
            },
            Some(Err(e)) => {
                sender.fail(TransportError::Stream(e.to_string())).await;
                return;
            }
            None => {
                sender.fail(TransportError::ClosedUnexpectedly).await;
                return;
            }
        }
    }
}
