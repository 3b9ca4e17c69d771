use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::backend::{EndSessionResponse, SimulationBackend, StartSessionResponse};
use crate::credentials::CredentialStore;
use crate::error::{BackendError, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`SimulationBackend`] over HTTP with bearer auth.
///
/// Requests are sent once with no retry middleware; failures are returned to
/// the caller unchanged. Each request, body included, is bounded by the
/// request timeout.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self
            .credentials
            .token()
            .ok_or(BackendError::MissingCredential)?;

        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl SimulationBackend for HttpBackend {
    async fn start_session(&self, case_id: &str) -> Result<StartSessionResponse> {
        self.post("/simulation/start", &json!({ "caseId": case_id }))
            .await
    }

    async fn end_session(&self, session_id: &str) -> Result<EndSessionResponse> {
        self.post("/simulation/end", &json!({ "sessionId": session_id }))
            .await
    }
}
