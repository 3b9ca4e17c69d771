//! Test doubles for the controller's collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sim_client::{BackendError, EndSessionResponse, SimulationBackend, StartSessionResponse};
use sim_controller::{Navigator, SessionController};
use sim_core::{Config, NavigationIntent};
use sim_stream::{
    StreamEvent, StreamHandle, StreamRequest, StreamSender, StreamTransport, TransportError,
};

pub fn test_config() -> Config {
    Config {
        auth_token: Some("test-token".to_string()),
        phase_delay_ms: 0,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        redirect_delay_secs: 0,
        stream_timeout_secs: 5,
        ..Config::default()
    }
}

pub fn start_response(session_id: &str) -> StartSessionResponse {
    StartSessionResponse {
        session_id: Some(session_id.to_string()),
        patient_label: Some("Mr. Jones".to_string()),
        initial_prompt: Some("Hello doctor, I've had chest pain since this morning.".to_string()),
    }
}

pub enum BackendReply {
    Start(StartSessionResponse),
    Status(u16, &'static str),
    Malformed,
}

impl BackendReply {
    fn into_start(self) -> Result<StartSessionResponse, BackendError> {
        match self {
            BackendReply::Start(response) => Ok(response),
            BackendReply::Status(status, body) => Err(BackendError::Status {
                status,
                body: body.to_string(),
            }),
            BackendReply::Malformed => Err(malformed()),
        }
    }
}

fn malformed() -> BackendError {
    serde_json::from_str::<serde_json::Value>("<html>")
        .unwrap_err()
        .into()
}

/// Backend that counts calls and answers from a script. Once the start
/// script is exhausted, every start succeeds with session `s1`.
#[derive(Default)]
pub struct FakeBackend {
    start_calls: AtomicUsize,
    end_calls: AtomicUsize,
    start_script: Mutex<VecDeque<BackendReply>>,
    end_reply: Mutex<Option<Result<EndSessionResponse, u16>>>,
    start_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_start(&self, reply: BackendReply) {
        self.start_script.lock().unwrap().push_back(reply);
    }

    pub fn set_end(&self, reply: Result<EndSessionResponse, u16>) {
        *self.end_reply.lock().unwrap() = Some(reply);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimulationBackend for FakeBackend {
    async fn start_session(&self, _case_id: &str) -> Result<StartSessionResponse, BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.start_script.lock().unwrap().pop_front();
        match reply {
            Some(reply) => reply.into_start(),
            None => Ok(start_response("s1")),
        }
    }

    async fn end_session(&self, _session_id: &str) -> Result<EndSessionResponse, BackendError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.end_reply.lock().unwrap().clone();
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(BackendError::Status {
                status,
                body: "evaluation service unavailable".to_string(),
            }),
            None => Ok(EndSessionResponse {
                evaluation_text: Some("Thorough history, good rapport.".to_string()),
                structured_metrics: None,
                history: Vec::new(),
            }),
        }
    }
}

/// How the transport answers one `open` call.
pub enum OpenScript {
    /// Deliver these events, then stop.
    Events(Vec<StreamEvent>),
    /// Refuse to open with a connection-level message.
    Refuse(&'static str),
    /// Refuse with an HTTP status.
    Status(u16, &'static str),
    /// Hand the sender to the test via [`ScriptedTransport::take_sender`].
    Manual,
}

/// Transport fed from a script; unscripted opens use `Manual`.
pub struct ScriptedTransport {
    timeout: Duration,
    script: Mutex<VecDeque<OpenScript>>,
    senders: Mutex<VecDeque<StreamSender>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            script: Mutex::new(VecDeque::new()),
            senders: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, open: OpenScript) {
        self.script.lock().unwrap().push_back(open);
    }

    pub fn take_sender(&self) -> StreamSender {
        self.senders
            .lock()
            .unwrap()
            .pop_front()
            .expect("no manual stream was opened")
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, request: StreamRequest) -> Result<StreamHandle, TransportError> {
        request.require_session()?;
        self.requests.lock().unwrap().push(request);

        let script = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OpenScript::Manual);
        match script {
            OpenScript::Refuse(message) => Err(TransportError::Stream(message.to_string())),
            OpenScript::Status(status, body) => Err(TransportError::Status {
                status,
                body: body.to_string(),
            }),
            OpenScript::Events(events) => {
                let (sender, handle) = StreamHandle::channel(self.timeout);
                tokio::spawn(async move {
                    for event in events {
                        if !sender.send(event).await {
                            break;
                        }
                    }
                    // Keep the sender alive until the consumer is done so the
                    // scripted events are not followed by a spurious close.
                    sender.cancelled().await;
                });
                Ok(handle)
            }
            OpenScript::Manual => {
                let (sender, handle) = StreamHandle::channel(self.timeout);
                self.senders.lock().unwrap().push_back(sender);
                Ok(handle)
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    intents: Mutex<Vec<NavigationIntent>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn intents(&self) -> Vec<NavigationIntent> {
        self.intents.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, intent: &NavigationIntent) {
        self.intents.lock().unwrap().push(intent.clone());
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub transport: Arc<ScriptedTransport>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::new(),
            transport: ScriptedTransport::new(),
            navigator: RecordingNavigator::new(),
        }
    }

    pub fn controller(&self) -> SessionController {
        self.controller_with(test_config())
    }

    pub fn controller_with(&self, config: Config) -> SessionController {
        SessionController::new(
            config,
            self.backend.clone(),
            self.transport.clone(),
            self.navigator.clone(),
        )
    }
}
