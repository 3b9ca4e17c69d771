//! The simulation session controller.
//!
//! One controller owns one session at a time. Every command runs to
//! completion against `&mut self`, so at most one startup and one stream can
//! be in flight; [`crate::runtime`] serialises concurrent callers onto it.

use std::fmt;
use std::sync::Arc;

use sim_client::{
    BackendError, CredentialStore, EndSessionResponse, SimulationBackend, StaticCredentials,
};
use sim_core::{
    canonical_intent, classify_with, AccessPattern, Config, EntryLocation, EvaluationResult,
    LogAction, Message, MessageLog, NavigationContext, NavigationIntent, RawFailure,
    RecommendedAction, RedirectTargets, Role, Session, SimulationError, StartupPhase,
    StartupProgress,
};
use sim_state::{SimEvent, SimPhase, StateMachine};
use sim_stream::{StreamEvent, StreamHandle, StreamRequest, StreamTransport, TransportError};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CommandError;
use crate::navigator::Navigator;
use crate::snapshot::ControllerSnapshot;

const MAX_CASE_ID_LEN: usize = 128;

/// The operation a classified error interrupted, kept so `retry` can replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedOperation {
    Startup { case_id: String },
    Question { text: String },
}

impl fmt::Display for FailedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedOperation::Startup { .. } => write!(f, "startup"),
            FailedOperation::Question { .. } => write!(f, "question"),
        }
    }
}

/// A navigation the controller will perform on its own once `due` passes.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRedirect {
    pub intent: NavigationIntent,
    pub due: Instant,
}

pub struct SessionController {
    config: Config,
    targets: RedirectTargets,
    backend: Arc<dyn SimulationBackend>,
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,

    machine: StateMachine,
    progress: StartupProgress,
    session: Option<Session>,
    messages: MessageLog,
    error: Option<SimulationError>,
    evaluation: Option<EvaluationResult>,
    retry_count: u32,
    entry_context: NavigationContext,
    failed: Option<FailedOperation>,

    stream: Option<StreamHandle>,
    active_question: Option<String>,
    pending_redirect: Option<PendingRedirect>,

    snapshot_tx: watch::Sender<ControllerSnapshot>,
}

impl SessionController {
    /// Credentials default to the token in `config`; see
    /// [`with_credentials`](Self::with_credentials).
    pub fn new(
        config: Config,
        backend: Arc<dyn SimulationBackend>,
        transport: Arc<dyn StreamTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(StaticCredentials::new(config.auth_token.clone()));
        let (snapshot_tx, _) = watch::channel(ControllerSnapshot {
            is_submit_disabled: true,
            ..ControllerSnapshot::default()
        });

        Self {
            targets: RedirectTargets::from(&config),
            config,
            backend,
            transport,
            credentials,
            navigator,
            machine: StateMachine::new(),
            progress: StartupProgress::idle(),
            session: None,
            messages: MessageLog::new(),
            error: None,
            evaluation: None,
            retry_count: 0,
            entry_context: NavigationContext::default(),
            failed: None,
            stream: None,
            active_question: None,
            pending_redirect: None,
            snapshot_tx,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    // ========== Observation ==========

    pub fn phase(&self) -> SimPhase {
        *self.machine.state()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn error(&self) -> Option<&SimulationError> {
        self.error.as_ref()
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn pending_redirect(&self) -> Option<&PendingRedirect> {
        self.pending_redirect.as_ref()
    }

    /// True unless the phase is `Active` with a live session and no reply in
    /// flight.
    pub fn is_submit_disabled(&self) -> bool {
        let session_ready = self
            .session
            .as_ref()
            .map(|s| s.is_active() && !s.is_ended())
            .unwrap_or(false);
        !(self.machine.state().accepts_questions() && session_ready && self.stream.is_none())
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase(),
            startup_progress: self.progress.clone(),
            messages: self.messages.snapshot(),
            session: self.session.clone(),
            error: self.error.clone(),
            evaluation: self.evaluation.clone(),
            retry_count: self.retry_count,
            is_submit_disabled: self.is_submit_disabled(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    // ========== Startup ==========

    /// Start (or resume) the session described by an entry address.
    ///
    /// Does nothing while a session is live, so repeated calls from the view
    /// layer create at most one backend session.
    pub async fn open_entry(&mut self, entry: EntryLocation) -> Result<(), CommandError> {
        if self.has_live_session() {
            log::debug!("Entry ignored: a session is already live");
            return Ok(());
        }
        self.discard_previous_session();
        self.entry_context = entry.context.clone();

        match (entry.access_pattern(), entry.case_id, entry.session_id) {
            (AccessPattern::CaseWithSession, Some(case_id), Some(session_id)) => {
                self.resume_session(case_id, session_id)
            }
            (AccessPattern::CaseOnly, Some(case_id), _) => {
                self.begin_startup(case_id, SimEvent::StartRequested).await
            }
            _ => {
                self.fail_invalid_entry();
                Ok(())
            }
        }
    }

    /// Create a new session for `case_id`. A no-op while a session is live.
    pub async fn start_session(&mut self, case_id: &str) -> Result<(), CommandError> {
        self.open_entry(EntryLocation::for_case(case_id)).await
    }

    fn has_live_session(&self) -> bool {
        self.session.as_ref().map(Session::is_live).unwrap_or(false)
    }

    fn discard_previous_session(&mut self) {
        if self.phase() != SimPhase::Idle {
            log::debug!("Discarding previous session state from {:?}", self.phase());
            self.clear_state();
        }
    }

    fn resume_session(&mut self, case_id: String, session_id: String) -> Result<(), CommandError> {
        if let Err(reason) = validate_case_id(&case_id) {
            let error = self.invalid_case_error(&case_id, reason);
            self.fail(FailedOperation::Startup { case_id }, error);
            return Ok(());
        }

        let mut session = Session::new(case_id, AccessPattern::CaseWithSession);
        if let Err(e) = session.activate(session_id.clone(), None) {
            self.fail(
                FailedOperation::Startup {
                    case_id: session.case_id().to_string(),
                },
                SimulationError::malformed(e.to_string()),
            );
            return Ok(());
        }

        log::info!(
            "[case {}] Resuming session {}",
            session.case_id(),
            session_id
        );
        self.session = Some(session);
        self.messages.clear();
        self.messages.apply(LogAction::Append {
            role: Role::System,
            content: format!(
                "Session {session_id} resumed. Continue the consultation where you left off."
            ),
            speaks_for: None,
        })?;
        self.machine.try_event(SimEvent::SessionResumed)?;
        self.publish();
        Ok(())
    }

    fn fail_invalid_entry(&mut self) {
        let raw = RawFailure::with_status("invalid case: the address names no case", 404);
        let error = classify_with(&raw, &self.targets);
        log::error!("Simulation opened without a case id: {}", error.detail);

        self.progress.reset();
        self.machine.handle_event(SimEvent::Failed {
            kind: error.kind,
            retryable: error.retryable,
        });
        self.schedule_redirect(&error, None);
        self.error = Some(error);
        self.publish();
    }

    async fn begin_startup(&mut self, case_id: String, event: SimEvent) -> Result<(), CommandError> {
        self.machine.try_event(event)?;
        self.session = Some(Session::new(case_id.clone(), AccessPattern::CaseOnly));
        self.messages.clear();
        self.progress.reset();
        self.error = None;
        self.pending_redirect = None;

        self.run_startup(case_id).await
    }

    async fn run_startup(&mut self, case_id: String) -> Result<(), CommandError> {
        self.enter_phase(StartupPhase::Validating).await;
        if let Err(reason) = validate_case_id(&case_id) {
            let error = self.invalid_case_error(&case_id, reason);
            self.fail(FailedOperation::Startup { case_id }, error);
            return Ok(());
        }
        self.machine.try_event(SimEvent::ValidationPassed)?;

        self.enter_phase(StartupPhase::CreatingSession).await;
        let response = match self.backend.start_session(&case_id).await {
            Ok(response) => response,
            Err(e) => {
                let error = self.classify_backend_error(&e);
                self.fail(FailedOperation::Startup { case_id }, error);
                return Ok(());
            }
        };

        let Some(session_id) = response.session_id.filter(|id| !id.trim().is_empty()) else {
            self.fail(
                FailedOperation::Startup { case_id },
                SimulationError::malformed("start-session response is missing sessionId"),
            );
            return Ok(());
        };

        let label = response
            .patient_label
            .filter(|l| !l.trim().is_empty());
        let activated = match self.session.as_mut() {
            Some(session) => session
                .activate(session_id.clone(), label.clone())
                .map_err(|e| e.to_string()),
            None => Err("session discarded during startup".to_string()),
        };
        if let Err(detail) = activated {
            self.fail(
                FailedOperation::Startup { case_id },
                SimulationError::malformed(detail),
            );
            return Ok(());
        }
        log::info!("[case {}] Session {} created", case_id, session_id);
        self.machine.try_event(SimEvent::SessionCreated)?;

        self.enter_phase(StartupPhase::LoadingPatient).await;
        self.machine.try_event(SimEvent::PatientLoaded)?;

        self.enter_phase(StartupPhase::Initializing).await;
        self.seed_conversation(label, response.initial_prompt)?;
        self.machine.try_event(SimEvent::InitializationFinished)?;

        self.progress.advance(StartupPhase::Complete);
        self.retry_count = 0;
        self.failed = None;
        self.publish();
        // Progress only describes session creation.
        self.progress.reset();

        let intent = canonical_intent(
            &self.config.simulation_base_path,
            &case_id,
            &session_id,
            &self.entry_context,
        );
        self.navigator.navigate(&intent);
        self.publish();
        Ok(())
    }

    async fn enter_phase(&mut self, phase: StartupPhase) {
        self.progress.advance(phase);
        self.publish();

        let delay = self.config.phase_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn seed_conversation(
        &mut self,
        label: Option<String>,
        initial_prompt: Option<String>,
    ) -> Result<(), CommandError> {
        let speaker = label
            .clone()
            .unwrap_or_else(|| Role::Patient.default_label().to_string());

        self.messages.apply(LogAction::Append {
            role: Role::System,
            content: format!(
                "Welcome to the simulation. You are now speaking with {speaker}. \
                 Take a history as you would in a real consultation."
            ),
            speaks_for: None,
        })?;

        let opening = initial_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("Hello, doctor. I'm {speaker}. Thank you for seeing me."));
        self.messages.apply(LogAction::Append {
            role: Role::Patient,
            content: opening,
            speaks_for: label,
        })?;
        Ok(())
    }

    // ========== Conversation ==========

    /// Send a clinician question and open the reply stream.
    ///
    /// Rejected while a reply is streaming. A failure to open the stream is
    /// reported through the error state, not the returned result.
    pub async fn submit_question(&mut self, text: &str) -> Result<(), CommandError> {
        let question = text.trim();
        if question.is_empty() {
            return Err(CommandError::EmptyQuestion);
        }
        if self.stream.is_some() || self.messages.is_streaming() {
            return Err(CommandError::StreamInProgress);
        }
        let phase = self.phase();
        if !phase.accepts_questions() {
            return Err(CommandError::NotAccepting(phase));
        }
        if self.is_submit_disabled() {
            return Err(CommandError::NoActiveSession);
        }

        self.messages.apply(LogAction::Append {
            role: Role::Clinician,
            content: question.to_string(),
            speaks_for: None,
        })?;
        self.machine.try_event(SimEvent::QuestionSubmitted)?;
        self.open_stream(question.to_string()).await
    }

    async fn open_stream(&mut self, question: String) -> Result<(), CommandError> {
        let (session_id, speaker) = match &self.session {
            Some(session) => (
                session.session_id().map(str::to_string),
                session.patient_label().map(str::to_string),
            ),
            None => (None, None),
        };

        self.messages.apply(LogAction::BeginStreaming { speaks_for: speaker })?;
        self.active_question = Some(question.clone());
        self.publish();

        let request = StreamRequest {
            session_id,
            question,
            token: self.credentials.token(),
        };
        match self.transport.open(request).await {
            Ok(handle) => {
                log::debug!("Stream {} opened", handle.id());
                self.stream = Some(handle);
                self.publish();
            }
            Err(e) => self.handle_stream_failure(e),
        }
        Ok(())
    }

    /// Wait for the next item of the open stream. Pending forever when no
    /// stream is open. Cancel-safe.
    pub async fn next_stream_item(&mut self) -> Option<Result<StreamEvent, TransportError>> {
        match self.stream.as_mut() {
            Some(handle) => handle.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Fold one stream item into the message log and the phase.
    pub fn apply_stream_item(&mut self, item: Option<Result<StreamEvent, TransportError>>) {
        match item {
            Some(Ok(StreamEvent::Chunk { content, speaker })) => {
                match self.messages.apply(LogAction::AppendChunk {
                    delta: content,
                    speaker,
                }) {
                    Ok(_) => self.publish(),
                    Err(e) => log::warn!("Dropping chunk: {}", e),
                }
            }
            Some(Ok(StreamEvent::Done)) => {
                self.finish_stream();
                self.machine.handle_event(SimEvent::StreamCompleted);
                self.retry_count = 0;
                self.failed = None;
                self.publish();
            }
            Some(Ok(StreamEvent::SessionEnd { summary })) => {
                self.finish_stream();
                self.machine.handle_event(SimEvent::ServerEndedSession);
                if let Some(session) = self.session.as_mut() {
                    log::info!("[case {}] Session ended by the server", session.case_id());
                    session.end();
                }
                if let Some(summary) = summary {
                    self.evaluation = Some(EvaluationResult::new(
                        summary,
                        None,
                        self.messages.snapshot(),
                    ));
                }
                self.publish();
            }
            Some(Err(e)) => self.handle_stream_failure(e),
            None => {
                self.finish_stream();
                if self.phase() == SimPhase::Streaming {
                    self.machine.handle_event(SimEvent::StreamCompleted);
                }
                self.publish();
            }
        }
    }

    /// Apply one stream item. Returns `false` when no stream is open.
    pub async fn pump_once(&mut self) -> bool {
        if self.stream.is_none() {
            return false;
        }
        let item = self.next_stream_item().await;
        self.apply_stream_item(item);
        true
    }

    /// Apply stream items until the open stream terminates.
    pub async fn pump_stream(&mut self) {
        while self.pump_once().await {}
    }

    fn finish_stream(&mut self) {
        if let Some(mut handle) = self.stream.take() {
            handle.close();
        }
        self.active_question = None;
        if let Err(e) = self.messages.apply(LogAction::FinishStreaming) {
            log::warn!("Finalizing reply failed: {}", e);
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut handle) = self.stream.take() {
            handle.close();
        }
        self.active_question = None;
        if let Err(e) = self.messages.apply(LogAction::AbortStreaming) {
            log::warn!("Aborting reply failed: {}", e);
        }
    }

    fn handle_stream_failure(&mut self, error: TransportError) {
        let question = self.active_question.clone().unwrap_or_default();
        self.close_stream();

        let classified = classify_with(&error.raw_failure(), &self.targets);
        self.fail(FailedOperation::Question { text: question }, classified);
    }

    // ========== End of session ==========

    /// End the session and settle its evaluation. Always reaches `Ended`
    /// once a session id exists; a failed retrieval yields a degraded
    /// evaluation instead of an error.
    pub async fn end_session(&mut self) -> Result<(), CommandError> {
        if self.phase().is_terminal() {
            return Ok(());
        }
        let Some(session) = self.session.as_ref() else {
            return Err(CommandError::NoActiveSession);
        };
        let Some(session_id) = session.session_id().map(str::to_string) else {
            return Err(CommandError::NoActiveSession);
        };
        let case_id = session.case_id().to_string();

        self.close_stream();
        if let Some(session) = self.session.as_mut() {
            session.end();
        }

        let evaluation = match self.evaluation.take() {
            Some(inline) => {
                log::debug!("[case {}] Using evaluation delivered by the stream", case_id);
                inline
            }
            None => self.fetch_evaluation(&case_id, &session_id).await,
        };
        self.evaluation = Some(evaluation);

        self.error = None;
        self.failed = None;
        self.pending_redirect = None;
        self.progress.reset();
        self.machine.handle_event(SimEvent::SessionEnded);
        log::info!("[case {}] Session {} ended", case_id, session_id);
        self.publish();
        Ok(())
    }

    async fn fetch_evaluation(&self, case_id: &str, session_id: &str) -> EvaluationResult {
        match self.backend.end_session(session_id).await {
            Ok(response) => self.evaluation_from(response),
            Err(e) => {
                log::warn!(
                    "[case {}] Evaluation for session {} unavailable: {}",
                    case_id,
                    session_id,
                    e
                );
                EvaluationResult::degraded(&e.to_string(), self.messages.snapshot())
            }
        }
    }

    fn evaluation_from(&self, response: EndSessionResponse) -> EvaluationResult {
        let history = if self.messages.is_empty() {
            transcript_from(&response)
        } else {
            self.messages.snapshot()
        };

        match response.evaluation_text.filter(|t| !t.trim().is_empty()) {
            Some(text) => EvaluationResult::new(text, response.structured_metrics, history),
            None => EvaluationResult::degraded("the evaluation was empty", history),
        }
    }

    // ========== Recovery ==========

    /// Replay the operation the current error interrupted.
    ///
    /// Network-class failures wait an exponential backoff first. A failed
    /// startup restarts from validation; a failed question is re-sent without
    /// adding a second clinician message.
    pub async fn retry(&mut self) -> Result<(), CommandError> {
        let Some(error) = self.error.as_ref() else {
            return Err(CommandError::NothingToRetry);
        };
        if !error.retryable {
            return Err(CommandError::NotRetryable(error.kind));
        }
        if self.retry_count >= self.config.max_retries {
            return Err(CommandError::RetriesExhausted(self.config.max_retries));
        }
        let Some(operation) = self.failed.clone() else {
            return Err(CommandError::NothingToRetry);
        };

        let kind = error.kind;
        self.retry_count += 1;
        self.publish();

        if kind.is_network_class() {
            let delay = self.config.retry_delay(self.retry_count);
            log::info!(
                "Retrying {} in {:?} (attempt {}/{})",
                operation,
                delay,
                self.retry_count,
                self.config.max_retries
            );
            tokio::time::sleep(delay).await;
        } else {
            log::info!(
                "Retrying {} (attempt {}/{})",
                operation,
                self.retry_count,
                self.config.max_retries
            );
        }

        self.error = None;
        self.pending_redirect = None;
        match operation {
            FailedOperation::Startup { case_id } => {
                self.begin_startup(case_id, SimEvent::RetryStartup).await
            }
            FailedOperation::Question { text } => {
                self.machine.try_event(SimEvent::RetryQuestion)?;
                self.open_stream(text).await
            }
        }
    }

    /// Drop the session and return to `Idle`.
    pub fn reset(&mut self) {
        self.clear_state();
        self.entry_context = NavigationContext::default();
        self.publish();
    }

    fn clear_state(&mut self) {
        self.close_stream();
        self.machine.handle_event(SimEvent::Reset);
        self.progress.reset();
        self.session = None;
        self.messages.clear();
        self.error = None;
        self.evaluation = None;
        self.retry_count = 0;
        self.failed = None;
        self.pending_redirect = None;
    }

    /// Close any open stream before the controller goes away.
    pub fn shutdown(&mut self) {
        if self.stream.is_some() || self.messages.is_streaming() {
            self.close_stream();
            if self.phase() == SimPhase::Streaming {
                self.machine.handle_event(SimEvent::StreamCompleted);
            }
            self.publish();
        }
    }

    // ========== Failures and redirects ==========

    fn invalid_case_error(&self, case_id: &str, reason: &str) -> SimulationError {
        let raw = RawFailure::with_status(format!("invalid case {case_id:?}: {reason}"), 404);
        classify_with(&raw, &self.targets)
    }

    fn classify_backend_error(&self, error: &BackendError) -> SimulationError {
        if error.is_malformed() {
            SimulationError::malformed(error.to_string())
        } else {
            classify_with(&error.raw_failure(), &self.targets)
        }
    }

    fn fail(&mut self, operation: FailedOperation, error: SimulationError) {
        let case_id = self
            .session
            .as_ref()
            .map(|s| s.case_id().to_string())
            .unwrap_or_default();
        log::error!(
            "[case {}] {} failed in phase {:?} (retry {}): {} ({})",
            case_id,
            operation,
            self.phase(),
            self.retry_count,
            error,
            error.detail
        );

        self.progress.reset();
        self.machine.handle_event(SimEvent::Failed {
            kind: error.kind,
            retryable: error.retryable,
        });
        self.failed = Some(operation);
        self.schedule_redirect(&error, Some(&case_id));
        self.error = Some(error);
        self.publish();
    }

    fn schedule_redirect(&mut self, error: &SimulationError, case_id: Option<&str>) {
        if error.retryable || !error.needs_navigation() {
            return;
        }
        let Some(target) = error.redirect_target.clone() else {
            return;
        };

        let mut context = self.entry_context.clone();
        if error.recommended_action == RecommendedAction::Reauthenticate
            && context.return_to.is_none()
        {
            context.return_to = case_id
                .filter(|c| !c.is_empty())
                .map(|c| self.current_address(c));
        }

        let delay = self.config.redirect_delay();
        log::info!("Redirecting to {} in {:?}", target, delay);
        self.pending_redirect = Some(PendingRedirect {
            intent: NavigationIntent::redirect(target, context),
            due: Instant::now() + delay,
        });
    }

    fn current_address(&self, case_id: &str) -> String {
        let base = self.config.simulation_base_path.trim_end_matches('/');
        match self.session.as_ref().and_then(Session::session_id) {
            Some(session_id) => {
                canonical_intent(base, case_id, session_id, &NavigationContext::default()).target
            }
            None => format!("{base}/{case_id}"),
        }
    }

    /// Perform the pending redirect, if any.
    pub fn fire_redirect(&mut self) -> Option<NavigationIntent> {
        let redirect = self.pending_redirect.take()?;
        self.navigator.navigate(&redirect.intent);
        Some(redirect.intent)
    }

    /// Sleep until the pending redirect is due, then perform it.
    pub async fn await_redirect(&mut self) -> Option<NavigationIntent> {
        let due = self.pending_redirect.as_ref()?.due;
        tokio::time::sleep_until(due).await;
        self.fire_redirect()
    }
}

fn validate_case_id(case_id: &str) -> Result<(), &'static str> {
    if case_id.is_empty() {
        return Err("case id is empty");
    }
    if case_id.len() > MAX_CASE_ID_LEN {
        return Err("case id is too long");
    }
    if !case_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("case id contains unsupported characters");
    }
    Ok(())
}

fn transcript_from(response: &EndSessionResponse) -> Vec<Message> {
    let mut transcript = MessageLog::new();
    for entry in &response.history {
        let appended = transcript.apply(LogAction::Append {
            role: entry.role(),
            content: entry.content.clone(),
            speaks_for: entry.speaker.clone(),
        });
        if let Err(e) = appended {
            log::warn!("Skipping history entry: {}", e);
        }
    }
    transcript.snapshot()
}
