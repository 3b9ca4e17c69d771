//! Simulation events - the inputs that drive phase transitions

use serde::{Deserialize, Serialize};
use sim_core::ErrorKind;

/// Defines the events that can trigger state transitions in the FSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEvent {
    // ========== Startup Events ==========
    /// A case-only entry asked for a new session.
    StartRequested,

    /// The case id passed local validation.
    ValidationPassed,

    /// The backend created the session.
    SessionCreated,

    /// Patient profile is available.
    PatientLoaded,

    /// Conversation seeded; ready for questions.
    InitializationFinished,

    /// A case+session bookmark adopted an existing session.
    SessionResumed,

    // ========== Conversation Events ==========
    /// The clinician asked a question and a stream was opened.
    QuestionSubmitted,

    /// The stream finished normally.
    StreamCompleted,

    /// The server closed the session from within the stream.
    ServerEndedSession,

    /// The session was ended and its evaluation settled.
    SessionEnded,

    // ========== Error Events ==========
    /// A classified failure occurred.
    Failed { kind: ErrorKind, retryable: bool },

    /// Re-run startup after a retryable failure.
    RetryStartup,

    /// Re-open the stream for the question that failed.
    RetryQuestion,

    // ========== Control Events ==========
    /// Discard everything and return to idle.
    Reset,
}

impl SimEvent {
    /// Check if this event belongs to the startup sequence.
    pub fn is_startup_event(&self) -> bool {
        matches!(
            self,
            Self::StartRequested
                | Self::ValidationPassed
                | Self::SessionCreated
                | Self::PatientLoaded
                | Self::InitializationFinished
                | Self::RetryStartup
        )
    }

    /// Check if this is an error event.
    pub fn is_error_event(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
