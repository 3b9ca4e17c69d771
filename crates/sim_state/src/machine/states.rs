//! Simulation phases

use serde::{Deserialize, Serialize};
use sim_core::ErrorKind;

/// The lifecycle phases of a simulation controller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SimPhase {
    /// No session, nothing in progress.
    #[default]
    Idle,

    // ========== Startup ==========
    /// Checking the case id before talking to the backend.
    Validating,

    /// Waiting for the backend to create the session.
    CreatingSession,

    /// Session exists; loading the patient profile.
    LoadingPatient,

    /// Seeding the conversation.
    Initializing,

    // ========== Conversation ==========
    /// Waiting for the clinician's next question.
    Active,

    /// A patient reply is being streamed.
    Streaming,

    /// The session is over (terminal).
    Ended,

    /// A classified failure is waiting to be retried or acted on.
    Error { kind: ErrorKind, retryable: bool },
}

impl SimPhase {
    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    pub fn is_starting(&self) -> bool {
        matches!(
            self,
            Self::Validating | Self::CreatingSession | Self::LoadingPatient | Self::Initializing
        )
    }

    /// Check if this state allows the clinician to ask a question.
    pub fn accepts_questions(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
