//! State transitions - FSM transition logic
//!
//! Implements the state machine that handles event-driven phase transitions.

use thiserror::Error;

use super::events::SimEvent;
use super::states::SimPhase;

/// Error type for invalid state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} with event {event:?}")]
    InvalidTransition { from: SimPhase, event: SimEvent },

    #[error("State machine is in terminal state: {0:?}")]
    TerminalState(SimPhase),
}

/// Represents a state transition result.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state before the transition.
    pub from: SimPhase,
    /// The state after the transition.
    pub to: SimPhase,
    /// The event that triggered the transition.
    pub event: SimEvent,
    /// Whether the state actually changed.
    pub changed: bool,
}

/// State machine for managing simulation phase transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    /// Current state.
    current_state: SimPhase,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in Idle state.
    pub fn new() -> Self {
        Self::with_state(SimPhase::Idle)
    }

    /// Create a state machine with a specific initial state.
    pub fn with_state(state: SimPhase) -> Self {
        Self {
            current_state: state,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> &SimPhase {
        &self.current_state
    }

    /// Handle an event and transition to a new state.
    pub fn handle_event(&mut self, event: SimEvent) -> StateTransition {
        let old_state = self.current_state;
        let new_state = self.compute_next_state(&old_state, &event);
        let changed = old_state != new_state;

        self.current_state = new_state;

        StateTransition {
            from: old_state,
            to: new_state,
            event,
            changed,
        }
    }

    /// Like [`handle_event`](Self::handle_event), but an event the current
    /// state does not accept is an error and leaves the state untouched.
    pub fn try_event(&mut self, event: SimEvent) -> Result<StateTransition, TransitionError> {
        if !self.accepts(&event) {
            if self.current_state.is_terminal() {
                return Err(TransitionError::TerminalState(self.current_state));
            }
            return Err(TransitionError::InvalidTransition {
                from: self.current_state,
                event,
            });
        }
        Ok(self.handle_event(event))
    }

    fn accepts(&self, event: &SimEvent) -> bool {
        match event {
            SimEvent::Reset => true,
            SimEvent::Failed { .. } => !self.current_state.is_terminal(),
            other => self.can_transition(other),
        }
    }

    /// Compute the next state given current state and event.
    fn compute_next_state(&self, state: &SimPhase, event: &SimEvent) -> SimPhase {
        use SimEvent::*;
        use SimPhase::*;

        match (state, event) {
            // ========== Startup ==========
            (Idle, StartRequested) => Validating,
            (Validating, ValidationPassed) => CreatingSession,
            (CreatingSession, SessionCreated) => LoadingPatient,
            (LoadingPatient, PatientLoaded) => Initializing,
            (Initializing, InitializationFinished) => Active,
            (Idle, SessionResumed) => Active,

            // ========== Conversation ==========
            (Active, QuestionSubmitted) => Streaming,
            (Streaming, StreamCompleted) => Active,
            (Streaming, ServerEndedSession) => Active,
            (Active | Streaming | Error { .. }, SessionEnded) => Ended,

            // ========== Error Recovery ==========
            (Ended, Failed { .. }) => Ended,
            (_, Failed { kind, retryable }) => Error {
                kind: *kind,
                retryable: *retryable,
            },
            (
                Error {
                    retryable: true, ..
                },
                RetryStartup,
            ) => Validating,
            (
                Error {
                    retryable: true, ..
                },
                RetryQuestion,
            ) => Streaming,

            // ========== Control ==========
            (_, Reset) => Idle,

            // ========== Default: No transition ==========
            _ => *state,
        }
    }

    /// Check if a transition is valid without executing it.
    pub fn can_transition(&self, event: &SimEvent) -> bool {
        let next = self.compute_next_state(&self.current_state, event);
        next != self.current_state
    }
}
