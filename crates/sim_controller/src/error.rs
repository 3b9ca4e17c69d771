use sim_core::{ErrorKind, LogError};
use sim_state::{SimPhase, TransitionError};
use thiserror::Error;

/// A command the controller refused to run. Failures of commands that did
/// run are reported through the snapshot's `error` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("A reply is still streaming")]
    StreamInProgress,

    #[error("Questions are not accepted in phase {0:?}")]
    NotAccepting(SimPhase),

    #[error("No active session")]
    NoActiveSession,

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error("{0} errors cannot be retried")]
    NotRetryable(ErrorKind),

    #[error("Retry limit of {0} reached")]
    RetriesExhausted(u32),

    #[error("Controller runtime has stopped")]
    RuntimeStopped,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Log(#[from] LogError),
}
