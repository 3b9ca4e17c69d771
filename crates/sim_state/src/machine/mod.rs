//! State machine module
//!
//! Contains the FSM implementation for the simulation session lifecycle.

mod events;
mod states;
mod transitions;

pub use events::SimEvent;
pub use states::SimPhase;
pub use transitions::{StateMachine, StateTransition, TransitionError};
