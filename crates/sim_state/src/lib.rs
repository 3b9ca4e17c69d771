//! sim_state - Phase state machine for simulation sessions
//!
//! This crate provides the state machine that governs which controller
//! operations are legal at any point of a simulation's lifecycle.

pub mod machine;

// Re-export commonly used types
pub use machine::{SimEvent, SimPhase, StateMachine, StateTransition, TransitionError};
