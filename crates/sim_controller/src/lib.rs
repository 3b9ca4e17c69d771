//! sim_controller - Session lifecycle controller
//!
//! [`SessionController`] owns one simulation session: it runs the startup
//! phases, streams patient replies into the message log, classifies failures,
//! and settles the evaluation when the session ends. [`ControllerRuntime`]
//! puts a controller on its own task and serialises commands against it.

pub mod controller;
pub mod error;
pub mod navigator;
pub mod runtime;
pub mod snapshot;

pub use controller::{FailedOperation, PendingRedirect, SessionController};
pub use error::CommandError;
pub use navigator::{LogNavigator, Navigator};
pub use runtime::{spawn, ControllerHandle, ControllerRuntime};
pub use snapshot::ControllerSnapshot;
