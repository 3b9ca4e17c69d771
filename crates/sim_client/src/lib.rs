//! sim_client - Simulation backend collaborators
//!
//! Session creation and termination calls, and the credential store that
//! supplies the auth token for them and for the stream endpoint.

pub mod backend;
pub mod credentials;
pub mod error;
pub mod http;

pub use backend::{EndSessionResponse, HistoryEntry, SimulationBackend, StartSessionResponse};
pub use credentials::{CredentialStore, EnvCredentials, StaticCredentials};
pub use error::BackendError;
pub use http::{HttpBackend, DEFAULT_REQUEST_TIMEOUT};
