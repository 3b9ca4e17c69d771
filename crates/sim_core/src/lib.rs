//! sim_core - Core types for the virtual patient simulation
//!
//! This crate provides the foundational types shared by the controller crates:
//! - `session` - Session identity and access pattern
//! - `message` - Chat turns and the reducer-driven message log
//! - `progress` - Startup phases and progress values
//! - `error` / `classifier` - Failure taxonomy and the ordered classification rules
//! - `reconciler` - Entry URL parsing and canonical navigation intents
//! - `evaluation` - End-of-session evaluation results

pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod message;
pub mod progress;
pub mod reconciler;
pub mod session;

// Re-export commonly used types
pub use classifier::{classify, classify_with, RedirectTargets};
pub use config::{Config, ConfigError};
pub use error::{ErrorKind, RawFailure, RecommendedAction, SimulationError};
pub use evaluation::{EvaluationResult, MetricRating};
pub use message::{LogAction, LogChange, LogError, Message, MessageId, MessageLog, Role};
pub use progress::{StartupPhase, StartupProgress};
pub use reconciler::{
    canonical_intent, reconcile, EntryLocation, EntryParseError, HistoryMode, NavigationContext,
    NavigationIntent,
};
pub use session::{AccessPattern, Session, SessionStateError};
