use serde::Serialize;
use sim_core::{EvaluationResult, Message, Session, SimulationError, StartupProgress};
use sim_state::SimPhase;

/// Read-only view of the controller handed to the view layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub phase: SimPhase,
    pub startup_progress: StartupProgress,
    pub messages: Vec<Message>,
    pub session: Option<Session>,
    pub error: Option<SimulationError>,
    pub evaluation: Option<EvaluationResult>,
    pub retry_count: u32,
    pub is_submit_disabled: bool,
}

impl ControllerSnapshot {
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }
}
