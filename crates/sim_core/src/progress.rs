//! Startup progress shown while a session is being created.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StartupPhase {
    #[default]
    Idle,
    Validating,
    CreatingSession,
    LoadingPatient,
    Initializing,
    Complete,
}

impl StartupPhase {
    pub fn percent(&self) -> u8 {
        match self {
            StartupPhase::Idle => 0,
            StartupPhase::Validating => 10,
            StartupPhase::CreatingSession => 30,
            StartupPhase::LoadingPatient => 60,
            StartupPhase::Initializing => 85,
            StartupPhase::Complete => 100,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            StartupPhase::Idle => "",
            StartupPhase::Validating => "Validating case...",
            StartupPhase::CreatingSession => "Creating simulation session...",
            StartupPhase::LoadingPatient => "Loading patient profile...",
            StartupPhase::Initializing => "Preparing the consultation...",
            StartupPhase::Complete => "Simulation ready",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartupProgress {
    pub phase: StartupPhase,
    pub progress: u8,
    pub message: String,
}

impl StartupProgress {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn at(phase: StartupPhase) -> Self {
        Self {
            phase,
            progress: phase.percent(),
            message: phase.status().to_string(),
        }
    }

    /// Move forward to `phase`. Moving backwards is ignored, so observed
    /// progress never decreases within one startup attempt.
    pub fn advance(&mut self, phase: StartupPhase) -> bool {
        if phase <= self.phase {
            return false;
        }
        *self = Self::at(phase);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::idle();
    }

    pub fn is_idle(&self) -> bool {
        self.phase == StartupPhase::Idle
    }
}
