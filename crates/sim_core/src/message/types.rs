use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MessageId = u64;

/// Who a chat turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Clinician,
    Patient,
    System,
}

impl Role {
    pub fn default_label(&self) -> &'static str {
        match self {
            Role::Clinician => "Clinician",
            Role::Patient => "Patient",
            Role::System => "System",
        }
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// Display label of the speaker; may be corrected while streaming.
    pub speaks_for: String,
    pub timestamp: DateTime<Utc>,
    pub is_streaming: bool,
}

impl Message {
    pub(crate) fn new(
        id: MessageId,
        role: Role,
        content: String,
        speaks_for: String,
        is_streaming: bool,
    ) -> Self {
        Self {
            id,
            role,
            content,
            speaks_for,
            timestamp: Utc::now(),
            is_streaming,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}
