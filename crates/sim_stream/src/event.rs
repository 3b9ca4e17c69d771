//! Framed stream events and their wire format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One event delivered on an open stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental reply text, with the speaker label the backend currently
    /// reports.
    Chunk {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
    },
    /// The reply is complete.
    Done,
    /// The server ended the whole session, optionally with an evaluation.
    SessionEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
            speaker: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::SessionEnd { .. })
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame has no type")]
    MissingType,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    speaker: Option<String>,
    summary: Option<String>,
}

/// Decode one SSE frame.
///
/// The frame kind comes from the JSON `type` field, falling back to the SSE
/// event name. Returns `Ok(None)` for keep-alives and kinds this client does
/// not know.
pub fn parse_frame(event_name: &str, data: &str) -> Result<Option<StreamEvent>, FrameError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }

    let frame: RawFrame = serde_json::from_str(data)?;
    let kind = match frame.kind {
        Some(kind) => kind,
        None if !event_name.is_empty() && event_name != "message" => event_name.to_string(),
        None => return Err(FrameError::MissingType),
    };

    let event = match kind.as_str() {
        "chunk" => StreamEvent::Chunk {
            content: frame.content.unwrap_or_default(),
            speaker: frame.speaker,
        },
        "done" => StreamEvent::Done,
        "session_end" => StreamEvent::SessionEnd {
            summary: frame.summary.filter(|s| !s.trim().is_empty()),
        },
        other => {
            log::debug!("Skipping unknown stream frame type: {}", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}
