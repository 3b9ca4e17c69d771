//! Message log - append-only chat history with a single in-flight slot
//!
//! Finalized turns live in an ordered vector; the message currently being
//! streamed lives in a separate slot, so there can never be more than one
//! streaming message. All mutation goes through [`MessageLog::apply`].

use thiserror::Error;

use super::types::{Message, MessageId, Role};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("A message is already streaming (id {0})")]
    StreamInProgress(MessageId),

    #[error("No message is streaming")]
    NotStreaming,
}

/// Reducer input for the message log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogAction {
    /// Append a complete, non-streaming turn.
    Append {
        role: Role,
        content: String,
        speaks_for: Option<String>,
    },
    /// Open an empty streaming patient placeholder.
    BeginStreaming { speaks_for: Option<String> },
    /// Append a fragment to the streaming message.
    AppendChunk {
        delta: String,
        speaker: Option<String>,
    },
    /// Close the streaming message, keeping whatever content it has.
    FinishStreaming,
    /// Close the streaming message after a failure: an empty placeholder is
    /// dropped, a partial one is kept.
    AbortStreaming,
}

/// What a reducer step did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChange {
    Appended(MessageId),
    Updated(MessageId),
    Finalized(MessageId),
    Removed(MessageId),
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    finalized: Vec<Message>,
    in_flight: Option<Message>,
    next_id: MessageId,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: LogAction) -> Result<LogChange, LogError> {
        match action {
            LogAction::Append {
                role,
                content,
                speaks_for,
            } => {
                self.ensure_idle()?;
                let label = speaks_for.unwrap_or_else(|| role.default_label().to_string());
                let id = self.allocate_id();
                self.finalized
                    .push(Message::new(id, role, content, label, false));
                Ok(LogChange::Appended(id))
            }
            LogAction::BeginStreaming { speaks_for } => {
                self.ensure_idle()?;
                let label = speaks_for.unwrap_or_else(|| Role::Patient.default_label().to_string());
                let id = self.allocate_id();
                self.in_flight = Some(Message::new(id, Role::Patient, String::new(), label, true));
                Ok(LogChange::Appended(id))
            }
            LogAction::AppendChunk { delta, speaker } => {
                let message = self.in_flight.as_mut().ok_or(LogError::NotStreaming)?;
                message.content.push_str(&delta);
                if let Some(speaker) = speaker.filter(|s| !s.trim().is_empty()) {
                    if message.speaks_for != speaker {
                        log::debug!(
                            "Speaker label changed mid-stream: {:?} -> {:?}",
                            message.speaks_for,
                            speaker
                        );
                        message.speaks_for = speaker;
                    }
                }
                Ok(LogChange::Updated(message.id))
            }
            LogAction::FinishStreaming => Ok(self.close_in_flight(false)),
            LogAction::AbortStreaming => Ok(self.close_in_flight(true)),
        }
    }

    fn ensure_idle(&self) -> Result<(), LogError> {
        match &self.in_flight {
            Some(message) => Err(LogError::StreamInProgress(message.id)),
            None => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> MessageId {
        self.next_id += 1;
        self.next_id
    }

    fn close_in_flight(&mut self, drop_if_empty: bool) -> LogChange {
        let Some(mut message) = self.in_flight.take() else {
            return LogChange::Unchanged;
        };

        if drop_if_empty && message.content.is_empty() {
            return LogChange::Removed(message.id);
        }

        message.is_streaming = false;
        let id = message.id;
        self.finalized.push(message);
        LogChange::Finalized(id)
    }

    /// Ordered copy of every turn, the in-flight message last.
    pub fn snapshot(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.finalized.iter().chain(self.in_flight.iter())
    }

    pub fn streaming(&self) -> Option<&Message> {
        self.in_flight.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn len(&self) -> usize {
        self.finalized.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<&Message> {
        self.in_flight.as_ref().or_else(|| self.finalized.last())
    }

    pub fn clear(&mut self) {
        self.finalized.clear();
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinician(text: &str) -> LogAction {
        LogAction::Append {
            role: Role::Clinician,
            content: text.to_string(),
            speaks_for: None,
        }
    }

    fn chunk(text: &str) -> LogAction {
        LogAction::AppendChunk {
            delta: text.to_string(),
            speaker: None,
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let mut log = MessageLog::new();
        log.apply(clinician("one")).unwrap();
        log.apply(clinician("two")).unwrap();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();

        let ids: Vec<_> = log.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn streaming_content_only_grows() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();

        let mut previous = String::new();
        for delta in ["I've", " had", " pain"] {
            log.apply(chunk(delta)).unwrap();
            let current = log.streaming().unwrap().content.clone();
            assert!(current.starts_with(&previous));
            previous = current;
        }

        log.apply(LogAction::FinishStreaming).unwrap();
        let last = log.last().unwrap();
        assert_eq!(last.content, "I've had pain");
        assert!(!last.is_streaming);
    }

    #[test]
    fn second_stream_is_rejected() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();

        let err = log
            .apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap_err();
        assert_eq!(err, LogError::StreamInProgress(1));
        assert_eq!(log.iter().filter(|m| m.is_streaming).count(), 1);
    }

    #[test]
    fn append_is_rejected_while_streaming() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();
        assert!(log.apply(clinician("late")).is_err());
    }

    #[test]
    fn abort_drops_empty_placeholder() {
        let mut log = MessageLog::new();
        log.apply(clinician("What brings you in today?")).unwrap();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();

        assert_eq!(log.apply(LogAction::AbortStreaming).unwrap(), LogChange::Removed(2));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().role, Role::Clinician);
    }

    #[test]
    fn abort_keeps_partial_content() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();
        log.apply(chunk("I've")).unwrap();

        assert_eq!(log.apply(LogAction::AbortStreaming).unwrap(), LogChange::Finalized(1));
        assert!(!log.last().unwrap().is_streaming);
        assert_eq!(log.last().unwrap().content, "I've");
    }

    #[test]
    fn closing_twice_is_harmless() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming { speaks_for: None })
            .unwrap();
        log.apply(chunk("ok")).unwrap();
        log.apply(LogAction::FinishStreaming).unwrap();

        assert_eq!(log.apply(LogAction::FinishStreaming).unwrap(), LogChange::Unchanged);
        assert_eq!(log.apply(LogAction::AbortStreaming).unwrap(), LogChange::Unchanged);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn chunk_without_stream_fails() {
        let mut log = MessageLog::new();
        assert_eq!(log.apply(chunk("stray")).unwrap_err(), LogError::NotStreaming);
    }

    #[test]
    fn last_seen_speaker_label_wins() {
        let mut log = MessageLog::new();
        log.apply(LogAction::BeginStreaming {
            speaks_for: Some("Patient".to_string()),
        })
        .unwrap();
        log.apply(LogAction::AppendChunk {
            delta: "Hi".to_string(),
            speaker: Some("John Smith".to_string()),
        })
        .unwrap();
        log.apply(LogAction::AppendChunk {
            delta: " there".to_string(),
            speaker: Some("Mr. Smith".to_string()),
        })
        .unwrap();
        log.apply(LogAction::AppendChunk {
            delta: ".".to_string(),
            speaker: Some("  ".to_string()),
        })
        .unwrap();

        assert_eq!(log.streaming().unwrap().speaks_for, "Mr. Smith");
    }
}
