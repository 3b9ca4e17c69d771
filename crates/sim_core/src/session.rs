//! Session identity for one simulation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the simulation page was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPattern {
    /// Case id only: a new session must be started.
    CaseOnly,
    /// Case id and session id: resume an already started session.
    CaseWithSession,
    /// No usable case id.
    Invalid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionStateError {
    #[error("Session id already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Session for case {0} has an invalid access pattern")]
    InvalidAccess(String),

    #[error("Session has already ended")]
    Ended,

    #[error("Session id must not be empty")]
    EmptySessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    case_id: String,
    session_id: Option<String>,
    patient_label: Option<String>,
    started_at: DateTime<Utc>,
    access_pattern: AccessPattern,
    is_active: bool,
    is_ended: bool,
}

impl Session {
    pub fn new(case_id: impl Into<String>, access_pattern: AccessPattern) -> Self {
        Self {
            case_id: case_id.into(),
            session_id: None,
            patient_label: None,
            started_at: Utc::now(),
            access_pattern,
            is_active: false,
            is_ended: false,
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn patient_label(&self) -> Option<&str> {
        self.patient_label.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn access_pattern(&self) -> AccessPattern {
        self.access_pattern
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_ended(&self) -> bool {
        self.is_ended
    }

    /// A session that has started (or is starting) and has not ended.
    pub fn is_live(&self) -> bool {
        !self.is_ended
    }

    /// Assign the backend session id and mark the session active.
    ///
    /// The id is write-once: activating again with a different id fails.
    pub fn activate(
        &mut self,
        session_id: impl Into<String>,
        patient_label: Option<String>,
    ) -> Result<(), SessionStateError> {
        if self.access_pattern == AccessPattern::Invalid {
            return Err(SessionStateError::InvalidAccess(self.case_id.clone()));
        }
        if self.is_ended {
            return Err(SessionStateError::Ended);
        }

        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(SessionStateError::EmptySessionId);
        }

        match &self.session_id {
            Some(existing) if *existing != session_id => {
                return Err(SessionStateError::AlreadyAssigned(existing.clone()));
            }
            Some(_) => {}
            None => self.session_id = Some(session_id),
        }

        if patient_label.is_some() {
            self.patient_label = patient_label;
        }
        self.is_active = true;
        Ok(())
    }

    pub fn end(&mut self) {
        self.is_active = false;
        self.is_ended = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_assigns_session_id_once() {
        let mut session = Session::new("VP-001", AccessPattern::CaseOnly);
        session
            .activate("s1", Some("Mr. Jones".to_string()))
            .unwrap();

        assert_eq!(session.session_id(), Some("s1"));
        assert!(session.is_active());

        let err = session.activate("s2", None).unwrap_err();
        assert_eq!(err, SessionStateError::AlreadyAssigned("s1".to_string()));
        assert_eq!(session.session_id(), Some("s1"));
        assert_eq!(session.patient_label(), Some("Mr. Jones"));
    }

    #[test]
    fn invalid_session_never_becomes_active() {
        let mut session = Session::new("", AccessPattern::Invalid);
        assert!(session.activate("s1", None).is_err());
        assert!(!session.is_active());
    }

    #[test]
    fn end_clears_active_flag() {
        let mut session = Session::new("VP-001", AccessPattern::CaseOnly);
        session.activate("s1", None).unwrap();
        session.end();

        assert!(session.is_ended());
        assert!(!session.is_active());
        assert_eq!(session.activate("s1", None), Err(SessionStateError::Ended));
    }
}
