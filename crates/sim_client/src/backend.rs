use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_core::{MetricRating, Role};

use crate::error::Result;

/// Reply to a session-creation request. Every field is optional on the wire;
/// the controller decides which absences are fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
    #[serde(default, alias = "patient_label", alias = "patientName")]
    pub patient_label: Option<String>,
    #[serde(default, alias = "initial_prompt")]
    pub initial_prompt: Option<String>,
}

/// One turn of the transcript as the backend recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl HistoryEntry {
    pub fn role(&self) -> Role {
        match self.role.to_ascii_lowercase().as_str() {
            "clinician" | "user" | "doctor" => Role::Clinician,
            "patient" | "assistant" => Role::Patient,
            _ => Role::System,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionResponse {
    #[serde(default, alias = "evaluation", alias = "evaluation_text")]
    pub evaluation_text: Option<String>,
    #[serde(default, alias = "structured_metrics")]
    pub structured_metrics: Option<Vec<MetricRating>>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Session endpoints of the simulation backend.
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    async fn start_session(&self, case_id: &str) -> Result<StartSessionResponse>;

    async fn end_session(&self, session_id: &str) -> Result<EndSessionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_response_accepts_camel_and_snake_case() {
        let camel: StartSessionResponse = serde_json::from_str(
            r#"{"sessionId":"s1","patientLabel":"Mr. Jones","initialPrompt":"Hello, I have chest pain."}"#,
        )
        .unwrap();
        let snake: StartSessionResponse = serde_json::from_str(
            r#"{"session_id":"s1","patient_label":"Mr. Jones","initial_prompt":"Hello, I have chest pain."}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
    }

    #[test]
    fn start_response_tolerates_missing_fields() {
        let response: StartSessionResponse = serde_json::from_str("{}").unwrap();
        assert!(response.session_id.is_none());
    }

    #[test]
    fn end_response_parses_metrics_and_history() {
        let response: EndSessionResponse = serde_json::from_str(
            r#"{
                "evaluationText": "Good history taking.",
                "structuredMetrics": [{"name": "Empathy", "score": 4.5, "maxScore": 5}],
                "history": [
                    {"role": "user", "content": "Any allergies?"},
                    {"role": "assistant", "content": "Penicillin.", "speaker": "Mr. Jones"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(response.evaluation_text.as_deref(), Some("Good history taking."));
        assert_eq!(response.structured_metrics.unwrap()[0].max_score, Some(5.0));
        assert_eq!(response.history[0].role(), Role::Clinician);
        assert_eq!(response.history[1].role(), Role::Patient);
    }
}
