use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One structured rating from the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRating {
    pub name: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// End-of-session feedback. Built once per ended session and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub evaluation_text: String,
    pub metrics: Option<Vec<MetricRating>>,
    pub history: Vec<Message>,
    pub created_at: DateTime<Utc>,
    /// Set when retrieval failed and this result only records the failure.
    pub degraded: bool,
}

impl EvaluationResult {
    pub fn new(
        evaluation_text: impl Into<String>,
        metrics: Option<Vec<MetricRating>>,
        history: Vec<Message>,
    ) -> Self {
        Self {
            evaluation_text: evaluation_text.into(),
            metrics,
            history,
            created_at: Utc::now(),
            degraded: false,
        }
    }

    pub fn degraded(reason: &str, history: Vec<Message>) -> Self {
        Self {
            evaluation_text: format!(
                "The evaluation for this session could not be retrieved ({reason}). \
                 Your conversation has been kept below."
            ),
            metrics: None,
            history,
            created_at: Utc::now(),
            degraded: true,
        }
    }
}
