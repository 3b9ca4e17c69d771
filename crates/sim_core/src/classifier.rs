//! Error classifier - maps raw failures onto [`SimulationError`]s
//!
//! Classification walks an ordered rule table and the first matching rule
//! wins. The same failure can match several rules (an "authentication" hint
//! inside a 500 response, for example); earlier rules take precedence.

use std::ops::RangeInclusive;

use crate::config::Config;
use crate::error::{ErrorKind, RawFailure, RecommendedAction, SimulationError};

/// Where non-retryable errors send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub case_list: String,
    pub login: String,
}

impl Default for RedirectTargets {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RedirectTargets {
    fn from(config: &Config) -> Self {
        Self {
            case_list: config.case_list_path.clone(),
            login: config.login_path.clone(),
        }
    }
}

struct ClassifierRule {
    kind: ErrorKind,
    statuses: &'static [RangeInclusive<u16>],
    patterns: &'static [&'static str],
}

const RULES: &[ClassifierRule] = &[
    ClassifierRule {
        kind: ErrorKind::Network,
        statuses: &[],
        patterns: &[
            "failed to fetch",
            "network",
            "connection",
            "econnrefused",
            "econnreset",
            "enotfound",
            "error sending request",
            "stream closed unexpectedly",
        ],
    },
    ClassifierRule {
        kind: ErrorKind::Auth,
        statuses: &[401..=401, 403..=403],
        patterns: &[
            "401",
            "unauthorized",
            "unauthenticated",
            "authentication",
            "forbidden",
            "session expired",
            "token expired",
            "jwt expired",
            "invalid token",
            "missing credential",
        ],
    },
    ClassifierRule {
        kind: ErrorKind::InvalidCase,
        statuses: &[404..=404],
        patterns: &["404", "not found", "invalid case", "no such case"],
    },
    ClassifierRule {
        kind: ErrorKind::Timeout,
        statuses: &[408..=408, 504..=504],
        patterns: &["timeout", "timed out", "deadline exceeded"],
    },
    ClassifierRule {
        kind: ErrorKind::Server,
        statuses: &[500..=599],
        patterns: &[
            "500",
            "502",
            "503",
            "internal server error",
            "server error",
            "bad gateway",
            "service unavailable",
        ],
    },
];

impl ClassifierRule {
    fn matches(&self, failure: &RawFailure, lowered: &str) -> bool {
        let status_hit = failure
            .status
            .map(|status| self.statuses.iter().any(|range| range.contains(&status)))
            .unwrap_or(false);

        status_hit || self.patterns.iter().any(|p| contains_signature(lowered, p))
    }
}

/// Substring match; purely numeric signatures must not touch other digits so
/// that "401" does not fire inside "VP-4012".
fn contains_signature(haystack: &str, needle: &str) -> bool {
    if !needle.bytes().all(|b| b.is_ascii_digit()) {
        return haystack.contains(needle);
    }

    let bytes = haystack.as_bytes();
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_digit();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_digit();
        before_ok && after_ok
    })
}

/// Classify with the default redirect targets.
pub fn classify(failure: &RawFailure) -> SimulationError {
    classify_with(failure, &RedirectTargets::default())
}

pub fn classify_with(failure: &RawFailure, targets: &RedirectTargets) -> SimulationError {
    let lowered = failure.message.to_lowercase();
    let kind = RULES
        .iter()
        .find(|rule| rule.matches(failure, &lowered))
        .map(|rule| rule.kind)
        .unwrap_or(ErrorKind::Unknown);

    build(kind, failure, targets)
}

fn build(kind: ErrorKind, failure: &RawFailure, targets: &RedirectTargets) -> SimulationError {
    let (retryable, action, target, message) = match kind {
        ErrorKind::Network => (
            true,
            RecommendedAction::Retry,
            None,
            "Unable to reach the simulation server. Check your connection and try again.",
        ),
        ErrorKind::Auth => (
            false,
            RecommendedAction::Reauthenticate,
            Some(targets.login.clone()),
            "Your session has expired. Please sign in again.",
        ),
        ErrorKind::InvalidCase => (
            false,
            RecommendedAction::Redirect,
            Some(targets.case_list.clone()),
            "This case could not be found. Returning to the case list.",
        ),
        ErrorKind::Timeout => (
            true,
            RecommendedAction::Retry,
            None,
            "The patient is taking too long to respond. Please try again.",
        ),
        ErrorKind::Server => (
            true,
            RecommendedAction::Retry,
            None,
            "The simulation server ran into a problem. Please try again.",
        ),
        ErrorKind::Unknown => (
            true,
            RecommendedAction::Retry,
            None,
            "Something went wrong. Please try again.",
        ),
        ErrorKind::MalformedResponse => return SimulationError::malformed(failure.message.clone()),
    };

    SimulationError {
        kind,
        retryable,
        recommended_action: action,
        redirect_target: target,
        message: message.to_string(),
        detail: failure.to_string(),
    }
}
