//! URL/bookmark reconciler
//!
//! Simulation pages can be reached either through a case link
//! (`/simulation/{case}`) or through a bookmark of a running session
//! (`/simulation/{case}/session/{session}`). This module decides which of the
//! two applies and builds the canonical URL once a session exists, carrying
//! along whatever navigation context the entry URL had.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::session::AccessPattern;

const SESSION_SEGMENT: &str = "session";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryParseError {
    #[error("Invalid entry URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Path segment is not valid UTF-8 once decoded: {0}")]
    InvalidSegment(String),
}

/// Path segments arrive percent-encoded; ids are compared and sent decoded.
fn decode_segment(segment: &str) -> Result<String, EntryParseError> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|_| EntryParseError::InvalidSegment(segment.to_string()))
}

/// Context attached to a navigation (where to return to, which specialty
/// list the case came from, ...). Unknown keys are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl NavigationContext {
    pub fn is_empty(&self) -> bool {
        self.return_to.is_none() && self.specialty.is_none() && self.extra.is_empty()
    }

    fn insert(&mut self, key: &str, value: String) {
        match key {
            "returnTo" | "return_to" => self.return_to = Some(value),
            "specialty" => self.specialty = Some(value),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    fn to_query(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if let Some(return_to) = &self.return_to {
            serializer.append_pair("returnTo", return_to);
        }
        if let Some(specialty) = &self.specialty {
            serializer.append_pair("specialty", specialty);
        }
        for (key, value) in &self.extra {
            serializer.append_pair(key, value);
        }
        Some(serializer.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Rewrite the current history entry.
    Replace,
    /// Add a new history entry.
    Push,
}

/// An address change for the external navigator to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    pub target: String,
    pub mode: HistoryMode,
    pub context: NavigationContext,
}

impl NavigationIntent {
    /// Leave the simulation page for `target`, keeping the entry context.
    pub fn redirect(target: impl Into<String>, context: NavigationContext) -> Self {
        Self {
            target: target.into(),
            mode: HistoryMode::Push,
            context,
        }
    }
}

/// The identifiers and context found in the address the page was opened with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryLocation {
    pub case_id: Option<String>,
    pub session_id: Option<String>,
    pub context: NavigationContext,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EntryLocation {
    pub fn new(
        case_id: Option<String>,
        session_id: Option<String>,
        context: NavigationContext,
    ) -> Self {
        Self {
            case_id: non_blank(case_id),
            session_id: non_blank(session_id),
            context,
        }
    }

    pub fn for_case(case_id: impl Into<String>) -> Self {
        Self::new(Some(case_id.into()), None, NavigationContext::default())
    }

    /// Parse an absolute URL or an app-relative path such as
    /// `/simulation/VP-001?returnTo=/cases/cardiology`.
    pub fn parse(input: &str, base_path: &str) -> Result<Self, EntryParseError> {
        let url = match Url::parse(input) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("http://localhost/")?.join(input)?
            }
            Err(e) => return Err(e.into()),
        };

        let mut case_id = None;
        let mut session_id = None;

        let base: Vec<&str> = base_path.split('/').filter(|s| !s.is_empty()).collect();
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if segments.len() > base.len() && segments[..base.len()] == base[..] {
            let rest = &segments[base.len()..];
            case_id = rest.first().map(|s| decode_segment(s)).transpose()?;
            if rest.len() >= 3 && rest[1] == SESSION_SEGMENT {
                session_id = Some(decode_segment(rest[2])?);
            }
        }

        let mut context = NavigationContext::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "caseId" | "case_id" => {
                    if case_id.is_none() {
                        case_id = Some(value.into_owned());
                    }
                }
                "sessionId" | "session_id" => {
                    if session_id.is_none() {
                        session_id = Some(value.into_owned());
                    }
                }
                other => context.insert(other, value.into_owned()),
            }
        }

        Ok(Self::new(case_id, session_id, context))
    }

    pub fn access_pattern(&self) -> AccessPattern {
        reconcile(self.case_id.as_deref(), self.session_id.as_deref())
    }
}

/// Decide the access pattern from the identifiers present on entry.
pub fn reconcile(case_id: Option<&str>, session_id: Option<&str>) -> AccessPattern {
    let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);

    match (present(case_id), present(session_id)) {
        (false, _) => AccessPattern::Invalid,
        (true, false) => AccessPattern::CaseOnly,
        (true, true) => AccessPattern::CaseWithSession,
    }
}

/// The bookmarkable `case+session` address, applied with replace semantics so
/// no extra history entry is created.
pub fn canonical_intent(
    base_path: &str,
    case_id: &str,
    session_id: &str,
    context: &NavigationContext,
) -> NavigationIntent {
    let base = base_path.trim_end_matches('/');
    let mut target = format!(
        "{base}/{}/{SESSION_SEGMENT}/{}",
        urlencoding::encode(case_id),
        urlencoding::encode(session_id)
    );
    if let Some(query) = context.to_query() {
        target.push('?');
        target.push_str(&query);
    }

    NavigationIntent {
        target,
        mode: HistoryMode::Replace,
        context: context.clone(),
    }
}
