use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// `chrono::DateTime<Utc>`, named for readability at call sites the way the teacher
/// workspace names its own UTC alias.
pub type UtcDateTime = chrono::DateTime<Utc>;

/// Current time formatted so that lexicographic string order matches chronological
/// order: fixed millisecond precision and a literal `Z` suffix (never `+00:00`).
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

impl IssueLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueLevel::Fatal => "fatal",
            IssueLevel::Error => "error",
            IssueLevel::Warning => "warning",
            IssueLevel::Info => "info",
            IssueLevel::Debug => "debug",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fatal" => Some(IssueLevel::Fatal),
            "error" => Some(IssueLevel::Error),
            "warning" => Some(IssueLevel::Warning),
            "info" => Some(IssueLevel::Info),
            "debug" => Some(IssueLevel::Debug),
            _ => None,
        }
    }
}

impl Default for IssueLevel {
    fn default() -> Self {
        IssueLevel::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Unresolved,
    Resolved,
    Ignored,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Unresolved => "unresolved",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Ignored => "ignored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unresolved" => Some(IssueStatus::Unresolved),
            "resolved" => Some(IssueStatus::Resolved),
            "ignored" => Some(IssueStatus::Ignored),
            _ => None,
        }
    }
}
