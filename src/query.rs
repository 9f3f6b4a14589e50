//! Query identity: pattern + mode key, continuation cursor, version tag.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the backend interprets placeholders in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// `%name%` placeholders, everything else literal.
    #[default]
    Percent,
    /// Regular expression with named groups.
    Regex,
}

impl QueryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Percent => "percent",
            QueryMode::Regex => "regex",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            QueryMode::Percent => QueryMode::Regex,
            QueryMode::Regex => QueryMode::Percent,
        }
    }

    /// Parse a user-supplied mode name. Empty input means percent.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "percent" => Some(QueryMode::Percent),
            "regex" => Some(QueryMode::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque query key. Two submissions with equal keys still get distinct versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
    pub pattern: String,
    pub mode: QueryMode,
}

impl QueryKey {
    pub fn new(pattern: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
        }
    }
}

/// Monotonic tag identifying one submitted query.
///
/// Replies carry the version they were requested under; anything that does
/// not match the current version is stale and must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueryVersion(pub u64);

impl QueryVersion {
    pub fn next(self) -> Self {
        QueryVersion(self.0 + 1)
    }
}

impl fmt::Display for QueryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Continuation token returned by a page. Never interpreted client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);
