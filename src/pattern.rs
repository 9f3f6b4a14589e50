//! Client-side pattern inspection.
//!
//! Catches the purely syntactic mistakes the backend would reject anyway
//! (missing `gs://`, unterminated `%name`, bad regex, ...) so a bad
//! submission never leaves the terminal, and reports the capture names a
//! query will produce before its first page arrives. Matching itself is
//! the server's business.

use std::sync::LazyLock;

use regex::Regex;

use crate::query::QueryMode;

static CAPTURE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern must start with gs://")]
    MissingScheme,
    #[error("pattern must include bucket and object path")]
    MissingObjectPath,
    #[error("segment {segment}: unterminated capture token")]
    Unterminated { segment: usize },
    #[error("segment {segment}: empty capture name")]
    EmptyName { segment: usize },
    #[error("segment {segment}: invalid capture name: {name}")]
    InvalidName { segment: usize, name: String },
    #[error("duplicate capture name: {0}")]
    Duplicate(String),
    #[error("compile regex: {0}")]
    Regex(String),
}

/// What inspection learned about a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    pub bucket: String,
    pub object_pattern: String,
    pub capture_names: Vec<String>,
}

/// Validate `pattern` for `mode` and list its capture names in order.
pub fn inspect(pattern: &str, mode: QueryMode) -> Result<PatternInfo, PatternError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    let rest = pattern
        .strip_prefix("gs://")
        .ok_or(PatternError::MissingScheme)?;
    let (bucket, object) = rest
        .split_once('/')
        .ok_or(PatternError::MissingObjectPath)?;
    let object = object.trim_start_matches('/');
    if bucket.is_empty() || object.is_empty() {
        return Err(PatternError::MissingObjectPath);
    }

    let capture_names = match mode {
        QueryMode::Percent => percent_captures(object)?,
        QueryMode::Regex => regex_captures(object)?,
    };

    Ok(PatternInfo {
        bucket: bucket.to_string(),
        object_pattern: object.to_string(),
        capture_names,
    })
}

fn percent_captures(object: &str) -> Result<Vec<String>, PatternError> {
    let mut names: Vec<String> = Vec::new();
    for (segment, raw) in object.split('/').enumerate() {
        let mut rest = raw;
        while let Some(pos) = rest.find('%') {
            let after = &rest[pos + 1..];
            // `%%` is a literal percent sign.
            if let Some(tail) = after.strip_prefix('%') {
                rest = tail;
                continue;
            }
            let end = after
                .find('%')
                .ok_or(PatternError::Unterminated { segment })?;
            let name = &after[..end];
            if name.is_empty() {
                return Err(PatternError::EmptyName { segment });
            }
            if !CAPTURE_NAME_RE.is_match(name) {
                return Err(PatternError::InvalidName {
                    segment,
                    name: name.to_string(),
                });
            }
            if names.iter().any(|n| n == name) {
                return Err(PatternError::Duplicate(name.to_string()));
            }
            names.push(name.to_string());
            rest = &after[end + 1..];
        }
    }
    Ok(names)
}

fn regex_captures(object: &str) -> Result<Vec<String>, PatternError> {
    let normalized = object.replace("(?<", "(?P<");
    let body = normalized.trim_start_matches('^').trim_end_matches('$');
    let re = Regex::new(&format!("^{body}$")).map_err(|e| PatternError::Regex(e.to_string()))?;
    Ok(re.capture_names().flatten().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_default_pattern() {
        let info = inspect(
            "gs://wlt-public-sandbox/imgrid-takehome/%exp%/%class%_00.jpg",
            QueryMode::Percent,
        )
        .unwrap();
        assert_eq!(info.bucket, "wlt-public-sandbox");
        assert_eq!(info.object_pattern, "imgrid-takehome/%exp%/%class%_00.jpg");
        assert_eq!(info.capture_names, ["exp", "class"]);
    }

    #[test]
    fn percent_literal_escape() {
        let info = inspect("gs://b/100%%/%name%.png", QueryMode::Percent).unwrap();
        assert_eq!(info.capture_names, ["name"]);
    }

    #[test]
    fn percent_errors() {
        assert_eq!(inspect("", QueryMode::Percent), Err(PatternError::Empty));
        assert_eq!(inspect("s3://b/x", QueryMode::Percent), Err(PatternError::MissingScheme));
        assert_eq!(inspect("gs://bucket", QueryMode::Percent), Err(PatternError::MissingObjectPath));
        assert_eq!(inspect("gs://bucket/", QueryMode::Percent), Err(PatternError::MissingObjectPath));
        assert_eq!(
            inspect("gs://b/a/%exp", QueryMode::Percent),
            Err(PatternError::Unterminated { segment: 1 })
        );
        assert_eq!(
            inspect("gs://b/a-%%%.jpg", QueryMode::Percent),
            Err(PatternError::Unterminated { segment: 0 })
        );
        assert!(matches!(
            inspect("gs://b/%bad name%", QueryMode::Percent),
            Err(PatternError::InvalidName { .. })
        ));
        assert_eq!(
            inspect("gs://b/%x%/%x%", QueryMode::Percent),
            Err(PatternError::Duplicate("x".into()))
        );
    }

    #[test]
    fn regex_named_groups() {
        let info = inspect(
            r"gs://b/imgs/(?P<exp>[^/]+)/(?<class>\w+)_\d+\.jpg",
            QueryMode::Regex,
        )
        .unwrap();
        assert_eq!(info.capture_names, ["exp", "class"]);
    }

    #[test]
    fn regex_invalid() {
        assert!(matches!(
            inspect("gs://b/(?P<x>[a-", QueryMode::Regex),
            Err(PatternError::Regex(_))
        ));
    }

    #[test]
    fn regex_without_groups() {
        let info = inspect(r"gs://b/^.*\.png$", QueryMode::Regex).unwrap();
        assert!(info.capture_names.is_empty());
    }
}
