//! Error types shared across the redirect engine.
//!
//! None of these ever reach the request path: the maintainer absorbs them and
//! the matcher only ever produces decisions.

use thiserror::Error;

/// Why a raw record could not become a [`crate::model::Rule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("record has no id")]
    MissingId,
    #[error("rule {0} has an empty source")]
    EmptySource(String),
    #[error("rule {0} has neither a target link nor a target url")]
    MissingTarget(String),
    #[error("rule {0} is flagged as deleted")]
    Deleted(String),
}

/// Failures raised while mutating a [`crate::index::SiteIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Warning level: the rule is skipped, the rest of the index is unaffected.
    #[error("rule {id}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        id: String,
        pattern: String,
        reason: String,
    },
    #[error("rule {0} is indexed more than once")]
    Invariant(String),
}

impl IndexError {
    pub fn is_warning(&self) -> bool {
        matches!(self, IndexError::InvalidPattern { .. })
    }
}

/// Failures reported by a [`crate::source::RuleSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The site has no rules source at all (configuration error).
    #[error("no rules source for site '{0}'")]
    NotFound(String),
    /// The source exists but could not be read right now.
    #[error("rules source unavailable: {0}")]
    Unavailable(String),
    /// The source was read but its content could not be parsed.
    #[error("malformed rules source: {0}")]
    Malformed(String),
}

/// Why a site rebuild did not install a new index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebuildError {
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The freshly built index failed its consistency check.
    #[error("rebuilt index rejected: {0}")]
    Index(#[from] IndexError),
}

/// Errors surfaced by the maintainer's public entry points.
#[derive(Debug, Error)]
pub enum MaintainerError {
    #[error("unknown site '{0}'")]
    UnknownSite(String),
    #[error("maintainer is shut down")]
    ShutDown,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_warning() {
        let err = IndexError::InvalidPattern {
            id: "7".into(),
            pattern: "(".into(),
            reason: "unclosed group".into(),
        };
        assert!(err.is_warning());
        assert!(!IndexError::Invariant("7".into()).is_warning());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SourceError::NotFound("corporate".into()).to_string(),
            "no rules source for site 'corporate'"
        );
        assert_eq!(
            RebuildError::from(SourceError::Unavailable("timeout".into())).to_string(),
            "rules source unavailable: timeout"
        );
        assert_eq!(
            RebuildError::from(IndexError::Invariant("7".into())).to_string(),
            "rebuilt index rejected: rule 7 is indexed more than once"
        );
        assert_eq!(
            RuleError::MissingTarget("42".into()).to_string(),
            "rule 42 has neither a target link nor a target url"
        );
    }
}
