//! Validated, immutable redirect rules.

use super::query::QueryParams;
use super::record::{RedirectType, RuleRecord, SourceUrlType};
use crate::error::RuleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable external rule identifier.
///
/// Ordering is "natural": ids that parse as integers compare numerically and
/// sort before non-numeric ids, which compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Rule parts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Plain,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Immediate,
    AfterNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Target {
    /// Rendered content link, only valid inside its window.
    #[serde(rename_all = "camelCase")]
    Content {
        link: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_from: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_to: Option<DateTime<Utc>>,
    },
    /// Literal absolute URL, always valid.
    Url { url: String },
}

impl Target {
    /// Valid once `now >= valid_from` and while `now < valid_to`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Target::Url { .. } => true,
            Target::Content {
                valid_from,
                valid_to,
                ..
            } => {
                valid_from.map_or(true, |from| now >= from) && valid_to.map_or(true, |to| now < to)
            }
        }
    }

    pub fn href(&self) -> &str {
        match self {
            Target::Content { link, .. } => link,
            Target::Url { url } => url,
        }
    }
}

// ============================================================================
// Rule
// ============================================================================

/// One redirect definition. Replaced, never mutated, on edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub source_kind: SourceKind,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_params: Vec<Param>,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_params: Vec<Param>,
    pub mode: Mode,
}

impl Rule {
    /// Validate a raw record and apply the site's root segment to its source.
    pub fn from_record(record: RuleRecord, root_segment: Option<&str>) -> Result<Self, RuleError> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(RuleError::MissingId);
        }
        if record.deleted {
            return Err(RuleError::Deleted(id));
        }
        let source = record.source.trim();
        if source.is_empty() {
            return Err(RuleError::EmptySource(id));
        }

        let target = record
            .target
            .and_then(|t| {
                let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
                match (non_blank(t.link), non_blank(t.url)) {
                    (Some(link), _) => Some(Target::Content {
                        link,
                        valid_from: t.valid_from,
                        valid_to: t.valid_to,
                    }),
                    (None, Some(url)) => Some(Target::Url { url }),
                    (None, None) => None,
                }
            })
            .ok_or_else(|| RuleError::MissingTarget(id.clone()))?;

        let source_kind = match record.source_url_type {
            SourceUrlType::Plain => SourceKind::Plain,
            SourceUrlType::Regex => SourceKind::Pattern,
        };
        let segment = root_segment.and_then(normalize_segment);
        let source_path = match source_kind {
            SourceKind::Plain => prefix_plain(segment.as_deref(), source),
            SourceKind::Pattern => prefix_pattern(segment.as_deref(), source),
        };

        let source_params = record
            .source_params
            .into_iter()
            .filter_map(|p| {
                let supported = p
                    .operator
                    .as_deref()
                    .map_or(true, |op| op.eq_ignore_ascii_case("equals"));
                if p.name.is_empty() || p.value.is_empty() || !supported {
                    warn!("Cannot parse source param '{}' for redirect {}", p.name, id);
                    None
                } else {
                    Some(Param::new(p.name, p.value))
                }
            })
            .collect();

        let target_params = record
            .target_params
            .into_iter()
            .filter_map(|p| {
                if p.name.is_empty() || p.value.is_empty() {
                    warn!("Cannot parse target param '{}' for redirect {}", p.name, id);
                    None
                } else {
                    Some(Param::new(p.name, p.value))
                }
            })
            .collect();

        let mode = match record.redirect_type {
            RedirectType::Always => Mode::Immediate,
            RedirectType::AfterNotFound => Mode::AfterNotFound,
        };

        Ok(Self {
            id: RuleId::new(id),
            source_kind,
            source_path,
            source_params,
            target,
            target_params,
            mode,
        })
    }

    /// Specificity used for tie-breaking.
    pub fn specificity(&self) -> usize {
        self.source_params.len()
    }

    /// Every source param has a case-insensitively equal value in the request.
    ///
    /// Values are compared by their Unicode lowercase forms, the same folding
    /// applied to plain source paths.
    pub fn params_match(&self, query: &QueryParams) -> bool {
        self.source_params.iter().all(|param| {
            let expected = param.value.to_lowercase();
            query
                .values(&param.name)
                .any(|value| value.to_lowercase() == expected)
        })
    }

    /// Build the redirect location for a request.
    pub fn location(&self, request_query: &QueryParams, keep_source_params: bool) -> String {
        let mut location = self.target.href().to_string();
        let mut has_query = location.contains('?');

        let request_params = keep_source_params
            .then(|| request_query.iter())
            .into_iter()
            .flatten();
        let params = self
            .target_params
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .chain(request_params);

        for (name, value) in params {
            location.push(if has_query { '&' } else { '?' });
            has_query = true;
            location.push_str(&urlencoding::encode(name));
            location.push('=');
            location.push_str(&urlencoding::encode(value));
        }
        location
    }
}

fn normalize_segment(segment: &str) -> Option<String> {
    let trimmed = segment.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{}", trimmed.to_lowercase()))
}

fn prefix_plain(segment: Option<&str>, source: &str) -> String {
    let slash = if source.starts_with('/') { "" } else { "/" };
    format!("{}{slash}{source}", segment.unwrap_or(""))
}

fn prefix_pattern(segment: Option<&str>, source: &str) -> String {
    let Some(segment) = segment else {
        return source.to_string();
    };
    let escaped = regex::escape(segment);
    match source.strip_prefix('^') {
        Some(rest) => format!("^{escaped}{rest}"),
        None => format!("{escaped}{source}"),
    }
}
