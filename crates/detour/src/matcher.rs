//! Redirect resolution over a [`SiteIndex`].
//!
//! Resolution is a pure function of the index snapshot, the request path and
//! query, and the current time. It never errors: the worst case is
//! [`Decision::None`].

use crate::index::{normalize_path, SiteIndex};
use crate::model::{Mode, QueryParams, Rule};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;

/// What the interceptor should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    None,
    SendNow(Arc<Rule>),
    DeferUntilNotFound(Arc<Rule>),
}

impl Decision {
    pub fn rule(&self) -> Option<&Arc<Rule>> {
        match self {
            Decision::None => None,
            Decision::SendNow(rule) | Decision::DeferUntilNotFound(rule) => Some(rule),
        }
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::SendNow(_) => "send_now",
            Decision::DeferUntilNotFound(_) => "defer",
        }
    }

    fn for_rule(rule: Arc<Rule>) -> Self {
        match rule.mode {
            Mode::Immediate => Decision::SendNow(rule),
            Mode::AfterNotFound => Decision::DeferUntilNotFound(rule),
        }
    }
}

/// Resolve a request against one site's index.
///
/// Plain rules are consulted first. Only when none of them survives filtering
/// is the first matching pattern group consulted; later pattern groups are
/// never considered even if the first group filters down to nothing.
pub fn resolve(
    index: &SiteIndex,
    path: &str,
    query: &QueryParams,
    now: DateTime<Utc>,
) -> Decision {
    if path.is_empty() || path == "/" {
        return Decision::None;
    }
    let path = normalize_path(path, index.options().case_insensitive);

    let decision = index
        .lookup_candidates(&path)
        .find_map(|tier| select(tier, query, now))
        .map(Decision::for_rule)
        .unwrap_or(Decision::None);
    decision
}

/// Filter candidates by parameters and validity, then break ties.
///
/// Most source params wins; equal specificity falls back to the lowest id.
pub fn select(
    candidates: Vec<Arc<Rule>>,
    query: &QueryParams,
    now: DateTime<Utc>,
) -> Option<Arc<Rule>> {
    candidates
        .into_iter()
        .filter(|rule| rule.params_match(query) && rule.target.is_valid_at(now))
        .min_by(|a, b| {
            (Reverse(a.specificity()), &a.id).cmp(&(Reverse(b.specificity()), &b.id))
        })
}
