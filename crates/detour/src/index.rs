//! Per-site redirect index.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          SiteIndex                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  plain: DashMap<normalized path, Vec<Rule>>     O(1) lookup  │
//! │  patterns: RwLock<Vec<PatternGroup>>            O(p) scan    │
//! │      (insertion order; first full match wins)                │
//! │  locations: DashMap<RuleId, Location>           O(1) remove  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups never take a global lock: plain lookups lock one shard of the
//! concurrent map, pattern scans share a read lock that writers only hold for
//! the structural edit itself (compilation happens before the lock is taken).
//!
//! Mutations must be serialized per site by the caller. The index still tolerates
//! lookups racing any mutation; a lookup may observe the state before or after a
//! given upsert, and briefly neither version while the rule is being replaced.

use crate::error::IndexError;
use crate::model::{Rule, RuleId, SourceKind};
use dashmap::DashMap;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::iter;
use std::sync::Arc;
use tracing::{error, warn};

/// Normalization options fixed for the lifetime of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Fold request paths, plain keys and patterns to lowercase matching.
    pub case_insensitive: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            case_insensitive: true,
        }
    }
}

/// Normalize a path for plain-key storage and lookup.
///
/// Percent-decodes, strips one trailing slash and folds case when configured.
pub fn normalize_path(path: &str, case_insensitive: bool) -> String {
    let decoded = urlencoding::decode(path)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let trimmed = decoded.strip_suffix('/').unwrap_or(&decoded);
    if case_insensitive {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Plain(String),
    Pattern(String),
}

struct PatternGroup {
    source: String,
    regex: Regex,
    rules: Vec<Arc<Rule>>,
}

/// Concurrent lookup structure over one site's rules.
pub struct SiteIndex {
    options: IndexOptions,
    plain: DashMap<String, Vec<Arc<Rule>>>,
    patterns: RwLock<Vec<PatternGroup>>,
    locations: DashMap<RuleId, Location>,
}

impl SiteIndex {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            plain: DashMap::new(),
            patterns: RwLock::new(Vec::new()),
            locations: DashMap::new(),
        }
    }

    /// Bulk construction used by rebuilds; per-rule failures are returned, not fatal.
    pub fn build(
        rules: impl IntoIterator<Item = Rule>,
        options: IndexOptions,
    ) -> (Self, Vec<IndexError>) {
        let index = Self::new(options);
        let errors = rules
            .into_iter()
            .filter_map(|rule| index.replace(rule).err())
            .collect();
        (index, errors)
    }

    pub fn options(&self) -> IndexOptions {
        self.options
    }

    /// Replace any existing rule with the same id, then insert `rule`.
    ///
    /// An invalid pattern drops the rule but still removes the previous version.
    /// Afterwards the id must be held by exactly one list; anything else is
    /// reported as [`IndexError::Invariant`].
    pub fn upsert(&self, rule: Rule) -> Result<(), IndexError> {
        let id = rule.id.clone();
        self.replace(rule)?;
        self.verify_single_location(&id)
    }

    fn replace(&self, rule: Rule) -> Result<(), IndexError> {
        self.remove(&rule.id);

        let rule = Arc::new(rule);
        match rule.source_kind {
            SourceKind::Plain => {
                let key = normalize_path(&rule.source_path, self.options.case_insensitive);
                self.locations
                    .insert(rule.id.clone(), Location::Plain(key.clone()));
                self.plain.entry(key).or_default().push(rule);
            }
            SourceKind::Pattern => {
                let regex = self.compile(&rule)?;
                let source = rule.source_path.clone();
                self.locations
                    .insert(rule.id.clone(), Location::Pattern(source.clone()));

                let mut groups = self.patterns.write();
                match groups.iter_mut().find(|g| g.source == source) {
                    Some(group) => group.rules.push(rule),
                    None => groups.push(PatternGroup {
                        source,
                        regex,
                        rules: vec![rule],
                    }),
                }
            }
        }
        Ok(())
    }

    /// Remove the rule with `id`. Returns whether anything was removed.
    pub fn remove(&self, id: &RuleId) -> bool {
        let Some((_, location)) = self.locations.remove(id) else {
            return false;
        };

        match location {
            Location::Plain(key) => {
                // remove_if keeps the empty-check and the removal atomic for this key
                if let Some(mut rules) = self.plain.get_mut(&key) {
                    rules.retain(|r| &r.id != id);
                }
                self.plain.remove_if(&key, |_, rules| rules.is_empty());
            }
            Location::Pattern(source) => {
                let mut groups = self.patterns.write();
                if let Some(pos) = groups.iter().position(|g| g.source == source) {
                    groups[pos].rules.retain(|r| &r.id != id);
                    if groups[pos].rules.is_empty() {
                        groups.remove(pos);
                    }
                }
            }
        }
        true
    }

    /// Rules registered for exactly this normalized path.
    pub fn plain_candidates(&self, path: &str) -> Vec<Arc<Rule>> {
        self.plain
            .get(path)
            .map(|rules| rules.value().clone())
            .unwrap_or_default()
    }

    /// Rules of the first pattern group, in insertion order, that fully matches `path`.
    pub fn pattern_candidates(&self, path: &str) -> Vec<Arc<Rule>> {
        self.patterns
            .read()
            .iter()
            .find(|group| group.regex.is_match(path))
            .map(|group| group.rules.clone())
            .unwrap_or_default()
    }

    /// Candidate tiers for `path`: the plain list, then the first matching
    /// pattern group. Empty tiers are skipped.
    ///
    /// Tiers are produced lazily, so the pattern scan only runs when the caller
    /// moves past the plain tier. `path` must already be normalized with
    /// [`normalize_path`].
    pub fn lookup_candidates<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = Vec<Arc<Rule>>> + 'a {
        iter::once_with(move || self.plain_candidates(path))
            .chain(iter::once_with(move || self.pattern_candidates(path)))
            .filter(|tier| !tier.is_empty())
    }

    pub fn contains(&self, id: &RuleId) -> bool {
        self.locations.contains_key(id)
    }

    pub fn get(&self, id: &RuleId) -> Option<Arc<Rule>> {
        let location = self.locations.get(id)?.value().clone();
        match location {
            Location::Plain(key) => self
                .plain
                .get(&key)?
                .iter()
                .find(|r| &r.id == id)
                .cloned(),
            Location::Pattern(source) => self
                .patterns
                .read()
                .iter()
                .find(|g| g.source == source)?
                .rules
                .iter()
                .find(|r| &r.id == id)
                .cloned(),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn plain_key_count(&self) -> usize {
        self.plain.len()
    }

    pub fn pattern_group_count(&self) -> usize {
        self.patterns.read().len()
    }

    /// All rules, ordered by id.
    pub fn rules(&self) -> Vec<Arc<Rule>> {
        let mut rules: Vec<Arc<Rule>> = self
            .plain
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        rules.extend(
            self.patterns
                .read()
                .iter()
                .flat_map(|g| g.rules.iter().cloned()),
        );
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Verify that every id lives in exactly one list.
    ///
    /// Violations are construction bugs; they are logged loudly and reported.
    pub fn check_invariants(&self) -> Result<(), IndexError> {
        let mut seen = HashSet::new();
        for entry in self.plain.iter() {
            for rule in entry.value() {
                if !seen.insert(rule.id.clone()) {
                    error!("Invariant violated: rule {} indexed twice", rule.id);
                    return Err(IndexError::Invariant(rule.id.to_string()));
                }
            }
        }
        for group in self.patterns.read().iter() {
            for rule in &group.rules {
                if !seen.insert(rule.id.clone()) {
                    error!(
                        "Invariant violated: rule {} in both plain and pattern indexes",
                        rule.id
                    );
                    return Err(IndexError::Invariant(rule.id.to_string()));
                }
            }
        }
        Ok(())
    }

    fn verify_single_location(&self, id: &RuleId) -> Result<(), IndexError> {
        let in_plain: usize = self
            .plain
            .iter()
            .map(|entry| entry.value().iter().filter(|r| &r.id == id).count())
            .sum();
        let in_patterns: usize = self
            .patterns
            .read()
            .iter()
            .map(|g| g.rules.iter().filter(|r| &r.id == id).count())
            .sum();
        if in_plain + in_patterns > 1 {
            error!(
                "Invariant violated: rule {} indexed {} times ({} plain, {} pattern)",
                id,
                in_plain + in_patterns,
                in_plain,
                in_patterns
            );
            return Err(IndexError::Invariant(id.to_string()));
        }
        Ok(())
    }

    /// Push a rule into the plain map without any bookkeeping.
    #[cfg(test)]
    pub(crate) fn insert_stray(&self, rule: Rule) {
        let key = normalize_path(&rule.source_path, self.options.case_insensitive);
        self.plain.entry(key).or_default().push(Arc::new(rule));
    }

    fn compile(&self, rule: &Rule) -> Result<Regex, IndexError> {
        RegexBuilder::new(&format!("^(?:{})$", rule.source_path))
            .case_insensitive(self.options.case_insensitive)
            .build()
            .map_err(|e| {
                warn!(
                    "Skipping redirect {}: invalid pattern '{}'",
                    rule.id, rule.source_path
                );
                IndexError::InvalidPattern {
                    id: rule.id.to_string(),
                    pattern: rule.source_path.clone(),
                    reason: e.to_string(),
                }
            })
    }
}

impl Default for SiteIndex {
    fn default() -> Self {
        Self::new(IndexOptions::default())
    }
}

impl std::fmt::Debug for SiteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteIndex")
            .field("options", &self.options)
            .field("rules", &self.len())
            .field("plain_keys", &self.plain_key_count())
            .field("pattern_groups", &self.pattern_group_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, Param, Target};

    fn make_rule(id: &str, kind: SourceKind, source: &str) -> Rule {
        Rule {
            id: RuleId::new(id),
            source_kind: kind,
            source_path: source.to_string(),
            source_params: vec![],
            target: Target::Content {
                link: format!("/target-{id}"),
                valid_from: None,
                valid_to: None,
            },
            target_params: vec![],
            mode: Mode::Immediate,
        }
    }

    fn ids(rules: &[Arc<Rule>]) -> Vec<&str> {
        rules.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/Old/", true), "/old");
        assert_eq!(normalize_path("/Old/", false), "/Old");
        assert_eq!(normalize_path("/caf%C3%A9", true), "/café");
        assert_eq!(normalize_path("/a//", true), "/a/");
        assert_eq!(normalize_path("/bad%zz", true), "/bad%zz");
    }

    #[test]
    fn test_plain_lookup() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/Old/")).unwrap();
        index
            .upsert(make_rule("2", SourceKind::Plain, "/old%20page"))
            .unwrap();

        assert_eq!(ids(&index.plain_candidates("/old")), vec!["1"]);
        assert_eq!(ids(&index.plain_candidates("/old page")), vec!["2"]);
        assert!(index.plain_candidates("/other").is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_shared_plain_key() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/search")).unwrap();
        let mut specific = make_rule("2", SourceKind::Plain, "/search");
        specific.source_params = vec![Param::new("q", "legacy")];
        index.upsert(specific).unwrap();

        assert_eq!(ids(&index.plain_candidates("/search")), vec!["1", "2"]);
        assert_eq!(index.plain_key_count(), 1);
    }

    #[test]
    fn test_idempotent_upsert() {
        let index = SiteIndex::default();
        let rule = make_rule("1", SourceKind::Plain, "/old");
        index.upsert(rule.clone()).unwrap();
        index.upsert(rule).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(ids(&index.plain_candidates("/old")), vec!["1"]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_upsert_moves_changed_path() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/a")).unwrap();
        index.upsert(make_rule("1", SourceKind::Plain, "/b")).unwrap();

        assert!(index.plain_candidates("/a").is_empty());
        assert_eq!(ids(&index.plain_candidates("/b")), vec!["1"]);
        assert_eq!(index.plain_key_count(), 1);
    }

    #[test]
    fn test_kind_migration() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/blog")).unwrap();
        index
            .upsert(make_rule("1", SourceKind::Pattern, "/blog/.*"))
            .unwrap();

        assert_eq!(index.plain_key_count(), 0);
        assert_eq!(index.pattern_group_count(), 1);
        assert_eq!(ids(&index.pattern_candidates("/blog/post")), vec!["1"]);

        index.upsert(make_rule("1", SourceKind::Plain, "/blog")).unwrap();
        assert_eq!(index.pattern_group_count(), 0);
        assert_eq!(ids(&index.plain_candidates("/blog")), vec!["1"]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_invalid_pattern_removes_previous() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/old")).unwrap();

        let err = index
            .upsert(make_rule("1", SourceKind::Pattern, "/old/(unclosed"))
            .unwrap_err();
        assert!(err.is_warning());
        assert!(!index.contains(&RuleId::new("1")));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_drops_empty_lists() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/a")).unwrap();
        index.upsert(make_rule("2", SourceKind::Plain, "/a")).unwrap();
        index.upsert(make_rule("3", SourceKind::Pattern, "/p/.*")).unwrap();

        assert!(index.remove(&RuleId::new("1")));
        assert_eq!(index.plain_key_count(), 1);
        assert!(index.remove(&RuleId::new("2")));
        assert_eq!(index.plain_key_count(), 0);
        assert!(index.remove(&RuleId::new("3")));
        assert_eq!(index.pattern_group_count(), 0);
        assert!(!index.remove(&RuleId::new("3")));
        assert!(index.is_empty());
    }

    #[test]
    fn test_pattern_insertion_order() {
        let index = SiteIndex::default();
        index.upsert(make_rule("5", SourceKind::Pattern, "/blog/.*")).unwrap();
        index.upsert(make_rule("1", SourceKind::Pattern, "/.*")).unwrap();
        index.upsert(make_rule("9", SourceKind::Pattern, "/blog/.*")).unwrap();

        assert_eq!(ids(&index.pattern_candidates("/blog/x")), vec!["5", "9"]);
        assert_eq!(ids(&index.pattern_candidates("/news")), vec!["1"]);
    }

    #[test]
    fn test_pattern_full_match_only() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Pattern, "/blog")).unwrap();
        assert!(index.pattern_candidates("/blog/post").is_empty());
        assert!(index.pattern_candidates("/x/blog").is_empty());
        assert_eq!(ids(&index.pattern_candidates("/blog")), vec!["1"]);
    }

    #[test]
    fn test_pattern_case_sensitivity() {
        let insensitive = SiteIndex::default();
        insensitive
            .upsert(make_rule("1", SourceKind::Pattern, "^/Blog/.*$"))
            .unwrap();
        assert_eq!(insensitive.pattern_candidates("/blog/x").len(), 1);

        let sensitive = SiteIndex::new(IndexOptions {
            case_insensitive: false,
        });
        sensitive
            .upsert(make_rule("1", SourceKind::Pattern, "^/Blog/.*$"))
            .unwrap();
        assert!(sensitive.pattern_candidates("/blog/x").is_empty());
    }

    #[test]
    fn test_lookup_tiers() {
        let index = SiteIndex::default();
        index.upsert(make_rule("1", SourceKind::Plain, "/blog")).unwrap();
        index.upsert(make_rule("2", SourceKind::Pattern, "/bl.*")).unwrap();
        index.upsert(make_rule("3", SourceKind::Pattern, "/b.*")).unwrap();

        let tiers: Vec<Vec<Arc<Rule>>> = index.lookup_candidates("/blog").collect();
        assert_eq!(tiers.len(), 2);
        assert_eq!(ids(&tiers[0]), vec!["1"]);
        assert_eq!(ids(&tiers[1]), vec!["2"]);

        let tiers: Vec<Vec<Arc<Rule>>> = index.lookup_candidates("/blast").collect();
        assert_eq!(tiers.len(), 1);
        assert_eq!(ids(&tiers[0]), vec!["2"]);

        assert_eq!(index.lookup_candidates("/news").count(), 0);
    }

    #[test]
    fn test_upsert_reports_rule_held_twice() {
        let index = SiteIndex::default();
        index.insert_stray(make_rule("1", SourceKind::Plain, "/stale"));

        let err = index
            .upsert(make_rule("1", SourceKind::Pattern, "/blog/.*"))
            .unwrap_err();
        assert!(matches!(&err, IndexError::Invariant(id) if id == "1"));
        assert!(!err.is_warning());
        assert!(index.check_invariants().is_err());

        // a clean id is unaffected
        index.upsert(make_rule("2", SourceKind::Plain, "/ok")).unwrap();
    }

    #[test]
    fn test_build_collects_errors() {
        let (index, errors) = SiteIndex::build(
            vec![
                make_rule("1", SourceKind::Plain, "/a"),
                make_rule("2", SourceKind::Pattern, "(("),
                make_rule("3", SourceKind::Pattern, "/b/.*"),
            ],
            IndexOptions::default(),
        );
        assert_eq!(index.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(ids(&index.rules()), vec!["1", "3"]);
        assert_eq!(
            index.get(&RuleId::new("3")).map(|r| r.source_path.clone()),
            Some("/b/.*".to_string())
        );
    }

    #[test]
    fn test_concurrent_lookup_during_updates() {
        let index = Arc::new(SiteIndex::default());
        index.upsert(make_rule("0", SourceKind::Plain, "/stable")).unwrap();

        let reader = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    assert_eq!(index.plain_candidates("/stable").len(), 1);
                    let _ = index.pattern_candidates("/churn/x");
                }
            })
        };

        for i in 0..500 {
            let kind = if i % 2 == 0 {
                SourceKind::Plain
            } else {
                SourceKind::Pattern
            };
            index.upsert(make_rule("1", kind, "/churn/.*")).unwrap();
        }
        reader.join().unwrap();
        assert_eq!(index.len(), 2);
        index.check_invariants().unwrap();
    }
}
