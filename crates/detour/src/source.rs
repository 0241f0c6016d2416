//! Rule sources: where raw rule records come from.
//!
//! The maintainer only talks to the [`RuleSource`] trait. Calls are blocking
//! and are made from the maintainer's worker threads, never from request
//! handling.

use crate::error::SourceError;
use crate::model::{RuleFile, RuleRecord, SiteId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of truth for redirect rules.
pub trait RuleSource: Send + Sync {
    /// All records of a site, used by rebuilds.
    fn fetch_rules_for_site(&self, site: &str) -> Result<Vec<RuleRecord>, SourceError>;

    /// One record, or `None` when it no longer exists.
    fn fetch_rule_by_id(&self, site: &str, id: &str) -> Result<Option<RuleRecord>, SourceError> {
        Ok(self
            .fetch_rules_for_site(site)?
            .into_iter()
            .find(|r| r.id == id && !r.deleted))
    }

    /// Site owning a record, for change events that carry none.
    fn locate_rule(&self, id: &str) -> Result<Option<SiteId>, SourceError>;
}

// ============================================================================
// File source
// ============================================================================

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// One rule file per site: `<dir>/<site>.yaml`, `.yml` or `.json`.
#[derive(Debug, Clone)]
pub struct FileRuleSource {
    dir: PathBuf,
}

impl FileRuleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn site_file(&self, site: &str) -> Option<PathBuf> {
        if site.is_empty() || site.contains(['/', '\\']) || site.contains("..") {
            return None;
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{site}.{ext}")))
            .find(|path| path.is_file())
    }

    fn read_file(path: &Path) -> Result<Vec<RuleRecord>, SourceError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let file: RuleFile = if is_json {
            serde_json::from_str(&contents)
                .map_err(|e| SourceError::Malformed(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| SourceError::Malformed(format!("{}: {e}", path.display())))?
        };
        Ok(file.into_records())
    }

    /// Site ids that currently have a rule file.
    pub fn list_sites(&self) -> Result<Vec<SiteId>, SourceError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.dir.display())))?;
        let mut sites: Vec<SiteId> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| EXTENSIONS.contains(&e))
            })
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect();
        sites.sort();
        sites.dedup();
        Ok(sites)
    }
}

impl RuleSource for FileRuleSource {
    fn fetch_rules_for_site(&self, site: &str) -> Result<Vec<RuleRecord>, SourceError> {
        let path = self
            .site_file(site)
            .ok_or_else(|| SourceError::NotFound(site.to_string()))?;
        debug!("Reading rules for site {} from {}", site, path.display());
        Self::read_file(&path)
    }

    fn locate_rule(&self, id: &str) -> Result<Option<SiteId>, SourceError> {
        for site in self.list_sites()? {
            match self.fetch_rules_for_site(&site) {
                Ok(records) if records.iter().any(|r| r.id == id) => return Ok(Some(site)),
                Ok(_) => {}
                Err(e) => warn!("Skipping site {} while locating rule {}: {}", site, id, e),
            }
        }
        Ok(None)
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// In-process source for embedders and tests.
///
/// Supports injected latency and per-site failures to exercise the maintainer's
/// timeout and retry paths. Records are read when a call starts and handed back
/// after the latency, the way a slow remote source answers with data that may
/// have changed in the meantime.
#[derive(Debug, Default)]
pub struct MemoryRuleSource {
    sites: RwLock<HashMap<SiteId, Vec<RuleRecord>>>,
    failures: RwLock<HashMap<SiteId, SourceError>>,
    latency: RwLock<Duration>,
    site_latency: RwLock<HashMap<SiteId, Duration>>,
    item_latency: RwLock<HashMap<SiteId, Duration>>,
    site_fetches: AtomicU64,
}

impl MemoryRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all records of a site (creating it if needed).
    pub fn set_site(&self, site: &str, records: Vec<RuleRecord>) {
        self.sites.write().insert(site.to_string(), records);
    }

    pub fn remove_site(&self, site: &str) {
        self.sites.write().remove(site);
    }

    /// Insert or replace one record by id.
    pub fn put_rule(&self, site: &str, record: RuleRecord) {
        let mut sites = self.sites.write();
        let records = sites.entry(site.to_string()).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn delete_rule(&self, site: &str, id: &str) {
        if let Some(records) = self.sites.write().get_mut(site) {
            records.retain(|r| r.id != id);
        }
    }

    /// Make every call for `site` fail with `error` until cleared with `None`.
    pub fn set_failure(&self, site: &str, error: Option<SourceError>) {
        let mut failures = self.failures.write();
        match error {
            Some(error) => failures.insert(site.to_string(), error),
            None => failures.remove(site),
        };
    }

    /// Latency of every call for sites without a per-site override.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Latency of full-site fetches for one site; `None` falls back to [`Self::set_latency`].
    pub fn set_site_latency(&self, site: &str, latency: Option<Duration>) {
        set_override(&self.site_latency, site, latency);
    }

    /// Latency of single-record fetches for one site; `None` falls back to [`Self::set_latency`].
    pub fn set_item_latency(&self, site: &str, latency: Option<Duration>) {
        set_override(&self.item_latency, site, latency);
    }

    /// Number of full-site fetches served so far.
    pub fn site_fetches(&self) -> u64 {
        self.site_fetches.load(Ordering::SeqCst)
    }

    /// Deliver `answer` after the configured latency, unless a failure is injected.
    fn respond<T>(
        &self,
        site: &str,
        overrides: &RwLock<HashMap<SiteId, Duration>>,
        answer: Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let latency = overrides
            .read()
            .get(site)
            .copied()
            .unwrap_or_else(|| *self.latency.read());
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        match self.failures.read().get(site) {
            Some(error) => Err(error.clone()),
            None => answer,
        }
    }
}

fn set_override(map: &RwLock<HashMap<SiteId, Duration>>, site: &str, latency: Option<Duration>) {
    let mut map = map.write();
    match latency {
        Some(latency) => map.insert(site.to_string(), latency),
        None => map.remove(site),
    };
}

impl RuleSource for MemoryRuleSource {
    fn fetch_rules_for_site(&self, site: &str) -> Result<Vec<RuleRecord>, SourceError> {
        self.site_fetches.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .sites
            .read()
            .get(site)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(site.to_string()));
        self.respond(site, &self.site_latency, answer)
    }

    fn fetch_rule_by_id(&self, site: &str, id: &str) -> Result<Option<RuleRecord>, SourceError> {
        let answer = self
            .sites
            .read()
            .get(site)
            .ok_or_else(|| SourceError::NotFound(site.to_string()))
            .map(|records| records.iter().find(|r| r.id == id && !r.deleted).cloned());
        self.respond(site, &self.item_latency, answer)
    }

    fn locate_rule(&self, id: &str) -> Result<Option<SiteId>, SourceError> {
        Ok(self
            .sites
            .read()
            .iter()
            .find(|(_, records)| records.iter().any(|r| r.id == id))
            .map(|(site, _)| site.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(id: &str, source: &str) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            source: source.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_source_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("corporate.yaml"),
            "rules:\n  - id: 1\n    source: /old\n    target:\n      link: /new\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("shop.json"),
            r#"[{"id": "7", "source": "/cart", "target": {"url": "https://shop.example/"}}]"#,
        )
        .unwrap();

        let source = FileRuleSource::new(dir.path());
        assert_eq!(source.list_sites().unwrap(), vec!["corporate", "shop"]);

        let records = source.fetch_rules_for_site("corporate").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "1");

        let record = source.fetch_rule_by_id("shop", "7").unwrap().unwrap();
        assert_eq!(record.source, "/cart");
        assert!(source.fetch_rule_by_id("shop", "8").unwrap().is_none());

        assert_eq!(source.locate_rule("7").unwrap().as_deref(), Some("shop"));
        assert_eq!(source.locate_rule("99").unwrap(), None);
    }

    #[test]
    fn test_file_source_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.yaml"), "rules: [ {").unwrap();
        let source = FileRuleSource::new(dir.path());

        assert_eq!(
            source.fetch_rules_for_site("missing"),
            Err(SourceError::NotFound("missing".into()))
        );
        assert!(matches!(
            source.fetch_rules_for_site("broken"),
            Err(SourceError::Malformed(_))
        ));
        assert!(matches!(
            source.fetch_rules_for_site("../etc"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_deleted_record_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("site.yaml"),
            "- id: 1\n  source: /a\n  deleted: true\n",
        )
        .unwrap();
        let source = FileRuleSource::new(dir.path());
        assert!(source.fetch_rule_by_id("site", "1").unwrap().is_none());
    }

    #[test]
    fn test_memory_source() {
        let source = MemoryRuleSource::new();
        source.put_rule("a", record("1", "/x"));
        source.put_rule("a", record("1", "/y"));
        source.put_rule("a", record("2", "/z"));

        let records = source.fetch_rules_for_site("a").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "/y");
        assert_eq!(source.site_fetches(), 1);

        source.delete_rule("a", "1");
        assert!(source.fetch_rule_by_id("a", "1").unwrap().is_none());
        assert_eq!(source.locate_rule("2").unwrap().as_deref(), Some("a"));

        source.set_failure("a", Some(SourceError::Unavailable("down".into())));
        assert!(source.fetch_rules_for_site("a").is_err());
        source.set_failure("a", None);
        assert!(source.fetch_rules_for_site("a").is_ok());

        assert_eq!(
            source.fetch_rules_for_site("b"),
            Err(SourceError::NotFound("b".into()))
        );
    }

    #[test]
    fn test_memory_source_latency_per_site() {
        let source = MemoryRuleSource::new();
        source.set_site("slow", vec![record("1", "/x")]);
        source.set_site("fast", vec![record("1", "/y")]);
        source.set_site_latency("slow", Some(Duration::from_millis(80)));

        let started = std::time::Instant::now();
        source.fetch_rules_for_site("fast").unwrap();
        source.fetch_rule_by_id("slow", "1").unwrap();
        assert!(started.elapsed() < Duration::from_millis(80));

        source.fetch_rules_for_site("slow").unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));

        source.set_site_latency("slow", None);
        let started = std::time::Instant::now();
        source.fetch_rules_for_site("slow").unwrap();
        assert!(started.elapsed() < Duration::from_millis(80));
    }

    #[test]
    fn test_memory_source_answers_with_state_at_call_start() {
        let source = std::sync::Arc::new(MemoryRuleSource::new());
        source.set_site("corporate", vec![record("1", "/before")]);
        source.set_item_latency("corporate", Some(Duration::from_millis(100)));

        let call = {
            let source = std::sync::Arc::clone(&source);
            std::thread::spawn(move || source.fetch_rule_by_id("corporate", "1"))
        };
        std::thread::sleep(Duration::from_millis(30));
        source.put_rule("corporate", record("1", "/after"));

        let answered = call.join().unwrap().unwrap().unwrap();
        assert_eq!(answered.source, "/before");
    }
}
