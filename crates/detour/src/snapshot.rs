//! On-disk snapshot of every site's index.
//!
//! A snapshot lets a restarted proxy serve redirects before its first rebuild
//! completes. Restored indexes are installed provisionally; the bootstrap
//! rebuild always follows and replaces them.

use crate::index::{IndexOptions, SiteIndex};
use crate::maintainer::IndexMaintainer;
use crate::model::{Rule, SiteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub sites: BTreeMap<SiteId, Vec<Rule>>,
}

impl Snapshot {
    /// Copy the live index of every site that has one.
    pub fn capture(maintainer: &IndexMaintainer) -> Self {
        let sites = maintainer
            .sites()
            .into_iter()
            .filter_map(|site| {
                let index = maintainer.index(&site)?;
                let rules = index.rules().iter().map(|r| r.as_ref().clone()).collect();
                Some((site, rules))
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            sites,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.sites.values().map(Vec::len).sum()
    }

    /// Write as pretty JSON. The file is replaced atomically.
    pub fn save(&self, path: &Path) -> Result<(), io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        info!(
            "Saved snapshot of {} sites ({} rules) to {:?}",
            self.sites.len(),
            self.rule_count(),
            path
        );
        Ok(())
    }

    /// Read a snapshot; a missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, io::Error> {
        if !path.exists() {
            debug!("Snapshot file {:?} does not exist, starting cold", path);
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            ));
        }
        Ok(Some(snapshot))
    }

    /// Build one index per site. Rules that no longer compile are skipped.
    pub fn into_indexes(self, options: IndexOptions) -> Vec<(SiteId, SiteIndex)> {
        self.sites
            .into_iter()
            .map(|(site, rules)| {
                let (index, errors) = SiteIndex::build(rules, options);
                for e in errors {
                    warn!("Snapshot for site {}: {}", site, e);
                }
                (site, index)
            })
            .collect()
    }
}

/// Capture and write the maintainer's indexes. Returns the number of sites saved.
pub fn save(path: &Path, maintainer: &IndexMaintainer) -> Result<usize, io::Error> {
    let snapshot = Snapshot::capture(maintainer);
    snapshot.save(path)?;
    Ok(snapshot.sites.len())
}

/// Install a saved snapshot provisionally. Returns the number of sites restored.
pub fn restore(path: &Path, maintainer: &IndexMaintainer) -> Result<usize, io::Error> {
    let Some(snapshot) = Snapshot::load(path)? else {
        return Ok(0);
    };
    let saved_at = snapshot.saved_at;
    let options = maintainer.config().index_options;

    let mut restored = 0;
    for (site, index) in snapshot.into_indexes(options) {
        if maintainer.install_provisional(&site, index) {
            restored += 1;
        }
    }
    info!(
        "Restored {} sites from snapshot saved at {}",
        restored, saved_at
    );
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintainer::{MaintainerConfig, SiteSpec, SiteState};
    use crate::model::{QueryParams, RuleRecord, TargetRecord};
    use crate::source::MemoryRuleSource;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(id: &str, source: &str) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            source: source.to_string(),
            target: Some(TargetRecord {
                url: Some("https://example.com/landing".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn maintainer(source: Arc<MemoryRuleSource>) -> IndexMaintainer {
        IndexMaintainer::new(
            MaintainerConfig::default(),
            source,
            vec![SiteSpec::new("corporate").with_root_segment("corp")],
        )
        .unwrap()
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Snapshot::load(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_rejects_other_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{"version": 99, "savedAt": "2024-01-01T00:00:00Z", "sites": {}}"#,
        )
        .unwrap();
        let err = Snapshot::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_save_and_restore_provisionally() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("snapshot.json");

        let source = Arc::new(MemoryRuleSource::new());
        source.set_site("corporate", vec![record("1", "/old"), record("2", "/promo")]);
        let warm = maintainer(source);
        warm.prewarm().unwrap();
        assert!(warm.wait_idle(Duration::from_secs(5)));
        assert_eq!(save(&path, &warm).unwrap(), 1);

        // a cold maintainer whose source is unreachable still serves the snapshot
        let cold = maintainer(Arc::new(MemoryRuleSource::new()));
        assert_eq!(cold.state("corporate"), SiteState::Absent);
        assert_eq!(restore(&path, &cold).unwrap(), 1);

        let status = cold.site_status("corporate").unwrap();
        assert!(status.provisional);
        assert_eq!(status.rules, 2);
        let decision = cold.resolve("corporate", "/corp/old", &QueryParams::new());
        assert_eq!(decision.kind(), "send_now");
    }

    #[test]
    fn test_saved_snapshot_is_camel_case_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            sites: BTreeMap::new(),
        };
        snapshot.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value.get("savedAt").is_some());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
