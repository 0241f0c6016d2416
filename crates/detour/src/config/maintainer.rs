//! Index maintainer tuning as written in the config file.

use crate::index::IndexOptions;
use crate::maintainer::MaintainerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintainerConfigFile {
    #[serde(default = "default_item_workers")]
    pub item_workers: usize,
    /// Rebuild threads; one per configured site when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_workers: Option<usize>,
    #[serde(default = "default_rebuild_timeout_secs")]
    pub rebuild_timeout_secs: u64,
    #[serde(default = "default_missing_source_retry_secs")]
    pub missing_source_retry_secs: u64,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_janitor_interval_ms")]
    pub janitor_interval_ms: u64,
}

fn default_item_workers() -> usize {
    4
}

fn default_rebuild_timeout_secs() -> u64 {
    30
}

fn default_missing_source_retry_secs() -> u64 {
    4 * 60 * 60
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    300_000
}

fn default_janitor_interval_ms() -> u64 {
    1_000
}

impl Default for MaintainerConfigFile {
    fn default() -> Self {
        Self {
            item_workers: default_item_workers(),
            site_workers: None,
            rebuild_timeout_secs: default_rebuild_timeout_secs(),
            missing_source_retry_secs: default_missing_source_retry_secs(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            janitor_interval_ms: default_janitor_interval_ms(),
        }
    }
}

impl MaintainerConfigFile {
    pub fn to_runtime(&self, index_options: IndexOptions) -> MaintainerConfig {
        MaintainerConfig {
            item_workers: self.item_workers,
            site_workers: self.site_workers,
            rebuild_timeout: Duration::from_secs(self.rebuild_timeout_secs),
            missing_source_retry: Duration::from_secs(self.missing_source_retry_secs),
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
            janitor_interval: Duration::from_millis(self.janitor_interval_ms),
            index_options,
        }
    }
}
