//! Configuration types for the detour proxy.

mod listen;
mod maintainer;
mod protocol;
mod sites;
mod upstream;

use crate::index::IndexOptions;
use crate::maintainer::{MaintainerConfig, SiteSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub use listen::{AdminConfig, ListenConfig};
pub use maintainer::MaintainerConfigFile;
pub use protocol::Protocol;
pub use sites::{RulesConfig, SiteConfig, SnapshotConfig};
pub use upstream::{ConnectionPoolConfig, UpstreamConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: ListenConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    pub rules: RulesConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    /// Site used when the request's host matches no configured site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_site: Option<String>,
    #[serde(default)]
    pub maintainer: MaintainerConfigFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sites.is_empty() && self.default_site.is_none() {
            anyhow::bail!("At least one site must be configured under 'sites'");
        }

        let mut ids = HashSet::new();
        let mut hosts = HashSet::new();
        for site in &self.sites {
            let id = site.id.trim();
            if id.is_empty() {
                anyhow::bail!("Site id must not be empty");
            }
            if id.contains(['/', '\\']) || id.contains("..") {
                anyhow::bail!("Site id '{id}' must not contain path separators or '..'");
            }
            if !ids.insert(id.to_string()) {
                anyhow::bail!("Duplicate site id: '{id}'");
            }
            for host in &site.hosts {
                let host = host.to_ascii_lowercase();
                if !hosts.insert(host.clone()) {
                    anyhow::bail!("Host '{host}' is mapped to more than one site");
                }
            }
        }

        if let Some(default_site) = &self.default_site {
            if !self.sites.is_empty() && !ids.contains(default_site.as_str()) {
                anyhow::bail!("default_site '{default_site}' is not a configured site");
            }
        }

        if self.admin.enabled && self.admin.port == self.listen.port {
            anyhow::bail!(
                "Admin port {} collides with the proxy listener port",
                self.admin.port
            );
        }

        let m = &self.maintainer;
        if m.item_workers == 0 {
            anyhow::bail!("maintainer.item_workers must be at least 1");
        }
        if m.site_workers == Some(0) {
            anyhow::bail!("maintainer.site_workers must be at least 1 when set");
        }
        if m.rebuild_timeout_secs == 0 {
            anyhow::bail!("maintainer.rebuild_timeout_secs must be positive");
        }
        if m.retry_base_ms > m.retry_max_ms {
            anyhow::bail!(
                "maintainer.retry_base_ms ({}) exceeds retry_max_ms ({})",
                m.retry_base_ms,
                m.retry_max_ms
            );
        }

        Ok(())
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            case_insensitive: self.rules.case_insensitive,
        }
    }

    pub fn maintainer_config(&self) -> MaintainerConfig {
        self.maintainer.to_runtime(self.index_options())
    }

    /// Sites known at startup, including a default site that has no entry of its own.
    pub fn site_specs(&self) -> Vec<SiteSpec> {
        let mut specs: Vec<SiteSpec> = self
            .sites
            .iter()
            .map(|site| SiteSpec {
                id: site.id.trim().to_string(),
                root_segment: site.root_segment.clone(),
            })
            .collect();
        if let Some(default_site) = &self.default_site {
            if !specs.iter().any(|s| &s.id == default_site) {
                specs.push(SiteSpec::new(default_site.clone()));
            }
        }
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
listen:
  port: 8080
upstream:
  host: 127.0.0.1
  port: 8000
rules:
  dir: /etc/detour/rules
sites:
  - id: corporate
    hosts: [www.example.com, example.com]
    root_segment: Corporate
  - id: shop
    hosts: [shop.example.com]
default_site: corporate
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.admin.port, 9090);
        assert!(config.admin.enabled);
        assert_eq!(config.upstream.base_uri(), "http://127.0.0.1:8000");
        assert!(config.rules.case_insensitive);
        assert!(!config.rules.keep_source_params);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].root_segment.as_deref(), Some("Corporate"));
        assert_eq!(config.default_site.as_deref(), Some("corporate"));
        assert!(config.snapshot.is_none());
    }

    #[test]
    fn test_maintainer_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        let runtime = config.maintainer_config();
        assert_eq!(runtime.item_workers, 4);
        assert_eq!(runtime.site_workers, None);
        assert_eq!(runtime.rebuild_timeout, Duration::from_secs(30));
        assert_eq!(runtime.missing_source_retry, Duration::from_secs(14_400));
        assert!(runtime.index_options.case_insensitive);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listen:
  port: 8080
admin:
  port: 9191
upstream:
  host: origin.internal
  port: 443
  protocol: https
  tls_skip_verify: true
connection_pool:
  max_idle_per_host: 10
rules:
  dir: ./rules
  case_insensitive: false
  keep_source_params: true
sites:
  - id: corporate
maintainer:
  item_workers: 8
  site_workers: 2
  rebuild_timeout_secs: 5
  retry_base_ms: 100
  retry_max_ms: 1000
snapshot:
  path: /var/lib/detour/snapshot.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.upstream.base_uri(), "https://origin.internal:443");
        assert!(config.upstream.tls_skip_verify);
        assert_eq!(config.connection_pool.max_idle_per_host, 10);
        assert_eq!(config.connection_pool.connect_timeout_secs, 5);
        assert!(config.rules.keep_source_params);
        assert!(!config.index_options().case_insensitive);

        let runtime = config.maintainer_config();
        assert_eq!(runtime.item_workers, 8);
        assert_eq!(runtime.site_workers, Some(2));
        assert_eq!(runtime.retry_base, Duration::from_millis(100));

        let snapshot = config.snapshot.unwrap();
        assert!(snapshot.restore);
    }

    #[test]
    fn test_site_specs_include_default_site() {
        let yaml = r#"
listen:
  port: 8080
upstream:
  host: 127.0.0.1
  port: 8000
rules:
  dir: ./rules
default_site: landing
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        let specs = config.site_specs();
        assert_eq!(specs, vec![SiteSpec::new("landing")]);
    }

    #[test]
    fn test_validate_rejects_duplicate_sites() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.sites[1].id = "corporate".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate site id"));
    }

    #[test]
    fn test_validate_rejects_shared_host() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.sites[1].hosts.push("WWW.example.com".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than one site"));
    }

    #[test]
    fn test_validate_rejects_path_like_site_id() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.sites[0].id = "../etc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_default_site() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.default_site = Some("blog".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_site"));
    }

    #[test]
    fn test_validate_rejects_port_collision() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.admin.port = 8080;
        assert!(config.validate().is_err());

        config.admin.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_retry_window() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.maintainer.retry_base_ms = 10_000;
        config.maintainer.retry_max_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sites.len(), 2);

        assert!(Config::from_file("/nonexistent/detour.yaml").is_err());
    }
}
