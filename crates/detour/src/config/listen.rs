//! Proxy and admin listener configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    pub port: u16,
    #[serde(default = "default_listen_host")]
    pub host: String,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

/// Admin API listener (health, metrics, sites, events).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_port")]
    pub port: u16,
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
}

fn default_admin_port() -> u16 {
    9090
}

fn default_admin_enabled() -> bool {
    true
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            port: default_admin_port(),
            host: default_listen_host(),
            enabled: default_admin_enabled(),
        }
    }
}
