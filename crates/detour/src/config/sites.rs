//! Sites, rule source and matching options.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One site served by this proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub id: String,
    /// Host names routed to this site (port is ignored when matching).
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Path segment prepended to every rule source of the site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_segment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    /// Directory holding one `<site>.yaml|yml|json` rule file per site.
    pub dir: PathBuf,
    /// Compare paths case-insensitively.
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
    /// Append the request's own query parameters to the redirect location.
    #[serde(default)]
    pub keep_source_params: bool,
}

fn default_case_insensitive() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    /// Restore the snapshot at startup before the first rebuild completes.
    #[serde(default = "default_restore")]
    pub restore: bool,
}

fn default_restore() -> bool {
    true
}
