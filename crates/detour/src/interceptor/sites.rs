//! Host header to site mapping.

use crate::config::Config;
use crate::model::SiteId;
use std::collections::HashMap;

/// Maps request hosts onto site ids, falling back to the default site.
#[derive(Debug, Clone, Default)]
pub struct SiteRouter {
    hosts: HashMap<String, SiteId>,
    default_site: Option<SiteId>,
}

impl SiteRouter {
    pub fn new(hosts: HashMap<String, SiteId>, default_site: Option<SiteId>) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|(host, site)| (host.to_ascii_lowercase(), site))
            .collect();
        Self {
            hosts,
            default_site,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let hosts = config
            .sites
            .iter()
            .flat_map(|site| {
                let id = site.id.trim().to_string();
                site.hosts.iter().map(move |host| (host.clone(), id.clone()))
            })
            .collect();
        Self::new(hosts, config.default_site.clone())
    }

    /// Site for a `Host` header value such as `www.example.com:8080`.
    pub fn site_for(&self, host: Option<&str>) -> Option<&str> {
        host.map(strip_port)
            .and_then(|host| self.hosts.get(&host.to_ascii_lowercase()))
            .or(self.default_site.as_ref())
            .map(String::as_str)
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    // bracketed IPv6 literal, e.g. [::1]:8080
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(default_site: Option<&str>) -> SiteRouter {
        let hosts = HashMap::from([
            ("WWW.Example.com".to_string(), "corporate".to_string()),
            ("shop.example.com".to_string(), "shop".to_string()),
            ("::1".to_string(), "local".to_string()),
        ]);
        SiteRouter::new(hosts, default_site.map(str::to_string))
    }

    #[test]
    fn test_host_lookup_ignores_case_and_port() {
        let router = router(None);
        assert_eq!(router.site_for(Some("www.example.com")), Some("corporate"));
        assert_eq!(router.site_for(Some("WWW.EXAMPLE.COM:8080")), Some("corporate"));
        assert_eq!(router.site_for(Some("shop.example.com:80")), Some("shop"));
        assert_eq!(router.site_for(Some("[::1]:8080")), Some("local"));
    }

    #[test]
    fn test_unknown_host_uses_default() {
        assert_eq!(router(None).site_for(Some("blog.example.com")), None);
        assert_eq!(router(None).site_for(None), None);
        assert_eq!(
            router(Some("corporate")).site_for(Some("blog.example.com")),
            Some("corporate")
        );
        assert_eq!(router(Some("corporate")).site_for(None), Some("corporate"));
    }
}
