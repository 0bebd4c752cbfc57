use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Public HTTP listener and selection settings (`frontend` section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FrontendConfig {
    pub listen: String,
    /// Number of mirrors in each response
    pub results: usize,
    /// Static headers added to every mirrorlist response
    pub headers: BTreeMap<String, serde_yaml::Value>,
    pub cache: CacheConfig,
    pub admin: AdminConfig,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            results: 10,
            headers: BTreeMap::new(),
            cache: CacheConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl FrontendConfig {
    /// Render configured headers as strings. Booleans become `1`/`0`,
    /// anything that is not a scalar is dropped.
    pub fn static_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let rendered = match value {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(true) => "1".to_string(),
                    serde_yaml::Value::Bool(false) => "0".to_string(),
                    _ => {
                        tracing::warn!("Ignoring non-scalar value for header \"{}\"", name);
                        return None;
                    }
                };
                Some((name.clone(), rendered))
            })
            .collect()
    }
}

/// Response cache settings (`frontend.cache`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Total capacity in bytes
    pub size: usize,
    /// Lifetime of a cached response in seconds
    pub ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        // ~850 GeoIP locations * ~700 bytes per response, per repository
        Self {
            enabled: true,
            size: 64_000_000,
            ttl: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Switches for the /admin endpoints (`frontend.admin`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub read: bool,
    pub write: bool,
}
