use serde::Deserialize;

/// Geo-IP database settings (`geo-database` section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoDatabaseConfig {
    /// MaxMind City database (.mmdb)
    pub file: String,
}

impl Default for GeoDatabaseConfig {
    fn default() -> Self {
        Self {
            file: "GeoLite2-City.mmdb".to_string(),
        }
    }
}
