pub mod backend;
pub mod database;
pub mod frontend;
pub mod geo;

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Default configuration file of the frontend binary
pub const FRONTEND_CONFIG_FILE: &str = "mirrorlist.conf";
/// Default configuration file of the standalone checker binary
pub const UPDATER_CONFIG_FILE: &str = "mirrorlist_updater.conf";

/// Command-line options shared by the frontend and the updater
#[derive(Debug, Clone, Default, Parser)]
#[command(version, about = "CentOS mirror list service", long_about = None)]
pub struct Args {
    /// Configuration file, takes precedence over MIRRORLIST_CONFIG
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Application configuration, read from a YAML (or JSON) file and
/// overridden by environment variables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub frontend: frontend::FrontendConfig,
    pub backend: backend::BackendConfig,
    pub database: database::DatabaseConfig,
    pub geo_database: geo::GeoDatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Nothing at the given path
    Defaults(PathBuf),
}

/// The `--config` flag wins over `MIRRORLIST_CONFIG`, which wins over
/// `default_path`
pub fn config_path(flag: Option<&Path>, env_path: Option<String>, default_path: &str) -> PathBuf {
    match (flag, env_path) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(default_path),
    }
}

impl Config {
    /// Load the configuration file chosen by [`config_path`]. A missing
    /// file yields the defaults, a file that cannot be parsed is an error.
    pub fn load(args: &Args, default_path: &str) -> Result<(Self, ConfigSource)> {
        let path = config_path(
            args.config.as_deref(),
            env::var("MIRRORLIST_CONFIG").ok(),
            default_path,
        );

        let (mut config, source) = match Self::from_file(&path)? {
            Some(config) => (config, ConfigSource::File(path)),
            None => (Self::default(), ConfigSource::Defaults(path)),
        };
        config.apply_env();

        Ok((config, source))
    }

    /// Parse a configuration file. Returns `None` if it does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Self::parse(&contents).map(Some).map_err(|e| {
            AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Parse configuration text. YAML is a superset of JSON so both work.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply `MIRRORLIST_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("MIRRORLIST_DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(listen) = env::var("MIRRORLIST_LISTEN") {
            self.frontend.listen = listen;
        }
        if let Ok(level) = env::var("MIRRORLIST_LOG_LEVEL") {
            self.log.level = level;
        }
    }
}
