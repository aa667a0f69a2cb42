use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::bundled_catalog_dir;
use crate::error::CapError;

pub const DEFAULT_CONFIG_FILE: &str = "capval.json";
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub report_success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog_dir: Utf8PathBuf,
    pub report_success: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `capval.json` from the current directory when no path
    /// is given. A missing default file yields the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CapError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CapError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CapError::ConfigParse(err.to_string()))?;

        let resolved = Self::resolve_config(config);
        if resolved.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(CapError::ConfigParse(format!(
                "unsupported schema_version {} (expected {SUPPORTED_SCHEMA_VERSION})",
                resolved.schema_version
            )));
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(SUPPORTED_SCHEMA_VERSION),
            catalog_dir: config.catalog_dir.unwrap_or_else(bundled_catalog_dir),
            report_success: config.report_success.unwrap_or(true),
        }
    }
}
