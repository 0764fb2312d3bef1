//! Configuration for the snapshot refresh cycle.
//!
//! Configuration is loaded with precedence: overrides > Env vars > Config
//! file > Defaults. Environment variables use the `TIDELINE_` prefix, e.g.
//! `TIDELINE_REFRESH_PERIOD_SECS=30`.
//!
//! # Example config file (tideline.toml)
//! ```toml
//! refresh_period_secs = 60
//! default_completeness = "require-complete"
//! strict = true
//! ```

use crate::timeline::Completeness;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Seconds between metadata polls; bounds the staleness of the
    /// published snapshot
    pub refresh_period_secs: u64,
    /// Completeness mode used by visibility queries that don't choose one
    pub default_completeness: Completeness,
    /// When true, a malformed segment descriptor aborts the rebuild cycle;
    /// when false it is skipped with a warning and the cycle continues
    pub strict: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            refresh_period_secs: 60,
            default_completeness: Completeness::RequireComplete,
            strict: true,
        }
    }
}

impl CatalogConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - Overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(CatalogConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with TIDELINE_ prefix
        figment = figment.merge(Env::prefixed("TIDELINE_"));

        // Layer 3: Explicit overrides
        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }
}

/// Optional overrides applied on top of file and environment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_period_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_completeness: Option<Completeness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
