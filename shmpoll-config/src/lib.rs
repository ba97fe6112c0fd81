//! # shmpoll Configuration System
//!
//! Layered configuration for the epoll multiplexing core.
//!
//! ## Features
//! - **Unified Configuration**: one tree shared by the registry, the wait engine and telemetry
//! - **Validation**: runtime range checks on every tunable before it reaches the core
//! - **Environment Awareness**: per-environment overrides and `SHMPOLL_*` variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod telemetry;
mod validation;

pub use self::core::{TableConfig, WaitConfig};
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/shmpoll.yaml";
const ENV_PREFIX: &str = "SHMPOLL_";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct ShmPollConfig {
    /// Instance table sizing.
    #[validate(nested)]
    #[serde(default)]
    pub table: TableConfig,

    /// Wait engine polling behaviour.
    #[validate(nested)]
    #[serde(default)]
    pub wait: WaitConfig,

    /// Logging and metrics.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ShmPollConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/shmpoll.yaml` if present
    /// 3. `config/<SHMPOLL_ENV>.yaml` if present
    /// 4. `SHMPOLL_*` environment variables, `__` separating nested keys
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ShmPollConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("SHMPOLL_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from a specific file, still honouring environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(ShmPollConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
