//! Runtime settings.
//!
//! Layered, later sources win: built-in defaults, `settings/strata.toml`
//! (optional), an explicit settings file, then `V6_`-prefixed environment
//! variables with `__` between nested keys (`V6_SERVER__PORT=9090`).

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use log::info;
use serde::{Deserialize, Serialize};

use crate::algorithms::default_algorithms;
use crate::core::metrics::MetricsConfig;
use crate::core::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
use crate::data::DatasetSource;
use crate::stats::PRIVACY_THRESHOLD;

/// Settings file read when present, relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "settings/strata";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "V6";

/// Directory holding the three-node split used by default
pub const DEFAULT_DATA_DIR: &str = "tests/data/data_times";

/// HTTP API bind address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A simulated node and its databases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub name: String,
    pub databases: Vec<DatasetSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Counts below this value are suppressed
    pub privacy_threshold: usize,
    pub collaboration_name: String,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_organizations")]
    pub organizations: Vec<OrganizationSettings>,
}

/// One organization per CSV of the three-node split
pub fn default_organizations() -> Vec<OrganizationSettings> {
    ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|name| OrganizationSettings {
            name: name.to_string(),
            databases: vec![DatasetSource::csv(
                PathBuf::from(DEFAULT_DATA_DIR).join(format!("{}.csv", name)),
            )],
        })
        .collect()
}

/// `V6_PRIVACY_THRESHOLD`, `V6_SERVER__PORT`, ...
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            privacy_threshold: PRIVACY_THRESHOLD,
            collaboration_name: "strata-fit".to_string(),
            server: ServerSettings::default(),
            metrics: MetricsConfig::default(),
            organizations: default_organizations(),
        }
    }
}

impl Settings {
    /// Load the layered settings; `path` must exist when given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("privacy_threshold", PRIVACY_THRESHOLD as i64)?
            .set_default("collaboration_name", "strata-fit")?
            .add_source(File::with_name(DEFAULT_SETTINGS_FILE).required(false));

        if let Some(path) = path {
            info!("Reading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.privacy_threshold == 0 {
            return Err(ConfigError::Message(
                "privacy_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            privacy_threshold: self.privacy_threshold,
            collaboration_name: self.collaboration_name.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Orchestrator with every algorithm and the configured organizations loaded
    pub fn build_orchestrator(&self) -> Result<Orchestrator, OrchestratorError> {
        let mut orchestrator = Orchestrator::new(self.orchestrator_config());
        for algorithm in default_algorithms() {
            orchestrator.register_algorithm(algorithm);
        }
        for organization in &self.organizations {
            orchestrator.register_organization(&organization.name, organization.databases.clone())?;
        }
        Ok(orchestrator)
    }
}
