// Configuration for the request lifecycle subsystem.
//
// Loaded from an optional `schoolops.toml` next to the process plus
// `SCHOOLOPS_*` environment overrides. Every field has a default, so an
// empty environment yields the baseline behavior.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::consent::ConsentGate;
use crate::requests::types::DataType;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestFlowConfig {
    /// Consent gate policy.
    #[serde(default)]
    pub consent: ConsentConfig,
    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Optional SQLite persistence (feature `database`).
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsentConfig {
    /// Data categories whose presence forces the parent consent gate.
    #[serde(default = "ConsentConfig::default_sensitive_types")]
    pub sensitive_data_types: Vec<DataType>,
}

impl ConsentConfig {
    fn default_sensitive_types() -> Vec<DataType> {
        vec![DataType::FriendshipData, DataType::BehavioralRecords]
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            sensitive_data_types: Self::default_sensitive_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_log_level")]
    pub log_level: String,
    /// Emit JSON-formatted log lines (structured logging for production).
    #[serde(default)]
    pub json_logs: bool,
}

impl ObservabilityConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub auto_migrate: bool,
}

impl RequestFlowConfig {
    /// Layered load: file (optional) then environment. `SCHOOLOPS__CONSENT__…`
    /// style keys override file values.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("schoolops").required(false))
            .add_source(Environment::with_prefix("SCHOOLOPS").separator("__"))
            .build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn consent_gate(&self) -> ConsentGate {
        ConsentGate::new(self.consent.sensitive_data_types.iter().copied().collect())
    }
}
