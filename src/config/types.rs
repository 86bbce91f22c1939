use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::session::SessionConfig;
use crate::profiles::ProfileStoreConfig;
use crate::providers::ProviderConfig;

const DEFAULT_CONFIG_PATH: &str = "./config.yaml";
const ENV_PREFIX: &str = "AUTHSYNC_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct ConfigV1 {
    pub logging: LoggingConfig,
    pub auth_provider: ProviderConfig,
    pub profile_store: ProfileStoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub bind_address: String,
}

/// Path of the config file: `AUTHSYNC_CONFIG`, or "config.yaml" in the current directory.
pub fn config_path() -> String {
    std::env::var(format!("{}CONFIG", ENV_PREFIX)).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Merge the YAML file at `path` with `AUTHSYNC_`-prefixed environment
/// variables (`__` separates nested keys) and extract the config.
pub fn load_config_from(path: &str) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    parse(figment)
}

/// Parse a config from a YAML string (no environment overrides).
pub fn load_config_str(yaml: &str) -> Result<ConfigV1, figment::Error> {
    parse(Figment::new().merge(Yaml::string(yaml)))
}

fn parse(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load the config, exiting the process if it cannot be read.
pub fn load_config() -> ConfigV1 {
    let path = config_path();
    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration from '{}': {}", path, e);
            std::process::exit(1);
        }
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render schema: {}", e),
    }
}
