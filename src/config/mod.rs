//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `CHATHUB` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use chathub_client::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Talking to {}", config.hub.websocket_url);
//! ```

mod error;
mod hub;
mod local_llm;
mod logging;
mod storage;

pub use error::{ConfigError, ValidationError};
pub use hub::{parse_ipv4_range, HubConfig, HubFeatures};
pub use local_llm::LocalLlmConfig;
pub use logging::LoggingConfig;
pub use storage::{StorageBackend, StorageConfig};

use serde::Deserialize;

/// Which client the binary drives
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    #[default]
    Hub,
    Local,
}

/// Root application configuration
///
/// Every section has defaults, so an empty environment loads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: ClientMode,

    /// Hub client settings
    #[serde(default)]
    pub hub: HubConfig,

    /// Local completion server settings
    #[serde(default)]
    pub local: LocalLlmConfig,

    /// Conversation store settings
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CHATHUB` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CHATHUB__HUB__TONE=precise` -> `hub.tone = "precise"`
    /// - `CHATHUB__LOCAL__PORT=8080` -> `local.port = "8080"`
    /// - `CHATHUB__HUB__PLUGINS__SEARCH=false` -> `hub.plugins["search"] = false`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHATHUB")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            ClientMode::Hub => self.hub.validate()?,
            ClientMode::Local => self.local.validate()?,
        }
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
