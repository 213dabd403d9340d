//! Conversation store configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Which conversation store backend to use
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
    Redis,
}

/// Conversation store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the file backend
    #[serde(default = "default_path")]
    pub path: String,

    /// Namespace separating clients that share a backend; defaults per
    /// client (`bing` or `localLLM`) when unset
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub redis_url: Option<String>,

    /// Expiry for redis entries; 0 keeps them forever
    #[serde(default)]
    pub ttl_secs: u64,
}

impl StorageConfig {
    /// Namespace to use, falling back to the client's default.
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace.as_deref().filter(|n| !n.is_empty()).unwrap_or(fallback)
    }

    pub fn ttl(&self) -> Option<u64> {
        (self.ttl_secs > 0).then_some(self.ttl_secs)
    }

    /// Validate storage configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::File if self.path.trim().is_empty() => {
                Err(ValidationError::MissingRequired("STORAGE_PATH"))
            }
            StorageBackend::File => Ok(()),
            StorageBackend::Redis => {
                let url = self
                    .redis_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or(ValidationError::MissingRequired("STORAGE_REDIS_URL"))?;
                if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                    return Err(ValidationError::InvalidRedisUrl);
                }
                Ok(())
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_path(),
            namespace: None,
            redis_url: None,
            ttl_secs: 0,
        }
    }
}

fn default_path() -> String {
    "./data/conversations".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Memory);
        assert_eq!(config.namespace_or("bing"), "bing");
        assert!(config.ttl().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_requires_url() {
        let config = StorageConfig {
            backend: StorageBackend::Redis,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("STORAGE_REDIS_URL"))
        );
    }

    #[test]
    fn test_redis_url_scheme() {
        let config = StorageConfig {
            backend: StorageBackend::Redis,
            redis_url: Some("http://localhost".to_string()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRedisUrl));

        let config = StorageConfig {
            redis_url: Some("redis://localhost:6379".to_string()),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_namespace() {
        let config = StorageConfig {
            namespace: Some("shared".to_string()),
            ttl_secs: 3600,
            ..Default::default()
        };
        assert_eq!(config.namespace_or("bing"), "shared");
        assert_eq!(config.ttl(), Some(3600));
    }
}
