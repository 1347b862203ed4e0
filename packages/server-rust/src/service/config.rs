use std::time::Duration;

use crate::cache::CacheConfig;
use crate::lifecycle::LifecycleConfig;
use crate::network::NetworkConfig;
use crate::orchestrator::OrchestratorConfig;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Everything needed to assemble a server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub lifecycle: LifecycleConfig,
    pub orchestrator: OrchestratorConfig,
}

impl ServerConfig {
    /// Checks values that would otherwise panic deep inside tokio.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Zero` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.sweep_interval == Duration::ZERO {
            return Err(ConfigError::Zero {
                field: "cache.sweep_interval",
            });
        }
        if self.orchestrator.default_ttl == Duration::ZERO {
            return Err(ConfigError::Zero {
                field: "orchestrator.default_ttl",
            });
        }
        if self.network.connection.outbound_channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "network.connection.outbound_channel_capacity",
            });
        }
        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::Zero {
                field: "cache.max_entries",
            });
        }
        Ok(())
    }
}
