use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the DHT node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network / KRPC transport configuration.
    pub network: NetworkConfig,
    /// Routing table tuning.
    pub routing: RoutingConfig,
    /// Iterative lookup tuning.
    pub lookup: LookupConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// UDP port to listen on (0 for an OS-assigned port).
    pub listen_port: u16,
    /// Path to the bootstrap-nodes snapshot file, read at construction
    /// and written on shutdown.
    pub bootstrap_file: PathBuf,
    /// Private overlay name-qualifier, if this node should only talk to
    /// a private swarm of nodes sharing the same qualifier.
    pub private_overlay_name: Option<String>,
    /// Default per-query timeout.
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Maximum nodes held per k-bucket.
    pub bucket_size: usize,
    /// Seconds between routing-table maintenance sweeps under normal conditions.
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Number of parallel in-flight queries per lookup step (Kademlia's α).
    pub alpha: usize,
    /// Number of closest nodes a lookup tries to converge on (Kademlia's k).
    pub k: usize,
    /// Peer-cache validity window, in seconds.
    pub cache_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter string (passed through to `tracing_subscriber::EnvFilter`).
    pub level: String,
    /// Log to a file in addition to stderr.
    pub log_file: Option<PathBuf>,
}

/// The OS config directory's `dht-node/bootstrap_nodes.json`, mirroring
/// `datamesh::database::get_default_db_path`'s `dirs::config_dir()` /
/// `dirs::home_dir().join(".config")` fallback. Falls back to a relative
/// path in the current directory if neither can be resolved (e.g. a
/// minimal container with no `$HOME`).
fn default_bootstrap_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|dir| dir.join("dht-node").join("bootstrap_nodes.json"))
        .unwrap_or_else(|| PathBuf::from("bootstrap_nodes.json"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                listen_port: 6881,
                bootstrap_file: default_bootstrap_path(),
                private_overlay_name: None,
                query_timeout_secs: 2,
            },
            routing: RoutingConfig {
                bucket_size: 8,
                maintenance_interval_secs: 60,
            },
            lookup: LookupConfig {
                alpha: 3,
                k: 8,
                cache_window_secs: 5 * 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_file: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load_or_default(config_path: Option<PathBuf>) -> crate::error::DhtResult<Self> {
        if let Some(path) = config_path {
            if path.exists() {
                let config_str = std::fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&config_str)?;
                tracing::info!("loaded configuration from {:?}", path);
                return Ok(config);
            }
        }

        tracing::info!("using default configuration");
        Ok(Config::default())
    }

    /// Save configuration to file.
    pub fn save(&self, config_path: &PathBuf) -> crate::error::DhtResult<()> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(config_path, config_str)?;
        tracing::info!("configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Get the per-query timeout as a `Duration`.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.network.query_timeout_secs)
    }

    /// Get the cache validity window as a `Duration`.
    pub fn cache_window(&self) -> Duration {
        Duration::from_secs(self.lookup.cache_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.network.listen_port, cfg.network.listen_port);
        assert_eq!(parsed.lookup.alpha, cfg.lookup.alpha);
    }

    #[test]
    fn missing_config_path_falls_back_to_default() {
        let cfg = Config::load_or_default(None).unwrap();
        assert_eq!(cfg.lookup.k, 8);
    }
}
