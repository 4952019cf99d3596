//! Simulation settings.
//!
//! Every field has a default, so an empty file (or no file at all) runs the
//! stock simulation. A partial file overrides only what it names:
//!
//! ```toml
//! [production]
//! stations = 2
//! workers_per_station = 3
//!
//! [network]
//! listen_addr = "0.0.0.0:5000"
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::production::AcquireOrder;

/// Environment variable naming the config file when no CLI argument is given.
pub const CONFIG_ENV: &str = "FACTORY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactoryConfig {
    pub production: ProductionConfig,
    pub network: NetworkConfig,
    pub belt: BeltConfig,
    pub retail: RetailConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProductionConfig {
    /// Size of the factory-wide parts pool.
    pub max_parts: usize,
    pub stations: usize,
    /// Workers per station; each station also gets this many tools.
    pub workers_per_station: usize,
    /// Pause between two units of the same worker.
    pub interval_ms: u64,
    pub acquire_order: AcquireOrder,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            max_parts: 500,
            stations: 4,
            workers_per_station: 5,
            interval_ms: 2000,
            acquire_order: AcquireOrder::default(),
        }
    }
}

impl ProductionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub listen_addr: SocketAddr,
    /// Bound on reading a request and writing a reply.
    pub request_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5000)),
            request_timeout_ms: 5000,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeltConfig {
    pub capacity: usize,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self { capacity: 40 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetailConfig {
    pub stores: Vec<String>,
    pub store_capacity: usize,
    pub request_interval_ms: u64,
    pub customers: u32,
    pub max_purchases: u32,
    pub max_pause_ms: u64,
}

impl Default for RetailConfig {
    fn default() -> Self {
        Self {
            stores: ["Store A", "Store B", "Store C"].map(String::from).to_vec(),
            store_capacity: 35,
            request_interval_ms: 1500,
            customers: 20,
            max_purchases: 5,
            max_pause_ms: 5000,
        }
    }
}

impl RetailConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn max_pause(&self) -> Duration {
        Duration::from_millis(self.max_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Directory holding the production, sales and purchase logs.
    pub dir: PathBuf,
    /// Events queued for the recorder before new ones are dropped.
    pub buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            buffer: 1024,
        }
    }
}

impl FactoryConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` if given, otherwise the file named by [`CONFIG_ENV`],
    /// otherwise the defaults.
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::load(&path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.production;
        let r = &self.retail;
        let checks = [
            (p.max_parts == 0, "production.max_parts must be at least 1"),
            (p.stations == 0, "production.stations must be at least 1"),
            (
                p.workers_per_station < 2,
                "production.workers_per_station must be at least 2",
            ),
            (self.belt.capacity == 0, "belt.capacity must be at least 1"),
            (
                self.network.request_timeout_ms == 0,
                "network.request_timeout_ms must be at least 1",
            ),
            (r.store_capacity == 0, "retail.store_capacity must be at least 1"),
            (r.max_purchases == 0, "retail.max_purchases must be at least 1"),
            (
                r.stores.iter().any(|s| s.trim().is_empty()),
                "retail.stores must not contain blank names",
            ),
            (self.events.buffer == 0, "events.buffer must be at least 1"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(ConfigError::Invalid(reason.to_string())),
            None => Ok(()),
        }
    }

    /// Total number of assembly workers across all stations.
    pub fn total_workers(&self) -> usize {
        self.production.stations * self.production.workers_per_station
    }
}
