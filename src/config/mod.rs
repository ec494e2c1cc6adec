//! Configuration for the moderation queue coordinator

mod credentials;
mod embedding;
mod index;
mod logging;
mod services;

pub use credentials::{Credentials, CredentialsError};
pub use embedding::EmbeddingConfig;
pub use index::IndexConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use services::{default_services, SchedulerConfig, ServiceSpec, SupervisorConfig};

use anyhow::Result;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Document store client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the document store / data processing API
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_store_endpoint() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_store_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            timeout_secs: default_store_timeout(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for persisted index partitions
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Managed services, in startup order
    #[serde(default = "default_services")]
    pub services: Vec<ServiceSpec>,
    /// Supervisor timing
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Daily scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Similarity index
    #[serde(default)]
    pub index: IndexConfig,
    /// Document store client
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "modqueue")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".modqueue"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            services: default_services(),
            supervisor: SupervisorConfig::default(),
            scheduler: SchedulerConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`~/.config/modqueue/config.toml` style)
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "modqueue")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("modqueue.toml"))
    }

    /// Credential file location next to the config file
    pub fn credentials_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "modqueue")
            .map(|d| d.config_dir().join("credentials.json"))
            .unwrap_or_else(|| PathBuf::from("credentials.json"))
    }

    /// Scheduler time of day, parsed
    pub fn scheduled_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.scheduler.time_of_day, "%H:%M").map_err(|e| {
            anyhow::anyhow!(
                "Invalid scheduler time_of_day '{}': {}",
                self.scheduler.time_of_day,
                e
            )
        })
    }

    /// Validate all fields, collecting every problem into one error so the
    /// operator can fix the file in a single pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Services: names and ports must be unique, ports valid
        let mut seen_names: HashMap<&str, ()> = HashMap::new();
        let mut port_owners: HashMap<u16, &str> = HashMap::new();
        for spec in &self.services {
            if spec.name.is_empty() {
                errors.push("service name must not be empty".to_string());
            }
            if spec.command.is_empty() {
                errors.push(format!("service '{}' has an empty command", spec.name));
            }
            if spec.port == 0 {
                errors.push(format!("service '{}' has port 0", spec.name));
            }
            if seen_names.insert(&spec.name, ()).is_some() {
                errors.push(format!("duplicate service name '{}'", spec.name));
            }
            if let Some(other) = port_owners.insert(spec.port, &spec.name) {
                errors.push(format!(
                    "port {} assigned to both '{}' and '{}'",
                    spec.port, other, spec.name
                ));
            }
            if !spec.health_path.starts_with('/') {
                errors.push(format!(
                    "service '{}' health_path must start with '/'",
                    spec.name
                ));
            }
        }

        // Supervisor timing
        if self.supervisor.startup_timeout_secs == 0 {
            errors.push("startup_timeout_secs must be positive".to_string());
        }
        if self.supervisor.probe_timeout_secs == 0 {
            errors.push("probe_timeout_secs must be positive".to_string());
        }
        if self.supervisor.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be positive".to_string());
        }

        // Scheduler
        if self.scheduler.tick_interval_secs == 0 {
            errors.push("tick_interval_secs must be positive".to_string());
        }
        if NaiveTime::parse_from_str(&self.scheduler.time_of_day, "%H:%M").is_err() {
            errors.push(format!(
                "time_of_day '{}' is not HH:MM",
                self.scheduler.time_of_day
            ));
        }

        // Embedding
        if self.embedding.dimensions == 0 {
            errors.push("embedding dimensions must be positive".to_string());
        }
        if self.embedding.max_batch_size == 0 {
            errors.push("embedding max_batch_size must be positive".to_string());
        }
        if self.embedding.endpoint.is_empty() {
            errors.push("embedding endpoint must not be empty".to_string());
        }

        // Index
        if self.index.query_k == 0 {
            errors.push("query_k must be positive".to_string());
        }
        if self.index.rebuild_dirty_threshold == Some(0) {
            errors.push("rebuild_dirty_threshold must be positive when set".to_string());
        }
        if self.index.content_types.is_empty() {
            errors.push("content_types must not be empty".to_string());
        }

        // Store
        if self.store.endpoint.is_empty() {
            errors.push("store endpoint must not be empty".to_string());
        }

        // Data dir
        if self.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
