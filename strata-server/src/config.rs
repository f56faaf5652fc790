use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strata_core::{
    ChannelNamePolicy, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_NAME_MAX_LENGTH, GroupDeliveryConfig,
    HubConfig, LongTermBackend as CoreLongTermBackend, ReaperConfig,
    ReplicationConfig as CoreReplicationConfig, Result, StrataError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub long_term: LongTermConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub reaper: ReaperSettings,
    #[serde(default)]
    pub groups: GroupsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base URL used in links when a request carries no Host header.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: None,
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn public_url_or_default(&self) -> String {
        self.public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("http://{}", self.bind_addr))
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermConfig {
    #[serde(default)]
    pub backend: LongTermBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub redis: Option<LongTermRedisConfig>,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            backend: LongTermBackend::Fs,
            path: None,
            redis: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongTermBackend {
    #[default]
    Fs,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermRedisConfig {
    pub url: String,
    #[serde(default = "default_long_term_key_prefix")]
    pub key_prefix: String,
}

fn default_long_term_key_prefix() -> String {
    "strata:long_term".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_replication_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_min_age_secs")]
    pub sweep_min_age_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            workers: default_replication_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_min_age_secs: default_sweep_min_age_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_replication_workers() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    2000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_sweep_min_age_secs() -> u64 {
    10
}

fn default_sweep_batch_size() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_name_max_length")]
    pub name_max_length: usize,
    #[serde(default = "default_strict_names")]
    pub strict_names: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            name_max_length: default_name_max_length(),
            strict_names: default_strict_names(),
        }
    }
}

fn default_name_max_length() -> usize {
    DEFAULT_NAME_MAX_LENGTH
}

fn default_strict_names() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSettings {
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_reaper_grace_secs")]
    pub grace_secs: u64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval_secs(),
            grace_secs: default_reaper_grace_secs(),
        }
    }
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_reaper_grace_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default = "default_deliver_callbacks")]
    pub deliver_callbacks: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_callback_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            deliver_callbacks: default_deliver_callbacks(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_callback_timeout_secs(),
        }
    }
}

fn default_deliver_callbacks() -> bool {
    true
}

fn default_callback_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("STRATA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| StrataError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| StrataError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn to_hub_config(&self) -> Result<HubConfig> {
        let long_term = match self.long_term.backend {
            LongTermBackend::Fs => CoreLongTermBackend::Filesystem {
                path: self.long_term.path.clone(),
            },
            LongTermBackend::Redis => {
                let redis = self.long_term.redis.as_ref().ok_or_else(|| {
                    StrataError::Config(
                        "long_term.redis is required when backend=redis".to_string(),
                    )
                })?;
                CoreLongTermBackend::Redis {
                    url: redis.url.clone(),
                    key_prefix: redis.key_prefix.clone(),
                }
            }
        };

        let defaults = GroupDeliveryConfig::default();

        Ok(HubConfig {
            data_dir: self.storage.data_dir.clone(),
            long_term,
            name_policy: ChannelNamePolicy {
                max_length: self.channels.name_max_length,
                strict: self.channels.strict_names,
            },
            max_payload_bytes: self.server.max_payload_bytes,
            replication: CoreReplicationConfig {
                workers: self.replication.workers,
                queue_capacity: self.replication.queue_capacity,
                max_attempts: self.replication.max_attempts,
                retry_backoff: Duration::from_millis(self.replication.retry_backoff_ms),
                sweep_interval: Duration::from_secs(self.replication.sweep_interval_secs.max(1)),
                sweep_min_age: Duration::from_secs(self.replication.sweep_min_age_secs),
                sweep_batch_size: self.replication.sweep_batch_size,
            },
            reaper: ReaperConfig {
                interval: Duration::from_secs(self.reaper.interval_secs.max(1)),
                grace: Duration::from_secs(self.reaper.grace_secs),
            },
            groups: GroupDeliveryConfig {
                enabled: self.groups.deliver_callbacks,
                max_attempts: self.groups.max_attempts,
                timeout: Duration::from_secs(self.groups.timeout_secs.max(1)),
                ..defaults
            },
        })
    }
}
