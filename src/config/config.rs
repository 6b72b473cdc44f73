use config::{Config, ConfigError, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Stores ownership intervals, scan checkpoints and trade requests.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Chain access configuration: which contract to watch, over which endpoint,
/// and how aggressively to scan it.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub contract_address: String,
    /// Block the watched contract was deployed at; scanning never starts below it.
    pub deploy_block: u64,
    /// Blocks held back from the head to stay clear of reorganizations.
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    /// Maximum block span of a single getLogs request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Pause between chunk requests, to bound the RPC request rate.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

fn default_confirmation_depth() -> u64 {
    12
}

fn default_chunk_size() -> u64 {
    5_000
}

fn default_chunk_delay_ms() -> u64 {
    800
}

/// Polling driver configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    /// Checkpoint identity; defaults to the watched contract address.
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Attempts per poll cycle before giving up until the next tick.
    #[serde(default = "default_max_cycle_attempts")]
    pub max_cycle_attempts: u32,
    /// Initial backoff between cycle attempts; doubles per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            source_key: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_cycle_attempts: default_max_cycle_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            enabled: default_enabled(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_cycle_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    8_000
}

fn default_enabled() -> bool {
    true
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    #[serde(default)]
    pub poller: PollerSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
