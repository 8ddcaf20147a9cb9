use serde::Deserialize;
use tracing::trace;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Capacity of the transport's outgoing request queue; a full queue is
    /// what surfaces as a rejected send.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_ids")]
    pub ids: Vec<i32>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            sensors: SensorConfig::default(),
            buffer: BufferConfig::default(),
            retry: RetryConfig::default(),
            alerts: AlertConfig::default(),
            monitor_interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            ids: default_sensor_ids(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_webhook_url(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_broker_host() -> String {
    String::from("localhost")
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    String::from("sensor_data")
}

fn default_client_id() -> String {
    String::from("sensor-relay")
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_sensor_ids() -> Vec<i32> {
    (1..=5).collect()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_buffer_capacity() -> usize {
    100_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_webhook_url() -> String {
    String::from("http://localhost:8080/alert")
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_monitor_interval_secs() -> u64 {
    10
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
