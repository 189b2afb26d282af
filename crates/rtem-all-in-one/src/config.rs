use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Transport configuration
    /// Transport between simulator and ingest: "channel" (in-process) or
    /// "mqtt" (external broker)
    #[serde(default = "default_transport")]
    pub transport: String,

    /// MQTT broker URL (mqtt://host:port or mqtts://host:port)
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    /// Prefix for per-device MQTT client IDs
    #[serde(default = "default_mqtt_client_id_prefix")]
    pub mqtt_client_id_prefix: String,

    /// Path to the broker CA certificate; enables TLS with mutual auth
    #[serde(default)]
    pub mqtt_ca_certificate_path: Option<String>,

    /// Bounded capacity of the in-process channel transport
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    // Fleet configuration
    /// Number of simulated residential units
    #[serde(default = "default_unit_count")]
    pub unit_count: usize,

    /// Base seed for the per-device value generators
    #[serde(default)]
    pub fleet_seed: u64,

    /// Overrides every device's reporting cadence when set
    #[serde(default)]
    pub publish_interval_secs: Option<u64>,

    // Credential configuration
    /// Certificate PEM passed directly through configuration
    #[serde(default)]
    pub inline_certificate_pem: Option<String>,

    /// Private key PEM passed directly through configuration
    #[serde(default)]
    pub inline_private_key_pem: Option<String>,

    /// Name of the credential secret in the secret store
    #[serde(default = "default_credential_secret_name")]
    pub credential_secret_name: String,

    /// Path to the device certificate file
    #[serde(default)]
    pub certificate_path: Option<String>,

    /// Path to the device private key file
    #[serde(default)]
    pub private_key_path: Option<String>,

    // Reconnect backoff
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    // Store configuration
    /// Retention applied to stored readings, in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,

    /// Interval between TTL sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    // Query configuration
    #[serde(default = "default_query_page_size")]
    pub query_page_size: usize,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Interval between periodic telemetry reports, in seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    // Access gate configuration
    #[serde(default = "default_gate_username")]
    pub gate_username: String,

    /// Password for the query surface; hashed at startup, never logged
    #[serde(default = "default_gate_password")]
    pub gate_password: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// Transport defaults
fn default_transport() -> String {
    "channel".to_string()
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id_prefix() -> String {
    "rtem".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

// Fleet defaults
fn default_unit_count() -> usize {
    4
}

// Credential defaults
fn default_credential_secret_name() -> String {
    "rtem/iot_device_credentials".to_string()
}

// Backoff defaults
fn default_backoff_min_secs() -> u64 {
    1
}

fn default_backoff_max_secs() -> u64 {
    60
}

// Store defaults
fn default_retention_secs() -> i64 {
    604_800
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

// Query defaults
fn default_query_page_size() -> usize {
    100
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_report_interval_secs() -> u64 {
    60
}

// Access gate defaults
fn default_gate_username() -> String {
    "operator".to_string()
}

fn default_gate_password() -> String {
    "change-me-in-production".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RTEM"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to keep env-var tests from interfering with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_loads_without_env() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::remove_var("RTEM_LOG_LEVEL");
        std::env::remove_var("RTEM_TRANSPORT");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.transport, "channel");
        assert_eq!(config.unit_count, 4);
        assert_eq!(config.retention_secs, 604_800);
        assert_eq!(config.credential_secret_name, "rtem/iot_device_credentials");
    }

    #[test]
    fn env_vars_override_defaults() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::set_var("RTEM_LOG_LEVEL", "debug");
        std::env::set_var("RTEM_UNIT_COUNT", "8");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.unit_count, 8);

        std::env::remove_var("RTEM_LOG_LEVEL");
        std::env::remove_var("RTEM_UNIT_COUNT");
    }
}
