//! Exporter configuration from environment variables
//!
//! Values are read after `dotenv` has loaded an optional `.env` file, so a
//! key/value file next to the binary works the same as real environment
//! variables.

use crate::pipeline::scheduler::LockFailurePolicy;
use std::env;
use std::path::PathBuf;

/// Default poll interval (15 seconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;

/// Zone the monitoring application writes its local timestamps in
pub const DEFAULT_REFERENCE_TIMEZONE: &str = "Europe/London";

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// InfluxDB v2 connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxDbConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
}

/// MQTT broker settings
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
}

/// Configuration for the exporter runtime
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Monitoring log file the application appends to
    pub log_path: PathBuf,

    /// Interval between passes in milliseconds
    pub poll_interval_ms: u64,

    /// IANA zone name the log timestamps are written in
    pub reference_timezone: String,

    /// What the scheduler does when the lock protocol fails
    pub lock_failure_policy: LockFailurePolicy,

    /// InfluxDB sink, enabled when url/org/bucket/token are all set
    pub influxdb: Option<InfluxDbConfig>,

    /// MQTT sink, enabled when broker and a non-zero port are set
    pub mqtt: Option<MqttConfig>,

    /// JSONL sink output file
    pub jsonl_path: Option<PathBuf>,
}

impl ExporterConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `AFTERBURNER_LOG_PATH` (required)
    /// - `POLL_INTERVAL_MS` (default: 15000)
    /// - `REFERENCE_TIMEZONE` (default: Europe/London)
    /// - `LOCK_FAILURE_POLICY` (`skip` or `escalate`, default: skip)
    /// - `INFLUXDB_URL`, `INFLUXDB_ORG`, `INFLUXDB_BUCKET`, `INFLUXDB_TOKEN`,
    ///   `INFLUXDB_MEASUREMENT` (default: afterburner)
    /// - `MQTT_BROKER`, `MQTT_PORT`, `MQTT_TOPIC` (default: afterburner),
    ///   `MQTT_CLIENT_ID` (default: afterburner_exporter)
    /// - `JSONL_OUTPUT_PATH`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_path = var("AFTERBURNER_LOG_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingVariable("AFTERBURNER_LOG_PATH".to_string()))?;

        let poll_interval_ms = match var("POLL_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|ms| *ms > 0).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "POLL_INTERVAL_MS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let reference_timezone =
            var("REFERENCE_TIMEZONE").unwrap_or_else(|| DEFAULT_REFERENCE_TIMEZONE.to_string());

        let lock_failure_policy = match var("LOCK_FAILURE_POLICY") {
            Some(raw) => raw.parse::<LockFailurePolicy>().map_err(ConfigError::InvalidValue)?,
            None => LockFailurePolicy::default(),
        };

        let influxdb = match (
            var("INFLUXDB_URL"),
            var("INFLUXDB_ORG"),
            var("INFLUXDB_BUCKET"),
            var("INFLUXDB_TOKEN"),
        ) {
            (Some(url), Some(org), Some(bucket), Some(token)) => Some(InfluxDbConfig {
                url,
                org,
                bucket,
                token,
                measurement: var("INFLUXDB_MEASUREMENT")
                    .unwrap_or_else(|| "afterburner".to_string()),
            }),
            _ => None,
        };

        let mqtt_port = match var("MQTT_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue(format!("MQTT_PORT must be a port number, got '{}'", raw))
            })?,
            None => 0,
        };

        let mqtt = match var("MQTT_BROKER") {
            Some(broker) if mqtt_port != 0 => Some(MqttConfig {
                broker,
                port: mqtt_port,
                topic: var("MQTT_TOPIC").unwrap_or_else(|| "afterburner".to_string()),
                client_id: var("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| "afterburner_exporter".to_string()),
            }),
            _ => None,
        };

        let jsonl_path = var("JSONL_OUTPUT_PATH").map(PathBuf::from);

        Ok(Self {
            log_path,
            poll_interval_ms,
            reference_timezone,
            lock_failure_policy,
            influxdb,
            mqtt,
            jsonl_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ExporterConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExporterConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        // Test: only the log path is required
        let config = load(&[("AFTERBURNER_LOG_PATH", "/tmp/HardwareMonitoring.hml")]).unwrap();

        assert_eq!(config.log_path, PathBuf::from("/tmp/HardwareMonitoring.hml"));
        assert_eq!(config.poll_interval_ms, 15_000);
        assert_eq!(config.reference_timezone, "Europe/London");
        assert_eq!(config.lock_failure_policy, LockFailurePolicy::Skip);
        assert!(config.influxdb.is_none());
        assert!(config.mqtt.is_none());
        assert!(config.jsonl_path.is_none());
    }

    #[test]
    fn test_missing_log_path() {
        let result = load(&[("POLL_INTERVAL_MS", "1000")]);
        assert!(matches!(result, Err(ConfigError::MissingVariable(v)) if v == "AFTERBURNER_LOG_PATH"));
    }

    #[test]
    fn test_invalid_interval() {
        let result = load(&[("AFTERBURNER_LOG_PATH", "log.hml"), ("POLL_INTERVAL_MS", "soon")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

        let result = load(&[("AFTERBURNER_LOG_PATH", "log.hml"), ("POLL_INTERVAL_MS", "0")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_influxdb_requires_all_values() {
        let partial = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("INFLUXDB_URL", "http://localhost:8086"),
            ("INFLUXDB_ORG", "home"),
            ("INFLUXDB_BUCKET", "gpu"),
            ("INFLUXDB_TOKEN", " "),
        ])
        .unwrap();
        assert!(partial.influxdb.is_none());

        let full = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("INFLUXDB_URL", "http://localhost:8086"),
            ("INFLUXDB_ORG", "home"),
            ("INFLUXDB_BUCKET", "gpu"),
            ("INFLUXDB_TOKEN", "secret"),
        ])
        .unwrap();
        let influx = full.influxdb.unwrap();
        assert_eq!(influx.url, "http://localhost:8086");
        assert_eq!(influx.measurement, "afterburner");
    }

    #[test]
    fn test_mqtt_config() {
        let config = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("MQTT_BROKER", "broker.local"),
            ("MQTT_PORT", "1883"),
        ])
        .unwrap();
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.broker, "broker.local");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.topic, "afterburner");
        assert_eq!(mqtt.client_id, "afterburner_exporter");

        // Port zero disables the sink
        let config = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("MQTT_BROKER", "broker.local"),
            ("MQTT_PORT", "0"),
        ])
        .unwrap();
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn test_invalid_mqtt_port() {
        let result = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("MQTT_BROKER", "broker.local"),
            ("MQTT_PORT", "eighteen"),
        ]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_lock_failure_policy() {
        let config = load(&[
            ("AFTERBURNER_LOG_PATH", "log.hml"),
            ("LOCK_FAILURE_POLICY", "Escalate"),
            ("JSONL_OUTPUT_PATH", "out/samples.jsonl"),
        ])
        .unwrap();
        assert_eq!(config.lock_failure_policy, LockFailurePolicy::Escalate);
        assert_eq!(config.jsonl_path, Some(PathBuf::from("out/samples.jsonl")));

        let result = load(&[("AFTERBURNER_LOG_PATH", "log.hml"), ("LOCK_FAILURE_POLICY", "panic")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
