//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TASK_TIMEOUT_SECS: u32 = 30;
const DEFAULT_POLL_WINDOW_MS: u64 = 5_000;
const DEFAULT_QUEUE_CAPACITY: usize = 1_000;
const DEFAULT_SPLIT_DEPTH: u32 = 3;

/// What to do with a success report whose count cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedCountPolicy {
    /// Drop the branch's contribution and finish the task. Keeps the run
    /// live but makes the final total inexact.
    #[default]
    Discard,

    /// Put the same cube back in the queue under a fresh task id
    Requeue,
}

impl FromStr for MalformedCountPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "requeue" => Ok(Self::Requeue),
            other => Err(ConfigError::InvalidValue {
                field: "malformed_count_policy".to_string(),
                reason: format!("Unknown policy '{}'. Valid: discard, requeue", other),
            }),
        }
    }
}

/// Configuration for the Coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Solve budget sent to workers with every task
    pub task_timeout_secs: u32,

    /// How long an acquire call waits for work before answering "no work"
    pub poll_window_ms: u64,

    /// Pending queue capacity
    pub queue_capacity: usize,

    /// Number of leading variables the initial partition branches on
    pub initial_split_depth: u32,

    /// Handling of unparseable counts
    pub malformed_count_policy: MalformedCountPolicy,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 50051)),
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            poll_window_ms: DEFAULT_POLL_WINDOW_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            initial_split_depth: DEFAULT_SPLIT_DEPTH,
            malformed_count_policy: MalformedCountPolicy::Discard,
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Load configuration from a TOML file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Override fields from `HYDRASAT_*` environment variables
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(addr) = env_value::<SocketAddr>("HYDRASAT_BIND_ADDRESS")? {
            self.bind_address = addr;
        }
        if let Some(secs) = env_value("HYDRASAT_TASK_TIMEOUT_SECS")? {
            self.task_timeout_secs = secs;
        }
        if let Some(ms) = env_value("HYDRASAT_POLL_WINDOW_MS")? {
            self.poll_window_ms = ms;
        }
        if let Some(capacity) = env_value("HYDRASAT_QUEUE_CAPACITY")? {
            self.queue_capacity = capacity;
        }
        if let Some(depth) = env_value("HYDRASAT_SPLIT_DEPTH")? {
            self.initial_split_depth = depth;
        }
        if let Ok(policy) = std::env::var("HYDRASAT_MALFORMED_POLICY") {
            self.malformed_count_policy = policy.parse()?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "task_timeout_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        if self.poll_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_window_ms".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        // A split reserves two slots at once
        if self.queue_capacity < 2 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity".to_string(),
                reason: "Must hold at least 2 tasks".to_string(),
            });
        }

        if self.initial_split_depth > 20 {
            return Err(ConfigError::InvalidValue {
                field: "initial_split_depth".to_string(),
                reason: "At most 20 (2^20 initial cubes)".to_string(),
            });
        }

        let initial = 1usize << self.initial_split_depth;
        if initial > self.queue_capacity {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity".to_string(),
                reason: format!(
                    "Initial partition has {} cubes but the queue holds {}",
                    initial, self.queue_capacity
                ),
            });
        }

        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.task_timeout_secs))
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_millis(self.poll_window_ms)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            reason: format!("Cannot parse '{}'", raw),
        }),
        Err(_) => Ok(None),
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    bind_address: Option<SocketAddr>,
    task_timeout_secs: Option<u32>,
    poll_window_ms: Option<u64>,
    queue_capacity: Option<usize>,
    initial_split_depth: Option<u32>,
    malformed_count_policy: Option<MalformedCountPolicy>,
    enable_cors: Option<bool>,
    enable_request_logging: Option<bool>,
}

impl CoordinatorConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            reason: format!("Invalid address: {}", addr),
        })?);
        Ok(self)
    }

    /// Set per-task solve budget
    pub fn task_timeout_secs(mut self, secs: u32) -> Self {
        self.task_timeout_secs = Some(secs);
        self
    }

    /// Set acquire poll window
    pub fn poll_window_ms(mut self, ms: u64) -> Self {
        self.poll_window_ms = Some(ms);
        self
    }

    /// Set pending queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set initial partition depth
    pub fn initial_split_depth(mut self, depth: u32) -> Self {
        self.initial_split_depth = Some(depth);
        self
    }

    /// Set malformed-count policy
    pub fn malformed_count_policy(mut self, policy: MalformedCountPolicy) -> Self {
        self.malformed_count_policy = Some(policy);
        self
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Build on top of an existing config instead of the defaults
    pub fn build_from(self, base: CoordinatorConfig) -> Result<CoordinatorConfig, ConfigError> {
        let config = CoordinatorConfig {
            bind_address: self.bind_address.unwrap_or(base.bind_address),
            task_timeout_secs: self.task_timeout_secs.unwrap_or(base.task_timeout_secs),
            poll_window_ms: self.poll_window_ms.unwrap_or(base.poll_window_ms),
            queue_capacity: self.queue_capacity.unwrap_or(base.queue_capacity),
            initial_split_depth: self.initial_split_depth.unwrap_or(base.initial_split_depth),
            malformed_count_policy: self
                .malformed_count_policy
                .unwrap_or(base.malformed_count_policy),
            enable_cors: self.enable_cors.unwrap_or(base.enable_cors),
            enable_request_logging: self
                .enable_request_logging
                .unwrap_or(base.enable_request_logging),
        };

        config.validate()?;
        Ok(config)
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        self.build_from(CoordinatorConfig::default())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    Io { path: String, reason: String },
    Parse { path: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            Self::Io { path, reason } => {
                write!(f, "Failed to read config file {}: {}", path, reason)
            }
            Self::Parse { path, reason } => {
                write!(f, "Failed to parse config file {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.task_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_window(), Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:50051");
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::builder()
            .task_timeout_secs(10)
            .poll_window_ms(250)
            .queue_capacity(64)
            .initial_split_depth(4)
            .malformed_count_policy(MalformedCountPolicy::Requeue)
            .build()
            .unwrap();

        assert_eq!(config.task_timeout_secs, 10);
        assert_eq!(config.poll_window_ms, 250);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.initial_split_depth, 4);
        assert_eq!(config.malformed_count_policy, MalformedCountPolicy::Requeue);
    }

    #[test]
    fn test_config_validation_fails() {
        assert!(CoordinatorConfig::builder().task_timeout_secs(0).build().is_err());
        assert!(CoordinatorConfig::builder().queue_capacity(1).build().is_err());

        // 2^4 = 16 initial cubes do not fit in 8 slots
        let err = CoordinatorConfig::builder()
            .queue_capacity(8)
            .initial_split_depth(4)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_config_builder_with_address() {
        let config = CoordinatorConfig::builder()
            .bind_address_str("127.0.0.1:9000")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.bind_address.port(), 9000);
        assert!(CoordinatorConfig::builder().bind_address_str("nope").is_err());
    }

    #[test]
    fn test_build_from_keeps_base() {
        let base = CoordinatorConfig {
            queue_capacity: 32,
            ..Default::default()
        };
        let config = CoordinatorConfig::builder()
            .task_timeout_secs(5)
            .build_from(base)
            .unwrap();

        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.task_timeout_secs, 5);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("discard".parse(), Ok(MalformedCountPolicy::Discard));
        assert_eq!("REQUEUE".parse(), Ok(MalformedCountPolicy::Requeue));
        assert!("retry".parse::<MalformedCountPolicy>().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "task_timeout_secs = 12").unwrap();
        writeln!(file, "malformed_count_policy = \"requeue\"").unwrap();

        let config = CoordinatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.task_timeout_secs, 12);
        assert_eq!(config.malformed_count_policy, MalformedCountPolicy::Requeue);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "task_timeout_secs = \"soon\"").unwrap();

        assert!(matches!(
            CoordinatorConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
