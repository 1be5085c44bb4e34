use crate::error::{NodeError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Every node in the overlay lives on the loopback interface
pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Well-known listener port of the seed node
pub const DEFAULT_SEED_PORT: u16 = 65000;

pub const NODE_PORT_KEY: &str = "NODE_PORT";
pub const SEED_PORT_KEY: &str = "SEED_PORT";

/// Outbound connect retry policy: bounded attempts with exponential backoff
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 25,
            max_backoff_ms: 2000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after the failed attempt number `attempt` (1-based),
    /// before jitter is applied
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Settings of one overlay node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub host: Ipv4Addr,
    pub listener_port: u16,
    pub seed_port: u16,
    pub max_inbound_connections: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_frame_len: u32,
    pub broadcast_wait_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: LOOPBACK,
            listener_port: DEFAULT_SEED_PORT,
            seed_port: DEFAULT_SEED_PORT,
            max_inbound_connections: 32,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_frame_len: 16 * 1024 * 1024,
            broadcast_wait_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults for a node listening on `listener_port`
    pub fn for_port(listener_port: u16) -> Self {
        Self {
            listener_port,
            ..Self::default()
        }
    }

    /// Load settings: defaults, then the optional TOML file, then the
    /// `NODE_PORT` / `SEED_PORT` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(text)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = env::var(NODE_PORT_KEY) {
            self.listener_port = parse_port(NODE_PORT_KEY, &port)?;
        }
        if let Ok(port) = env::var(SEED_PORT_KEY) {
            self.seed_port = parse_port(SEED_PORT_KEY, &port)?;
        }
        Ok(())
    }

    /// Reject settings a node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listener_port == 0 || self.seed_port == 0 {
            return Err(NodeError::Config("Ports must be non-zero".to_string()));
        }
        if self.listener_port == u16::MAX {
            return Err(NodeError::Config(format!(
                "Listener port {} leaves no room for the client port",
                self.listener_port
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(NodeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_inbound_connections == 0 {
            return Err(NodeError::Config(
                "max_inbound_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_seed(&self) -> bool {
        self.listener_port == self.seed_port
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn broadcast_wait(&self) -> Duration {
        Duration::from_millis(self.broadcast_wait_ms)
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| NodeError::Config(format!("{key}={value} is not a port: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.host, LOOPBACK);
        assert_eq!(config.seed_port, DEFAULT_SEED_PORT);
        assert!(config.is_seed());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            listener_port = 7000

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.listener_port, 7000);
        assert_eq!(config.seed_port, DEFAULT_SEED_PORT);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 25);
        assert!(!config.is_seed());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listener_port = 7100\nseed_port = 7200").unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.listener_port, 7100);
        assert_eq!(config.seed_port, 7200);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = NodeConfig::from_toml_str("listener_port = \"seven\"");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig::for_port(u16::MAX);
        assert!(config.validate().is_err());

        config.listener_port = 7000;
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config.retry.max_attempts = 1;
        config.max_inbound_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            jitter: false,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(5), Duration::from_millis(100));
        assert_eq!(policy.backoff(40), Duration::from_millis(100));
    }
}
