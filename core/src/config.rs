//! Network service configuration.
//!
//! The service takes a single port, overridable from the environment or by
//! the caller before a start. Nothing is persisted.

/// Port used when the caller supplies none.
pub const DEFAULT_PORT: &str = "8765";

/// Loopback address the listener binds and the port probe connects to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variable overriding [`DEFAULT_PORT`].
pub const PORT_ENV: &str = "SCANLINK_PORT";

/// Listener address settings.
///
/// The port is kept as text and validated lazily by
/// [`NetworkService::is_valid`](crate::NetworkService::is_valid).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: String,
}

impl ServiceConfig {
    /// Configuration with the given port on the loopback host.
    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Default configuration, with the port taken from `SCANLINK_PORT` when set.
    pub fn from_env() -> Self {
        match std::env::var(PORT_ENV) {
            Ok(port) if !port.trim().is_empty() => Self::with_port(port.trim()),
            _ => Self::default(),
        }
    }

    /// `host:port` as passed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.address(), "127.0.0.1:8765");
    }

    #[test]
    fn test_with_port_keeps_text() {
        let config = ServiceConfig::with_port("abc");
        assert_eq!(config.address(), "127.0.0.1:abc");
    }
}
