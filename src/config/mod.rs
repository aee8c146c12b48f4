use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Token every accepted host must contain
    pub domain: String,
    /// Scheme and host canonical post URLs are rebuilt on
    pub canonical_origin: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            domain: "reddit.com".to_string(),
            canonical_origin: "https://www.reddit.com".to_string(),
            // <platform>:<app>:<version>, as upstream asks API clients to identify
            user_agent: format!(
                "rust:reddit-gallery-dl:v{} (by /u/reddit-gallery-dl)",
                env!("CARGO_PKG_VERSION")
            ),
            timeout_secs: 120,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    /// Replaces the port of the bind address, keeping its IP.
    pub fn apply_port_override(&mut self, port: &str) -> Result<()> {
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("Invalid port: {}", port))?;
        self.server.bind_address.set_port(port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind_address.port(), 5000);
        assert_eq!(config.upstream.domain, "reddit.com");
        assert_eq!(config.upstream.canonical_origin, "https://www.reddit.com");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(120));
        assert_eq!(config.get_logging_format(), "json");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [upstream]
            timeout_secs = 30

            [logging]
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.upstream.domain, "reddit.com");
        assert!(config.upstream.user_agent.contains("reddit-gallery-dl"));
        assert_eq!(config.get_logging_format(), "pretty");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:8080\"").unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            config.server.bind_address,
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_from_missing_file_fails() {
        assert!(Config::from_file("/nonexistent/config.toml").is_err());
    }

    #[test]
    fn test_invalid_toml_fails() {
        assert!(Config::from_toml("[server\nbind_address = ").is_err());
    }

    #[test]
    fn test_port_override() {
        let mut config = Config::default();
        config.apply_port_override("8081").unwrap();
        assert_eq!(config.server.bind_address.port(), 8081);
        assert!(config.apply_port_override("not-a-port").is_err());
    }
}
