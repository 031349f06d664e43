//! System configuration parsing.
//!
//! ```kdl
//! server {
//!     listen "0.0.0.0:3000"
//!     log-format "json"
//!     event-capacity 256
//! }
//! ```
//!
//! Every setting is optional and falls back to [`ServerConfig::default`].

use crate::kdl_ext::{first_integer_arg, first_string_arg};
use crate::{ConfigError, ConfigResult};
use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// System-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub listen: SocketAddr,
    pub log_format: LogFormat,
    /// Buffered pipeline events per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_format: LogFormat::Text,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        if node.name().value() != "server" {
            continue;
        }
        let Some(children) = node.children() else {
            continue;
        };
        for child in children.nodes() {
            let field = child.name().value();
            match field {
                "listen" => {
                    let raw = first_string_arg(child)
                        .ok_or_else(|| ConfigError::MissingField("server listen".to_string()))?;
                    config.server.listen = raw.parse().map_err(|_| invalid(field, &raw))?;
                }
                "log-format" => {
                    let raw = first_string_arg(child).unwrap_or_default();
                    config.server.log_format = match raw.as_str() {
                        "text" => LogFormat::Text,
                        "json" => LogFormat::Json,
                        _ => return Err(invalid(field, &raw)),
                    };
                }
                "event-capacity" => {
                    let raw = first_integer_arg(child).ok_or_else(|| {
                        ConfigError::MissingField("server event-capacity".to_string())
                    })?;
                    config.server.event_capacity = usize::try_from(raw)
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| invalid(field, &raw.to_string()))?;
                }
                _ => {}
            }
        }
    }

    Ok(config)
}

/// Read and parse a system configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

fn invalid(field: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("server {}", field),
        message: format!("'{}'", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.server.listen.port(), 3000);
    }

    #[test]
    fn test_parse_server_block() {
        let kdl = r#"
            server {
                listen "127.0.0.1:8080"
                log-format "json"
                event-capacity 64
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.server.event_capacity, 64);
    }

    #[test]
    fn test_reject_invalid_values() {
        let bad_addr = r#"server { listen "nowhere"; }"#;
        assert!(matches!(
            parse_system_config(bad_addr).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));

        let zero = r#"server { event-capacity 0; }"#;
        assert!(matches!(
            parse_system_config(zero).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));

        let format = r#"server { log-format "xml"; }"#;
        assert!(parse_system_config(format).is_err());
    }
}
