//! Environment configuration.
//!
//! Everything operational comes from the environment, matching the deployment
//! contract: `DENARO_*` for node behaviour, `POSTGRES_*` for storage
//! credentials, `LOG_*` for logging. The embedded storage engine does not
//! dial a database server, but the storage keys are still honoured:
//! `DENARO_DATABASE_NAME` names the on-disk database, and the remaining
//! credentials are accepted so existing deployments keep working unchanged.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

use denaro_chain::parameters::Network;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// How the node finds its first peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bootstrap {
    /// Handshake with this URL at startup.
    Url(String),
    /// Run standalone; this node is its own bootstrap.
    SelfOnly,
    /// Wait for inbound contact and periodic discovery of persisted peers.
    Discover,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub date_format: Option<String>,
    pub console_highlighting: bool,
    pub include_request_content: bool,
    pub include_response_content: bool,
    pub include_block_sync_messages: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Bind address for the framing layer.
    pub host: String,
    pub port: u16,
    /// The URL this node advertises to peers.
    pub self_url: Option<String>,
    pub bootstrap: Bootstrap,
    pub database_host: Option<String>,
    pub database_name: String,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
    pub network: Network,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Config::from_vars(&vars)
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
        let get = |key: &str| vars.get(key).map(|value| value.trim().to_string());

        let port = match get("DENARO_NODE_PORT") {
            None => 3006,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "DENARO_NODE_PORT",
                value: raw,
            })?,
        };

        let bootstrap = match get("DENARO_BOOTSTRAP_NODE").as_deref() {
            None | Some("") | Some("self") => Bootstrap::SelfOnly,
            Some("discover") => Bootstrap::Discover,
            Some(url) => Bootstrap::Url(url.to_string()),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("") | Some("plain") | Some("text") => LogFormat::Plain,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let flag = |key: &'static str, default: bool| -> Result<bool, ConfigError> {
            match get(key).as_deref() {
                None | Some("") => Ok(default),
                Some("1") | Some("true") | Some("yes") => Ok(true),
                Some("0") | Some("false") | Some("no") => Ok(false),
                Some(other) => Err(ConfigError::Invalid {
                    key,
                    value: other.to_string(),
                }),
            }
        };

        Ok(Config {
            host: get("DENARO_NODE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            self_url: get("DENARO_SELF_URL").filter(|url| !url.is_empty()),
            bootstrap,
            database_host: get("DENARO_DATABASE_HOST"),
            database_name: get("DENARO_DATABASE_NAME")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "denaro".to_string()),
            database_user: get("POSTGRES_USER"),
            database_password: get("POSTGRES_PASSWORD"),
            network: Network::Mainnet,
            log: LogConfig {
                level: get("LOG_LEVEL")
                    .filter(|level| !level.is_empty())
                    .unwrap_or_else(|| "info".to_string()),
                format: log_format,
                date_format: get("LOG_DATE_FORMAT").filter(|format| !format.is_empty()),
                console_highlighting: flag("LOG_CONSOLE_HIGHLIGHTING", true)?,
                include_request_content: flag("LOG_INCLUDE_REQUEST_CONTENT", false)?,
                include_response_content: flag("LOG_INCLUDE_RESPONSE_CONTENT", false)?,
                include_block_sync_messages: flag("LOG_INCLUDE_BLOCK_SYNC_MESSAGES", true)?,
            },
        })
    }

    /// The URL peers should reach us at, if one is configured or derivable.
    pub fn advertised_url(&self) -> Option<String> {
        self.self_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_an_empty_environment() {
        let config = Config::from_vars(&vars(&[])).unwrap();
        assert_eq!(config.port, 3006);
        assert_eq!(config.bootstrap, Bootstrap::SelfOnly);
        assert_eq!(config.database_name, "denaro");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Plain);
        assert!(config.log.console_highlighting);
    }

    #[test]
    fn bootstrap_modes_parse() {
        let config =
            Config::from_vars(&vars(&[("DENARO_BOOTSTRAP_NODE", "discover")])).unwrap();
        assert_eq!(config.bootstrap, Bootstrap::Discover);

        let config = Config::from_vars(&vars(&[(
            "DENARO_BOOTSTRAP_NODE",
            "http://seed.denaro.example:3006",
        )]))
        .unwrap();
        assert_eq!(
            config.bootstrap,
            Bootstrap::Url("http://seed.denaro.example:3006".to_string())
        );
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let result = Config::from_vars(&vars(&[("DENARO_NODE_PORT", "not-a-port")]));
        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "DENARO_NODE_PORT"));
    }

    #[test]
    fn log_flags_parse() {
        let config = Config::from_vars(&vars(&[
            ("LOG_FORMAT", "json"),
            ("LOG_CONSOLE_HIGHLIGHTING", "false"),
            ("LOG_INCLUDE_BLOCK_SYNC_MESSAGES", "0"),
        ]))
        .unwrap();
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(!config.log.console_highlighting);
        assert!(!config.log.include_block_sync_messages);
    }
}
