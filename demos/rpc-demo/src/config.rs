//! Process-wide configuration: a `-i <path>` CLI flag pointing at a plain
//! `key=value` file, loaded once and shared by both demo binaries.

use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("missing required config key {key}")]
    MissingKey { key: String },
    #[error("config key {key} is not a valid port number")]
    InvalidPort { key: String },
}

/// The handful of keys spec §6 recognizes in the `key=value` config file.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_server_ip: String,
    pub rpc_server_port: u16,
    pub zookeeper_ip: String,
    pub zookeeper_port: u16,
}

impl AppConfig {
    fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| map.get(key).cloned().ok_or_else(|| ConfigError::MissingKey { key: key.into() });
        let port = |key: &str| -> Result<u16, ConfigError> {
            get(key)?.parse().map_err(|_| ConfigError::InvalidPort { key: key.into() })
        };
        Ok(Self {
            rpc_server_ip: get("rpcserverip")?,
            rpc_server_port: port("rpcserverport")?,
            zookeeper_ip: get("zookeeperip")?,
            zookeeper_port: port("zookeeperport")?,
        })
    }

    /// Parses a `key=value` per line file, ignoring blank lines and `#`
    /// comments.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read { path: path.into(), reason: err.to_string() })?;
        let mut map = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self::from_map(&map)
    }
}

static GLOBAL: OnceLock<AppConfig> = OnceLock::new();

/// Installs the process-wide config. Idempotent: if another caller (or a
/// racing thread) already installed one, `config` is dropped and the
/// existing instance wins — matching `Supervisor::global`'s
/// `get_or_init` shape rather than panicking on a second call.
pub fn init(config: AppConfig) {
    GLOBAL.get_or_init(|| config);
}

/// Reads the process-wide config. Panics if `init` has not run yet.
pub fn global() -> &'static AppConfig {
    GLOBAL.get().expect("AppConfig not initialized — call config::init first")
}

/// Parses `-i <path>` out of `args` (excluding argv[0]). Prints a usage
/// line and exits non-zero on `-?` or a missing/malformed flag, matching
/// the original command's `getopt`-based behavior.
pub fn parse_cli_path(args: &[String]) -> String {
    let usage = || {
        eprintln!("usage: command -i <config file path>");
        std::process::exit(1);
    };

    if args.is_empty() {
        usage();
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" => return iter.next().cloned().unwrap_or_else(|| usage()),
            "-?" => usage(),
            _ => {}
        }
    }
    usage()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_keys() {
        let mut map = HashMap::new();
        map.insert("rpcserverip".into(), "127.0.0.1".into());
        map.insert("rpcserverport".into(), "8000".into());
        map.insert("zookeeperip".into(), "127.0.0.1".into());
        map.insert("zookeeperport".into(), "2181".into());
        let config = AppConfig::from_map(&map).unwrap();
        assert_eq!(config.rpc_server_port, 8000);
        assert_eq!(config.zookeeper_port, 2181);
    }

    #[test]
    fn missing_key_is_reported() {
        let map = HashMap::new();
        let err = AppConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn non_numeric_port_is_reported() {
        let mut map = HashMap::new();
        map.insert("rpcserverip".into(), "127.0.0.1".into());
        map.insert("rpcserverport".into(), "not-a-port".into());
        map.insert("zookeeperip".into(), "127.0.0.1".into());
        map.insert("zookeeperport".into(), "2181".into());
        let err = AppConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }
}
