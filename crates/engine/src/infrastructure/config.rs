//! Server configuration read from `LOBBY_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::lobby::{RegistryConfig, StartPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LobbyConfig {
    pub host: String,
    pub port: u16,
    /// Admin HTTP surface; disabled when `None`
    pub admin_addr: Option<SocketAddr>,
    pub max_connections: usize,
    pub max_frame_bytes: usize,
    pub handshake_timeout: Duration,
    pub outbound_capacity: usize,
    pub flush_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_room_members: Option<usize>,
    pub start_policy: StartPolicy,
    /// Accounts JSON for credential checks; dev auth when `None`
    pub accounts_file: Option<PathBuf>,
    pub worker_threads: Option<usize>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            admin_addr: None,
            max_connections: 1024,
            max_frame_bytes: 64 * 1024,
            handshake_timeout: Duration::from_millis(5_000),
            outbound_capacity: 256,
            flush_timeout: Duration::from_millis(1_000),
            heartbeat_interval: Duration::from_millis(5_000),
            heartbeat_timeout: Duration::from_millis(30_000),
            max_room_members: None,
            start_policy: StartPolicy::AnyMember,
            accounts_file: None,
            worker_threads: None,
        }
    }
}

impl LobbyConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset or blank keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            host: get("LOBBY_HOST").unwrap_or(defaults.host),
            port: parse(&get, "LOBBY_PORT")?.unwrap_or(defaults.port),
            admin_addr: parse(&get, "LOBBY_ADMIN_ADDR")?,
            max_connections: positive(&get, "LOBBY_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            max_frame_bytes: positive(&get, "LOBBY_MAX_FRAME_BYTES")?
                .unwrap_or(defaults.max_frame_bytes),
            handshake_timeout: millis(&get, "LOBBY_HANDSHAKE_TIMEOUT_MS")?
                .unwrap_or(defaults.handshake_timeout),
            outbound_capacity: positive(&get, "LOBBY_OUTBOUND_CAPACITY")?
                .unwrap_or(defaults.outbound_capacity),
            flush_timeout: millis(&get, "LOBBY_FLUSH_TIMEOUT_MS")?
                .unwrap_or(defaults.flush_timeout),
            heartbeat_interval: millis(&get, "LOBBY_HEARTBEAT_INTERVAL_MS")?
                .unwrap_or(defaults.heartbeat_interval),
            heartbeat_timeout: millis(&get, "LOBBY_HEARTBEAT_TIMEOUT_MS")?
                .unwrap_or(defaults.heartbeat_timeout),
            max_room_members: positive(&get, "LOBBY_MAX_ROOM_MEMBERS")?,
            start_policy: match get("LOBBY_START_POLICY") {
                Some(raw) => raw.parse().map_err(|()| {
                    ConfigError::invalid("LOBBY_START_POLICY", &raw, "expected 'any' or 'host'")
                })?,
                None => defaults.start_policy,
            },
            accounts_file: get("LOBBY_ACCOUNTS_FILE").map(PathBuf::from),
            worker_threads: positive(&get, "LOBBY_WORKER_THREADS")?,
        };
        Ok(config)
    }

    /// Address the game listener binds, as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_room_members: self.max_room_members,
            start_policy: self.start_policy,
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string()))
        })
        .transpose()
}

fn positive(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match parse::<usize>(get, key)? {
        Some(0) => Err(ConfigError::invalid(key, "0", "must be greater than zero")),
        other => Ok(other),
    }
}

fn millis(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(positive(get, key)?.map(|ms| Duration::from_millis(ms as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = LobbyConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, LobbyConfig::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5555");
        assert_eq!(config.registry_config().start_policy, StartPolicy::AnyMember);
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = LobbyConfig::from_lookup(lookup(&[
            ("LOBBY_HOST", "127.0.0.1"),
            ("LOBBY_PORT", "7000"),
            ("LOBBY_ADMIN_ADDR", "127.0.0.1:7001"),
            ("LOBBY_HEARTBEAT_TIMEOUT_MS", "1500"),
            ("LOBBY_MAX_ROOM_MEMBERS", "8"),
            ("LOBBY_START_POLICY", "host"),
            ("LOBBY_ACCOUNTS_FILE", "accounts.json"),
            ("LOBBY_WORKER_THREADS", ""),
        ]))
        .expect("valid config");

        assert_eq!(config.listen_addr(), "127.0.0.1:7000");
        assert_eq!(config.admin_addr, Some("127.0.0.1:7001".parse().expect("addr")));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_room_members, Some(8));
        assert_eq!(config.start_policy, StartPolicy::HostOnly);
        assert_eq!(config.accounts_file, Some(PathBuf::from("accounts.json")));
        assert_eq!(config.worker_threads, None);
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = LobbyConfig::from_lookup(lookup(&[("LOBBY_PORT", "lots")])).expect_err("bad port");
        assert!(matches!(err, ConfigError::Invalid { key: "LOBBY_PORT", .. }));

        let err = LobbyConfig::from_lookup(lookup(&[("LOBBY_MAX_CONNECTIONS", "0")]))
            .expect_err("zero connections");
        assert!(matches!(err, ConfigError::Invalid { key: "LOBBY_MAX_CONNECTIONS", .. }));

        let err = LobbyConfig::from_lookup(lookup(&[("LOBBY_START_POLICY", "dm")]))
            .expect_err("unknown policy");
        assert!(matches!(err, ConfigError::Invalid { key: "LOBBY_START_POLICY", .. }));
    }
}
