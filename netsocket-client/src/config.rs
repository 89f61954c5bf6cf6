/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Client configuration.
//!
//! Loaded from a YAML file when `NETSOCKET_CONFIG_PATH` is set, otherwise
//! from `NETSOCKET_*` environment variables, falling back to the built-in
//! access point defaults.

use netsocket_types::{Endpoint, DEFAULT_SSID, GREETING, PEER_HOST, PEER_PORT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "NETSOCKET_";

/// What the inbound loop does when a read fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadErrorPolicy {
    /// End the session and report the error.
    #[default]
    Terminate,
    /// Log the error and read again until `stop` is called.
    KeepReading,
}

impl FromStr for ReadErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminate" => Ok(Self::Terminate),
            "keep-reading" | "keep_reading" | "legacy" => Ok(Self::KeepReading),
            other => Err(format!(
                "unknown read error policy '{other}' (expected terminate or keep-reading)"
            )),
        }
    }
}

impl fmt::Display for ReadErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("terminate"),
            Self::KeepReading => f.write_str("keep-reading"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub ssid: String,
    pub greeting: String,
    pub read_errors: ReadErrorPolicy,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    /// Pause between reads after a failure in `keep-reading` mode.
    pub read_retry_delay_ms: u64,
    pub wifi_interface: String,
    pub wifi_enable_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(PEER_HOST, PEER_PORT),
            ssid: DEFAULT_SSID.to_string(),
            greeting: GREETING.to_string(),
            read_errors: ReadErrorPolicy::Terminate,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            read_retry_delay_ms: 100,
            wifi_interface: "wlan0".to_string(),
            wifi_enable_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `NETSOCKET_*` keys supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(path) = var("CONFIG_PATH") {
            return Self::from_file(path);
        }

        let mut config = Self::default();
        if let Some(host) = var("HOST") {
            config.endpoint.host = host;
        }
        if let Some(port) = var("PORT") {
            config.endpoint.port = parse_value("PORT", &port)?;
        }
        if let Some(ssid) = var("SSID") {
            config.ssid = ssid;
        }
        if let Some(greeting) = var("GREETING") {
            config.greeting = greeting;
        }
        if let Some(policy) = var("READ_ERRORS") {
            config.read_errors = parse_value("READ_ERRORS", &policy)?;
        }
        if let Some(ms) = var("CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = Some(parse_value("CONNECT_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = var("READ_TIMEOUT_MS") {
            config.read_timeout_ms = Some(parse_value("READ_TIMEOUT_MS", &ms)?);
        }
        if let Some(interface) = var("WIFI_INTERFACE") {
            config.wifi_interface = interface;
        }
        if let Some(ms) = var("READ_RETRY_DELAY_MS") {
            config.read_retry_delay_ms = parse_value("READ_RETRY_DELAY_MS", &ms)?;
        }
        if let Some(ms) = var("WIFI_ENABLE_TIMEOUT_MS") {
            config.wifi_enable_timeout_ms = parse_value("WIFI_ENABLE_TIMEOUT_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.is_empty() {
            return Err(invalid("endpoint.host", "", "host must not be empty"));
        }
        if self.endpoint.port == 0 {
            return Err(invalid("endpoint.port", "0", "port must be non-zero"));
        }
        for (key, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("wifi_enable_timeout_ms", Some(self.wifi_enable_timeout_ms)),
        ] {
            if value == Some(0) {
                return Err(invalid(key, "0", "timeout must be non-zero"));
            }
        }
        if netsocket_transport::line::contains_terminator(&self.greeting) {
            return Err(invalid(
                "greeting",
                &self.greeting,
                "greeting must be a single line",
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn wifi_enable_timeout(&self) -> Duration {
        Duration::from_millis(self.wifi_enable_timeout_ms)
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(&format!("{ENV_PREFIX}{name}"), raw, &e.to_string()))
}
