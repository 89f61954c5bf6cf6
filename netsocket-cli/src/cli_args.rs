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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use netsocket_client::{ClientConfig, ConfigError, ReadErrorPolicy};
use netsocket_types::{Endpoint, NetworkCredential};

/// Netsocket CLI
///
/// Joins the Raspberry Pi access point and opens a line-based session with
/// the Pi. Lines typed on stdin are sent, lines from the Pi are printed.
#[derive(Parser, Debug)]
#[clap(name = "netsocket")]
pub struct Opt {
    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Join the access point and open a session with the peer.
    Connect(Connect),

    /// Only move the wireless interface to the given network.
    Associate(Associate),

    /// List the networks configured on this host.
    Networks(Wireless),
}

/// Options shared by every subcommand that touches the wireless interface.
#[derive(Args, Debug, Clone)]
pub struct Wireless {
    /// YAML configuration file. Overrides `NETSOCKET_CONFIG_PATH`.
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Wireless interface handed to NetworkManager.
    #[clap(long = "interface", short = 'i')]
    pub interface: Option<String>,

    /// Use an in-memory wireless subsystem instead of nmcli.
    #[clap(long = "simulate-wifi")]
    pub simulate_wifi: bool,
}

impl Wireless {
    /// Loads the configuration file or environment, then applies the flags.
    pub fn load_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::from_env_or_default()?,
        };
        if let Some(interface) = &self.interface {
            config.wifi_interface = interface.clone();
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct Associate {
    #[clap(flatten)]
    pub wireless: Wireless,

    /// Network to join. Names of one character or less fall back to the default.
    #[clap(long = "ssid", short = 's')]
    pub ssid: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct Connect {
    #[clap(flatten)]
    pub wireless: Wireless,

    /// Network to join before connecting.
    #[clap(long = "ssid", short = 's')]
    pub ssid: Option<String>,

    /// Connect over whatever network the host is already on.
    #[clap(long = "skip-wifi")]
    pub skip_wifi: bool,

    /// Peer address as HOST:PORT.
    #[clap(long = "endpoint", short = 'e', conflicts_with_all = ["host", "port"])]
    pub endpoint: Option<Endpoint>,

    #[clap(long = "host")]
    pub host: Option<String>,

    #[clap(long = "port", short = 'p')]
    pub port: Option<u16>,

    /// What to do when a read fails: `terminate` or `keep-reading`.
    #[clap(long = "read-errors")]
    pub read_errors: Option<ReadErrorPolicy>,

    #[clap(long = "connect-timeout-ms")]
    pub connect_timeout_ms: Option<u64>,

    /// End (or, with keep-reading, report) when the peer is silent this long.
    #[clap(long = "read-timeout-ms")]
    pub read_timeout_ms: Option<u64>,
}

/// Resolves the network name the way the settings dialog does.
pub fn resolve_ssid(flag: Option<&str>, config: &ClientConfig) -> String {
    match flag {
        Some(input) => NetworkCredential::from_user_input(input).ssid,
        None => config.ssid.clone(),
    }
}

impl Connect {
    /// Overlays the command line flags on a loaded configuration.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(host) = &self.host {
            config.endpoint.host = host.clone();
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        config.ssid = resolve_ssid(self.ssid.as_deref(), config);
        if let Some(policy) = self.read_errors {
            config.read_errors = policy;
        }
        if self.connect_timeout_ms.is_some() {
            config.connect_timeout_ms = self.connect_timeout_ms;
        }
        if self.read_timeout_ms.is_some() {
            config.read_timeout_ms = self.read_timeout_ms;
        }
        config.validate()
    }
}
