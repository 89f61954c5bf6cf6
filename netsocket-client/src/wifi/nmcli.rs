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

use super::WirelessManager;
use crate::error::WirelessError;
use async_trait::async_trait;
use log::{debug, warn};
use netsocket_types::{NetworkId, NetworkProfile, WifiState};
use std::io;
use tokio::process::Command;

const WIFI_CONNECTION_TYPE: &str = "802-11-wireless";
const PREFERRED_PRIORITY: &str = "100";

/// NetworkManager backend driving the `nmcli` tool.
#[derive(Debug, Clone)]
pub struct NmcliWirelessManager {
    interface: String,
    program: String,
}

impl NmcliWirelessManager {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            program: "nmcli".to_string(),
        }
    }

    /// Runs `program` instead of `nmcli` from `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    async fn run(&self, args: &[&str]) -> Result<String, WirelessError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("running {command}");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    WirelessError::Unavailable(format!("{} not found", self.program))
                }
                _ => WirelessError::CommandFailed {
                    command: command.clone(),
                    reason: e.to_string(),
                },
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(WirelessError::CommandFailed { command, reason });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn wifi_connection_ids(&self) -> Result<Vec<NetworkId>, WirelessError> {
        let listing = self
            .run(&["--terse", "--fields", "UUID,TYPE", "connection", "show"])
            .await?;
        Ok(parse_wifi_connections(&listing))
    }

    async fn set_autoconnect(&self, id: &NetworkId, enabled: bool) -> Result<(), WirelessError> {
        let mut args = vec![
            "connection",
            "modify",
            "uuid",
            id.0.as_str(),
            "connection.autoconnect",
            if enabled { "yes" } else { "no" },
        ];
        if enabled {
            args.extend(["connection.autoconnect-priority", PREFERRED_PRIORITY]);
        }
        self.run(&args).await.map(|_| ())
    }
}

#[async_trait]
impl WirelessManager for NmcliWirelessManager {
    async fn add_network(&self, profile: &NetworkProfile) -> Result<NetworkId, WirelessError> {
        // Profiles persist across runs; one per SSID.
        let existing = self.configured_networks().await?;
        if let Some(id) = existing_profile(&existing, &profile.ssid) {
            debug!("Reusing connection {id} for '{}'", profile.ssid);
            return Ok(id);
        }

        let output = self
            .run(&[
                "connection",
                "add",
                "type",
                "wifi",
                "con-name",
                &profile.ssid,
                "ifname",
                &self.interface,
                "ssid",
                &profile.ssid,
            ])
            .await
            .map_err(|e| match e {
                WirelessError::CommandFailed { reason, .. } => WirelessError::Rejected(reason),
                other => other,
            })?;
        parse_added_uuid(&output)
    }

    async fn configured_networks(&self) -> Result<Vec<NetworkProfile>, WirelessError> {
        let mut networks = Vec::new();
        for id in self.wifi_connection_ids().await? {
            let ssid = match self
                .run(&[
                    "--terse",
                    "--get-values",
                    "802-11-wireless.ssid",
                    "connection",
                    "show",
                    "uuid",
                    &id.0,
                ])
                .await
            {
                Ok(output) => output.trim().to_string(),
                Err(e) => {
                    warn!("Skipping connection {id}: {e}");
                    continue;
                }
            };
            networks.push(NetworkProfile::open(ssid).with_id(id));
        }
        Ok(networks)
    }

    async fn disconnect(&self) -> Result<(), WirelessError> {
        self.run(&["device", "disconnect", &self.interface])
            .await
            .map(|_| ())
    }

    async fn enable_network(
        &self,
        id: &NetworkId,
        disable_others: bool,
    ) -> Result<(), WirelessError> {
        if disable_others {
            for other in self.wifi_connection_ids().await? {
                if &other != id {
                    self.set_autoconnect(&other, false).await?;
                }
            }
        }
        self.set_autoconnect(id, true).await
    }

    async fn reconnect(&self) -> Result<(), WirelessError> {
        self.run(&["device", "connect", &self.interface])
            .await
            .map(|_| ())
    }

    async fn wifi_state(&self) -> Result<WifiState, WirelessError> {
        let output = self.run(&["radio", "wifi"]).await?;
        Ok(parse_radio_state(&output))
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<(), WirelessError> {
        let state = if enabled { "on" } else { "off" };
        self.run(&["radio", "wifi", state]).await.map(|_| ())
    }
}

fn existing_profile(networks: &[NetworkProfile], ssid: &str) -> Option<NetworkId> {
    networks
        .iter()
        .filter(|profile| profile.matches(ssid))
        .find_map(|profile| profile.id.clone())
}

/// Extracts the uuid from `Connection 'name' (uuid) successfully added.`
fn parse_added_uuid(output: &str) -> Result<NetworkId, WirelessError> {
    let start = output.rfind('(');
    let end = output.rfind(')');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            let uuid = output[start + 1..end].trim();
            if uuid.is_empty() {
                Err(WirelessError::Parse(output.trim().to_string()))
            } else {
                Ok(NetworkId(uuid.to_string()))
            }
        }
        _ => Err(WirelessError::Parse(output.trim().to_string())),
    }
}

/// Picks the wifi connections out of `--terse --fields UUID,TYPE` output.
fn parse_wifi_connections(output: &str) -> Vec<NetworkId> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .filter(|(_, kind)| *kind == WIFI_CONNECTION_TYPE)
        .map(|(uuid, _)| NetworkId(uuid.to_string()))
        .collect()
}

fn parse_radio_state(output: &str) -> WifiState {
    match output.trim() {
        "enabled" => WifiState::Enabled,
        "disabled" => WifiState::Disabled,
        _ => WifiState::Unknown,
    }
}
