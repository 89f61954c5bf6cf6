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

//! Steering the wireless interface to a named open network.
//!
//! [`WifiAssociator`] holds the association procedure. The OS facing part is
//! the [`WirelessManager`] trait, implemented by [`NmcliWirelessManager`] for
//! NetworkManager hosts and by [`SimulatedWirelessManager`] for tests and
//! dry runs.

mod nmcli;
mod simulated;

pub use nmcli::NmcliWirelessManager;
pub use simulated::{SimulatedWirelessManager, WirelessCall};

use crate::error::{AssociationError, AssociationStep, WirelessError};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use netsocket_types::{NetworkId, NetworkProfile, WifiState};
use std::time::Duration;
use tokio::time::Instant;

const WIFI_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The network profile API of the host's wireless subsystem.
#[async_trait]
pub trait WirelessManager: Send + Sync {
    /// Stores a profile and returns the id the subsystem assigned to it.
    async fn add_network(&self, profile: &NetworkProfile) -> Result<NetworkId, WirelessError>;

    async fn configured_networks(&self) -> Result<Vec<NetworkProfile>, WirelessError>;

    async fn disconnect(&self) -> Result<(), WirelessError>;

    /// Marks `id` as the network to join. With `disable_others` every other
    /// profile is kept from auto-joining.
    async fn enable_network(&self, id: &NetworkId, disable_others: bool)
        -> Result<(), WirelessError>;

    async fn reconnect(&self) -> Result<(), WirelessError>;

    async fn wifi_state(&self) -> Result<WifiState, WirelessError>;

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<(), WirelessError>;
}

#[async_trait]
impl<T: WirelessManager + ?Sized> WirelessManager for Box<T> {
    async fn add_network(&self, profile: &NetworkProfile) -> Result<NetworkId, WirelessError> {
        (**self).add_network(profile).await
    }

    async fn configured_networks(&self) -> Result<Vec<NetworkProfile>, WirelessError> {
        (**self).configured_networks().await
    }

    async fn disconnect(&self) -> Result<(), WirelessError> {
        (**self).disconnect().await
    }

    async fn enable_network(
        &self,
        id: &NetworkId,
        disable_others: bool,
    ) -> Result<(), WirelessError> {
        (**self).enable_network(id, disable_others).await
    }

    async fn reconnect(&self) -> Result<(), WirelessError> {
        (**self).reconnect().await
    }

    async fn wifi_state(&self) -> Result<WifiState, WirelessError> {
        (**self).wifi_state().await
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<(), WirelessError> {
        (**self).set_wifi_enabled(enabled).await
    }
}

pub struct WifiAssociator<W> {
    manager: W,
}

impl<W: WirelessManager> WifiAssociator<W> {
    pub fn new(manager: W) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &W {
        &self.manager
    }

    /// Registers `ssid` as an open network profile.
    pub async fn register_network(&self, ssid: &str) -> Result<NetworkId, AssociationError> {
        let profile = NetworkProfile::open(ssid);
        match self.manager.add_network(&profile).await {
            Ok(id) => {
                info!("Registered network '{ssid}' as {id}");
                Ok(id)
            }
            Err(source) => {
                error!("Network profile for '{ssid}' rejected: {source}");
                Err(AssociationError::ConfigRejected {
                    ssid: ssid.to_string(),
                    source,
                })
            }
        }
    }

    /// Moves the interface onto the configured network named `ssid`.
    ///
    /// Disconnect, enable and reconnect are all attempted even when an
    /// earlier one fails. Returns once the requests are issued; the link
    /// itself comes up asynchronously.
    pub async fn activate(&self, ssid: &str) -> Result<NetworkId, AssociationError> {
        let networks = self
            .manager
            .configured_networks()
            .await
            .map_err(|e| {
                error!("Listing configured networks failed: {e}");
                AssociationError::ListFailed(e)
            })?;

        // First match wins when several profiles share an SSID.
        let id = networks
            .iter()
            .filter(|profile| profile.matches(ssid))
            .find_map(|profile| profile.id.clone())
            .ok_or_else(|| {
                warn!("No configured network matches '{ssid}'");
                AssociationError::NetworkNotFound {
                    ssid: ssid.to_string(),
                }
            })?;

        let mut failed = Vec::new();
        if let Err(e) = self.manager.disconnect().await {
            error!("Disconnect before joining '{ssid}' failed: {e}");
            failed.push(AssociationStep::Disconnect);
        }
        if let Err(e) = self.manager.enable_network(&id, true).await {
            error!("Enabling network '{ssid}' ({id}) failed: {e}");
            failed.push(AssociationStep::Enable);
        }
        if let Err(e) = self.manager.reconnect().await {
            error!("Reconnect to '{ssid}' failed: {e}");
            failed.push(AssociationStep::Reconnect);
        }

        if failed.is_empty() {
            info!("Associating with '{ssid}' ({id})");
            Ok(id)
        } else {
            Err(AssociationError::StepsFailed {
                ssid: ssid.to_string(),
                failed,
            })
        }
    }

    /// Registers and activates `ssid`. A rejected profile stops here.
    pub async fn associate(&self, ssid: &str) -> Result<NetworkId, AssociationError> {
        self.register_network(ssid).await?;
        self.activate(ssid).await
    }

    pub async fn networks(&self) -> Result<Vec<NetworkProfile>, AssociationError> {
        self.manager
            .configured_networks()
            .await
            .map_err(AssociationError::ListFailed)
    }

    /// Turns the radio on if needed and waits until it reports `Enabled`.
    pub async fn ensure_wifi_enabled(&self, timeout: Duration) -> Result<(), AssociationError> {
        let unavailable = |reason: String| AssociationError::WifiUnavailable { reason };

        let state = self
            .manager
            .wifi_state()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        match state {
            WifiState::Enabled => return Ok(()),
            WifiState::Enabling => debug!("Wifi radio is already turning on"),
            WifiState::Disabled | WifiState::Disabling | WifiState::Unknown => {
                info!("Wifi radio is {state:?}, turning it on");
                self.manager
                    .set_wifi_enabled(true)
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.manager.wifi_state().await {
                Ok(WifiState::Enabled) => {
                    info!("Wifi radio enabled");
                    return Ok(());
                }
                Ok(state) => debug!("Wifi radio state: {state:?}"),
                Err(e) => warn!("Reading wifi state failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(unavailable(format!(
                    "radio not enabled after {timeout:?}"
                )));
            }
            tokio::time::sleep(WIFI_POLL_INTERVAL).await;
        }
    }
}
