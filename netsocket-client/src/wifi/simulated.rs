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
use crate::error::{AssociationStep, WirelessError};
use async_trait::async_trait;
use log::debug;
use netsocket_types::{NetworkId, NetworkProfile, WifiState};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A call received by [`SimulatedWirelessManager`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirelessCall {
    AddNetwork(String),
    ConfiguredNetworks,
    Disconnect,
    EnableNetwork {
        id: NetworkId,
        disable_others: bool,
    },
    Reconnect,
    WifiState,
    SetWifiEnabled(bool),
}

#[derive(Debug)]
struct Inner {
    networks: Vec<NetworkProfile>,
    next_id: u64,
    calls: Vec<WirelessCall>,
    failing: HashSet<AssociationStep>,
    reject_profiles: bool,
    wifi: WifiState,
    enabled: Option<NetworkId>,
}

/// In-memory wireless subsystem with scriptable failures.
#[derive(Debug)]
pub struct SimulatedWirelessManager {
    inner: Mutex<Inner>,
}

impl Default for SimulatedWirelessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedWirelessManager {
    /// An empty subsystem with the radio on.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                networks: Vec::new(),
                next_id: 1,
                calls: Vec::new(),
                failing: HashSet::new(),
                reject_profiles: false,
                wifi: WifiState::Enabled,
                enabled: None,
            }),
        }
    }

    /// Adds a pre-configured profile for `ssid`.
    pub fn with_network(self, ssid: &str) -> Self {
        {
            let mut inner = self.lock();
            let id = inner.allocate_id();
            inner.networks.push(NetworkProfile::open(ssid).with_id(id));
        }
        self
    }

    /// Makes every `add_network` call fail.
    pub fn rejecting_profiles(self) -> Self {
        self.lock().reject_profiles = true;
        self
    }

    pub fn failing(self, step: AssociationStep) -> Self {
        self.lock().failing.insert(step);
        self
    }

    pub fn with_wifi_state(self, state: WifiState) -> Self {
        self.lock().wifi = state;
        self
    }

    pub fn calls(&self) -> Vec<WirelessCall> {
        self.lock().calls.clone()
    }

    /// The network most recently enabled.
    pub fn enabled_network(&self) -> Option<NetworkId> {
        self.lock().enabled.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn step(&self, call: WirelessCall, step: AssociationStep) -> Result<(), WirelessError> {
        let mut inner = self.lock();
        debug!("simulated wifi: {call:?}");
        inner.calls.push(call);
        if inner.failing.contains(&step) {
            return Err(WirelessError::Rejected(format!("simulated {step} failure")));
        }
        Ok(())
    }
}

impl Inner {
    fn allocate_id(&mut self) -> NetworkId {
        let id = NetworkId(format!("sim-{}", self.next_id));
        self.next_id += 1;
        id
    }
}

#[async_trait]
impl WirelessManager for SimulatedWirelessManager {
    async fn add_network(&self, profile: &NetworkProfile) -> Result<NetworkId, WirelessError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(WirelessCall::AddNetwork(profile.ssid.clone()));
        if inner.reject_profiles {
            return Err(WirelessError::Rejected(format!(
                "profile '{}' refused",
                profile.ssid
            )));
        }
        let id = inner.allocate_id();
        inner
            .networks
            .push(NetworkProfile::open(profile.ssid.clone()).with_id(id.clone()));
        Ok(id)
    }

    async fn configured_networks(&self) -> Result<Vec<NetworkProfile>, WirelessError> {
        let mut inner = self.lock();
        inner.calls.push(WirelessCall::ConfiguredNetworks);
        Ok(inner.networks.clone())
    }

    async fn disconnect(&self) -> Result<(), WirelessError> {
        self.step(WirelessCall::Disconnect, AssociationStep::Disconnect)
    }

    async fn enable_network(
        &self,
        id: &NetworkId,
        disable_others: bool,
    ) -> Result<(), WirelessError> {
        let call = WirelessCall::EnableNetwork {
            id: id.clone(),
            disable_others,
        };
        self.step(call, AssociationStep::Enable)?;
        self.lock().enabled = Some(id.clone());
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), WirelessError> {
        self.step(WirelessCall::Reconnect, AssociationStep::Reconnect)
    }

    async fn wifi_state(&self) -> Result<WifiState, WirelessError> {
        let mut inner = self.lock();
        inner.calls.push(WirelessCall::WifiState);
        Ok(inner.wifi)
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<(), WirelessError> {
        let mut inner = self.lock();
        inner.calls.push(WirelessCall::SetWifiEnabled(enabled));
        inner.wifi = if enabled {
            WifiState::Enabled
        } else {
            WifiState::Disabled
        };
        Ok(())
    }
}
