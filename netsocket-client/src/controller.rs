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

//! Glue between network selection and the session, as a UI would drive it.

use crate::error::{AssociationError, SessionError};
use crate::events::SessionId;
use crate::session::SessionManager;
use crate::wifi::{WifiAssociator, WirelessManager};
use log::{info, warn};
use netsocket_transport::{Connector, TcpConnector};
use std::time::Duration;

pub struct SessionController<W, C: Connector = TcpConnector> {
    associator: WifiAssociator<W>,
    session: SessionManager<C>,
}

impl<W: WirelessManager, C: Connector> SessionController<W, C> {
    pub fn new(associator: WifiAssociator<W>, session: SessionManager<C>) -> Self {
        Self {
            associator,
            session,
        }
    }

    pub fn associator(&self) -> &WifiAssociator<W> {
        &self.associator
    }

    pub fn session(&self) -> &SessionManager<C> {
        &self.session
    }

    /// Joins `ssid` and restarts the session on it.
    ///
    /// When association fails the running session is left alone.
    pub async fn switch_network(&self, ssid: &str) -> Result<SessionId, AssociationError> {
        match self.associator.associate(ssid).await {
            Ok(network) => {
                info!("Joined '{ssid}' ({network}), restarting session");
                Ok(self.session.start().await)
            }
            Err(e) => {
                warn!("Staying on the current network: {e}");
                Err(e)
            }
        }
    }

    /// Waits for the radio to come up, then starts the session.
    pub async fn start_when_wifi_ready(
        &self,
        timeout: Duration,
    ) -> Result<SessionId, AssociationError> {
        self.associator.ensure_wifi_enabled(timeout).await?;
        Ok(self.session.start().await)
    }

    pub async fn start(&self) -> SessionId {
        self.session.start().await
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.session.send(text).await
    }

    pub async fn stop(&self) {
        self.session.stop().await
    }
}
