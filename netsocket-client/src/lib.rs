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

//! This crate provides the network session manager: it steers the wireless
//! interface to a named access point and owns one line-oriented connection
//! to the peer behind it.
//!
//! # Outline of usage
//!
//! For more detailed documentation see the doc for each struct.
//!
//! ## Session creation and messaging:
//! ```no_run
//! use netsocket_client::{ClientConfig, SessionEvent, SessionManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env_or_default()?;
//! let (manager, mut events) = SessionManager::from_config(&config);
//!
//! manager.start().await;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Connected { .. } => manager.send("ping").await?,
//!         SessionEvent::LineReceived { line, .. } => println!("{line}"),
//!         SessionEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Switching networks:
//! ```no_run
//! use netsocket_client::{
//!     NmcliWirelessManager, SessionController, SessionManager, SessionSettings, WifiAssociator,
//! };
//! use netsocket_transport::TcpConnector;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let associator = WifiAssociator::new(NmcliWirelessManager::new("wlan0"));
//! let (manager, _events) = SessionManager::new(SessionSettings::default(), TcpConnector::new());
//! let controller = SessionController::new(associator, manager);
//!
//! controller.switch_network("RaspberryPiAP").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod controller;
pub mod error;
pub mod events;
pub mod session;
pub mod wifi;

pub use config::{ClientConfig, ConfigError, ReadErrorPolicy};
pub use controller::SessionController;
pub use error::{AssociationError, AssociationStep, SessionError, WirelessError};
pub use events::{CloseReason, SessionEvent, SessionId};
pub use session::{SessionManager, SessionSettings, STOP_TIMEOUT};
pub use wifi::{
    NmcliWirelessManager, SimulatedWirelessManager, WifiAssociator, WirelessCall,
    WirelessManager,
};
