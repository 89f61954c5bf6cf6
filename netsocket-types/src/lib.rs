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

//! Shared data model for the netsocket crates.
//!
//! Everything here is plain data: the fixed peer [`Endpoint`], the wireless
//! [`NetworkCredential`] / [`NetworkProfile`] pair, and the lifecycle enums
//! reported by the session manager and the wireless backends.

pub mod endpoint;
pub mod network;
pub mod state;

pub use endpoint::{Endpoint, ParseEndpointError};
pub use network::{NetworkCredential, NetworkId, NetworkProfile};
pub use state::{SessionState, WifiState};

/// SSID used when the user does not supply a usable network name.
pub const DEFAULT_SSID: &str = "RaspberryPiAP";

/// Address of the access point peer.
pub const PEER_HOST: &str = "192.168.3.1";

/// TCP port the peer listens on.
pub const PEER_PORT: u16 = 5000;

/// First line written by the client on every new connection.
pub const GREETING: &str = "Hello Raspberry Pi!";
