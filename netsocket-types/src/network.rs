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

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DEFAULT_SSID;

/// Name of the open wireless network to join. No password is modeled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkCredential {
    pub ssid: String,
}

impl NetworkCredential {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self { ssid: ssid.into() }
    }

    /// Turns free-form user input into a credential.
    ///
    /// Inputs of zero or one character fall back to [`DEFAULT_SSID`].
    pub fn from_user_input(input: &str) -> Self {
        if input.chars().count() > 1 {
            Self::new(input)
        } else {
            Self::default()
        }
    }
}

impl Default for NetworkCredential {
    fn default() -> Self {
        Self::new(DEFAULT_SSID)
    }
}

impl fmt::Display for NetworkCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ssid)
    }
}

/// Opaque identifier a wireless backend assigns to a stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub String);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An open-network profile as known to the wireless subsystem.
///
/// `id` is `None` until the backend has accepted the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NetworkId>,
}

impl NetworkProfile {
    pub fn open(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: NetworkId) -> Self {
        self.id = Some(id);
        self
    }

    /// Exact, case-sensitive SSID comparison.
    pub fn matches(&self, ssid: &str) -> bool {
        self.ssid == ssid
    }
}

impl From<&NetworkCredential> for NetworkProfile {
    fn from(credential: &NetworkCredential) -> Self {
        Self::open(credential.ssid.clone())
    }
}
