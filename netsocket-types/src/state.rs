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

/// Lifecycle of one session run.
///
/// ```text
/// Idle -> Opening -> Open -> Reading -> Closing -> Closed
///            \_______________________________________/^
///                      (connect failure or stop)
/// ```
///
/// `Closed` is terminal for the run; a new `start` creates a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Opening,
    Open,
    Reading,
    Closing,
    Closed,
}

impl SessionState {
    /// True while the connection handle is held and writable.
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Open | SessionState::Reading)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Open => "open",
            SessionState::Reading => "reading",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Radio state reported by a wireless backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
    Unknown,
}
