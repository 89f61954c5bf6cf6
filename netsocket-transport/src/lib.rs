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

//! Transport layer for netsocket.
//!
//! Provides the [`Connector`] seam the session manager dials through, a
//! Tokio TCP implementation of it, and the newline-delimited text codec used
//! on the wire.
//!
//! # Example
//!
//! ```no_run
//! use netsocket_transport::{line, Connector, TcpConnector};
//! use netsocket_types::Endpoint;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpConnector::new().connect(&Endpoint::default()).await?;
//! let (mut reader, mut writer) = line::split(stream);
//!
//! writer.write_line("Hello Raspberry Pi!").await?;
//! while let Some(line) = reader.read_line().await? {
//!     println!("peer said: {line}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod line;
pub mod tcp;

pub use line::{LineReader, LineWriter};
pub use tcp::{ConnectError, Connector, TcpConnector};
