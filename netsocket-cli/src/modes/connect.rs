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

use super::wireless::{backend, Backend};
use anyhow::anyhow;
use netsocket_cli::cli_args::Connect;
use netsocket_client::{
    CloseReason, SessionController, SessionEvent, SessionManager, WifiAssociator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub async fn connect(args: Connect) -> anyhow::Result<()> {
    let mut config = args.wireless.load_config()?;
    args.apply(&mut config)?;
    info!(
        "Peer {} via '{}' (read errors: {})",
        config.endpoint, config.ssid, config.read_errors
    );

    let (manager, events) = SessionManager::from_config(&config);
    let associator = WifiAssociator::new(backend(&args.wireless, &config));
    let controller = SessionController::new(associator, manager);

    if args.skip_wifi {
        controller.start().await;
    } else {
        controller
            .associator()
            .ensure_wifi_enabled(config.wifi_enable_timeout())
            .await?;
        if let Err(e) = controller.switch_network(&config.ssid).await {
            warn!("Could not join '{}': {e}; connecting over the current network", config.ssid);
            controller.start().await;
        }
    }

    bridge(&controller, events).await
}

/// Sends stdin lines and prints received lines until the session closes or
/// the user interrupts.
async fn bridge(
    controller: &SessionController<Backend>,
    mut events: UnboundedReceiver<SessionEvent>,
) -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing the session");
                controller.stop().await;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = controller.send(line).await {
                        warn!("Not sent: {e}");
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                    controller.stop().await;
                }
                Err(e) => {
                    warn!("Reading stdin failed: {e}");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Some(SessionEvent::LineReceived { line, .. }) => println!("{line}"),
                Some(SessionEvent::Connected { endpoint, .. }) => {
                    info!("Connected to {endpoint}, type a line to send it");
                }
                Some(SessionEvent::StateChanged { session, state }) => {
                    debug!("Session {session}: {state}");
                }
                Some(SessionEvent::Error { error, .. }) => warn!("{error}"),
                Some(SessionEvent::Closed { reason, .. }) => {
                    return match reason {
                        CloseReason::ConnectFailed | CloseReason::HandshakeFailed => {
                            Err(anyhow!("session closed: {reason}"))
                        }
                        _ => {
                            info!("Session closed: {reason}");
                            Ok(())
                        }
                    };
                }
                None => return Ok(()),
            },
        }
    }
}
