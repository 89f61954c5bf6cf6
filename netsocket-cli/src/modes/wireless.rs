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

use netsocket_cli::cli_args::{resolve_ssid, Associate, Wireless};
use netsocket_client::{
    ClientConfig, NmcliWirelessManager, SimulatedWirelessManager, WifiAssociator, WirelessManager,
};
use tracing::info;

pub type Backend = Box<dyn WirelessManager>;

pub fn backend(wireless: &Wireless, config: &ClientConfig) -> Backend {
    if wireless.simulate_wifi {
        info!("Using the simulated wireless subsystem");
        Box::new(SimulatedWirelessManager::new().with_network(&config.ssid))
    } else {
        Box::new(NmcliWirelessManager::new(config.wifi_interface.clone()))
    }
}

pub async fn associate(args: Associate) -> anyhow::Result<()> {
    let config = args.wireless.load_config()?;
    let ssid = resolve_ssid(args.ssid.as_deref(), &config);
    let associator = WifiAssociator::new(backend(&args.wireless, &config));

    associator
        .ensure_wifi_enabled(config.wifi_enable_timeout())
        .await?;
    let id = associator.associate(&ssid).await?;
    println!("Associating with '{ssid}' ({id})");
    Ok(())
}

pub async fn list_networks(wireless: Wireless) -> anyhow::Result<()> {
    let config = wireless.load_config()?;
    let associator = WifiAssociator::new(backend(&wireless, &config));

    let networks = associator.networks().await?;
    println!("There are {} configured networks.", networks.len());
    for network in networks {
        match network.id {
            Some(id) => println!("{} ({id})", network.ssid),
            None => println!("{}", network.ssid),
        }
    }
    Ok(())
}
