//! Discovery of running emulator instances

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::transport::DeviceTransport;
use crate::config::DiscoveryConfig;
use crate::error::Result;

/// A reachable instance found by a discovery sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub port: Option<u16>,
}

impl DiscoveredDevice {
    /// Whether the address is in raw `host:port` form rather than an alias
    pub fn is_raw_address(&self) -> bool {
        self.address.contains(':')
    }
}

/// Resolve the adb port behind an address.
///
/// `host:port` resolves to `port`. The alias `emulator-N` names the console
/// port N; its adb port is N + 1.
pub fn port_of(address: &str) -> Option<u16> {
    if let Some((_, port)) = address.rsplit_once(':') {
        return port.parse().ok();
    }
    address
        .strip_prefix("emulator-")
        .and_then(|console| console.parse::<u16>().ok())
        .and_then(|console| console.checked_add(1))
}

/// Parse `adb devices` output, keeping only entries in the `device` state.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*'))
        .filter(|line| !line.to_lowercase().starts_with("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            (state == "device").then(|| serial.to_string())
        })
        .collect()
}

/// Collapse entries resolving to the same port into one, preferring the raw
/// address form, and sort ascending by port. Entries without a port follow,
/// ordered by address.
pub fn dedup_by_port(addresses: &[String]) -> Vec<DiscoveredDevice> {
    let mut by_port: BTreeMap<u16, DiscoveredDevice> = BTreeMap::new();
    let mut portless: BTreeMap<String, DiscoveredDevice> = BTreeMap::new();

    for address in addresses {
        let candidate = DiscoveredDevice {
            address: address.clone(),
            port: port_of(address),
        };
        let Some(port) = candidate.port else {
            portless.insert(candidate.address.clone(), candidate);
            continue;
        };

        match by_port.get(&port) {
            None => {
                by_port.insert(port, candidate);
            }
            Some(existing) => {
                let replace = match (existing.is_raw_address(), candidate.is_raw_address()) {
                    (false, true) => true,
                    (true, false) => false,
                    _ => candidate.address < existing.address,
                };
                if replace {
                    by_port.insert(port, candidate);
                }
            }
        }
    }

    by_port.into_values().chain(portless.into_values()).collect()
}

/// Try every candidate port in parallel, then enumerate reachable devices.
pub async fn discover(
    transport: &dyn DeviceTransport,
    config: &DiscoveryConfig,
) -> Result<Vec<DiscoveredDevice>> {
    let attempts = config.ports.iter().map(|port| {
        let address = format!("{}:{}", config.host, port);
        async move {
            let outcome = transport.connect(&address, config.connect_timeout).await;
            debug!(
                "connect {}: {}",
                address,
                if outcome.success { "ok" } else { "failed" }
            );
        }
    });
    join_all(attempts).await;

    let listing = transport
        .devices(Duration::from_secs(5))
        .await
        .into_result("adb devices")?;

    let devices = dedup_by_port(&parse_device_list(&listing));
    info!("Discovered {} instance(s)", devices.len());
    Ok(devices)
}
