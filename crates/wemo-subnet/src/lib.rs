// # Interface Subnet Resolver
//
// Finds the IPv4 subnet the host is attached to by reading the interface
// table, so the deep scan sweeps the real LAN and not a guessed /24.
//
// ## Selection
//
// The first interface address, in OS order, that passes every filter wins:
//
// 1. Name matches the requested interface, if one is configured
// 2. Not loopback, link-local (169.254/16), unspecified, broadcast or multicast
// 3. Not a container or bridge interface (docker, veth, br-, virbr),
//    unless it was requested by name
//
// The prefix comes from the interface netmask. Interfaces that report no
// netmask are assumed to be /24. Anything wider than /20 is narrowed to the
// /20 around the host address so a large LAN still gets a bounded sweep;
// set a fixed CIDR to scan more.
//
// ## Platform Support
//
// Works wherever `network-interface` can enumerate addresses (Linux, macOS,
// Windows, BSD).

use ipnet::Ipv4Net;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::Ipv4Addr;

use wemo_core::traits::SubnetResolver;
use wemo_core::{Error, Result};

/// Prefix assumed when an interface reports no netmask
const FALLBACK_PREFIX: u8 = 24;

/// Widest prefix returned; /20 holds 4094 hosts
pub const WIDEST_PREFIX: u8 = 20;

/// Interface name prefixes skipped during automatic selection
const VIRTUAL_PREFIXES: &[&str] = &["docker", "veth", "br-", "virbr"];

/// One IPv4 address of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub interface: String,
    pub ip: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
}

/// Subnet resolver backed by the OS interface table
#[derive(Debug, Clone, Default)]
pub struct InterfaceSubnetResolver {
    interface: Option<String>,
}

impl InterfaceSubnetResolver {
    /// Create a resolver
    ///
    /// # Parameters
    ///
    /// - `interface`: Only consider this interface (None = pick automatically)
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    /// Every IPv4 address currently assigned, in OS order
    pub fn addresses() -> Result<Vec<InterfaceAddress>> {
        let interfaces = NetworkInterface::show()
            .map_err(|e| Error::no_route(format!("cannot list interfaces: {}", e)))?;

        let mut addresses = Vec::new();
        for interface in interfaces {
            for addr in &interface.addr {
                if let Addr::V4(v4) = addr {
                    addresses.push(InterfaceAddress {
                        interface: interface.name.clone(),
                        ip: v4.ip,
                        netmask: v4.netmask,
                    });
                }
            }
        }
        Ok(addresses)
    }
}

impl SubnetResolver for InterfaceSubnetResolver {
    fn resolve(&self) -> Result<Ipv4Net> {
        let addresses = Self::addresses()?;
        let subnet = select_subnet(&addresses, self.interface.as_deref())?;
        tracing::debug!("Detected subnet {}", subnet);
        Ok(subnet)
    }
}

/// Pick the subnet to scan from a list of interface addresses
///
/// # Returns
///
/// - `Ok(Ipv4Net)`: Network address and prefix of the selected interface
/// - `Err(Error::NoRouteDetected)`: No address passed the filters
pub fn select_subnet(addresses: &[InterfaceAddress], interface: Option<&str>) -> Result<Ipv4Net> {
    let selected = addresses.iter().find(|addr| match interface {
        Some(name) => addr.interface == name && is_usable(addr.ip),
        None => is_usable(addr.ip) && !is_virtual(&addr.interface),
    });

    let Some(addr) = selected else {
        return Err(Error::no_route(match interface {
            Some(name) => format!("interface {} has no usable IPv4 address", name),
            None => "no usable IPv4 interface".to_string(),
        }));
    };

    let detected = addr.netmask.map(prefix_len).unwrap_or(FALLBACK_PREFIX);
    let prefix = detected.max(WIDEST_PREFIX);
    if prefix != detected {
        tracing::warn!(
            "Interface {} is a /{} network; scanning only the /{} around {}. Set WEMO_SCAN_CIDR to scan more",
            addr.interface,
            detected,
            prefix,
            addr.ip
        );
    }
    let subnet = Ipv4Net::new(addr.ip, prefix)
        .map_err(|e| Error::no_route(format!("bad prefix on {}: {}", addr.interface, e)))?
        .trunc();

    tracing::info!(
        "Using interface {} ({}) -> {}",
        addr.interface,
        addr.ip,
        subnet
    );
    Ok(subnet)
}

fn is_usable(ip: Ipv4Addr) -> bool {
    !ip.is_loopback()
        && !ip.is_link_local()
        && !ip.is_unspecified()
        && !ip.is_broadcast()
        && !ip.is_multicast()
}

fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Prefix length of a netmask (number of set bits)
fn prefix_len(netmask: Ipv4Addr) -> u8 {
    u32::from(netmask).count_ones() as u8
}
