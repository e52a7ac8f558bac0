//! Address allocation for site networks
//!
//! Every peer gets one host address in every configured network. The k-th
//! peer (in site order) receives the k-th usable host of each network, so
//! allocation is deterministic and addresses are never reused.

use std::net::IpAddr;

use indexmap::IndexMap;
use ipnet::IpNet;
use tracing::debug;

use crate::error::{Error, Result};

/// A host address together with the network it was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAddress {
    pub network: IpNet,
    pub address: IpAddr,
}

impl HostAddress {
    /// `address/prefixlen` of the owning network, as used in `Address =`
    pub fn with_network_prefix(&self) -> String {
        format!("{}/{}", self.address, self.network.prefix_len())
    }

    /// `address/32` or `address/128`, as used in `AllowedIPs =`
    pub fn host_route(&self) -> String {
        format!("{}/{}", self.address, self.network.max_prefix_len())
    }
}

/// Result of an allocation run: peer name -> one address per network
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    peers: IndexMap<String, Vec<HostAddress>>,
}

impl Allocation {
    /// Addresses of `peer`, in network declaration order
    pub fn addresses(&self, peer: &str) -> Option<&[HostAddress]> {
        self.peers.get(peer).map(Vec::as_slice)
    }

    /// Address of `peer` inside `network`
    pub fn address(&self, peer: &str, network: &IpNet) -> Option<HostAddress> {
        self.addresses(peer)?
            .iter()
            .find(|h| h.network == *network)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Number of usable hosts in `network`
///
/// IPv4 excludes network and broadcast addresses below /31, IPv6 excludes
/// the subnet-router anycast address below /127.
pub fn usable_host_count(network: &IpNet) -> u128 {
    let host_bits = u32::from(network.max_prefix_len() - network.prefix_len());
    let size = if host_bits >= 128 {
        u128::MAX
    } else {
        1u128 << host_bits
    };
    match network {
        IpNet::V4(_) if host_bits >= 2 => size - 2,
        IpNet::V6(_) if host_bits >= 2 => size - 1,
        _ => size,
    }
}

/// Iterate the usable hosts of `network` in ascending order
pub fn usable_hosts(network: &IpNet) -> Box<dyn Iterator<Item = IpAddr>> {
    match network {
        IpNet::V4(net) => Box::new(net.hosts().map(IpAddr::V4)),
        IpNet::V6(net) => {
            let skip = usize::from(net.prefix_len() < 127);
            Box::new(net.hosts().skip(skip).map(IpAddr::V6))
        }
    }
}

/// Allocate one address per network for every peer, in the given order
pub fn allocate(peers: &[String], networks: &[IpNet]) -> Result<Allocation> {
    for network in networks {
        let available = usable_host_count(network);
        if (peers.len() as u128) > available {
            return Err(Error::Capacity {
                network: network.to_string(),
                available,
                requested: peers.len(),
            });
        }
    }

    let mut allocation = Allocation::default();
    for name in peers {
        allocation
            .peers
            .insert(name.clone(), Vec::with_capacity(networks.len()));
    }

    for network in networks {
        let mut hosts = usable_hosts(network);
        for name in peers {
            let address = hosts.next().ok_or_else(|| Error::Capacity {
                network: network.to_string(),
                available: usable_host_count(network),
                requested: peers.len(),
            })?;
            if let Some(entries) = allocation.peers.get_mut(name) {
                entries.push(HostAddress {
                    network: *network,
                    address,
                });
            }
        }
        debug!("Allocated {} addresses in {}", peers.len(), network);
    }

    Ok(allocation)
}
