//! WireGuard config synthesis
//!
//! Turns a validated site plus its address allocation into one config
//! document per peer. Every field depends on the direction of the edge
//! between the interface peer and each neighbour; see [`compile_peer`].
//!
//! The compiler trusts its input. Anything missing that validation should
//! have caught is reported as [`Error::Precondition`].

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::debug;

use crate::allocator::{allocate, Allocation, HostAddress};
use crate::error::{Error, Result};
use crate::integrity::validate::check_name;
use crate::site::{Peer, Site};

/// Routing table and fwmark wg-quick uses for its default route
pub const WG_QUICK_TABLE: u32 = 51820;

/// Keepalive interval written next to `Endpoint`
pub const PERSISTENT_KEEP_ALIVE_SECS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Interface,
    Peer,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKind::Interface => write!(f, "[Interface]"),
            SectionKind::Peer => write!(f, "[Peer]"),
        }
    }
}

/// One `[Interface]` or `[Peer]` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    /// Peer the block describes, written as a leading comment
    pub name: String,
    /// `Key = value` lines in output order
    pub entries: Vec<(&'static str, String)>,
}

impl Section {
    fn new(kind: SectionKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, key: &'static str, value: impl Into<String>) {
        self.entries.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.name)?;
        writeln!(f, "{}", self.kind)?;
        for (key, value) in &self.entries {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

/// Config of one peer: the interface section followed by its neighbours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDocument {
    pub peer: String,
    pub file_name: String,
    pub sections: Vec<Section>,
}

impl PeerDocument {
    pub fn interface(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == SectionKind::Interface)
    }

    /// Peer section for `neighbour`
    pub fn peer_section(&self, neighbour: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.kind == SectionKind::Peer && s.name == neighbour)
    }

    pub fn peer_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.kind == SectionKind::Peer)
    }

    /// Text of the config file
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(Section::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Name of the config file of `peer` in `site`
pub fn file_name(site: &str, peer: &str) -> String {
    format!("{}_{}.conf", site, peer)
}

/// Allocate addresses and compile every peer of a site, in site order
pub fn compile_site(site_name: &str, site: &Site) -> Result<Vec<PeerDocument>> {
    let allocation = allocate(&site.peer_names(), &site.ip_networks)?;
    site.peers
        .keys()
        .map(|name| compile_peer(site_name, site, name, &allocation))
        .collect()
}

/// Compile the document of peer `name`
///
/// Neighbours are the union of the peer's ingoing and outgoing edges,
/// emitted in site order.
pub fn compile_peer(
    site_name: &str,
    site: &Site,
    name: &str,
    allocation: &Allocation,
) -> Result<PeerDocument> {
    for part in [site_name, name] {
        check_name(part).map_err(|kind| Error::Precondition(kind.to_string()))?;
    }
    let peer = lookup(site, name)?;
    for edge in peer
        .outgoing_connected_peers
        .iter()
        .chain(&peer.ingoing_connected_peers)
    {
        lookup(site, edge)?;
    }

    let mut sections = vec![interface_section(site, name, peer, allocation)?];
    for neighbour in site.peers.keys() {
        if peer.dials(neighbour) || peer.is_dialed_by(neighbour) {
            sections.push(peer_section(site, name, peer, neighbour, allocation)?);
        }
    }

    debug!(
        "Compiled {} with {} peer section(s)",
        name,
        sections.len() - 1
    );
    Ok(PeerDocument {
        peer: name.to_string(),
        file_name: file_name(site_name, name),
        sections,
    })
}

fn lookup<'a>(site: &'a Site, name: &str) -> Result<&'a Peer> {
    site.peers
        .get(name)
        .ok_or_else(|| Error::Precondition(format!("peer {} is not part of the site", name)))
}

fn address_of(allocation: &Allocation, peer: &str, network: &IpNet) -> Result<HostAddress> {
    allocation.address(peer, network).ok_or_else(|| {
        Error::Precondition(format!("no address allocated for {} in {}", peer, network))
    })
}

fn interface_section(
    site: &Site,
    name: &str,
    peer: &Peer,
    allocation: &Allocation,
) -> Result<Section> {
    let mut section = Section::new(SectionKind::Interface, name);

    let addresses = site
        .ip_networks
        .iter()
        .map(|network| {
            address_of(allocation, name, network).map(|host| host.with_network_prefix())
        })
        .collect::<Result<Vec<_>>>()?;
    section.push("Address", addresses.join(", "));

    if !peer.ingoing_connected_peers.is_empty() {
        section.push("ListenPort", peer.port.to_string());
    }

    let dns = dns_servers(site, peer);
    if !dns.is_empty() {
        section.push("DNS", join(&dns));
    }

    section.push("PrivateKey", peer.keys.privkey.as_str());

    let (fix_up, fix_down) = ipv6_routing_fix(site, name, peer, allocation)?;
    let post_up = join_commands(&fix_up, &peer.post_up);
    if !post_up.is_empty() {
        section.push("PostUp", post_up);
    }
    let post_down = join_commands(&peer.post_down, &fix_down);
    if !post_down.is_empty() {
        section.push("PostDown", post_down);
    }

    Ok(section)
}

/// Resolvers of a redirecting peer: its own list, else the site list
/// restricted to the redirected families
fn dns_servers(site: &Site, peer: &Peer) -> Vec<IpAddr> {
    let redirect = peer.redirect_all_traffic;
    if !redirect.any() {
        return Vec::new();
    }
    if !peer.dns.is_empty() {
        return peer.dns.clone();
    }
    site.dns
        .iter()
        .filter(|addr| redirect.covers(addr))
        .copied()
        .collect()
}

/// PostUp prefix and PostDown suffix routing the peer's own IPv6 host
/// addresses through its main peer
fn ipv6_routing_fix(
    site: &Site,
    name: &str,
    peer: &Peer,
    allocation: &Allocation,
) -> Result<(String, String)> {
    let main = match (&peer.main_peer, peer.ipv6_routing_fix) {
        (Some(main), true) => main,
        _ => return Ok((String::new(), String::new())),
    };
    lookup(site, main)?;

    let mut up = Vec::new();
    let mut down = Vec::new();
    for network in site.ip_networks.iter().filter(|n| matches!(n, IpNet::V6(_))) {
        let own = address_of(allocation, name, network)?.host_route();
        let gateway = address_of(allocation, main, network)?.address;

        if up.is_empty() {
            up.push(format!(
                "ip -6 rule del not fwmark {t} table {t}",
                t = WG_QUICK_TABLE
            ));
        }
        up.push(format!("ip -6 rule add from {} table {}", own, WG_QUICK_TABLE));
        up.push(format!(
            "ip -6 route add default via {} dev %i table {}",
            gateway, WG_QUICK_TABLE
        ));
        down.push(format!("ip -6 rule del from {} table {}", own, WG_QUICK_TABLE));
        down.push(format!(
            "ip -6 route del default via {} dev %i table {}",
            gateway, WG_QUICK_TABLE
        ));
    }
    Ok((up.join("; "), down.join("; ")))
}

fn peer_section(
    site: &Site,
    name: &str,
    peer: &Peer,
    neighbour: &str,
    allocation: &Allocation,
) -> Result<Section> {
    let other = lookup(site, neighbour)?;
    let outgoing = peer.dials(neighbour);
    let ingoing = peer.is_dialed_by(neighbour);

    let mut section = Section::new(SectionKind::Peer, neighbour);

    if outgoing {
        if let Some(endpoint) = other.endpoint_with_port() {
            section.push("Endpoint", endpoint);
            if peer.persistent_keep_alive {
                section.push("PersistentKeepAlive", PERSISTENT_KEEP_ALIVE_SECS.to_string());
            }
        }
    }

    section.push("PublicKey", other.keys.pubkey.as_str());

    let psk = match (ingoing, outgoing) {
        (true, true) if neighbour < name => &other.keys.psk,
        (true, true) => &peer.keys.psk,
        (true, false) => &other.keys.psk,
        _ => &peer.keys.psk,
    };
    section.push("PresharedKey", psk.as_str());

    let is_main = peer.is_main_peer(neighbour);
    let redirect = peer.redirect_all_traffic;
    let mut allowed = Vec::with_capacity(site.ip_networks.len());
    for network in &site.ip_networks {
        let route = match network {
            IpNet::V4(_) if is_main && redirect.ipv4 => "0.0.0.0/0".to_string(),
            IpNet::V6(_) if is_main && (redirect.ipv6 || peer.ipv6_routing_fix) => {
                "::/0".to_string()
            }
            _ => address_of(allocation, neighbour, network)?.host_route(),
        };
        allowed.push(route);
    }
    allowed.extend(peer.additional_allowed_ips.iter().map(IpNet::to_string));
    section.push("AllowedIPs", allowed.join(", "));

    Ok(section)
}

fn join(addresses: &[IpAddr]) -> String {
    addresses
        .iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_commands(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{}; {}", first, second),
    }
}
