//! Site and peer records
//!
//! Strongly typed form of the persisted sites document. Records only reach
//! this shape after passing through [`crate::integrity`], so the rest of the
//! crate can rely on the field invariants documented on [`Peer`].

use std::net::IpAddr;

use indexmap::IndexMap;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::integrity::SITE_LATEST_VERSION;

/// All sites, keyed by site name
pub type Sites = IndexMap<String, Site>;

/// Key triple issued by a [`crate::keys::KeyProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    pub privkey: String,
    pub pubkey: String,
    /// Preshared key, used for every edge this peer owns
    pub psk: String,
}

/// Per address family default-route redirection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectAllTraffic {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl RedirectAllTraffic {
    pub fn any(&self) -> bool {
        self.ipv4 || self.ipv6
    }

    /// Whether traffic of the family of `addr` is redirected
    pub fn covers(&self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self.ipv4,
            IpAddr::V6(_) => self.ipv6,
        }
    }
}

/// A peer inside a site
///
/// Invariants (checked by the integrity validator, repaired by the
/// connection graph):
/// - no peer lists itself as a neighbour
/// - `p.outgoing_connected_peers` contains `q` iff `q.ingoing_connected_peers` contains `p`
/// - when `outgoing_connected_peers` is non-empty, `main_peer` is one of them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub keys: Keys,

    /// Extra networks routed into the tunnel
    #[serde(default)]
    pub additional_allowed_ips: Vec<IpNet>,

    /// Peers this peer dials (it knows their endpoint)
    #[serde(default)]
    pub outgoing_connected_peers: Vec<String>,

    /// Default-route relay, drawn from `outgoing_connected_peers`
    #[serde(default)]
    pub main_peer: Option<String>,

    /// Peers that dial this peer
    #[serde(default)]
    pub ingoing_connected_peers: Vec<String>,

    /// Hostname or address other peers dial, required with ingoing peers
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub port: u16,

    /// Own resolver list, empty to inherit the site list
    #[serde(default)]
    pub dns: Vec<IpAddr>,

    #[serde(default)]
    pub persistent_keep_alive: bool,

    #[serde(default)]
    pub redirect_all_traffic: RedirectAllTraffic,

    #[serde(default)]
    pub post_up: String,

    #[serde(default)]
    pub post_down: String,

    #[serde(default)]
    pub ipv6_routing_fix: bool,
}

impl Peer {
    /// Create an unconnected peer holding `keys`
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            ..Default::default()
        }
    }

    pub fn dials(&self, name: &str) -> bool {
        self.outgoing_connected_peers.iter().any(|p| p == name)
    }

    pub fn is_dialed_by(&self, name: &str) -> bool {
        self.ingoing_connected_peers.iter().any(|p| p == name)
    }

    pub fn is_main_peer(&self, name: &str) -> bool {
        self.main_peer.as_deref() == Some(name)
    }

    /// Endpoint as written into a config file, `None` if unset
    pub fn endpoint_with_port(&self) -> Option<String> {
        if self.endpoint.is_empty() {
            return None;
        }
        match self.endpoint.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => Some(format!("[{}]:{}", v6, self.port)),
            _ => Some(format!("{}:{}", self.endpoint, self.port)),
        }
    }
}

/// A named group of peers sharing address space and DNS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub config_version: String,

    /// Networks every peer gets one address in, in declaration order
    pub ip_networks: Vec<IpNet>,

    #[serde(default)]
    pub dns: Vec<IpAddr>,

    /// Insertion order is the address allocation order
    #[serde(default)]
    pub peers: IndexMap<String, Peer>,
}

impl Site {
    pub fn new(ip_networks: Vec<IpNet>, dns: Vec<IpAddr>) -> Self {
        Self {
            config_version: SITE_LATEST_VERSION.to_string(),
            ip_networks,
            dns,
            peers: IndexMap::new(),
        }
    }

    pub fn has_ipv4(&self) -> bool {
        self.ip_networks.iter().any(|n| matches!(n, IpNet::V4(_)))
    }

    pub fn has_ipv6(&self) -> bool {
        self.ip_networks.iter().any(|n| matches!(n, IpNet::V6(_)))
    }

    /// Peer names in allocation order
    pub fn peer_names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_with_port() {
        let mut peer = Peer::default();
        assert_eq!(peer.endpoint_with_port(), None);

        peer.endpoint = "vpn.example.com".into();
        peer.port = 51820;
        assert_eq!(peer.endpoint_with_port().unwrap(), "vpn.example.com:51820");

        peer.endpoint = "2001:db8::1".into();
        assert_eq!(peer.endpoint_with_port().unwrap(), "[2001:db8::1]:51820");
    }

    #[test]
    fn test_site_families() {
        let site = Site::new(
            vec!["10.0.0.0/24".parse().unwrap(), "fd00::/64".parse().unwrap()],
            vec![],
        );
        assert!(site.has_ipv4());
        assert!(site.has_ipv6());

        let v4_only = Site::new(vec!["10.0.0.0/24".parse().unwrap()], vec![]);
        assert!(!v4_only.has_ipv6());
    }

    #[test]
    fn test_site_json_layout() {
        let mut site = Site::new(
            vec!["10.0.0.0/24".parse().unwrap()],
            vec!["1.1.1.1".parse().unwrap()],
        );
        site.peers.insert("b".into(), Peer::default());
        site.peers.insert("a".into(), Peer::default());

        let json = serde_json::to_value(&site).unwrap();
        assert_eq!(json["config_version"], SITE_LATEST_VERSION);
        assert_eq!(json["ip_networks"][0], "10.0.0.0/24");
        assert!(json["peers"]["a"]["main_peer"].is_null());

        let back: Site = serde_json::from_value(json).unwrap();
        assert_eq!(back.peer_names(), vec!["b", "a"]);
    }
}
