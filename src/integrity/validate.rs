//! Field and semantic checks
//!
//! Every field goes through the same recipe: presence, type, then domain
//! checks. A failed check never stops the others. Invalid list elements are
//! stripped, missing or mistyped fields fall back to their default, and
//! problems without a safe repair (edge symmetry, endpoints) are reported
//! without touching the data.

use std::collections::HashSet;
use std::net::IpAddr;

use indexmap::IndexMap;
use ipnet::IpNet;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::Settings;
use crate::report::{MessageKind, Report, ReportList, SiteReport};
use crate::site::{Keys, Peer, RedirectAllTraffic, Site};

/// Longest accepted prefix, leaving room for at least two hosts
pub const MAX_IPV4_PREFIX: u8 = 30;
pub const MAX_IPV6_PREFIX: u8 = 126;

// ============ Field access ============

fn field<'a>(obj: &'a Map<String, Value>, key: &str, report: &mut Report) -> Option<&'a Value> {
    let value = obj.get(key);
    if value.is_none() {
        report.error(MessageKind::FieldMissing { field: key.to_string() });
    }
    value
}

fn type_error(key: &str, expected: &'static str, report: &mut Report) {
    report.error(MessageKind::FieldType {
        field: key.to_string(),
        expected,
    });
}

fn get_str(obj: &Map<String, Value>, key: &str, report: &mut Report) -> Option<String> {
    match field(obj, key, report)? {
        Value::String(s) => Some(s.clone()),
        _ => {
            type_error(key, "a string", report);
            None
        }
    }
}

fn get_bool(obj: &Map<String, Value>, key: &str, report: &mut Report) -> Option<bool> {
    match field(obj, key, report)? {
        Value::Bool(b) => Some(*b),
        _ => {
            type_error(key, "a bool", report);
            None
        }
    }
}

fn get_int(obj: &Map<String, Value>, key: &str, report: &mut Report) -> Option<i64> {
    match field(obj, key, report)?.as_i64() {
        Some(n) => Some(n),
        None => {
            type_error(key, "an integer", report);
            None
        }
    }
}

fn get_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    report: &mut Report,
) -> Option<&'a Map<String, Value>> {
    match field(obj, key, report)? {
        Value::Object(o) => Some(o),
        _ => {
            type_error(key, "an object", report);
            None
        }
    }
}

/// String elements of a list field; other elements are reported and dropped
fn get_str_list(obj: &Map<String, Value>, key: &str, report: &mut Report) -> Vec<String> {
    let Some(value) = field(obj, key, report) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        type_error(key, "a list", report);
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::String(s) => Some(s.clone()),
            _ => {
                type_error(&format!("{}[{}]", key, i), "a string", report);
                None
            }
        })
        .collect()
}

// ============ Semantic checks ============

/// Site and peer names end up as connection table labels and file names
pub fn check_name(name: &str) -> Result<(), MessageKind> {
    let invalid = name.is_empty()
        || name == crate::graph::NO_MAIN_PEER
        || name == crate::graph::MAIN_PEER_HEADER
        || name.starts_with('#')
        || name.contains("..")
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control());
    if invalid {
        return Err(MessageKind::NameInvalid {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Parse a site network: strict (no host bits) and prefix-bounded
pub fn check_ip_network(value: &str) -> Result<IpNet, MessageKind> {
    let network: IpNet = value.parse().map_err(|_| MessageKind::IpNetworkInvalid {
        value: value.to_string(),
    })?;
    if network.trunc() != network {
        return Err(MessageKind::IpNetworkHostBits {
            network: value.to_string(),
        });
    }
    let max = match network {
        IpNet::V4(_) => MAX_IPV4_PREFIX,
        IpNet::V6(_) => MAX_IPV6_PREFIX,
    };
    if network.prefix_len() > max {
        return Err(MessageKind::IpNetworkPrefixTooHigh {
            network: value.to_string(),
            prefix: network.prefix_len(),
            max,
        });
    }
    Ok(network)
}

/// Parse a resolver address whose family must be in use
pub fn check_dns(value: &str, ipv4: bool, ipv6: bool) -> Result<IpAddr, MessageKind> {
    let address: IpAddr = value.parse().map_err(|_| MessageKind::DnsInvalid {
        value: value.to_string(),
    })?;
    let allowed = match address {
        IpAddr::V4(_) => ipv4,
        IpAddr::V6(_) => ipv6,
    };
    if !allowed {
        return Err(MessageKind::DnsFamily {
            address: value.to_string(),
        });
    }
    Ok(address)
}

/// Parse an additional allowed network whose family must be in use
pub fn check_additional_allowed_ip(value: &str, ipv4: bool, ipv6: bool) -> Result<IpNet, MessageKind> {
    let network: IpNet = value
        .parse()
        .ok()
        .filter(|n: &IpNet| n.trunc() == *n)
        .ok_or_else(|| MessageKind::AdditionalAllowedIpInvalid {
            value: value.to_string(),
        })?;
    let allowed = match network {
        IpNet::V4(_) => ipv4,
        IpNet::V6(_) => ipv6,
    };
    if !allowed {
        return Err(MessageKind::AdditionalAllowedIpFamily {
            network: value.to_string(),
        });
    }
    Ok(network)
}

/// Hostname per RFC 1123, or an IP address
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    if endpoint.parse::<IpAddr>().is_ok() {
        return true;
    }
    let name = endpoint.strip_suffix('.').unwrap_or(endpoint);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Endpoint and port, required only when other peers dial this one
pub fn check_endpoint(endpoint: &str, port: i64, has_ingoing: bool, report: &mut Report) {
    if endpoint.is_empty() {
        if has_ingoing {
            report.error(MessageKind::EndpointMissing);
        }
    } else if !is_valid_endpoint(endpoint) {
        report.error(MessageKind::EndpointInvalid {
            endpoint: endpoint.to_string(),
        });
    }
    if has_ingoing && !(1..=65535).contains(&port) {
        report.error(MessageKind::PortInvalid { port });
    }
}

fn check_dns_list(names: Vec<String>, ipv4: bool, ipv6: bool, report: &mut Report) -> Vec<IpAddr> {
    names
        .iter()
        .filter_map(|d| match check_dns(d, ipv4, ipv6) {
            Ok(address) => Some(address),
            Err(kind) => {
                report.error(kind);
                None
            }
        })
        .collect()
}

// ============ Records ============

/// A peer after its own fields were checked, before cross-peer checks
struct PeerDraft {
    peer: Peer,
    port: i64,
    connections: Report,
    endpoint: Report,
    list: ReportList,
}

fn parse_keys(obj: &Map<String, Value>, report: &mut Report) -> Keys {
    let Some(keys) = get_object(obj, "keys", report) else {
        return Keys::default();
    };
    let mut get = |key: &str| {
        get_str(keys, key, report).unwrap_or_default()
    };
    Keys {
        privkey: get("privkey"),
        pubkey: get("pubkey"),
        psk: get("psk"),
    }
}

fn parse_redirect(obj: &Map<String, Value>, report: &mut Report) -> RedirectAllTraffic {
    match field(obj, "redirect_all_traffic", report) {
        None | Some(Value::Null) => RedirectAllTraffic::default(),
        Some(Value::Object(flags)) => RedirectAllTraffic {
            ipv4: get_bool(flags, "ipv4", report).unwrap_or(false),
            ipv6: get_bool(flags, "ipv6", report).unwrap_or(false),
        },
        Some(_) => {
            type_error("redirect_all_traffic", "an object or null", report);
            RedirectAllTraffic::default()
        }
    }
}

fn parse_peer(name: &str, value: &Value, ipv4: bool, ipv6: bool) -> PeerDraft {
    let mut list = ReportList::new(name);
    let mut structure = Report::new();
    let mut networks = Report::new();
    let mut connections = Report::new();
    let mut options = Report::new();

    let empty = Map::new();
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            type_error(name, "an object", &mut structure);
            &empty
        }
    };

    if let Err(kind) = check_name(name) {
        structure.error(kind);
    }
    let keys = parse_keys(obj, &mut structure);

    let additional_allowed_ips = get_str_list(obj, "additional_allowed_ips", &mut networks)
        .iter()
        .filter_map(|n| match check_additional_allowed_ip(n, ipv4, ipv6) {
            Ok(network) => Some(network),
            Err(kind) => {
                networks.error(kind);
                None
            }
        })
        .collect();
    let dns_names = get_str_list(obj, "dns", &mut networks);
    let dns = check_dns_list(dns_names, ipv4, ipv6, &mut networks);

    let outgoing_connected_peers = get_str_list(obj, "outgoing_connected_peers", &mut connections);
    let ingoing_connected_peers = get_str_list(obj, "ingoing_connected_peers", &mut connections);
    let main_peer = match field(obj, "main_peer", &mut connections) {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => None,
        Some(_) => {
            type_error("main_peer", "a string or null", &mut connections);
            None
        }
    };

    let mut endpoint_report = Report::new();
    let endpoint = get_str(obj, "endpoint", &mut endpoint_report).unwrap_or_default();
    let port = get_int(obj, "port", &mut endpoint_report).unwrap_or(0);

    let redirect_all_traffic = parse_redirect(obj, &mut options);
    let persistent_keep_alive = get_bool(obj, "persistent_keep_alive", &mut options).unwrap_or(false);
    let post_up = get_str(obj, "post_up", &mut options).unwrap_or_default();
    let post_down = get_str(obj, "post_down", &mut options).unwrap_or_default();
    let ipv6_routing_fix = get_bool(obj, "ipv6_routing_fix", &mut options).unwrap_or(false);

    list.push(structure);
    list.push(networks);
    list.push(options);

    PeerDraft {
        peer: Peer {
            keys,
            additional_allowed_ips,
            outgoing_connected_peers,
            main_peer,
            ingoing_connected_peers,
            endpoint,
            port: u16::try_from(port).unwrap_or(0),
            dns,
            persistent_keep_alive,
            redirect_all_traffic,
            post_up,
            post_down,
            ipv6_routing_fix,
        },
        port,
        connections,
        endpoint: endpoint_report,
        list,
    }
}

/// Drop unknown names and self references from an edge list
fn strip_references(
    name: &str,
    field: &'static str,
    list: &mut Vec<String>,
    known: &HashSet<String>,
    report: &mut Report,
) {
    list.retain(|other| {
        if other == name {
            report.error(MessageKind::SelfReference { field });
            false
        } else if !known.contains(other) {
            report.error(MessageKind::UnknownPeer {
                field,
                name: other.clone(),
            });
            false
        } else {
            true
        }
    });
}

/// Checks that need every peer of the site
fn check_connections(drafts: &mut IndexMap<String, PeerDraft>) {
    let known: HashSet<String> = drafts.keys().cloned().collect();

    for (name, draft) in drafts.iter_mut() {
        let report = &mut draft.connections;
        let peer = &mut draft.peer;
        strip_references(name, "outgoing_connected_peers", &mut peer.outgoing_connected_peers, &known, report);
        strip_references(name, "ingoing_connected_peers", &mut peer.ingoing_connected_peers, &known, report);

        if let Some(main) = peer.main_peer.take() {
            if main == *name {
                report.error(MessageKind::SelfReference { field: "main_peer" });
            } else if !known.contains(&main) {
                report.error(MessageKind::UnknownPeer {
                    field: "main_peer",
                    name: main,
                });
            } else {
                peer.main_peer = Some(main);
            }
        }
    }

    // Symmetry is judged on the stripped lists and never repaired
    let mut asymmetric: Vec<(String, MessageKind)> = Vec::new();
    for (name, draft) in drafts.iter() {
        for q in &draft.peer.outgoing_connected_peers {
            if !drafts.get(q).map_or(false, |d| d.peer.is_dialed_by(name)) {
                asymmetric.push((name.clone(), MessageKind::OutgoingNotMirrored { peer: q.clone() }));
            }
        }
        for q in &draft.peer.ingoing_connected_peers {
            if !drafts.get(q).map_or(false, |d| d.peer.dials(name)) {
                asymmetric.push((name.clone(), MessageKind::IngoingNotMirrored { peer: q.clone() }));
            }
        }
    }
    for (name, kind) in asymmetric {
        if let Some(draft) = drafts.get_mut(&name) {
            draft.connections.error(kind);
        }
    }

    for draft in drafts.values_mut() {
        let peer = &mut draft.peer;
        if peer.outgoing_connected_peers.is_empty() {
            if peer.main_peer.is_some() {
                draft.connections.error(MessageKind::MainPeerInvalid {
                    main: peer.main_peer.take(),
                });
            }
        } else if !peer
            .main_peer
            .as_ref()
            .map_or(false, |m| peer.outgoing_connected_peers.contains(m))
        {
            draft.connections.error(MessageKind::MainPeerInvalid {
                main: peer.main_peer.clone(),
            });
        }

        let has_ingoing = !peer.ingoing_connected_peers.is_empty();
        check_endpoint(&peer.endpoint, draft.port, has_ingoing, &mut draft.endpoint);
    }
}

/// Validate one upgraded site document
///
/// Returns `None` only when the document is not an object at all.
pub fn validate_site(name: &str, value: &Value, migration: Report) -> (Option<Site>, SiteReport) {
    let mut site_report = SiteReport::new(name);
    site_report.site.push(migration);

    let Some(obj) = value.as_object() else {
        let mut report = Report::new();
        type_error(name, "an object", &mut report);
        site_report.site.push(report);
        return (None, site_report);
    };

    let mut structure = Report::new();
    if let Err(kind) = check_name(name) {
        structure.error(kind);
    }
    let config_version = get_str(obj, "config_version", &mut structure).unwrap_or_default();

    let mut networks_report = Report::new();
    let ip_networks: Vec<IpNet> = get_str_list(obj, "ip_networks", &mut networks_report)
        .iter()
        .filter_map(|n| match check_ip_network(n) {
            Ok(network) => Some(network),
            Err(kind) => {
                networks_report.error(kind);
                None
            }
        })
        .collect();
    if ip_networks.is_empty() {
        networks_report.error(MessageKind::NoIpNetworks);
    }
    let mut site = Site::new(ip_networks, Vec::new());
    site.config_version = config_version;
    let (ipv4, ipv6) = (site.has_ipv4(), site.has_ipv6());

    let mut dns_report = Report::new();
    let dns_names = get_str_list(obj, "dns", &mut dns_report);
    site.dns = check_dns_list(dns_names, ipv4, ipv6, &mut dns_report);

    let mut drafts = IndexMap::new();
    if let Some(peers) = get_object(obj, "peers", &mut structure) {
        for (peer_name, peer_value) in peers {
            drafts.insert(peer_name.clone(), parse_peer(peer_name, peer_value, ipv4, ipv6));
        }
    }
    check_connections(&mut drafts);

    site_report.site.push(structure);
    site_report.site.push(networks_report);
    site_report.site.push(dns_report);

    for (peer_name, draft) in drafts {
        let PeerDraft {
            peer,
            connections,
            endpoint,
            mut list,
            ..
        } = draft;
        list.push(connections);
        list.push(endpoint);
        if list.message_count() > 0 {
            warn!("Site {} peer {}: {} integrity message(s)", name, peer_name, list.message_count());
            site_report.peers.push(list);
        }
        site.peers.insert(peer_name, peer);
    }

    (Some(site), site_report)
}

/// Validate an upgraded settings document, substituting defaults
pub fn validate_settings(value: &Value) -> (Settings, Report) {
    let mut report = Report::new();
    let defaults = Settings::default();
    let Some(obj) = value.as_object() else {
        type_error("settings", "an object", &mut report);
        return (defaults, report);
    };

    // Missing settings fall back to their default with a warning
    let optional = |key: &str, report: &mut Report| -> Option<Value> {
        match obj.get(key) {
            Some(v) => Some(v.clone()),
            None => {
                report.warning(MessageKind::FieldMissing { field: key.to_string() });
                None
            }
        }
    };
    let text = |key: &str, default: String, report: &mut Report| match optional(key, report) {
        Some(Value::String(s)) => s,
        Some(_) => {
            type_error(key, "a string", report);
            default
        }
        None => default,
    };

    let file_version = text("file_version", defaults.file_version.clone(), &mut report);
    let sites_file_path = text(
        "sites_file_path",
        defaults.sites_file_path.display().to_string(),
        &mut report,
    );
    let wg_config_path = text(
        "wg_config_path",
        defaults.wg_config_path.display().to_string(),
        &mut report,
    );
    let editor = text("editor", defaults.editor.clone(), &mut report);
    let wg_executable = text("wg_executable", defaults.wg_executable.clone(), &mut report);

    let verbosity = match obj.get("verbosity") {
        None => {
            report.warning(MessageKind::FieldMissing { field: "verbosity".into() });
            defaults.verbosity
        }
        Some(v) => match v.as_u64() {
            Some(n) => u8::try_from(n).unwrap_or(u8::MAX),
            None => {
                type_error("verbosity", "a non-negative integer", &mut report);
                defaults.verbosity
            }
        },
    };

    let settings = Settings {
        file_version,
        verbosity,
        sites_file_path: sites_file_path.into(),
        wg_config_path: wg_config_path.into(),
        editor,
        wg_executable,
    };
    (settings, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn peer_json() -> Value {
        json!({
            "keys": { "privkey": "priv", "pubkey": "pub", "psk": "psk" },
            "additional_allowed_ips": [],
            "outgoing_connected_peers": [],
            "main_peer": null,
            "ingoing_connected_peers": [],
            "endpoint": "",
            "port": 0,
            "dns": [],
            "persistent_keep_alive": false,
            "redirect_all_traffic": { "ipv4": false, "ipv6": false },
            "post_up": "",
            "post_down": "",
            "ipv6_routing_fix": false
        })
    }

    fn site_json(peers: Value) -> Value {
        json!({
            "config_version": "0.1.3",
            "ip_networks": ["10.0.0.0/24"],
            "dns": ["1.1.1.1"],
            "peers": peers
        })
    }

    fn linked_pair() -> Value {
        let mut a = peer_json();
        a["outgoing_connected_peers"] = json!(["b"]);
        a["main_peer"] = json!("b");
        let mut b = peer_json();
        b["ingoing_connected_peers"] = json!(["a"]);
        b["endpoint"] = json!("vpn.example.com");
        b["port"] = json!(51820);
        json!({ "a": a, "b": b })
    }

    #[test]
    fn test_valid_site() {
        let (site, report) = validate_site("hq", &site_json(linked_pair()), Report::new());
        assert!(report.is_success(true), "{:?}", report);
        let site = site.unwrap();
        assert_eq!(site.peers["a"].main_peer.as_deref(), Some("b"));
        assert_eq!(site.peers["b"].port, 51820);
    }

    #[test]
    fn test_check_ip_network() {
        assert!(check_ip_network("10.0.0.0/24").is_ok());
        assert!(matches!(check_ip_network("10.0.0.1/24"), Err(MessageKind::IpNetworkHostBits { .. })));
        assert!(matches!(check_ip_network("10.0.0.0/31"), Err(MessageKind::IpNetworkPrefixTooHigh { .. })));
        assert!(matches!(check_ip_network("fd00::/127"), Err(MessageKind::IpNetworkPrefixTooHigh { .. })));
        assert!(matches!(check_ip_network("banana"), Err(MessageKind::IpNetworkInvalid { .. })));
    }

    #[test]
    fn test_check_name() {
        for good in ["hq", "laptop-2", "db.internal", "peer_1"] {
            assert!(check_name(good).is_ok(), "{}", good);
        }
        for bad in ["", "my laptop", "None", "main_peer", "../x", "a/b", "a\\b", "/tmp/evil", "#c", "tab\t"] {
            assert!(
                matches!(check_name(bad), Err(MessageKind::NameInvalid { .. })),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_unusable_names_are_errors() {
        let mut peers = linked_pair();
        peers["my laptop"] = peer_json();
        let (site, report) = validate_site("../hq", &site_json(peers), Report::new());

        assert!(!report.is_success(false));
        assert!(report
            .site
            .messages()
            .any(|m| m.kind == MessageKind::NameInvalid { name: "../hq".into() }));
        assert!(report
            .peer("my laptop")
            .unwrap()
            .messages()
            .any(|m| m.kind == MessageKind::NameInvalid { name: "my laptop".into() }));
        // kept for inspection
        assert!(site.unwrap().peers.contains_key("my laptop"));
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(is_valid_endpoint("vpn.example.com"));
        assert!(is_valid_endpoint("203.0.113.7"));
        assert!(is_valid_endpoint("2001:db8::1"));
        assert!(!is_valid_endpoint("-bad.example.com"));
        assert!(!is_valid_endpoint("under_score.example"));
        assert!(!is_valid_endpoint("a..b"));
    }

    #[test]
    fn test_invalid_elements_are_stripped() {
        let mut peers = linked_pair();
        peers["a"]["additional_allowed_ips"] = json!(["192.168.1.0/24", "fd00::/64", "nope"]);
        let mut site = site_json(peers);
        site["dns"] = json!(["1.1.1.1", "2606:4700::1111", "x"]);

        let (site, report) = validate_site("hq", &site, Report::new());
        let site = site.unwrap();
        assert_eq!(site.dns.len(), 1);
        assert_eq!(site.peers["a"].additional_allowed_ips.len(), 1);
        assert_eq!(report.message_count(), 4);
    }

    #[test]
    fn test_three_invalid_fields_three_messages() {
        let mut peers = linked_pair();
        peers["b"]["port"] = json!(70000);
        peers["a"]["post_up"] = json!(5);
        let mut site = site_json(peers);
        site["ip_networks"] = json!(["10.0.0.0/24", "300.0.0.0/8"]);

        let (_, report) = validate_site("hq", &site, Report::new());
        assert!(!report.is_success(false));
        assert!(report.message_count() >= 3);
        let b = report.peer("b").unwrap();
        assert!(b.messages().any(|m| m.kind == MessageKind::PortInvalid { port: 70000 }));
        let a = report.peer("a").unwrap();
        assert!(a.messages().any(|m| matches!(&m.kind, MessageKind::FieldType { field, .. } if field == "post_up")));
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let (site, report) = validate_site("hq", &site_json(json!({ "a": {} })), Report::new());
        let a = report.peer("a").unwrap();
        // keys, lists, main_peer, endpoint, port, flags and hooks
        assert!(a.message_count() >= 12);
        assert!(site.unwrap().peers.contains_key("a"));
    }

    #[test]
    fn test_asymmetric_edges_reported_without_repair() {
        let mut peers = linked_pair();
        peers["b"]["ingoing_connected_peers"] = json!([]);
        let (site, report) = validate_site("hq", &site_json(peers), Report::new());

        let a = report.peer("a").unwrap();
        assert!(a
            .messages()
            .any(|m| m.kind == MessageKind::OutgoingNotMirrored { peer: "b".into() }));
        assert_eq!(site.unwrap().peers["a"].outgoing_connected_peers, vec!["b"]);
    }

    #[test]
    fn test_unknown_and_self_references_stripped() {
        let mut peers = linked_pair();
        peers["a"]["outgoing_connected_peers"] = json!(["b", "ghost", "a"]);
        let (site, report) = validate_site("hq", &site_json(peers), Report::new());

        assert_eq!(site.unwrap().peers["a"].outgoing_connected_peers, vec!["b"]);
        assert_eq!(report.peer("a").unwrap().message_count(), 2);
    }

    #[test]
    fn test_main_peer_must_be_outgoing() {
        let mut peers = linked_pair();
        peers["a"]["main_peer"] = json!(null);
        let (_, report) = validate_site("hq", &site_json(peers), Report::new());
        assert!(report
            .peer("a")
            .unwrap()
            .messages()
            .any(|m| m.kind == MessageKind::MainPeerInvalid { main: None }));
    }

    #[test]
    fn test_endpoint_required_with_ingoing() {
        let mut peers = linked_pair();
        peers["b"]["endpoint"] = json!("");
        peers["b"]["port"] = json!(0);
        let (_, report) = validate_site("hq", &site_json(peers), Report::new());
        let b = report.peer("b").unwrap();
        assert!(b.messages().any(|m| m.kind == MessageKind::EndpointMissing));
        assert!(b.messages().any(|m| m.kind == MessageKind::PortInvalid { port: 0 }));
    }

    #[test]
    fn test_settings_defaults_with_warnings() {
        let (settings, report) = validate_settings(&json!({ "file_version": "0.1.1", "editor": "vim" }));
        assert_eq!(settings.editor, "vim");
        assert_eq!(settings.wg_executable, "wg");
        assert!(report.is_success(false));
        assert!(!report.is_success(true));

        let (_, report) = validate_settings(&json!({ "file_version": "0.1.1", "verbosity": "loud" }));
        assert!(!report.is_success(false));
    }
}
