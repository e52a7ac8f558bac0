//! Versioned document upgrades
//!
//! Each document kind has a linear version chain. An upgrade is a list of
//! pure `Value -> Value` steps folded over the document, one version at a
//! time, until the latest version is reached.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::report::{MessageKind, Report};

/// One upgrade step from the version before it to the next
pub type Step = fn(Value) -> Value;

/// Resolvers materialized into sites that predate the `dns` key
pub const DEFAULT_DNS: [&str; 2] = ["1.1.1.1", "8.8.8.8"];

/// Linear version chain of one document kind
pub struct Chain {
    /// Key holding the version string
    pub version_key: &'static str,
    /// Oldest supported version
    pub first: &'static str,
    /// `(target version, step)` in order
    pub steps: &'static [(&'static str, Step)],
}

pub const SITE_CHAIN: Chain = Chain {
    version_key: "config_version",
    first: "0.1.0",
    steps: &[
        ("0.1.1", site_0_1_1),
        ("0.1.2", site_0_1_2),
        ("0.1.3", site_0_1_3),
    ],
};

pub const SETTINGS_CHAIN: Chain = Chain {
    version_key: "file_version",
    first: "0.1.0",
    steps: &[("0.1.1", settings_0_1_1)],
};

impl Chain {
    pub fn latest(&self) -> &'static str {
        self.steps.last().map(|(v, _)| *v).unwrap_or(self.first)
    }

    /// Position of `version` in the chain
    fn position(&self, version: &str) -> Option<usize> {
        if version == self.first {
            return Some(0);
        }
        self.steps
            .iter()
            .position(|(v, _)| *v == version)
            .map(|i| i + 1)
    }

    /// Upgrade `doc` to the latest version
    ///
    /// Unknown, missing and newer versions are fatal. Every applied step is
    /// recorded in `report`.
    pub fn upgrade(&self, document: &str, doc: Value, report: &mut Report) -> Result<Value> {
        let found = doc
            .get(self.version_key)
            .and_then(Value::as_str)
            .map(str::to_string);
        let unsupported = |found: String| Error::UnsupportedVersion {
            document: document.to_string(),
            found,
            latest: self.latest().to_string(),
        };

        let version = found.ok_or_else(|| unsupported("<missing>".to_string()))?;
        let start = self
            .position(&version)
            .ok_or_else(|| unsupported(version.clone()))?;

        let mut from = version;
        Ok(self.steps[start..].iter().fold(doc, |doc, (to, step)| {
            debug!("Upgrading {} from {} to {}", document, from, to);
            let mut doc = step(doc);
            if let Some(obj) = doc.as_object_mut() {
                obj.insert(self.version_key.to_string(), json!(to));
            }
            report.information(MessageKind::Migrated {
                from: std::mem::replace(&mut from, to.to_string()),
                to: to.to_string(),
            });
            doc
        }))
    }
}

fn for_each_peer(site: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Some(peers) = site.get_mut("peers").and_then(Value::as_object_mut) {
        for peer in peers.values_mut() {
            if let Some(peer) = peer.as_object_mut() {
                f(peer);
            }
        }
    }
}

/// Hooks, routing fix flag, and per-family traffic redirection
fn site_0_1_1(mut site: Value) -> Value {
    for_each_peer(&mut site, |peer| {
        peer.entry("post_up").or_insert_with(|| json!(""));
        peer.entry("post_down").or_insert_with(|| json!(""));
        peer.entry("ipv6_routing_fix").or_insert_with(|| json!(false));
        if let Some(Value::Bool(all)) = peer.get("redirect_all_traffic") {
            let all = *all;
            peer.insert(
                "redirect_all_traffic".into(),
                json!({ "ipv4": all, "ipv6": all }),
            );
        }
    });
    site
}

/// Site resolvers, peers inherit them by default
fn site_0_1_2(mut site: Value) -> Value {
    if let Some(obj) = site.as_object_mut() {
        obj.entry("dns").or_insert_with(|| json!(DEFAULT_DNS));
    }
    for_each_peer(&mut site, |peer| {
        peer.entry("dns").or_insert_with(|| json!([]));
    });
    site
}

/// Keepalive becomes a flag, empty main peer becomes null
fn site_0_1_3(mut site: Value) -> Value {
    for_each_peer(&mut site, |peer| {
        let keep_alive = match peer.get("persistent_keep_alive") {
            Some(Value::Number(n)) => n.as_i64().map_or(false, |n| n > 0),
            Some(Value::Bool(b)) => *b,
            _ => false,
        };
        peer.insert("persistent_keep_alive".into(), json!(keep_alive));

        if let Some(Value::String(main)) = peer.get("main_peer") {
            if main.is_empty() || main == crate::graph::NO_MAIN_PEER {
                peer.insert("main_peer".into(), Value::Null);
            }
        }
    });
    site
}

/// Configurable key tool
fn settings_0_1_1(mut settings: Value) -> Value {
    if let Some(obj) = settings.as_object_mut() {
        obj.entry("wg_executable").or_insert_with(|| json!("wg"));
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_versions() {
        assert_eq!(SITE_CHAIN.latest(), "0.1.3");
        assert_eq!(SETTINGS_CHAIN.latest(), "0.1.1");
        assert_eq!(SITE_CHAIN.position("0.1.0"), Some(0));
        assert_eq!(SITE_CHAIN.position("0.1.3"), Some(3));
        assert_eq!(SITE_CHAIN.position("0.2.0"), None);
    }

    #[test]
    fn test_site_upgrade_from_first_version() {
        let doc = json!({
            "config_version": "0.1.0",
            "ip_networks": ["10.0.0.0/24"],
            "peers": {
                "a": { "redirect_all_traffic": true, "persistent_keep_alive": 25, "main_peer": "" },
                "b": { "redirect_all_traffic": false, "persistent_keep_alive": -1 }
            }
        });
        let mut report = Report::new();
        let doc = SITE_CHAIN.upgrade("Site hq", doc, &mut report).unwrap();

        assert_eq!(doc["config_version"], "0.1.3");
        assert_eq!(doc["dns"], json!(["1.1.1.1", "8.8.8.8"]));
        assert_eq!(doc["peers"]["a"]["redirect_all_traffic"], json!({"ipv4": true, "ipv6": true}));
        assert_eq!(doc["peers"]["b"]["redirect_all_traffic"], json!({"ipv4": false, "ipv6": false}));
        assert_eq!(doc["peers"]["a"]["persistent_keep_alive"], json!(true));
        assert_eq!(doc["peers"]["b"]["persistent_keep_alive"], json!(false));
        assert_eq!(doc["peers"]["a"]["post_up"], "");
        assert_eq!(doc["peers"]["a"]["dns"], json!([]));
        assert!(doc["peers"]["a"]["main_peer"].is_null());
        assert_eq!(report.len(), 3);
        assert!(report.is_success(true));
    }

    #[test]
    fn test_existing_dns_is_kept() {
        let doc = json!({ "config_version": "0.1.1", "dns": ["9.9.9.9"], "peers": {} });
        let doc = SITE_CHAIN.upgrade("Site x", doc, &mut Report::new()).unwrap();
        assert_eq!(doc["dns"], json!(["9.9.9.9"]));
    }

    #[test]
    fn test_latest_version_untouched() {
        let doc = json!({ "config_version": "0.1.3", "peers": {} });
        let mut report = Report::new();
        let upgraded = SITE_CHAIN.upgrade("Site x", doc.clone(), &mut report).unwrap();
        assert_eq!(upgraded, doc);
        assert!(report.is_empty());
    }

    #[test]
    fn test_unsupported_versions_are_fatal() {
        for doc in [
            json!({ "config_version": "9.0.0" }),
            json!({ "config_version": 3 }),
            json!({}),
        ] {
            let err = SITE_CHAIN.upgrade("Site x", doc, &mut Report::new()).unwrap_err();
            assert!(matches!(err, Error::UnsupportedVersion { .. }));
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_settings_upgrade() {
        let doc = json!({ "file_version": "0.1.0", "editor": "vim" });
        let doc = SETTINGS_CHAIN.upgrade("Settings", doc, &mut Report::new()).unwrap();
        assert_eq!(doc["file_version"], "0.1.1");
        assert_eq!(doc["wg_executable"], "wg");
    }
}
