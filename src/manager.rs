//! Site administration
//!
//! [`SiteManager`] owns the settings and the sites of one session. Every
//! administrative action goes through it; nothing is written back until
//! [`SiteManager::save`] is called.

use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use tracing::{info, warn};

use crate::allocator::allocate;
use crate::compiler::{compile_site, PeerDocument};
use crate::config::Settings;
use crate::editor::{edit_connection_graph, TextEditor};
use crate::error::{Error, Result};
use crate::graph::ConnectionGraph;
use crate::integrity::{self, validate};
use crate::keys::KeyProvider;
use crate::report::{IntegrityReport, Report};
use crate::site::{Peer, Site, Sites};
use crate::storage::Storage;

/// Session context: settings, sites, and the collaborators that touch
/// the outside world
pub struct SiteManager<S: Storage, K: KeyProvider> {
    storage: S,
    keys: K,
    settings: Settings,
    sites: Sites,
}

impl<S: Storage, K: KeyProvider> SiteManager<S, K> {
    /// Create a manager with no sites loaded
    pub fn new(storage: S, keys: K, settings: Settings) -> Self {
        Self {
            storage,
            keys,
            settings,
            sites: Sites::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn sites(&self) -> &Sites {
        &self.sites
    }

    pub fn site(&self, name: &str) -> Result<&Site> {
        self.sites
            .get(name)
            .ok_or_else(|| Error::SiteNotFound(name.to_string()))
    }

    fn site_mut(&mut self, name: &str) -> Result<&mut Site> {
        self.sites
            .get_mut(name)
            .ok_or_else(|| Error::SiteNotFound(name.to_string()))
    }

    pub fn peer(&self, site: &str, name: &str) -> Result<&Peer> {
        self.site(site)?
            .peers
            .get(name)
            .ok_or_else(|| Error::PeerNotFound(name.to_string()))
    }

    /// Load the sites document, upgrading and validating it
    ///
    /// Sites that could be read are kept even when the report has errors,
    /// so they can be inspected and fixed.
    pub fn load(&mut self) -> Result<IntegrityReport> {
        let text = self.storage.read(&self.settings.sites_file_path)?;
        let (sites, report) = integrity::load_sites(&text)?;
        info!(
            "Loaded {} site(s) from {}",
            sites.len(),
            self.settings.sites_file_path.display()
        );
        if !report.is_success(false) {
            warn!("Sites document has {} problem(s)", report.message_count());
        }
        self.sites = sites;
        Ok(report)
    }

    /// Write the sites document
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.sites)?;
        self.storage.write(&self.settings.sites_file_path, &text)?;
        info!("Saved sites to {}", self.settings.sites_file_path.display());
        Ok(())
    }

    /// Validate the sites as they are in memory
    pub fn check(&self) -> Result<IntegrityReport> {
        let (_, report) = integrity::check_sites(serde_json::to_value(&self.sites)?)?;
        Ok(report)
    }

    /// Add an empty site
    pub fn add_site(&mut self, name: &str, ip_networks: Vec<IpNet>, dns: Vec<IpAddr>) -> Result<()> {
        if self.sites.contains_key(name) {
            return Err(Error::SiteExists(name.to_string()));
        }
        validate::check_name(name).map_err(|kind| Error::Config(kind.to_string()))?;
        for network in &ip_networks {
            validate::check_ip_network(&network.to_string())
                .map_err(|kind| Error::Config(kind.to_string()))?;
        }
        if ip_networks.is_empty() {
            return Err(Error::Config(format!("site {} needs at least one IP network", name)));
        }
        let site = Site::new(ip_networks, dns);
        for addr in &site.dns {
            validate::check_dns(&addr.to_string(), site.has_ipv4(), site.has_ipv6())
                .map_err(|kind| Error::Config(kind.to_string()))?;
        }

        self.sites.insert(name.to_string(), site);
        info!("Added site {}", name);
        Ok(())
    }

    /// Remove a site together with its generated configs
    pub fn delete_site(&mut self, name: &str) -> Result<()> {
        self.sites
            .shift_remove(name)
            .ok_or_else(|| Error::SiteNotFound(name.to_string()))?;
        match validate::check_name(name) {
            Ok(()) => self.delete_configs(name)?,
            Err(kind) => warn!("Not removing configs of site {}: {}", name, kind),
        }
        info!("Deleted site {}", name);
        Ok(())
    }

    /// Add an unconnected peer with freshly issued keys
    pub fn add_peer(&mut self, site: &str, name: &str) -> Result<()> {
        let current = self.site(site)?;
        if current.peers.contains_key(name) {
            return Err(Error::PeerExists(name.to_string()));
        }
        validate::check_name(name).map_err(|kind| Error::Config(kind.to_string()))?;
        let mut names = current.peer_names();
        names.push(name.to_string());
        allocate(&names, &current.ip_networks)?;

        let keys = self.keys.generate()?;
        self.site_mut(site)?
            .peers
            .insert(name.to_string(), Peer::new(keys));
        info!("Added peer {} to site {}", name, site);
        Ok(())
    }

    /// Remove a peer and every edge that points at it
    ///
    /// Peers that used it as their main peer fall back to their first
    /// remaining outgoing peer.
    pub fn delete_peer(&mut self, site: &str, name: &str) -> Result<()> {
        let current = self.site_mut(site)?;
        current
            .peers
            .shift_remove(name)
            .ok_or_else(|| Error::PeerNotFound(name.to_string()))?;

        for (other, peer) in current.peers.iter_mut() {
            peer.outgoing_connected_peers.retain(|p| p != name);
            peer.ingoing_connected_peers.retain(|p| p != name);
            if peer.is_main_peer(name) {
                peer.main_peer = peer.outgoing_connected_peers.first().cloned();
                warn!(
                    "Main peer of {} reassigned to {:?} after deleting {}",
                    other, peer.main_peer, name
                );
            }
        }
        info!("Deleted peer {} from site {}", name, site);
        Ok(())
    }

    /// Issue new keys for a peer
    pub fn rekey_peer(&mut self, site: &str, name: &str) -> Result<()> {
        let keys = self.keys.generate()?;
        self.update_peer(site, name, |peer| peer.keys = keys)?;
        info!("Rekeyed peer {} in site {}", name, site);
        Ok(())
    }

    /// Change peer attributes in place; run [`check`](Self::check) afterwards
    pub fn update_peer(&mut self, site: &str, name: &str, change: impl FnOnce(&mut Peer)) -> Result<()> {
        let peer = self
            .site_mut(site)?
            .peers
            .get_mut(name)
            .ok_or_else(|| Error::PeerNotFound(name.to_string()))?;
        change(peer);
        Ok(())
    }

    /// Connection table of a site, repaired, with a message per repair
    pub fn connection_graph(&self, site: &str) -> Result<(ConnectionGraph, Report)> {
        let mut graph = ConnectionGraph::from_site(self.site(site)?);
        let repairs = graph.check_integrity();
        if !repairs.is_empty() {
            warn!("Connection table of site {} needed {} repair(s)", site, repairs.len());
        }
        Ok((graph, repairs))
    }

    /// Store an edited connection table back into the peers
    pub fn apply_graph(&mut self, site: &str, graph: &ConnectionGraph) -> Result<()> {
        graph.apply_to(self.site_mut(site)?)?;
        info!("Updated connections of site {}", site);
        Ok(())
    }

    /// Edit the connection table of a site with `editor`
    pub fn edit_connections(&mut self, site: &str, editor: &dyn TextEditor) -> Result<()> {
        let (mut graph, repairs) = self.connection_graph(site)?;
        edit_connection_graph(&mut graph, editor, &repairs)?;
        self.apply_graph(site, &graph)
    }

    /// Compile the configs of a site without writing them
    ///
    /// Refuses sites that do not pass the integrity check.
    pub fn compile(&self, site: &str) -> Result<Vec<PeerDocument>> {
        let current = self.site(site)?;
        let report = self.check()?;
        if let Some(site_report) = report.get(site) {
            if !site_report.is_success(false) {
                return Err(Error::Integrity(format!(
                    "site {} ({} message(s))",
                    site,
                    site_report.message_count()
                )));
            }
        }
        compile_site(site, current)
    }

    /// Write one config file per peer, replacing earlier output
    pub fn generate_configs(&self, site: &str) -> Result<Vec<PathBuf>> {
        let documents = self.compile(site)?;
        let dir = self.config_dir(site)?;
        self.storage.prepare_dir(&dir)?;

        let mut written = Vec::with_capacity(documents.len());
        for document in documents {
            let path = dir.join(&document.file_name);
            self.storage.write(&path, &document.render())?;
            info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Remove the generated configs of a site
    pub fn delete_configs(&self, site: &str) -> Result<()> {
        self.storage.remove_dir(&self.config_dir(site)?)
    }

    /// Output directory of a site; the name must stay below `wg_config_path`
    fn config_dir(&self, site: &str) -> Result<PathBuf> {
        validate::check_name(site).map_err(|kind| Error::Config(kind.to_string()))?;
        Ok(self.settings.site_config_dir(site))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Keys;
    use crate::storage::MemoryStorage;
    use crate::report::MessageKind;
    use std::cell::{Cell, RefCell};
    use std::path::Path;

    /// Issues numbered keys without running anything
    #[derive(Default)]
    struct CountingKeys(Cell<u32>);

    impl KeyProvider for CountingKeys {
        fn generate(&self) -> Result<Keys> {
            let n = self.0.get() + 1;
            self.0.set(n);
            Ok(Keys {
                privkey: format!("priv{}", n),
                pubkey: format!("pub{}", n),
                psk: format!("psk{}", n),
            })
        }
    }

    struct FixedEditor(&'static str);

    impl TextEditor for FixedEditor {
        fn edit(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Confirms whatever it is shown
    #[derive(Default)]
    struct RecordingEditor(RefCell<Vec<String>>);

    impl TextEditor for RecordingEditor {
        fn edit(&self, text: &str) -> Result<String> {
            self.0.borrow_mut().push(text.to_string());
            Ok(text.to_string())
        }
    }

    fn manager() -> SiteManager<MemoryStorage, CountingKeys> {
        let mut m = SiteManager::new(MemoryStorage::new(), CountingKeys::default(), Settings::default());
        m.add_site("hq", vec!["10.0.0.0/24".parse().unwrap()], vec!["1.1.1.1".parse().unwrap()])
            .unwrap();
        for peer in ["a", "b", "c"] {
            m.add_peer("hq", peer).unwrap();
        }
        m
    }

    #[test]
    fn test_add_and_lookup() {
        let mut m = manager();
        assert_eq!(m.site("hq").unwrap().peer_names(), vec!["a", "b", "c"]);
        assert_eq!(m.peer("hq", "b").unwrap().keys.pubkey, "pub2");
        assert!(matches!(m.add_site("hq", vec!["10.1.0.0/24".parse().unwrap()], vec![]), Err(Error::SiteExists(_))));
        assert!(matches!(m.add_peer("hq", "a"), Err(Error::PeerExists(_))));
        assert!(matches!(m.add_peer("lab", "a"), Err(Error::SiteNotFound(_))));
        assert!(matches!(m.peer("hq", "z"), Err(Error::PeerNotFound(_))));
    }

    #[test]
    fn test_add_site_rejects_bad_input() {
        let mut m = manager();
        assert!(matches!(m.add_site("x", vec![], vec![]), Err(Error::Config(_))));
        assert!(matches!(
            m.add_site("y", vec!["10.0.0.0/31".parse().unwrap()], vec![]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            m.add_site("z", vec!["10.0.0.0/24".parse().unwrap()], vec!["2001:db8::53".parse().unwrap()]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unusable_names_rejected() {
        let mut m = manager();
        let outside = tempfile::tempdir().unwrap();
        let absolute = outside.path().display().to_string();
        for name in [absolute.as_str(), "../etc", "my site", "None", ""] {
            assert!(
                matches!(m.add_site(name, vec!["10.1.0.0/24".parse().unwrap()], vec![]), Err(Error::Config(_))),
                "{:?}",
                name
            );
        }
        for name in ["my laptop", "None", "main_peer", "../x", "#a"] {
            assert!(matches!(m.add_peer("hq", name), Err(Error::Config(_))), "{:?}", name);
        }
        assert_eq!(m.sites().len(), 1);
        assert_eq!(m.site("hq").unwrap().peers.len(), 3);
        // no keys issued for rejected peers
        assert_eq!(m.keys.0.get(), 3);
    }

    #[test]
    fn test_configs_stay_below_output_dir() {
        let mut m = manager();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("keep.txt"), "precious").unwrap();
        let hostile = outside.path().display().to_string();
        // a hand edited document can still carry such a name
        let site = m.site("hq").unwrap().clone();
        m.sites.insert(hostile.clone(), site);

        assert!(matches!(m.generate_configs(&hostile), Err(Error::Config(_) | Error::Integrity(_))));
        assert!(matches!(m.delete_configs(&hostile), Err(Error::Config(_))));
        m.delete_site(&hostile).unwrap();
        assert!(m.site(&hostile).is_err());
        assert!(outside.path().join("keep.txt").exists());
    }

    #[test]
    fn test_edit_shows_repairs_of_stored_table() {
        let mut m = manager();
        m.edit_connections(
            "hq",
            &FixedEditor("  a b c main_peer\na 0 1 0 b\nb 0 0 0 None\nc 0 0 0 None"),
        )
        .unwrap();
        m.update_peer("hq", "a", |p| p.main_peer = Some("ghost".into())).unwrap();

        let (graph, repairs) = m.connection_graph("hq").unwrap();
        assert_eq!(graph.main_peer("a").unwrap().as_deref(), Some("b"));
        assert!(repairs
            .iter()
            .any(|msg| matches!(&msg.kind, MessageKind::MainPeerNotExists { name, .. } if name == "ghost")));

        let editor = RecordingEditor::default();
        m.edit_connections("hq", &editor).unwrap();
        let shown = editor.0.borrow();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].contains("# [Error] Peer a: main peer ghost does not exist"), "{}", shown[0]);
        assert_eq!(m.peer("hq", "a").unwrap().main_peer.as_deref(), Some("b"));
    }

    #[test]
    fn test_add_peer_checks_capacity() {
        let mut m = manager();
        m.add_site("tiny", vec!["10.9.0.0/30".parse().unwrap()], vec![]).unwrap();
        m.add_peer("tiny", "one").unwrap();
        m.add_peer("tiny", "two").unwrap();
        let err = m.add_peer("tiny", "three").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(m.site("tiny").unwrap().peers.len(), 2);
    }

    #[test]
    fn test_edit_connections_and_generate() {
        let mut m = manager();
        m.edit_connections(
            "hq",
            &FixedEditor("  a b c main_peer\na 0 1 1 b\nb 0 0 0 None\nc 0 0 0 None"),
        )
        .unwrap();
        assert_eq!(m.peer("hq", "b").unwrap().ingoing_connected_peers, vec!["a"]);

        // b and c are dialed, so they need an endpoint first
        assert!(matches!(m.generate_configs("hq"), Err(Error::Integrity(_))));
        for (peer, host) in [("b", "b.example.org"), ("c", "10.20.0.3")] {
            m.update_peer("hq", peer, |p| {
                p.endpoint = host.to_string();
                p.port = 51820;
            })
            .unwrap();
        }

        let written = m.generate_configs("hq").unwrap();
        assert_eq!(written.len(), 3);
        let b_conf = m.storage().get(Path::new("./wg/hq/hq_b.conf")).unwrap();
        assert!(b_conf.contains("AllowedIPs = 10.0.0.1/32"));
        assert!(b_conf.contains("ListenPort = 51820"));
    }

    #[test]
    fn test_delete_peer_removes_edges() {
        let mut m = manager();
        m.edit_connections(
            "hq",
            &FixedEditor("  a b c main_peer\na 0 1 1 b\nb 0 0 0 None\nc 0 1 0 b"),
        )
        .unwrap();

        m.delete_peer("hq", "b").unwrap();
        let a = m.peer("hq", "a").unwrap();
        assert_eq!(a.outgoing_connected_peers, vec!["c"]);
        assert_eq!(a.main_peer.as_deref(), Some("c"));
        let c = m.peer("hq", "c").unwrap();
        assert!(c.outgoing_connected_peers.is_empty());
        assert_eq!(c.main_peer, None);
        assert_eq!(c.ingoing_connected_peers, vec!["a"]);
    }

    #[test]
    fn test_rekey_peer() {
        let mut m = manager();
        m.rekey_peer("hq", "a").unwrap();
        assert_eq!(m.peer("hq", "a").unwrap().keys.privkey, "priv4");
    }

    #[test]
    fn test_save_and_reload() {
        let m = manager();
        m.save().unwrap();

        let text = m.storage().get(Path::new("./sites.json")).unwrap();
        let storage = MemoryStorage::new();
        storage.write(Path::new("./sites.json"), &text).unwrap();

        let mut again = SiteManager::new(storage, CountingKeys::default(), Settings::default());
        let report = again.load().unwrap();
        assert!(report.is_success(true), "{}", report);
        assert_eq!(again.sites(), m.sites());
    }

    #[test]
    fn test_delete_site_clears_configs() {
        let mut m = manager();
        m.generate_configs("hq").unwrap();
        assert_eq!(m.storage().paths().len(), 3);

        m.delete_site("hq").unwrap();
        assert!(m.storage().paths().is_empty());
        assert!(matches!(m.site("hq"), Err(Error::SiteNotFound(_))));
    }
}
