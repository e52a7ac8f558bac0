//! Connection table
//!
//! Directed "who dials whom" graph of a site, stored as an n x (n + 1)
//! table: cell (i, j) is 1 when row peer i dials column peer j, and the
//! trailing column names row i's main peer. The table is built from the
//! peers' edge lists for one edit session, edited as text, repaired, and
//! written back into the peers.

use tracing::warn;

use crate::error::{Error, Result};
use crate::report::{MessageKind, Report};
use crate::site::Site;

/// Main peer column value for "no main peer"
pub const NO_MAIN_PEER: &str = "None";

/// Header of the trailing main peer column
pub const MAIN_PEER_HEADER: &str = "main_peer";

/// Directed dial graph plus main peer selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionGraph {
    names: Vec<String>,
    cells: Vec<Vec<bool>>,
    main_peers: Vec<Option<String>>,
}

impl ConnectionGraph {
    /// Create an empty table: no connections, no main peers
    pub fn new(peer_names: Vec<String>) -> Self {
        let n = peer_names.len();
        Self {
            names: peer_names,
            cells: vec![vec![false; n]; n],
            main_peers: vec![None; n],
        }
    }

    /// Build the table from the edge lists stored in a site's peers
    ///
    /// Names that are not peers of the site and self references are left
    /// out; the integrity validator reports them.
    pub fn from_site(site: &Site) -> Self {
        let mut graph = Self::new(site.peer_names());
        for (i, peer) in site.peers.values().enumerate() {
            for target in &peer.outgoing_connected_peers {
                if let Some(j) = graph.position(target) {
                    if i != j {
                        graph.cells[i][j] = true;
                    }
                }
            }
            graph.main_peers[i] = peer.main_peer.clone();
        }
        graph
    }

    /// Write the table back into the site's peer edge lists
    pub fn apply_to(&self, site: &mut Site) -> Result<()> {
        for name in &self.names {
            if !site.peers.contains_key(name) {
                return Err(Error::PeerNotFound(name.clone()));
            }
        }
        for (i, name) in self.names.iter().enumerate() {
            let outgoing = self.outgoing(name)?;
            let ingoing = self.ingoing(name)?;
            if let Some(peer) = site.peers.get_mut(name) {
                peer.outgoing_connected_peers = outgoing;
                peer.ingoing_connected_peers = ingoing;
                peer.main_peer = self.main_peers[i].clone();
            }
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of columns, including the main peer column
    pub fn width(&self) -> usize {
        self.names.len() + 1
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| Error::PeerNotFound(name.to_string()))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<bool> {
        self.cells.get(row)?.get(column).copied()
    }

    /// Set a dial cell; a peer can never dial itself
    pub fn set_cell(&mut self, row: usize, column: usize, value: bool) -> Result<()> {
        if row >= self.len() || column >= self.len() {
            return Err(Error::IndexOutOfRange { row, column });
        }
        if row == column && value {
            return Err(Error::SelfConnection(self.names[row].clone()));
        }
        self.cells[row][column] = value;
        Ok(())
    }

    /// Set the main peer column of a row; run `check_integrity` afterwards
    pub fn set_main_peer(&mut self, row: usize, main_peer: Option<String>) -> Result<()> {
        let slot = self
            .main_peers
            .get_mut(row)
            .ok_or(Error::IndexOutOfRange { row, column: row + 1 })?;
        *slot = main_peer;
        Ok(())
    }

    /// Peers that `name` dials, in table order
    pub fn outgoing(&self, name: &str) -> Result<Vec<String>> {
        let row = self.index_of(name)?;
        Ok(self.row_outgoing(row))
    }

    /// Peers that dial `name`, in table order
    pub fn ingoing(&self, name: &str) -> Result<Vec<String>> {
        let column = self.index_of(name)?;
        Ok(self
            .names
            .iter()
            .enumerate()
            .filter(|(i, _)| self.cells[*i][column])
            .map(|(_, n)| n.clone())
            .collect())
    }

    pub fn main_peer(&self, name: &str) -> Result<Option<String>> {
        let row = self.index_of(name)?;
        Ok(self.main_peers[row].clone())
    }

    fn row_outgoing(&self, row: usize) -> Vec<String> {
        self.names
            .iter()
            .enumerate()
            .filter(|(j, _)| self.cells[row][*j])
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Render the table as a fixed-width text grid
    pub fn serialize(&self) -> String {
        let label_width = self.names.iter().map(String::len).max().unwrap_or(0);

        let mut out = " ".repeat(label_width);
        for name in &self.names {
            out.push(' ');
            out.push_str(name);
        }
        out.push(' ');
        out.push_str(MAIN_PEER_HEADER);

        for (i, name) in self.names.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{:>width$}", name, width = label_width));
            for (j, column) in self.names.iter().enumerate() {
                let value = if self.cells[i][j] { "1" } else { "0" };
                out.push_str(&format!(" {:<width$}", value, width = column.len()));
            }
            out.push(' ');
            out.push_str(self.main_peers[i].as_deref().unwrap_or(NO_MAIN_PEER));
        }
        out
    }

    /// Read back a grid produced by [`serialize`](Self::serialize)
    ///
    /// Blank lines and `#` comment lines are ignored, the first remaining
    /// line is the header. Rows are matched by their leading peer name. The
    /// table is only changed when the whole text parses; otherwise the
    /// returned report explains what is wrong.
    pub fn deserialize(&mut self, text: &str) -> Report {
        let mut report = Report::new();
        let mut cells = self.cells.clone();
        let mut main_peers = self.main_peers.clone();
        let mut seen = vec![false; self.len()];

        let rows = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .skip(1);

        for (index, line) in rows.enumerate() {
            let row = index + 1;
            let mut tokens = line.split_whitespace();
            let Some(label) = tokens.next() else { continue };
            let Some(i) = self.position(label) else {
                report.error(MessageKind::UnknownRow {
                    row,
                    name: label.to_string(),
                });
                continue;
            };
            if seen[i] {
                report.error(MessageKind::DuplicateRow {
                    row,
                    name: label.to_string(),
                });
                continue;
            }
            seen[i] = true;

            let values: Vec<&str> = tokens.collect();
            if values.len() != self.width() {
                report.error(MessageKind::DimensionMismatch {
                    row,
                    expected: self.width(),
                    found: values.len(),
                });
                continue;
            }

            for (j, value) in values[..self.len()].iter().enumerate() {
                match *value {
                    "0" => cells[i][j] = false,
                    "1" => cells[i][j] = true,
                    other => report.error(MessageKind::InvalidCell {
                        row,
                        value: other.to_string(),
                    }),
                }
            }

            main_peers[i] = match values[self.len()] {
                NO_MAIN_PEER => None,
                name => Some(name.to_string()),
            };
        }

        for (i, present) in seen.iter().enumerate() {
            if !present {
                report.error(MessageKind::DimensionMismatch {
                    row: i + 1,
                    expected: self.width(),
                    found: 0,
                });
            }
        }

        if report.is_success(false) {
            self.cells = cells;
            self.main_peers = main_peers;
        }
        report
    }

    /// Deserialize, then repair; the report holds both kinds of messages
    pub fn update(&mut self, text: &str) -> Report {
        let mut report = self.deserialize(text);
        if report.is_success(false) {
            report.extend(self.check_integrity());
        }
        report
    }

    /// Repair invalid entries in place
    ///
    /// Every repair is reported. Running this twice in a row yields no
    /// messages on the second run.
    pub fn check_integrity(&mut self) -> Report {
        let mut report = Report::new();

        for i in 0..self.len() {
            if self.cells[i][i] {
                self.cells[i][i] = false;
                warn!("Removed self connection of peer {}", self.names[i]);
                report.error(MessageKind::SelfConnection {
                    peer: self.names[i].clone(),
                });
            }
        }

        for i in 0..self.len() {
            let peer = self.names[i].clone();
            let outgoing = self.row_outgoing(i);

            match self.main_peers[i].clone() {
                None => {
                    if let Some(first) = outgoing.first() {
                        self.main_peers[i] = Some(first.clone());
                        report.error(MessageKind::MainPeerMissing {
                            peer,
                            assigned: first.clone(),
                        });
                    }
                }
                Some(main) if main == peer || self.position(&main).is_none() => {
                    let replacement = outgoing.first().cloned();
                    self.main_peers[i] = replacement.clone();
                    report.error(MessageKind::MainPeerNotExists {
                        peer,
                        name: main,
                        replacement,
                    });
                }
                Some(main) if !outgoing.contains(&main) => {
                    if let Some(j) = self.position(&main) {
                        self.cells[i][j] = true;
                    }
                    report.error(MessageKind::MainPeerNotOutgoing { peer, main });
                }
                Some(_) => {}
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{Keys, Peer};

    fn graph(names: &[&str]) -> ConnectionGraph {
        ConnectionGraph::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_new_graph_is_empty() {
        let g = graph(&["a", "b"]);
        assert_eq!(g.width(), 3);
        assert!(g.outgoing("a").unwrap().is_empty());
        assert_eq!(g.main_peer("b").unwrap(), None);
    }

    #[test]
    fn test_self_connection_rejected() {
        let mut g = graph(&["a", "b"]);
        assert!(matches!(g.set_cell(0, 0, true), Err(Error::SelfConnection(_))));
        assert!(g.set_cell(0, 0, false).is_ok());
        assert!(matches!(
            g.set_cell(0, 5, true),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_projections() {
        let mut g = graph(&["a", "b", "c"]);
        g.set_cell(0, 1, true).unwrap();
        g.set_cell(0, 2, true).unwrap();
        g.set_cell(2, 1, true).unwrap();

        assert_eq!(g.outgoing("a").unwrap(), vec!["b", "c"]);
        assert_eq!(g.ingoing("b").unwrap(), vec!["a", "c"]);
        assert!(g.ingoing("a").unwrap().is_empty());
        assert!(matches!(g.outgoing("x"), Err(Error::PeerNotFound(_))));
        assert!(matches!(g.main_peer("x"), Err(Error::PeerNotFound(_))));
    }

    #[test]
    fn test_serialize_layout() {
        let mut g = graph(&["hq", "laptop"]);
        g.set_cell(1, 0, true).unwrap();
        g.set_main_peer(1, Some("hq".into())).unwrap();

        let text = g.serialize();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "       hq laptop main_peer");
        assert_eq!(lines[1], "    hq 0  0      None");
        assert_eq!(lines[2], "laptop 1  0      hq");
    }

    #[test]
    fn test_round_trip() {
        let mut g = graph(&["alpha", "b", "gamma"]);
        g.set_cell(0, 1, true).unwrap();
        g.set_cell(2, 0, true).unwrap();
        g.set_cell(2, 1, true).unwrap();
        g.set_main_peer(0, Some("b".into())).unwrap();
        g.set_main_peer(2, Some("b".into())).unwrap();

        let mut copy = graph(&["alpha", "b", "gamma"]);
        let report = copy.deserialize(&g.serialize());
        assert!(report.is_empty());
        assert_eq!(copy, g);
    }

    #[test]
    fn test_dimension_mismatch_keeps_table() {
        let mut g = graph(&["a", "b"]);
        let before = g.clone();
        let report = g.deserialize("  a b main_peer\na 0 1\nb 0 0 None");

        assert!(!report.is_success(false));
        assert!(report.iter().any(|m| matches!(
            m.kind,
            MessageKind::DimensionMismatch { row: 1, expected: 3, found: 2 }
        )));
        assert_eq!(g, before);
    }

    #[test]
    fn test_missing_row_reported() {
        let mut g = graph(&["a", "b"]);
        let report = g.deserialize("  a b main_peer\na 0 0 None");
        assert!(report.iter().any(|m| matches!(
            m.kind,
            MessageKind::DimensionMismatch { row: 2, found: 0, .. }
        )));
    }

    #[test]
    fn test_invalid_cell_and_unknown_row() {
        let mut g = graph(&["a", "b"]);
        let report = g.deserialize("  a b main_peer\na 0 x None\nz 0 0 None\nb 0 0 None");
        assert_eq!(report.len(), 2);
        assert!(report
            .iter()
            .any(|m| matches!(&m.kind, MessageKind::UnknownRow { name, .. } if name == "z")));
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let mut g = graph(&["a", "b"]);
        let before = g.clone();
        let report = g.deserialize("  a b main_peer\na 0 1 b\na 0 0 None\nb 0 0 None");

        assert_eq!(report.len(), 1);
        assert!(report.iter().any(|m| matches!(
            &m.kind,
            MessageKind::DuplicateRow { row: 2, name } if name == "a"
        )));
        assert_eq!(g, before);
    }

    #[test]
    fn test_accepted_names_round_trip() {
        let names = ["db.internal", "peer_1", "x-2", "LAPTOP"];
        for name in names {
            assert!(crate::integrity::validate::check_name(name).is_ok());
        }
        let mut g = graph(&names);
        g.set_cell(1, 0, true).unwrap();
        g.set_main_peer(1, Some("db.internal".into())).unwrap();

        let mut copy = graph(&names);
        assert!(copy.deserialize(&g.serialize()).is_empty());
        assert_eq!(copy, g);
    }

    #[test]
    fn test_comment_lines_ignored() {
        let mut g = graph(&["a", "b"]);
        let text = format!("{}\n# [Error] something from the last edit", g.serialize());
        assert!(g.deserialize(&text).is_empty());
    }

    #[test]
    fn test_integrity_repairs() {
        let mut g = graph(&["a", "b", "c", "d"]);
        let report = g.update(
            "  a b c d main_peer\n\
             a 1 0 0 0 None\n\
             b 1 0 1 0 None\n\
             c 0 0 0 0 ghost\n\
             d 0 0 0 0 a",
        );

        assert_eq!(report.len(), 4);
        assert_eq!(g.cell(0, 0), Some(false));
        assert_eq!(g.main_peer("b").unwrap().as_deref(), Some("a"));
        assert_eq!(g.main_peer("c").unwrap(), None);
        assert_eq!(g.outgoing("d").unwrap(), vec!["a"]);

        let kinds: Vec<&MessageKind> = report.iter().map(|m| &m.kind).collect();
        assert!(matches!(kinds[0], MessageKind::SelfConnection { .. }));
        assert!(matches!(kinds[1], MessageKind::MainPeerMissing { .. }));
        assert!(matches!(kinds[2], MessageKind::MainPeerNotExists { .. }));
        assert!(matches!(kinds[3], MessageKind::MainPeerNotOutgoing { .. }));
    }

    #[test]
    fn test_main_peer_not_exists_uses_first_outgoing() {
        let mut g = graph(&["a", "b", "c"]);
        g.set_cell(0, 2, true).unwrap();
        g.set_cell(0, 1, true).unwrap();
        g.set_main_peer(0, Some("gone".into())).unwrap();

        let report = g.check_integrity();
        assert_eq!(report.len(), 1);
        assert_eq!(g.main_peer("a").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_main_peer_self_is_replaced() {
        let mut g = graph(&["a", "b"]);
        g.set_main_peer(0, Some("a".into())).unwrap();
        let report = g.check_integrity();
        assert_eq!(report.len(), 1);
        assert_eq!(g.main_peer("a").unwrap(), None);
        assert_eq!(g.cell(0, 0), Some(false));
    }

    #[test]
    fn test_integrity_idempotent() {
        let mut g = graph(&["a", "b", "c"]);
        g.update(
            "  a b c main_peer\n\
             a 1 1 1 c\n\
             b 0 0 0 a\n\
             c 1 0 0 missing",
        );
        let second = g.check_integrity();
        assert!(second.is_empty(), "second run reported: {}", second);
    }

    #[test]
    fn test_site_round_trip() {
        let mut site = Site::new(vec!["10.0.0.0/24".parse().unwrap()], vec![]);
        for name in ["a", "b", "c"] {
            site.peers.insert(name.into(), Peer::new(Keys::default()));
        }

        let mut g = ConnectionGraph::from_site(&site);
        g.set_cell(0, 1, true).unwrap();
        g.set_cell(0, 2, true).unwrap();
        assert_eq!(g.check_integrity().len(), 1);
        g.apply_to(&mut site).unwrap();

        assert_eq!(site.peers["a"].outgoing_connected_peers, vec!["b", "c"]);
        assert_eq!(site.peers["a"].main_peer.as_deref(), Some("b"));
        assert_eq!(site.peers["b"].ingoing_connected_peers, vec!["a"]);
        assert_eq!(site.peers["c"].ingoing_connected_peers, vec!["a"]);
        assert_eq!(ConnectionGraph::from_site(&site), g);
    }
}
