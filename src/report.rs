//! Diagnostic reports
//!
//! Validation and graph repair never stop at the first problem. Every check
//! appends a [`Message`] to a [`Report`], and reports are grouped per peer
//! ([`ReportList`]) and per site ([`SiteReport`]) so a whole document can be
//! judged in one pass.

use std::fmt;

use indexmap::IndexMap;

/// Severity of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warning,
    Information,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "[Error]"),
            Level::Warning => write!(f, "[Warning]"),
            Level::Information => write!(f, "[Information]"),
        }
    }
}

/// Typed payload of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    // Structure
    FieldMissing { field: String },
    FieldType { field: String, expected: &'static str },
    NameInvalid { name: String },

    // Migration
    Migrated { from: String, to: String },

    // Networks and addresses
    NoIpNetworks,
    IpNetworkInvalid { value: String },
    IpNetworkHostBits { network: String },
    IpNetworkPrefixTooHigh { network: String, prefix: u8, max: u8 },
    DnsInvalid { value: String },
    DnsFamily { address: String },
    AdditionalAllowedIpInvalid { value: String },
    AdditionalAllowedIpFamily { network: String },
    EndpointInvalid { endpoint: String },
    EndpointMissing,
    PortInvalid { port: i64 },

    // Peer references
    UnknownPeer { field: &'static str, name: String },
    SelfReference { field: &'static str },
    OutgoingNotMirrored { peer: String },
    IngoingNotMirrored { peer: String },
    MainPeerInvalid { main: Option<String> },

    // Connection table
    SelfConnection { peer: String },
    MainPeerMissing { peer: String, assigned: String },
    MainPeerNotExists { peer: String, name: String, replacement: Option<String> },
    MainPeerNotOutgoing { peer: String, main: String },
    DimensionMismatch { row: usize, expected: usize, found: usize },
    UnknownRow { row: usize, name: String },
    InvalidCell { row: usize, value: String },
    DuplicateRow { row: usize, name: String },
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MessageKind::*;
        match self {
            FieldMissing { field } => write!(f, "key \"{}\" is missing", field),
            FieldType { field, expected } => write!(f, "key \"{}\" should be {}", field, expected),
            NameInvalid { name } => write!(
                f,
                "\"{}\" is not a valid name (no whitespace, path separators, '..', leading '#' or \"None\")",
                name
            ),
            Migrated { from, to } => write!(f, "upgraded from version {} to {}", from, to),
            NoIpNetworks => write!(f, "no valid IP network is configured"),
            IpNetworkInvalid { value } => write!(f, "{} is not a valid IP network", value),
            IpNetworkHostBits { network } => write!(f, "{} has host bits set", network),
            IpNetworkPrefixTooHigh { network, prefix, max } => write!(
                f,
                "{} has a too high prefix. Prefix is {}, maximum is {}",
                network, prefix, max
            ),
            DnsInvalid { value } => write!(f, "{} is not a valid IP address", value),
            DnsFamily { address } => write!(f, "{} has a wrong IP address version", address),
            AdditionalAllowedIpInvalid { value } => write!(f, "{} is not a valid IP network", value),
            AdditionalAllowedIpFamily { network } => {
                write!(f, "{} is of an IP version the site does not use", network)
            }
            EndpointInvalid { endpoint } => {
                write!(f, "{} is not a valid hostname or IP address", endpoint)
            }
            EndpointMissing => write!(f, "an endpoint is required when other peers dial this peer"),
            PortInvalid { port } => write!(f, "{} is out of range. Port must be within 1-65535", port),
            UnknownPeer { field, name } => {
                write!(f, "{} in \"{}\" is not present in the peers list", name, field)
            }
            SelfReference { field } => write!(f, "a peer cannot reference itself in \"{}\"", field),
            OutgoingNotMirrored { peer } => write!(
                f,
                "{} is an outgoing connected peer, but does not list this peer as ingoing",
                peer
            ),
            IngoingNotMirrored { peer } => write!(
                f,
                "{} is an ingoing connected peer, but does not list this peer as outgoing",
                peer
            ),
            MainPeerInvalid { main: Some(main) } => {
                write!(f, "main peer {} is not an outgoing connected peer", main)
            }
            MainPeerInvalid { main: None } => {
                write!(f, "a main peer is required when there are outgoing connected peers")
            }
            SelfConnection { peer } => write!(
                f,
                "Peer {}: a peer cannot be connected to itself, diagonal elements must be 0",
                peer
            ),
            MainPeerMissing { peer, assigned } => write!(
                f,
                "Peer {}: an outgoing connection requires a main peer, {} was assigned",
                peer, assigned
            ),
            MainPeerNotExists { peer, name, replacement } => write!(
                f,
                "Peer {}: main peer {} does not exist, replaced with {}",
                peer,
                name,
                replacement.as_deref().unwrap_or(crate::graph::NO_MAIN_PEER)
            ),
            MainPeerNotOutgoing { peer, main } => write!(
                f,
                "Peer {}: main peer {} was not an outgoing connection, the connection was added",
                peer, main
            ),
            DimensionMismatch { row, expected, found } => write!(
                f,
                "Row {}: dimension mismatch, expected {} entries but found {}",
                row, expected, found
            ),
            UnknownRow { row, name } => write!(f, "Row {}: {} is not a peer of this table", row, name),
            InvalidCell { row, value } => write!(f, "Row {}: {} is neither 0 nor 1", row, value),
            DuplicateRow { row, name } => write!(f, "Row {}: {} already has a row", row, name),
        }
    }
}

/// A single diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub kind: MessageKind,
}

impl Message {
    pub fn error(kind: MessageKind) -> Self {
        Self { level: Level::Error, kind }
    }

    pub fn warning(kind: MessageKind) -> Self {
        Self { level: Level::Warning, kind }
    }

    pub fn information(kind: MessageKind) -> Self {
        Self { level: Level::Information, kind }
    }

    pub fn is_error(&self, warnings_as_errors: bool) -> bool {
        self.level == Level::Error || (warnings_as_errors && self.level == Level::Warning)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.kind)
    }
}

/// Ordered sequence of messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    messages: Vec<Message>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn error(&mut self, kind: MessageKind) {
        self.push(Message::error(kind));
    }

    pub fn warning(&mut self, kind: MessageKind) {
        self.push(Message::warning(kind));
    }

    pub fn information(&mut self, kind: MessageKind) {
        self.push(Message::information(kind));
    }

    pub fn extend(&mut self, other: Report) {
        self.messages.extend(other.messages);
    }

    /// No error present (optionally counting warnings as errors)
    pub fn is_success(&self, warnings_as_errors: bool) -> bool {
        !self.messages.iter().any(|m| m.is_error(warnings_as_errors))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{}", message)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Named group of reports, one per checked field group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportList {
    name: String,
    reports: Vec<Report>,
}

impl ReportList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a report, dropping it if it carries no messages
    pub fn push(&mut self, report: Report) {
        if !report.is_empty() {
            self.reports.push(report);
        }
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn is_success(&self, warnings_as_errors: bool) -> bool {
        self.reports.iter().all(|r| r.is_success(warnings_as_errors))
    }

    pub fn message_count(&self) -> usize {
        self.reports.iter().map(Report::len).sum()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.reports.iter().flat_map(|r| r.iter())
    }
}

/// Full diagnostic of one site: its own fields plus one list per peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteReport {
    pub site: ReportList,
    pub peers: Vec<ReportList>,
}

impl SiteReport {
    pub fn new(site_name: &str) -> Self {
        Self {
            site: ReportList::new(site_name),
            peers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.site.name()
    }

    pub fn is_success(&self, warnings_as_errors: bool) -> bool {
        self.site.is_success(warnings_as_errors)
            && self.peers.iter().all(|p| p.is_success(warnings_as_errors))
    }

    pub fn message_count(&self) -> usize {
        self.site.message_count() + self.peers.iter().map(ReportList::message_count).sum::<usize>()
    }

    /// Messages reported for `peer`
    pub fn peer(&self, peer: &str) -> Option<&ReportList> {
        self.peers.iter().find(|p| p.name() == peer)
    }
}

/// Diagnostics of a whole sites document, keyed by site name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    sites: IndexMap<String, SiteReport>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, report: SiteReport) {
        self.sites.insert(report.name().to_string(), report);
    }

    pub fn get(&self, site: &str) -> Option<&SiteReport> {
        self.sites.get(site)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteReport> {
        self.sites.values()
    }

    pub fn is_success(&self, warnings_as_errors: bool) -> bool {
        self.sites.values().all(|s| s.is_success(warnings_as_errors))
    }

    pub fn message_count(&self) -> usize {
        self.sites.values().map(SiteReport::message_count).sum()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for site in self.sites.values() {
            if site.message_count() == 0 {
                continue;
            }
            writeln!(f, "Site {}:", site.name())?;
            for message in site.site.messages() {
                writeln!(f, "  {}", message)?;
            }
            for peer in &site.peers {
                for message in peer.messages() {
                    writeln!(f, "  Peer {}: {}", peer.name(), message)?;
                }
            }
        }
        Ok(())
    }
}
