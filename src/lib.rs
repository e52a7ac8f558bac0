//! WolfGrid - WireGuard Site Topology Manager
//!
//! Manages groups of WireGuard peers ("sites") and compiles one config file
//! per peer from a directed "who dials whom" graph.
//!
//! # Architecture
//!
//! Persisted sites pass through the integrity pipeline (version upgrade,
//! then field validation) before they become typed [`site::Site`] records.
//! From there a [`graph::ConnectionGraph`] is rebuilt for editing, the
//! [`allocator`] hands out host addresses, and the [`compiler`] emits the
//! configs.
//!
//! # Features
//!
//! - Sequential address allocation over mixed IPv4/IPv6 networks
//! - Text-grid editing of connections with automatic repair
//! - Per-edge preshared keys that both ends agree on
//! - Default-route redirection through a main peer, per address family
//! - Schema migration of old sites documents
//! - Accumulating diagnostics that report every problem at once

pub mod allocator;
pub mod compiler;
pub mod config;
pub mod editor;
pub mod error;
pub mod graph;
pub mod integrity;
pub mod keys;
pub mod manager;
pub mod report;
pub mod site;
pub mod storage;

pub use config::Settings;
pub use error::{Error, Result};
pub use manager::SiteManager;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::compiler::PeerDocument;
    pub use crate::config::Settings;
    pub use crate::editor::{ExternalEditor, TextEditor};
    pub use crate::error::{Error, Result};
    pub use crate::graph::ConnectionGraph;
    pub use crate::keys::{KeyProvider, WgKeyProvider};
    pub use crate::manager::SiteManager;
    pub use crate::report::{IntegrityReport, Level, Message, Report};
    pub use crate::site::{Keys, Peer, Site, Sites};
    pub use crate::storage::{FsStorage, MemoryStorage, Storage};
}
