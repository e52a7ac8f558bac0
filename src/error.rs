//! WolfGrid Error Types

use thiserror::Error;

/// Result type alias for WolfGrid operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfGrid error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    // Site / peer lookup errors
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Site already exists: {0}")]
    SiteExists(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Peer already exists: {0}")]
    PeerExists(String),

    // Connection graph errors
    #[error("Peer {0} cannot be connected to itself")]
    SelfConnection(String),

    #[error("Connection table index out of range: ({row}, {column})")]
    IndexOutOfRange { row: usize, column: usize },

    // Allocation errors
    #[error("Address space exhausted in {network}: {available} usable hosts, {requested} peers")]
    Capacity {
        network: String,
        available: u128,
        requested: usize,
    },

    // Key tool errors
    #[error("Key tool not found: {0}. Please install wireguard-tools or set wg_executable")]
    KeyToolNotFound(String),

    #[error("Key tool failed: {0}")]
    KeyTool(String),

    // Integrity errors
    #[error("{document} is version {found}, which is not supported. Latest supported version is {latest}")]
    UnsupportedVersion {
        document: String,
        found: String,
        latest: String,
    },

    #[error("Integrity check failed for {0}")]
    Integrity(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    // Editor errors
    #[error("Editor error: {0}")]
    Editor(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error aborts the current operation with no usable partial state
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Capacity { .. }
                | Error::KeyToolNotFound(_)
                | Error::KeyTool(_)
                | Error::UnsupportedVersion { .. }
                | Error::Precondition(_)
        )
    }

    /// Check if an administrator can fix this by editing the site
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Error::SiteNotFound(_)
                | Error::SiteExists(_)
                | Error::PeerNotFound(_)
                | Error::PeerExists(_)
                | Error::SelfConnection(_)
                | Error::Integrity(_)
        )
    }
}
