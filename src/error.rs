//! Error types for the SSM storage plugin
//!
//! Every public plugin operation fails with exactly one of these kinds. The
//! set is intentionally small and stable; transport and protocol failures are
//! folded into it by [`crate::plugin::classifier`].

use thiserror::Error;

/// Domain error returned across the plugin boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Argument Errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported search key: {0}")]
    UnsupportedSearchKey(String),

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("Pool not found: {0}")]
    NotFoundPool(String),

    #[error("System not found: {0}")]
    NotFoundSystem(String),

    #[error("Volume not found: {0}")]
    NotFoundVolume(String),

    #[error("Name conflict: {0}")]
    NameConflict(String),

    #[error("Not supported: {0}")]
    NoSupport(String),

    // =========================================================================
    // Network / Transport Errors
    // =========================================================================
    #[error("Connection refused: {0}")]
    NetworkConnRefused(String),

    #[error("Host is down: {0}")]
    NetworkHostDown(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Transport communication error: {0}")]
    TransportCommunication(String),

    #[error("Authentication failed: {0}")]
    PluginAuthFailed(String),

    // =========================================================================
    // Plugin Errors
    // =========================================================================
    #[error("Plugin bug: {message}")]
    PluginBug {
        message: String,
        debug: Option<String>,
    },
}

/// Numeric error codes shared with libStorageMgmt clients
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorNumber {
    PluginBug = 2,
    NameConflict = 50,
    InvalidArgument = 101,
    NetworkConnRefused = 140,
    NetworkHostDown = 141,
    NetworkError = 142,
    NoSupport = 153,
    NotFoundPool = 203,
    NotFoundVolume = 205,
    NotFoundSystem = 208,
    PluginAuthFailed = 300,
    TransportCommunication = 400,
    UnsupportedSearchKey = 510,
}

impl Error {
    /// Build a plugin bug error without a trace
    pub fn plugin_bug(message: impl Into<String>) -> Self {
        Error::PluginBug {
            message: message.into(),
            debug: None,
        }
    }

    /// Stable numeric code for this error kind
    pub fn number(&self) -> ErrorNumber {
        match self {
            Error::InvalidArgument(_) => ErrorNumber::InvalidArgument,
            Error::UnsupportedSearchKey(_) => ErrorNumber::UnsupportedSearchKey,
            Error::NotFoundPool(_) => ErrorNumber::NotFoundPool,
            Error::NotFoundSystem(_) => ErrorNumber::NotFoundSystem,
            Error::NotFoundVolume(_) => ErrorNumber::NotFoundVolume,
            Error::NameConflict(_) => ErrorNumber::NameConflict,
            Error::NoSupport(_) => ErrorNumber::NoSupport,
            Error::NetworkConnRefused(_) => ErrorNumber::NetworkConnRefused,
            Error::NetworkHostDown(_) => ErrorNumber::NetworkHostDown,
            Error::NetworkError(_) => ErrorNumber::NetworkError,
            Error::TransportCommunication(_) => ErrorNumber::TransportCommunication,
            Error::PluginAuthFailed(_) => ErrorNumber::PluginAuthFailed,
            Error::PluginBug { .. } => ErrorNumber::PluginBug,
        }
    }

    /// Diagnostic trace attached to the error, if any
    pub fn debug(&self) -> Option<&str> {
        match self {
            Error::PluginBug { debug, .. } => debug.as_deref(),
            _ => None,
        }
    }

    /// Check if this error came from the network or transport layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::NetworkConnRefused(_)
                | Error::NetworkHostDown(_)
                | Error::NetworkError(_)
                | Error::TransportCommunication(_)
                | Error::PluginAuthFailed(_)
        )
    }
}

/// Result type alias for the plugin
pub type Result<T> = std::result::Result<T, Error>;
