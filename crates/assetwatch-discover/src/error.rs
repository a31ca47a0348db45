//! Error types for the assetwatch-discover crate.

use assetwatch_core::StoreError;
use thiserror::Error;

use crate::range::RangeError;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid range segment '{segment}': {source}")]
    InvalidRange {
        segment: String,
        #[source]
        source: RangeError,
    },

    #[error("Scan interval of {minutes} minutes exceeds the {max} minute limit")]
    IntervalTooLong { minutes: i64, max: i64 },

    #[error("No valid addresses in range expression: '{0}'")]
    NoValidAddresses(String),

    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Nmap timed out after {secs}s")]
    NmapTimeout { secs: u64 },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was malformed (no usable address ranges, bad interval).
    InvalidRequest,
    /// The scan engine is missing, failed, or produced unusable output.
    ScanEngine,
    /// The persistence backend failed.
    StoreUnavailable,
    Internal,
}

impl DiscoverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange { .. }
            | Self::IntervalTooLong { .. }
            | Self::NoValidAddresses(_) => ErrorKind::InvalidRequest,
            Self::NmapNotFound { .. }
            | Self::NmapFailed { .. }
            | Self::NmapTimeout { .. }
            | Self::XmlParse(_) => ErrorKind::ScanEngine,
            Self::Store(_) => ErrorKind::StoreUnavailable,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_scan_engine(&self) -> bool {
        self.kind() == ErrorKind::ScanEngine
    }
}

impl From<std::io::Error> for DiscoverError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(format!("IO error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
