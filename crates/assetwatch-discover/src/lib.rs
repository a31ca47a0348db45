//! assetwatch-discover: Network discovery engine for Assetwatch.
//!
//! Expands address ranges, probes liveness over a bounded worker pool,
//! records new and returning addresses, raises alerts on first sightings,
//! enriches individual hosts with nmap detail scans, and runs the recurring
//! scan from persisted configuration.

pub mod alerts;
pub mod config;
pub mod detail;
pub mod error;
pub mod nmap_xml;
pub mod orchestrator;
pub mod persist;
pub mod pool;
pub mod probe;
pub mod range;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod service;

pub use config::{DetailOptions, DiscoverConfig};
pub use error::{DiscoverError, ErrorKind, Result};
pub use service::{DiscoveryService, ManualScanOutcome};
