//! assetwatch-core: Shared records, identifiers, and the persistence boundary
//! for the Assetwatch network discovery engine.
//!
//! This crate provides the foundational pieces used across all Assetwatch components:
//! - Typed records (DiscoveredAddress, AlertEvent, ScanConfiguration)
//! - Status and severity enums with their string forms
//! - The `DiscoveryStore` trait every persistence backend implements
//! - An in-process `MemoryStore` backend

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{StoreError, UnknownVariant};
pub use memory::MemoryStore;
pub use store::{DiscoveryStore, StoreResult};
pub use types::{
    AlertEvent, AlertId, AlertStatus, AlertType, AlertTypeId, DetailUpdate, DiscoveredAddress,
    NewAlert, RecordId, ResolutionStatus, ScanConfiguration, Severity, MAX_INTERVAL_MINUTES,
    NEW_IP_ALERT_TYPE,
};
