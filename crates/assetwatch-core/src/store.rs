//! The persistence boundary consumed by the discovery engine.
//!
//! Every backend (Neo4j, in-memory) implements `DiscoveryStore`. Any call may
//! fail with `StoreError::Unavailable`; callers decide whether that aborts a
//! single address or the whole request.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    AlertEvent, AlertId, AlertStatus, AlertType, DetailUpdate, DiscoveredAddress, NewAlert,
    RecordId, ResolutionStatus, ScanConfiguration,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    // ── Discovered addresses ─────────────────────────────────────

    async fn find_discovered_by_address(
        &self,
        address: IpAddr,
    ) -> StoreResult<Option<DiscoveredAddress>>;

    /// Insert a new record with first/last seen set to now.
    ///
    /// Fails with `StoreError::Conflict` if the address is already recorded.
    async fn insert_discovered(
        &self,
        address: IpAddr,
        hostname: Option<&str>,
        status: &ResolutionStatus,
    ) -> StoreResult<RecordId>;

    /// Overwrite the hostname (including clearing it) and advance last seen.
    async fn update_discovered_hostname(
        &self,
        id: RecordId,
        hostname: Option<&str>,
    ) -> StoreResult<()>;

    async fn update_discovered_details(&self, id: RecordId, update: &DetailUpdate)
        -> StoreResult<()>;

    async fn update_discovered_status(
        &self,
        id: RecordId,
        status: &ResolutionStatus,
    ) -> StoreResult<()>;

    async fn list_discovered(&self) -> StoreResult<Vec<DiscoveredAddress>>;

    // ── Alerts ───────────────────────────────────────────────────

    async fn find_alert_type_by_name(&self, name: &str) -> StoreResult<Option<AlertType>>;

    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<AlertEvent>;

    async fn find_alert(&self, id: AlertId) -> StoreResult<Option<AlertEvent>>;

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn list_alerts(&self, status: Option<AlertStatus>) -> StoreResult<Vec<AlertEvent>>;

    // ── Scan configuration ───────────────────────────────────────

    /// The persisted configuration; a store with none yet returns the default.
    async fn get_scan_configuration(&self) -> StoreResult<ScanConfiguration>;

    async fn update_scan_configuration(&self, config: &ScanConfiguration) -> StoreResult<()>;
}
