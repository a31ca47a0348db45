//! In-process `DiscoveryStore` backend.
//!
//! Holds everything behind a single mutex. Used by the engine's tests and by
//! the `--in-memory` mode of the binary, where nothing outlives the process.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{DiscoveryStore, StoreResult};
use crate::types::{
    AlertEvent, AlertId, AlertStatus, AlertType, AlertTypeId, DetailUpdate, DiscoveredAddress,
    NewAlert, RecordId, ResolutionStatus, ScanConfiguration, Severity,
};

#[derive(Default)]
struct Inner {
    discovered: HashMap<RecordId, DiscoveredAddress>,
    by_address: BTreeMap<IpAddr, RecordId>,
    alert_types: Vec<AlertType>,
    alerts: Vec<AlertEvent>,
    scan_config: ScanConfiguration,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alert type, returning its id.
    pub fn add_alert_type(&self, name: &str, default_severity: Severity) -> AlertTypeId {
        let id = AlertTypeId::new();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.alert_types.push(AlertType {
            id,
            name: name.to_string(),
            default_severity,
        });
        id
    }

    /// Simulate the backend going away: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {e}")))
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn find_discovered_by_address(
        &self,
        address: IpAddr,
    ) -> StoreResult<Option<DiscoveredAddress>> {
        let inner = self.lock()?;
        Ok(inner
            .by_address
            .get(&address)
            .and_then(|id| inner.discovered.get(id))
            .cloned())
    }

    async fn insert_discovered(
        &self,
        address: IpAddr,
        hostname: Option<&str>,
        status: &ResolutionStatus,
    ) -> StoreResult<RecordId> {
        let mut inner = self.lock()?;
        if inner.by_address.contains_key(&address) {
            return Err(StoreError::Conflict(format!("address {address} already recorded")));
        }
        let mut record =
            DiscoveredAddress::first_sighting(address, hostname.map(String::from), Utc::now());
        record.status = status.clone();
        let id = record.id;
        inner.by_address.insert(address, id);
        inner.discovered.insert(id, record);
        Ok(id)
    }

    async fn update_discovered_hostname(
        &self,
        id: RecordId,
        hostname: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let record = inner
            .discovered
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("discovered address", id))?;
        record.hostname = hostname.map(String::from);
        record.last_seen = Utc::now();
        Ok(())
    }

    async fn update_discovered_details(
        &self,
        id: RecordId,
        update: &DetailUpdate,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let record = inner
            .discovered
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("discovered address", id))?;
        record.apply_details(update, Utc::now());
        Ok(())
    }

    async fn update_discovered_status(
        &self,
        id: RecordId,
        status: &ResolutionStatus,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let record = inner
            .discovered
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("discovered address", id))?;
        record.status = status.clone();
        Ok(())
    }

    async fn list_discovered(&self) -> StoreResult<Vec<DiscoveredAddress>> {
        let inner = self.lock()?;
        Ok(inner
            .by_address
            .values()
            .filter_map(|id| inner.discovered.get(id))
            .cloned()
            .collect())
    }

    async fn find_alert_type_by_name(&self, name: &str) -> StoreResult<Option<AlertType>> {
        let inner = self.lock()?;
        Ok(inner.alert_types.iter().find(|t| t.name == name).cloned())
    }

    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<AlertEvent> {
        let mut inner = self.lock()?;
        let event = AlertEvent::from_new(alert, Utc::now());
        inner.alerts.push(event.clone());
        Ok(event)
    }

    async fn find_alert(&self, id: AlertId) -> StoreResult<Option<AlertEvent>> {
        let inner = self.lock()?;
        Ok(inner.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("alert", id))?;
        alert.status = status;
        alert.resolved_at = resolved_at;
        Ok(())
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> StoreResult<Vec<AlertEvent>> {
        let inner = self.lock()?;
        let mut alerts: Vec<AlertEvent> = inner
            .alerts
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn get_scan_configuration(&self) -> StoreResult<ScanConfiguration> {
        Ok(self.lock()?.scan_config.clone())
    }

    async fn update_scan_configuration(&self, config: &ScanConfiguration) -> StoreResult<()> {
        self.lock()?.scan_config = config.clone();
        Ok(())
    }
}
