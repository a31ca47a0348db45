//! `DiscoveryStore` implementation over Neo4j.

use std::net::IpAddr;

use assetwatch_core::{
    AlertEvent, AlertId, AlertStatus, AlertType, DetailUpdate, DiscoveredAddress,
    DiscoveryStore, NewAlert, RecordId, ResolutionStatus, ScanConfiguration, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::client::GraphClient;
use crate::mutations::InsertOutcome;

#[async_trait]
impl DiscoveryStore for GraphClient {
    async fn find_discovered_by_address(
        &self,
        address: IpAddr,
    ) -> StoreResult<Option<DiscoveredAddress>> {
        Ok(self.find_discovered(address).await?)
    }

    async fn insert_discovered(
        &self,
        address: IpAddr,
        hostname: Option<&str>,
        status: &ResolutionStatus,
    ) -> StoreResult<RecordId> {
        match self.create_discovered(address, hostname, status).await? {
            InsertOutcome::Created(id) => Ok(id),
            InsertOutcome::AlreadyExists(id) => Err(StoreError::Conflict(format!(
                "address {address} already recorded as {id}"
            ))),
        }
    }

    async fn update_discovered_hostname(
        &self,
        id: RecordId,
        hostname: Option<&str>,
    ) -> StoreResult<()> {
        Ok(self.set_discovered_hostname(id, hostname).await?)
    }

    async fn update_discovered_details(
        &self,
        id: RecordId,
        update: &DetailUpdate,
    ) -> StoreResult<()> {
        Ok(self.set_discovered_details(id, update).await?)
    }

    async fn update_discovered_status(
        &self,
        id: RecordId,
        status: &ResolutionStatus,
    ) -> StoreResult<()> {
        Ok(self.set_discovered_status(id, status).await?)
    }

    async fn list_discovered(&self) -> StoreResult<Vec<DiscoveredAddress>> {
        Ok(self.list_discovered_addresses().await?)
    }

    async fn find_alert_type_by_name(&self, name: &str) -> StoreResult<Option<AlertType>> {
        Ok(self.find_alert_type(name).await?)
    }

    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<AlertEvent> {
        Ok(self.create_alert(alert).await?)
    }

    async fn find_alert(&self, id: AlertId) -> StoreResult<Option<AlertEvent>> {
        Ok(self.get_alert(id).await?)
    }

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        Ok(self.set_alert_status(id, status, resolved_at).await?)
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> StoreResult<Vec<AlertEvent>> {
        Ok(self.list_alert_events(status).await?)
    }

    async fn get_scan_configuration(&self) -> StoreResult<ScanConfiguration> {
        Ok(self.scan_configuration().await?)
    }

    async fn update_scan_configuration(&self, config: &ScanConfiguration) -> StoreResult<()> {
        Ok(self.save_scan_configuration(config).await?)
    }
}
