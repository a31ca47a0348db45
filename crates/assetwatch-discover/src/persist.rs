//! Discovery store adapter: record a live address, telling first sightings
//! apart from addresses already known.

use std::net::IpAddr;

use assetwatch_core::{DiscoveryStore, RecordId, ResolutionStatus, StoreError, StoreResult};

/// Outcome of recording one live address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub is_new: bool,
    pub record_id: RecordId,
}

/// Insert `address` with status New, or refresh its hostname and last-seen.
///
/// The hostname is overwritten with the latest resolution, including
/// clearing it when resolution failed. Losing an insert race to a concurrent
/// upsert of the same address falls back to the update path.
pub async fn upsert_discovered(
    store: &dyn DiscoveryStore,
    address: IpAddr,
    hostname: Option<&str>,
) -> StoreResult<UpsertOutcome> {
    if let Some(existing) = store.find_discovered_by_address(address).await? {
        return refresh(store, existing.id, hostname).await;
    }

    match store
        .insert_discovered(address, hostname, &ResolutionStatus::New)
        .await
    {
        Ok(record_id) => {
            tracing::info!(
                address = %address,
                record_id = %record_id,
                hostname = hostname.unwrap_or(""),
                "New address discovered"
            );
            Ok(UpsertOutcome {
                is_new: true,
                record_id,
            })
        }
        Err(StoreError::Conflict(reason)) => {
            tracing::debug!(address = %address, reason = %reason, "Insert raced, updating instead");
            let existing = store
                .find_discovered_by_address(address)
                .await?
                .ok_or_else(|| StoreError::not_found("discovered address", address))?;
            refresh(store, existing.id, hostname).await
        }
        Err(e) => Err(e),
    }
}

async fn refresh(
    store: &dyn DiscoveryStore,
    record_id: RecordId,
    hostname: Option<&str>,
) -> StoreResult<UpsertOutcome> {
    store.update_discovered_hostname(record_id, hostname).await?;
    Ok(UpsertOutcome {
        is_new: false,
        record_id,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use assetwatch_core::{
        AlertEvent, AlertId, AlertStatus, AlertType, DetailUpdate, DiscoveredAddress, MemoryStore,
        NewAlert, ScanConfiguration,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;

    /// Store whose first lookup of each address misses, as if another writer
    /// inserted the record between our lookup and our insert.
    pub(crate) struct StaleLookupStore {
        pub inner: MemoryStore,
        missed: Mutex<HashSet<IpAddr>>,
    }

    impl StaleLookupStore {
        pub(crate) fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                missed: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl DiscoveryStore for StaleLookupStore {
        async fn find_discovered_by_address(
            &self,
            address: IpAddr,
        ) -> StoreResult<Option<DiscoveredAddress>> {
            if self.missed.lock().unwrap().insert(address) {
                return Ok(None);
            }
            self.inner.find_discovered_by_address(address).await
        }

        async fn insert_discovered(
            &self,
            address: IpAddr,
            hostname: Option<&str>,
            status: &ResolutionStatus,
        ) -> StoreResult<RecordId> {
            self.inner.insert_discovered(address, hostname, status).await
        }

        async fn update_discovered_hostname(
            &self,
            id: RecordId,
            hostname: Option<&str>,
        ) -> StoreResult<()> {
            self.inner.update_discovered_hostname(id, hostname).await
        }

        async fn update_discovered_details(
            &self,
            id: RecordId,
            update: &DetailUpdate,
        ) -> StoreResult<()> {
            self.inner.update_discovered_details(id, update).await
        }

        async fn update_discovered_status(
            &self,
            id: RecordId,
            status: &ResolutionStatus,
        ) -> StoreResult<()> {
            self.inner.update_discovered_status(id, status).await
        }

        async fn list_discovered(&self) -> StoreResult<Vec<DiscoveredAddress>> {
            self.inner.list_discovered().await
        }

        async fn find_alert_type_by_name(&self, name: &str) -> StoreResult<Option<AlertType>> {
            self.inner.find_alert_type_by_name(name).await
        }

        async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<AlertEvent> {
            self.inner.insert_alert(alert).await
        }

        async fn find_alert(&self, id: AlertId) -> StoreResult<Option<AlertEvent>> {
            self.inner.find_alert(id).await
        }

        async fn update_alert_status(
            &self,
            id: AlertId,
            status: AlertStatus,
            resolved_at: Option<DateTime<Utc>>,
        ) -> StoreResult<()> {
            self.inner.update_alert_status(id, status, resolved_at).await
        }

        async fn list_alerts(&self, status: Option<AlertStatus>) -> StoreResult<Vec<AlertEvent>> {
            self.inner.list_alerts(status).await
        }

        async fn get_scan_configuration(&self) -> StoreResult<ScanConfiguration> {
            self.inner.get_scan_configuration().await
        }

        async fn update_scan_configuration(&self, config: &ScanConfiguration) -> StoreResult<()> {
            self.inner.update_scan_configuration(config).await
        }
    }

    #[tokio::test]
    async fn test_second_upsert_is_not_new() {
        let store = MemoryStore::new();
        let address: IpAddr = "10.1.0.4".parse().unwrap();

        let first = upsert_discovered(&store, address, Some("nas.lan")).await.unwrap();
        let second = upsert_discovered(&store, address, Some("nas.lan")).await.unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.record_id, second.record_id);
        assert_eq!(store.list_discovered().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_clears_hostname() {
        let store = MemoryStore::new();
        let address: IpAddr = "10.1.0.5".parse().unwrap();

        upsert_discovered(&store, address, Some("cam.lan")).await.unwrap();
        let before = store.find_discovered_by_address(address).await.unwrap().unwrap();

        upsert_discovered(&store, address, None).await.unwrap();
        let after = store.find_discovered_by_address(address).await.unwrap().unwrap();

        assert_eq!(after.hostname, None);
        assert_eq!(after.status, ResolutionStatus::New);
        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.last_seen >= before.last_seen);
    }

    #[tokio::test]
    async fn test_concurrent_disjoint_upserts() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for last in 1..=20u8 {
            let store = store.clone();
            tasks.spawn(async move {
                let address = IpAddr::from([10, 1, 1, last]);
                upsert_discovered(store.as_ref(), address, None).await
            });
        }
        let mut new_count = 0;
        while let Some(res) = tasks.join_next().await {
            if res.unwrap().unwrap().is_new {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 20);
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = upsert_discovered(&store, "10.1.0.6".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_lost_insert_race_refreshes_existing_record() {
        let address: IpAddr = "10.1.0.7".parse().unwrap();
        let inner = MemoryStore::new();
        let existing = inner
            .insert_discovered(address, Some("old.lan"), &ResolutionStatus::New)
            .await
            .unwrap();
        let store = StaleLookupStore::new(inner);

        let outcome = upsert_discovered(&store, address, Some("printer.lan"))
            .await
            .unwrap();

        assert!(!outcome.is_new);
        assert_eq!(outcome.record_id, existing);
        let records = store.list_discovered().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hostname.as_deref(), Some("printer.lan"));
    }
}
