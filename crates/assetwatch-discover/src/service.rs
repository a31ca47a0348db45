//! Composition root and trigger boundary.
//!
//! `DiscoveryService` wires the store, scan pipeline, detail scanner and
//! scheduler together and exposes the operations a front end calls: manual
//! and detail scans, scan-configuration read/write, and the discovered-address
//! and alert views.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use assetwatch_core::{
    AlertEvent, AlertId, AlertStatus, DiscoveredAddress, DiscoveryStore, RecordId,
    ResolutionStatus, ScanConfiguration, StoreError, MAX_INTERVAL_MINUTES,
};
use chrono::Utc;
use serde::Serialize;

use crate::config::{DetailOptions, DiscoverConfig};
use crate::detail::{DetailResult, DetailScanner};
use crate::error::{DiscoverError, Result};
use crate::orchestrator::{ScanOrchestrator, ScanReport};
use crate::probe::{LivenessProbe, PingProbe};
use crate::range;
use crate::resolver::{DnsResolver, HostnameResolver};
use crate::scanner::{NmapScanner, ScanEngine};
use crate::scheduler::{ScanScheduler, SchedulerState};

/// Response of a manual scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualScanOutcome {
    pub responded_count: usize,
    pub active_addresses: Vec<IpAddr>,
}

impl From<ScanReport> for ManualScanOutcome {
    fn from(report: ScanReport) -> Self {
        Self {
            responded_count: report.active_addresses.len(),
            active_addresses: report.active_addresses,
        }
    }
}

pub struct DiscoveryService {
    store: Arc<dyn DiscoveryStore>,
    orchestrator: Arc<ScanOrchestrator>,
    detail: DetailScanner,
    scheduler: ScanScheduler,
    default_ranges: Option<String>,
    detail_options: DetailOptions,
}

impl DiscoveryService {
    /// Build a service with the system ping, resolver and nmap.
    pub fn from_config(config: &DiscoverConfig, store: Arc<dyn DiscoveryStore>) -> Self {
        Self::with_components(
            config,
            store,
            Arc::new(PingProbe::from_config(config)),
            Arc::new(DnsResolver::new(Duration::from_millis(config.dns_timeout_ms))),
            Arc::new(NmapScanner::from_config(config)),
        )
    }

    pub fn with_components(
        config: &DiscoverConfig,
        store: Arc<dyn DiscoveryStore>,
        probe: Arc<dyn LivenessProbe>,
        resolver: Arc<dyn HostnameResolver>,
        engine: Arc<dyn ScanEngine>,
    ) -> Self {
        let orchestrator = Arc::new(ScanOrchestrator::new(
            probe,
            resolver,
            store.clone(),
            config.worker_count,
            config.chunk_size,
        ));
        let scheduler = ScanScheduler::new(
            store.clone(),
            orchestrator.clone(),
            Duration::from_secs(config.initial_delay_secs),
        );

        Self {
            detail: DetailScanner::new(engine, store.clone()),
            store,
            orchestrator,
            scheduler,
            default_ranges: config.default_ranges.clone(),
            detail_options: config.detail_options(),
        }
    }

    pub fn scheduler(&self) -> &ScanScheduler {
        &self.scheduler
    }

    // ── Scans ────────────────────────────────────────────────────

    /// Scan `ranges`, or the configured default ranges when `None`.
    ///
    /// Fails only when no valid address can be derived from the request.
    pub async fn start_manual_scan(&self, ranges: Option<&str>) -> Result<ManualScanOutcome> {
        let expression = ranges
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| self.default_ranges.as_deref())
            .unwrap_or("");

        let addresses = range::expand(expression);
        if addresses.is_empty() {
            return Err(DiscoverError::NoValidAddresses(expression.to_string()));
        }

        tracing::info!(ranges = %expression, addresses = addresses.len(), "Manual scan requested");
        let report = self.orchestrator.run_scan(addresses).await;
        Ok(report.into())
    }

    /// Detail-scan one known address. `options` overrides the configured defaults.
    pub async fn start_detail_scan(
        &self,
        address: IpAddr,
        record_id: RecordId,
        options: Option<DetailOptions>,
    ) -> Result<DetailResult> {
        let options = options.unwrap_or(self.detail_options);
        let result = self.detail.scan_details(address, record_id, &options).await;

        if let Err(e) = &result {
            tracing::warn!(
                address = %address,
                record_id = %record_id,
                kind = ?e.kind(),
                error = %e,
                "Detail scan failed"
            );
        }
        result
    }

    // ── Scan configuration ───────────────────────────────────────

    pub async fn scan_configuration(&self) -> Result<ScanConfiguration> {
        Ok(self.store.get_scan_configuration().await?)
    }

    /// Persist `config` and reconcile the scheduler with it.
    ///
    /// Invalid segments are tolerated as long as one segment is usable.
    pub async fn update_scan_configuration(
        &self,
        config: &ScanConfiguration,
    ) -> Result<SchedulerState> {
        if config.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(DiscoverError::IntervalTooLong {
                minutes: config.interval_minutes,
                max: MAX_INTERVAL_MINUTES,
            });
        }
        if let Some(ranges) = config.ranges() {
            let (valid, mut rejected) = range::parse_expression(ranges);
            if valid.is_empty() && !rejected.is_empty() {
                let (segment, source) = rejected.swap_remove(0);
                return Err(DiscoverError::InvalidRange { segment, source });
            }
            for (segment, error) in &rejected {
                tracing::warn!(segment = %segment, error = %error, "Saved range segment is invalid");
            }
        }

        self.store.update_scan_configuration(config).await?;
        tracing::info!(
            enabled = config.enabled,
            interval_minutes = config.interval_minutes,
            ranges = config.address_ranges.as_deref().unwrap_or(""),
            "Scan configuration updated"
        );

        Ok(self.scheduler.reconcile().await?)
    }

    /// Reconcile if the persisted configuration differs from `last_seen`,
    /// e.g. after a write by another process. Returns whether it did.
    pub async fn reconcile_if_changed(
        &self,
        last_seen: &mut Option<ScanConfiguration>,
    ) -> Result<bool> {
        let current = self.store.get_scan_configuration().await?;
        if last_seen.as_ref() == Some(&current) {
            return Ok(false);
        }

        let state = self.scheduler.reconcile().await?;
        tracing::info!(state = ?state, "Scan configuration changed externally, reconciled");
        *last_seen = Some(current);
        Ok(true)
    }

    // ── Discovered addresses ─────────────────────────────────────

    pub async fn list_discovered(&self) -> Result<Vec<DiscoveredAddress>> {
        Ok(self.store.list_discovered().await?)
    }

    pub async fn set_discovered_status(
        &self,
        id: RecordId,
        status: &ResolutionStatus,
    ) -> Result<()> {
        self.store.update_discovered_status(id, status).await?;
        tracing::info!(record_id = %id, status = %status, "Discovered address status changed");
        Ok(())
    }

    // ── Alerts ───────────────────────────────────────────────────

    pub async fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<AlertEvent>> {
        Ok(self.store.list_alerts(status).await?)
    }

    /// Move an alert to `status`, stamping or clearing the resolution time.
    pub async fn update_alert_status(&self, id: AlertId, status: AlertStatus) -> Result<AlertEvent> {
        let mut alert = self
            .store
            .find_alert(id)
            .await?
            .ok_or_else(|| StoreError::not_found("alert", id))?;

        alert.transition(status, Utc::now());
        self.store
            .update_alert_status(id, alert.status, alert.resolved_at)
            .await?;

        tracing::info!(alert_id = %id, status = %status, "Alert status changed");
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use assetwatch_core::{MemoryStore, Severity, NEW_IP_ALERT_TYPE};
    use async_trait::async_trait;

    use super::*;
    use crate::error::ErrorKind;
    use crate::nmap_xml::parse_nmap_xml;
    use crate::orchestrator::tests::{FakeProbe, FakeResolver};
    use crate::scanner::EngineOutput;

    struct OfflineEngine;

    #[async_trait]
    impl ScanEngine for OfflineEngine {
        async fn scan(&self, _address: IpAddr, _options: &DetailOptions) -> Result<EngineOutput> {
            Err(DiscoverError::NmapNotFound {
                path: "nmap".to_string(),
            })
        }
    }

    /// Engine that records the options it was called with.
    struct RecordingEngine(std::sync::Mutex<Vec<DetailOptions>>);

    #[async_trait]
    impl ScanEngine for RecordingEngine {
        async fn scan(&self, address: IpAddr, options: &DetailOptions) -> Result<EngineOutput> {
            self.0.lock().unwrap().push(*options);
            let xml = format!(
                r#"<nmaprun><host><status state="up"/><address addr="{address}" addrtype="ipv4"/></host></nmaprun>"#
            );
            Ok(EngineOutput {
                run: parse_nmap_xml(xml.as_bytes())?,
                raw_xml: xml,
                duration: Duration::ZERO,
            })
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn service_with(
        store: Arc<MemoryStore>,
        live: &[&str],
        engine: Arc<dyn ScanEngine>,
        config: DiscoverConfig,
    ) -> DiscoveryService {
        DiscoveryService::with_components(
            &config,
            store,
            Arc::new(FakeProbe(live.iter().map(|s| ip(s)).collect())),
            Arc::new(FakeResolver(HashMap::new())),
            engine,
        )
    }

    #[tokio::test]
    async fn test_manual_scan_reports_responders() {
        let store = Arc::new(MemoryStore::new());
        store.add_alert_type(NEW_IP_ALERT_TYPE, Severity::Medium);
        let service = service_with(
            store.clone(),
            &["192.168.5.2", "192.168.5.5"],
            Arc::new(OfflineEngine),
            DiscoverConfig::default(),
        );

        let outcome = service
            .start_manual_scan(Some("192.168.5.1-6, bogus"))
            .await
            .unwrap();

        assert_eq!(outcome.responded_count, 2);
        let active: HashSet<_> = outcome.active_addresses.into_iter().collect();
        assert_eq!(active, HashSet::from([ip("192.168.5.2"), ip("192.168.5.5")]));
        assert_eq!(service.list_alerts(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_manual_scan_uses_default_ranges() {
        let store = Arc::new(MemoryStore::new());
        let config = DiscoverConfig {
            default_ranges: Some("10.4.0.0/30".to_string()),
            ..Default::default()
        };
        let service = service_with(store, &["10.4.0.1"], Arc::new(OfflineEngine), config);

        let outcome = service.start_manual_scan(None).await.unwrap();
        assert_eq!(outcome.active_addresses, vec![ip("10.4.0.1")]);

        let outcome = service.start_manual_scan(Some("  ")).await.unwrap();
        assert_eq!(outcome.responded_count, 1);
    }

    #[tokio::test]
    async fn test_manual_scan_without_valid_ranges_is_request_error() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());

        let err = service.start_manual_scan(Some("10.0.0.5-2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = service.start_manual_scan(None).await.unwrap_err();
        assert!(matches!(err, DiscoverError::NoValidAddresses(_)));
    }

    #[tokio::test]
    async fn test_manual_scan_with_no_responders_is_ok() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());
        let outcome = service.start_manual_scan(Some("10.0.0.0/29")).await.unwrap();
        assert_eq!(outcome.responded_count, 0);
    }

    #[tokio::test]
    async fn test_detail_scan_engine_error_is_distinguishable() {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .insert_discovered(ip("10.0.0.9"), None, &ResolutionStatus::New)
            .await
            .unwrap();
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());

        let err = service
            .start_detail_scan(ip("10.0.0.9"), id, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScanEngine);
    }

    #[tokio::test]
    async fn test_detail_scan_options_default_from_config() {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .insert_discovered(ip("10.0.0.9"), None, &ResolutionStatus::New)
            .await
            .unwrap();
        let engine = Arc::new(RecordingEngine(Default::default()));
        let config = DiscoverConfig {
            os_detection: true,
            ..Default::default()
        };
        let service = service_with(store.clone(), &[], engine.clone(), config);

        service.start_detail_scan(ip("10.0.0.9"), id, None).await.unwrap();
        service
            .start_detail_scan(ip("10.0.0.9"), id, Some(DetailOptions { os_detection: false }))
            .await
            .unwrap();

        let seen = engine.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                DetailOptions { os_detection: true },
                DetailOptions { os_detection: false }
            ]
        );
        let record = store
            .find_discovered_by_address(ip("10.0.0.9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ResolutionStatus::Analyzed);
    }

    #[tokio::test]
    async fn test_configuration_write_reconciles_scheduler() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());
        service.scheduler().start().await.unwrap();
        assert_eq!(service.scheduler().state().await, SchedulerState::Idle);

        let state = service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.0/24".to_string()),
                interval_minutes: 30,
                enabled: true,
            })
            .await
            .unwrap();
        assert_eq!(
            state,
            SchedulerState::Scheduled {
                interval: Duration::from_secs(1800)
            }
        );
        assert_eq!(
            service.scan_configuration().await.unwrap().interval_minutes,
            30
        );

        let state = service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.0/24".to_string()),
                interval_minutes: 30,
                enabled: false,
            })
            .await
            .unwrap();
        assert_eq!(state, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_configuration_without_usable_range_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            store.clone(),
            &[],
            Arc::new(OfflineEngine),
            DiscoverConfig::default(),
        );

        let err = service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.9-3, nonsense".to_string()),
                interval_minutes: 10,
                enabled: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoverError::InvalidRange { ref segment, .. } if segment == "10.0.0.9-3"
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            service.scan_configuration().await.unwrap(),
            ScanConfiguration::default()
        );

        service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.9-3, 10.0.0.0/29".to_string()),
                interval_minutes: 10,
                enabled: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_interval_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            store.clone(),
            &[],
            Arc::new(OfflineEngine),
            DiscoverConfig::default(),
        );
        service.scheduler().start().await.unwrap();

        let err = service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.0/29".to_string()),
                interval_minutes: i64::MAX,
                enabled: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::IntervalTooLong { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            service.scan_configuration().await.unwrap(),
            ScanConfiguration::default()
        );
        assert_eq!(service.scheduler().state().await, SchedulerState::Idle);

        let state = service
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.0/29".to_string()),
                interval_minutes: MAX_INTERVAL_MINUTES,
                enabled: true,
            })
            .await
            .unwrap();
        assert_eq!(
            state,
            SchedulerState::Scheduled {
                interval: Duration::from_secs(MAX_INTERVAL_MINUTES as u64 * 60)
            }
        );
    }

    #[tokio::test]
    async fn test_external_configuration_change_is_picked_up() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            store.clone(),
            &[],
            Arc::new(OfflineEngine),
            DiscoverConfig::default(),
        );
        service.scheduler().start().await.unwrap();

        let mut last_seen = Some(service.scan_configuration().await.unwrap());
        assert!(!service.reconcile_if_changed(&mut last_seen).await.unwrap());

        // Written straight to the store, as another process would.
        store
            .update_scan_configuration(&ScanConfiguration {
                address_ranges: Some("10.0.0.0/28".to_string()),
                interval_minutes: 5,
                enabled: true,
            })
            .await
            .unwrap();

        assert!(service.reconcile_if_changed(&mut last_seen).await.unwrap());
        assert_eq!(
            service.scheduler().state().await,
            SchedulerState::Scheduled {
                interval: Duration::from_secs(300)
            }
        );
        assert!(!service.reconcile_if_changed(&mut last_seen).await.unwrap());
    }

    #[tokio::test]
    async fn test_ignore_discovered_address() {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .insert_discovered(ip("10.0.0.9"), None, &ResolutionStatus::New)
            .await
            .unwrap();
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());

        service
            .set_discovered_status(id, &ResolutionStatus::Ignored)
            .await
            .unwrap();
        let records = service.list_discovered().await.unwrap();
        assert_eq!(records[0].status, ResolutionStatus::Ignored);
    }

    #[tokio::test]
    async fn test_alert_resolution_stamps_and_clears() {
        let store = Arc::new(MemoryStore::new());
        store.add_alert_type(NEW_IP_ALERT_TYPE, Severity::Medium);
        let service = service_with(
            store,
            &["10.0.0.1"],
            Arc::new(OfflineEngine),
            DiscoverConfig::default(),
        );
        service.start_manual_scan(Some("10.0.0.1")).await.unwrap();
        let alert_id = service.list_alerts(None).await.unwrap()[0].id;

        let resolved = service
            .update_alert_status(alert_id, AlertStatus::Resolved)
            .await
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        assert_eq!(
            service
                .list_alerts(Some(AlertStatus::Resolved))
                .await
                .unwrap()
                .len(),
            1
        );

        let reopened = service
            .update_alert_status(alert_id, AlertStatus::Investigating)
            .await
            .unwrap();
        assert_eq!(reopened.resolved_at, None);
        assert!(service
            .list_alerts(Some(AlertStatus::Resolved))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_alert_is_store_error() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, &[], Arc::new(OfflineEngine), DiscoverConfig::default());
        let err = service
            .update_alert_status(AlertId::new(), AlertStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::Store(StoreError::NotFound { .. })));
    }
}
