//! Scan orchestration: fan an address list out over the worker pool.
//!
//! Addresses are split into fixed-size chunks; each chunk is one pool task
//! that walks its addresses in order: probe, then for live ones resolve,
//! record and (on first sighting) alert. Every step yields an outcome value
//! that the chunk inspects, so one address can never abort its chunk.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assetwatch_core::{AlertEvent, DiscoveryStore, StoreResult};
use serde::Serialize;

use crate::alerts;
use crate::persist::{self, UpsertOutcome};
use crate::pool::WorkerPool;
use crate::probe::LivenessProbe;
use crate::resolver::HostnameResolver;

/// Summary of one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Addresses that answered the probe. Order follows chunk completion.
    pub active_addresses: Vec<IpAddr>,
    pub probed: usize,
    pub new_records: usize,
    pub alerts_raised: usize,
    /// Live addresses whose record or alert could not be written.
    pub persistence_failures: usize,
    #[serde(skip)]
    pub duration: Duration,
}

impl ScanReport {
    pub fn live(&self) -> usize {
        self.active_addresses.len()
    }

    fn absorb(&mut self, chunk: ScanReport) {
        self.active_addresses.extend(chunk.active_addresses);
        self.probed += chunk.probed;
        self.new_records += chunk.new_records;
        self.alerts_raised += chunk.alerts_raised;
        self.persistence_failures += chunk.persistence_failures;
    }
}

/// What happened to one address.
#[derive(Debug)]
enum AddressOutcome {
    Unreachable,
    Live {
        upsert: StoreResult<UpsertOutcome>,
        /// Only attempted for first sightings.
        alert: Option<StoreResult<Option<AlertEvent>>>,
    },
}

struct Pipeline {
    probe: Arc<dyn LivenessProbe>,
    resolver: Arc<dyn HostnameResolver>,
    store: Arc<dyn DiscoveryStore>,
}

impl Pipeline {
    async fn process(&self, address: IpAddr) -> AddressOutcome {
        let probe = self.probe.probe(address).await;
        if !probe.alive {
            return AddressOutcome::Unreachable;
        }

        let hostname = self.resolver.resolve(address).await;
        let upsert =
            persist::upsert_discovered(self.store.as_ref(), address, hostname.as_deref()).await;

        let alert = match &upsert {
            Ok(outcome) if outcome.is_new => Some(
                alerts::maybe_emit(
                    self.store.as_ref(),
                    outcome.record_id,
                    address,
                    hostname.as_deref(),
                )
                .await,
            ),
            _ => None,
        };

        AddressOutcome::Live { upsert, alert }
    }

    async fn process_chunk(&self, chunk: Vec<IpAddr>) -> ScanReport {
        let mut report = ScanReport::default();

        for address in chunk {
            report.probed += 1;

            let AddressOutcome::Live { upsert, alert } = self.process(address).await else {
                continue;
            };
            report.active_addresses.push(address);

            match upsert {
                Ok(outcome) if outcome.is_new => report.new_records += 1,
                Ok(_) => {}
                Err(e) => {
                    report.persistence_failures += 1;
                    tracing::warn!(address = %address, error = %e, "Failed to record live address");
                    continue;
                }
            }

            match alert {
                Some(Ok(Some(_))) => report.alerts_raised += 1,
                Some(Err(e)) => {
                    report.persistence_failures += 1;
                    tracing::warn!(address = %address, error = %e, "Failed to raise alert");
                }
                Some(Ok(None)) | None => {}
            }
        }

        report
    }
}

pub struct ScanOrchestrator {
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    chunk_size: usize,
}

impl ScanOrchestrator {
    pub fn new(
        probe: Arc<dyn LivenessProbe>,
        resolver: Arc<dyn HostnameResolver>,
        store: Arc<dyn DiscoveryStore>,
        worker_count: usize,
        chunk_size: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                probe,
                resolver,
                store,
            }),
            pool: WorkerPool::new(worker_count),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Probe every address and record the live ones. Returns once all chunks
    /// have finished.
    pub async fn run_scan(&self, addresses: Vec<IpAddr>) -> ScanReport {
        let start = Instant::now();
        let total = addresses.len();

        let tasks: Vec<_> = addresses
            .chunks(self.chunk_size)
            .map(|chunk| {
                let pipeline = self.pipeline.clone();
                let chunk = chunk.to_vec();
                async move { pipeline.process_chunk(chunk).await }
            })
            .collect();
        let chunks = tasks.len();

        tracing::info!(
            addresses = total,
            chunks,
            workers = self.pool.size(),
            "Scan started"
        );

        let mut report = ScanReport::default();
        for chunk_report in self.pool.run_all(tasks).await {
            report.absorb(chunk_report);
        }
        report.duration = start.elapsed();

        tracing::info!(
            probed = report.probed,
            live = report.live(),
            new_records = report.new_records,
            alerts_raised = report.alerts_raised,
            persistence_failures = report.persistence_failures,
            duration_ms = report.duration.as_millis() as u64,
            "Scan complete"
        );

        report
    }
}
