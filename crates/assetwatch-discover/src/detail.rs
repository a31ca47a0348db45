//! Detail scanning: run the scan engine against one known address, extract
//! host findings from its report, and fold them into the stored record.

use std::net::IpAddr;
use std::sync::Arc;

use assetwatch_core::{DetailUpdate, DiscoveryStore, RecordId, ResolutionStatus};
use serde::Serialize;

use crate::config::DetailOptions;
use crate::error::Result;
use crate::nmap_xml::{NmapHost, NmapPort, NmapRun};
use crate::scanner::ScanEngine;

/// Findings for one live host in a detail scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostDetail {
    pub address: IpAddr,
    /// Scanner-supplied hostname, or the address itself when it found none.
    pub hostname: String,
    /// Whether `hostname` came from the scan rather than the fallback.
    #[serde(skip)]
    pub hostname_from_scan: bool,
    pub mac_address: Option<String>,
    pub os: Option<String>,
    /// `port/proto - service (product version)`, ascending by port.
    pub open_ports: Vec<String>,
}

impl HostDetail {
    fn from_host(host: &NmapHost, queried: IpAddr) -> Self {
        let address = host.ip().unwrap_or(queried);
        let scanned_name = host.hostname().map(String::from);

        Self {
            address,
            hostname_from_scan: scanned_name.is_some(),
            hostname: scanned_name.unwrap_or_else(|| address.to_string()),
            mac_address: host.mac().map(String::from),
            os: host.os_name().map(String::from),
            open_ports: host.open_ports().into_iter().map(format_port).collect(),
        }
    }

    /// The persisted form of these findings.
    pub fn to_update(&self, raw_evidence: &str) -> DetailUpdate {
        DetailUpdate {
            hostname: self
                .hostname_from_scan
                .then(|| self.hostname.clone()),
            mac_address: self.mac_address.clone(),
            os: self.os.clone(),
            open_ports: (!self.open_ports.is_empty()).then(|| self.open_ports.join(", ")),
            raw_evidence: Some(raw_evidence.to_string()),
            status: ResolutionStatus::Analyzed,
        }
    }
}

/// What a detail scan returns to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct DetailResult {
    pub address: IpAddr,
    pub record_id: RecordId,
    pub hosts: Vec<HostDetail>,
    #[serde(skip)]
    pub raw_evidence: String,
}

/// Format one open port: `22/tcp - ssh (OpenSSH 9.6)`.
///
/// Product and version are each dropped when unknown; the parentheses go
/// with them.
pub fn format_port(port: &NmapPort) -> String {
    let service = port.service.as_ref();
    let name = service
        .and_then(|s| s.name.as_deref())
        .filter(|n| !n.is_empty())
        .unwrap_or("unknown");

    let extra: Vec<&str> = service
        .into_iter()
        .flat_map(|s| [s.product.as_deref(), s.version.as_deref()])
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if extra.is_empty() {
        format!("{}/{} - {}", port.port_id, port.protocol, name)
    } else {
        format!(
            "{}/{} - {} ({})",
            port.port_id,
            port.protocol,
            name,
            extra.join(" ")
        )
    }
}

/// Findings for every up host in `run`.
pub fn extract_details(queried: IpAddr, run: &NmapRun) -> Vec<HostDetail> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .map(|h| HostDetail::from_host(h, queried))
        .collect()
}

/// The host whose findings belong to the queried record: the one with the
/// queried address, else the first.
fn primary_host(queried: IpAddr, hosts: &[HostDetail]) -> Option<&HostDetail> {
    hosts
        .iter()
        .find(|h| h.address == queried)
        .or_else(|| hosts.first())
}

pub struct DetailScanner {
    engine: Arc<dyn ScanEngine>,
    store: Arc<dyn DiscoveryStore>,
}

impl DetailScanner {
    pub fn new(engine: Arc<dyn ScanEngine>, store: Arc<dyn DiscoveryStore>) -> Self {
        Self { engine, store }
    }

    /// Scan `address` and persist the findings onto `record_id`.
    ///
    /// Engine failures surface as scan-engine errors and leave the record
    /// untouched. A scan that finds no up host also leaves it untouched.
    pub async fn scan_details(
        &self,
        address: IpAddr,
        record_id: RecordId,
        options: &DetailOptions,
    ) -> Result<DetailResult> {
        let output = self.engine.scan(address, options).await?;
        let hosts = extract_details(address, &output.run);

        match primary_host(address, &hosts) {
            Some(host) => {
                let update = host.to_update(&output.raw_xml);
                self.store
                    .update_discovered_details(record_id, &update)
                    .await?;

                tracing::info!(
                    address = %address,
                    record_id = %record_id,
                    open_ports = host.open_ports.len(),
                    os = host.os.as_deref().unwrap_or(""),
                    "Detail scan persisted"
                );
            }
            None => {
                tracing::warn!(
                    address = %address,
                    record_id = %record_id,
                    "Detail scan found no live host; record left unchanged"
                );
            }
        }

        Ok(DetailResult {
            address,
            record_id,
            hosts,
            raw_evidence: output.raw_xml,
        })
    }
}
