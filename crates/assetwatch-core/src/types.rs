//! Core records of the discovery engine.
//!
//! These are the only shapes that cross the persistence boundary. Backends
//! translate their own row representation into these types and nothing else.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnknownVariant;

/// Name of the alert type raised for every first-seen address.
pub const NEW_IP_ALERT_TYPE: &str = "New IP Discovered";

/// Longest recurring interval honoured (one leap year, in minutes).
pub const MAX_INTERVAL_MINUTES: i64 = 366 * 24 * 60;

// ── Identifiers ───────────────────────────────────────────────────

/// Identifier of a discovered-address record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an alert event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an alert type configuration entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AlertTypeId(pub Uuid);

impl AlertTypeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Discovered addresses ──────────────────────────────────────────

/// Resolution status of a discovered address.
///
/// `New` and `Analyzed` are driven by the engine; any other value is set by
/// an administrator and round-trips untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResolutionStatus {
    New,
    Analyzed,
    Ignored,
    Other(String),
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Analyzed => "analyzed",
            Self::Ignored => "ignored",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResolutionStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "new" => Self::New,
            "analyzed" => Self::Analyzed,
            "ignored" => Self::Ignored,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for ResolutionStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ResolutionStatus> for String {
    fn from(status: ResolutionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// An address that has answered a liveness probe at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredAddress {
    pub id: RecordId,
    pub address: IpAddr,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: ResolutionStatus,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub os: Option<String>,
    pub open_ports: Option<String>,
    pub raw_evidence: Option<String>,
}

impl DiscoveredAddress {
    /// A freshly discovered record: status New, first and last seen at `now`.
    pub fn first_sighting(address: IpAddr, hostname: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            address,
            first_seen: now,
            last_seen: now,
            status: ResolutionStatus::New,
            hostname,
            mac_address: None,
            os: None,
            open_ports: None,
            raw_evidence: None,
        }
    }

    /// Apply detail-scan findings.
    ///
    /// The hostname is kept unless the update supplies one; MAC, OS, ports
    /// and evidence are replaced wholesale.
    pub fn apply_details(&mut self, update: &DetailUpdate, now: DateTime<Utc>) {
        if let Some(hostname) = &update.hostname {
            self.hostname = Some(hostname.clone());
        }
        self.mac_address = update.mac_address.clone();
        self.os = update.os.clone();
        self.open_ports = update.open_ports.clone();
        self.raw_evidence = update.raw_evidence.clone();
        self.status = update.status.clone();
        self.last_seen = now;
    }
}

/// Enrichment produced by a detail scan for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailUpdate {
    /// `None` keeps whatever hostname the record already has.
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub os: Option<String>,
    pub open_ports: Option<String>,
    pub raw_evidence: Option<String>,
    pub status: ResolutionStatus,
}

// ── Alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            }),
        }
    }
}

/// An alert type configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertType {
    pub id: AlertTypeId,
    pub name: String,
    pub default_severity: Severity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Read,
    Investigating,
    Resolved,
    Ignored,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "read" => Ok(Self::Read),
            "investigating" => Ok(Self::Investigating),
            "resolved" => Ok(Self::Resolved),
            "ignored" => Ok(Self::Ignored),
            _ => Err(UnknownVariant {
                kind: "alert status",
                value: s.to_string(),
            }),
        }
    }
}

/// A classified event raised by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: AlertId,
    pub type_id: AlertTypeId,
    pub severity: Severity,
    pub description: String,
    pub discovered_id: Option<RecordId>,
    pub created_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    pub fn from_new(alert: &NewAlert, now: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::new(),
            type_id: alert.type_id,
            severity: alert.severity,
            description: alert.description.clone(),
            discovered_id: alert.discovered_id,
            created_at: now,
            status: alert.status,
            resolved_at: None,
        }
    }

    /// Move to `status`. Entering Resolved stamps `resolved_at`; leaving it clears it.
    pub fn transition(&mut self, status: AlertStatus, now: DateTime<Utc>) {
        if status == AlertStatus::Resolved {
            if self.status != AlertStatus::Resolved {
                self.resolved_at = Some(now);
            }
        } else {
            self.resolved_at = None;
        }
        self.status = status;
    }
}

/// Input for creating an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub type_id: AlertTypeId,
    pub discovered_id: Option<RecordId>,
    pub description: String,
    pub status: AlertStatus,
    pub severity: Severity,
}

// ── Scan configuration ────────────────────────────────────────────

/// Singleton configuration of the recurring scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfiguration {
    pub address_ranges: Option<String>,
    pub interval_minutes: i64,
    pub enabled: bool,
}

impl ScanConfiguration {
    /// The recurring interval, if this configuration asks for a recurring job.
    ///
    /// Intervals above [`MAX_INTERVAL_MINUTES`] are clamped to it.
    pub fn recurring_interval(&self) -> Option<Duration> {
        if self.enabled && self.interval_minutes > 0 {
            let minutes = self.interval_minutes.min(MAX_INTERVAL_MINUTES) as u64;
            Some(Duration::from_secs(minutes * 60))
        } else {
            None
        }
    }

    /// The configured range expression, if it is non-blank.
    pub fn ranges(&self) -> Option<&str> {
        self.address_ranges
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_status_roundtrip() {
        assert_eq!(ResolutionStatus::from("New"), ResolutionStatus::New);
        assert_eq!(ResolutionStatus::from("ANALYZED"), ResolutionStatus::Analyzed);
        assert_eq!(
            ResolutionStatus::from("Inventoried"),
            ResolutionStatus::Other("Inventoried".to_string())
        );

        let json = serde_json::to_string(&ResolutionStatus::Analyzed).unwrap();
        assert_eq!(json, "\"analyzed\"");
        let back: ResolutionStatus = serde_json::from_str("\"Inventoried\"").unwrap();
        assert_eq!(back.as_str(), "Inventoried");
    }

    #[test]
    fn recurring_interval_clamps_huge_values() {
        let config = |interval_minutes, enabled| ScanConfiguration {
            address_ranges: Some("10.0.0.0/24".to_string()),
            interval_minutes,
            enabled,
        };

        assert_eq!(
            config(30, true).recurring_interval(),
            Some(Duration::from_secs(30 * 60))
        );
        assert_eq!(
            config(i64::MAX, true).recurring_interval(),
            Some(Duration::from_secs(MAX_INTERVAL_MINUTES as u64 * 60))
        );
        assert_eq!(config(i64::MIN, true).recurring_interval(), None);
        assert_eq!(config(i64::MAX, false).recurring_interval(), None);
    }

    #[test]
    fn severity_parse() {
        assert_eq!("High".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" critical ".parse::<Severity>().unwrap(), Severity::Critical);
        let err = "urgent".parse::<Severity>().unwrap_err();
        assert_eq!(err.kind, "severity");
    }

    #[test]
    fn alert_resolution_timestamp() {
        let t0 = Utc::now();
        let new = NewAlert {
            type_id: AlertTypeId::new(),
            discovered_id: None,
            description: "test".to_string(),
            status: AlertStatus::New,
            severity: Severity::Medium,
        };
        let mut alert = AlertEvent::from_new(&new, t0);
        assert!(alert.resolved_at.is_none());

        alert.transition(AlertStatus::Read, t0);
        assert!(alert.resolved_at.is_none());

        let t1 = t0 + chrono::TimeDelta::minutes(5);
        alert.transition(AlertStatus::Resolved, t1);
        assert_eq!(alert.resolved_at, Some(t1));

        // Re-resolving keeps the original timestamp.
        alert.transition(AlertStatus::Resolved, t1 + chrono::TimeDelta::minutes(1));
        assert_eq!(alert.resolved_at, Some(t1));

        alert.transition(AlertStatus::Investigating, t1);
        assert!(alert.resolved_at.is_none());
    }

    #[test]
    fn recurring_interval_rules() {
        let mut cfg = ScanConfiguration {
            address_ranges: Some("10.0.0.0/24".to_string()),
            interval_minutes: 30,
            enabled: true,
        };
        assert_eq!(cfg.recurring_interval(), Some(Duration::from_secs(1800)));

        cfg.interval_minutes = 0;
        assert_eq!(cfg.recurring_interval(), None);

        cfg.interval_minutes = -5;
        assert_eq!(cfg.recurring_interval(), None);

        cfg.interval_minutes = 15;
        cfg.enabled = false;
        assert_eq!(cfg.recurring_interval(), None);
    }

    #[test]
    fn blank_ranges_are_absent() {
        let cfg = ScanConfiguration {
            address_ranges: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.ranges(), None);
    }

    #[test]
    fn apply_details_keeps_known_hostname() {
        let now = Utc::now();
        let mut rec = DiscoveredAddress::first_sighting(
            "10.0.0.5".parse().unwrap(),
            Some("printer.lan".to_string()),
            now,
        );
        let update = DetailUpdate {
            hostname: None,
            mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            os: Some("Linux 5.15".to_string()),
            open_ports: Some("22/tcp - ssh".to_string()),
            raw_evidence: None,
            status: ResolutionStatus::Analyzed,
        };
        rec.apply_details(&update, now);
        assert_eq!(rec.hostname.as_deref(), Some("printer.lan"));
        assert_eq!(rec.os.as_deref(), Some("Linux 5.15"));
        assert_eq!(rec.status, ResolutionStatus::Analyzed);
    }
}
