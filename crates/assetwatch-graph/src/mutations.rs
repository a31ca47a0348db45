//! Write operations for the discovery store.
//!
//! Discovered addresses are keyed by `address`; inserts use MERGE so that a
//! losing concurrent insert is detected instead of creating a duplicate.
//! Optional properties are written as empty strings and read back as `None`.

use std::net::IpAddr;

use assetwatch_core::{
    AlertEvent, AlertId, AlertStatus, AlertType, AlertTypeId, DetailUpdate, NewAlert, RecordId,
    ResolutionStatus, ScanConfiguration, Severity,
};
use chrono::{DateTime, Utc};
use neo4rs::query;

use crate::client::{GraphClient, GraphError};
use crate::queries::SCAN_CONFIG_KEY;

/// Result of an insert attempt keyed by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(RecordId),
    /// Another writer already owns this address.
    AlreadyExists(RecordId),
}

impl GraphClient {
    // ── Discovered addresses ─────────────────────────────────────

    /// Insert a discovered address unless one with the same key exists.
    pub async fn create_discovered(
        &self,
        address: IpAddr,
        hostname: Option<&str>,
        status: &ResolutionStatus,
    ) -> Result<InsertOutcome, GraphError> {
        let id = RecordId::new();
        let q = query(
            "MERGE (n:DiscoveredAddress {address: $address})
             ON CREATE SET
               n.id = $id, n.status = $status, n.hostname = $hostname,
               n.mac_address = '', n.os = '', n.open_ports = '', n.raw_evidence = '',
               n.first_seen = $now, n.last_seen = $now
             RETURN n.id AS id",
        )
        .param("address", address.to_string())
        .param("id", id.0.to_string())
        .param("status", status.as_str().to_string())
        .param("hostname", hostname.unwrap_or_default().to_string())
        .param("now", Utc::now().to_rfc3339());

        let row = self.query_one(q).await?.ok_or_else(|| {
            GraphError::Serialization(format!("MERGE returned no row for {address}"))
        })?;
        let stored: String = row
            .get("id")
            .map_err(|e| GraphError::Serialization(format!("Failed to read id: {e}")))?;

        if stored == id.0.to_string() {
            Ok(InsertOutcome::Created(id))
        } else {
            let existing = uuid::Uuid::parse_str(&stored)
                .map_err(|e| GraphError::Serialization(format!("id={stored}: {e}")))?;
            Ok(InsertOutcome::AlreadyExists(RecordId(existing)))
        }
    }

    /// Overwrite the resolved hostname and advance last_seen.
    pub async fn set_discovered_hostname(
        &self,
        id: RecordId,
        hostname: Option<&str>,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n:DiscoveredAddress {id: $id})
             SET n.hostname = $hostname, n.last_seen = $now
             RETURN n.id AS id",
        )
        .param("id", id.0.to_string())
        .param("hostname", hostname.unwrap_or_default().to_string())
        .param("now", Utc::now().to_rfc3339());

        self.expect_match(q, "DiscoveredAddress", id.0.to_string())
            .await
    }

    /// Store detail-scan findings. An empty hostname keeps the current one.
    pub async fn set_discovered_details(
        &self,
        id: RecordId,
        update: &DetailUpdate,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n:DiscoveredAddress {id: $id})
             SET n.hostname = CASE WHEN $hostname = '' THEN n.hostname ELSE $hostname END,
                 n.mac_address = $mac_address, n.os = $os,
                 n.open_ports = $open_ports, n.raw_evidence = $raw_evidence,
                 n.status = $status, n.last_seen = $now
             RETURN n.id AS id",
        )
        .param("id", id.0.to_string())
        .param("hostname", opt_string(&update.hostname))
        .param("mac_address", opt_string(&update.mac_address))
        .param("os", opt_string(&update.os))
        .param("open_ports", opt_string(&update.open_ports))
        .param("raw_evidence", opt_string(&update.raw_evidence))
        .param("status", update.status.as_str().to_string())
        .param("now", Utc::now().to_rfc3339());

        self.expect_match(q, "DiscoveredAddress", id.0.to_string())
            .await
    }

    pub async fn set_discovered_status(
        &self,
        id: RecordId,
        status: &ResolutionStatus,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n:DiscoveredAddress {id: $id})
             SET n.status = $status
             RETURN n.id AS id",
        )
        .param("id", id.0.to_string())
        .param("status", status.as_str().to_string());

        self.expect_match(q, "DiscoveredAddress", id.0.to_string())
            .await
    }

    // ── Alerts ───────────────────────────────────────────────────

    /// Create or update an alert type by name.
    pub async fn upsert_alert_type(
        &self,
        name: &str,
        default_severity: Severity,
    ) -> Result<AlertType, GraphError> {
        let q = query(
            "MERGE (t:AlertType {name: $name})
             ON CREATE SET t.id = $id
             SET t.default_severity = $severity
             RETURN t.id AS id",
        )
        .param("name", name.to_string())
        .param("id", AlertTypeId::new().0.to_string())
        .param("severity", default_severity.as_str().to_string());

        let row = self.query_one(q).await?.ok_or_else(|| {
            GraphError::Serialization(format!("MERGE returned no row for alert type {name}"))
        })?;
        let raw: String = row
            .get("id")
            .map_err(|e| GraphError::Serialization(format!("Failed to read id: {e}")))?;
        let id = uuid::Uuid::parse_str(&raw)
            .map_err(|e| GraphError::Serialization(format!("id={raw}: {e}")))?;

        Ok(AlertType {
            id: AlertTypeId(id),
            name: name.to_string(),
            default_severity,
        })
    }

    /// Create an alert and link it to its discovered address, in one transaction.
    pub async fn create_alert(&self, alert: &NewAlert) -> Result<AlertEvent, GraphError> {
        let event = AlertEvent::from_new(alert, Utc::now());
        let mut txn = self.start_txn().await?;

        let create = query(
            "CREATE (a:Alert {
               id: $id, type_id: $type_id, severity: $severity,
               description: $description, discovered_id: $discovered_id,
               created_at: $created_at, status: $status, resolved_at: ''
             })",
        )
        .param("id", event.id.0.to_string())
        .param("type_id", event.type_id.0.to_string())
        .param("severity", event.severity.as_str().to_string())
        .param("description", event.description.clone())
        .param(
            "discovered_id",
            event
                .discovered_id
                .map(|d| d.0.to_string())
                .unwrap_or_default(),
        )
        .param("created_at", event.created_at.to_rfc3339())
        .param("status", event.status.as_str().to_string());
        txn.run(create).await?;

        if let Some(discovered_id) = event.discovered_id {
            let link = query(
                "MATCH (a:Alert {id: $alert_id})
                 MATCH (d:DiscoveredAddress {id: $discovered_id})
                 MERGE (a)-[:RAISED_FOR]->(d)",
            )
            .param("alert_id", event.id.0.to_string())
            .param("discovered_id", discovered_id.0.to_string());
            txn.run(link).await?;
        }

        txn.commit().await?;
        Ok(event)
    }

    pub async fn set_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (a:Alert {id: $id})
             SET a.status = $status, a.resolved_at = $resolved_at
             RETURN a.id AS id",
        )
        .param("id", id.0.to_string())
        .param("status", status.as_str().to_string())
        .param(
            "resolved_at",
            resolved_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        );

        self.expect_match(q, "Alert", id.0.to_string()).await
    }

    // ── Scan configuration ───────────────────────────────────────

    pub async fn save_scan_configuration(
        &self,
        config: &ScanConfiguration,
    ) -> Result<(), GraphError> {
        let q = query(
            "MERGE (c:ScanConfiguration {key: $key})
             SET c.address_ranges = $address_ranges,
                 c.interval_minutes = $interval_minutes,
                 c.enabled = $enabled,
                 c.updated_at = $now",
        )
        .param("key", SCAN_CONFIG_KEY.to_string())
        .param("address_ranges", opt_string(&config.address_ranges))
        .param("interval_minutes", config.interval_minutes)
        .param("enabled", config.enabled)
        .param("now", Utc::now().to_rfc3339());

        self.run(q).await
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Run a `... RETURN n.id AS id` write and fail with NotFound if nothing matched.
    async fn expect_match(
        &self,
        q: neo4rs::Query,
        label: &str,
        id: String,
    ) -> Result<(), GraphError> {
        match self.query_one(q).await? {
            Some(_) => Ok(()),
            None => Err(GraphError::NotFound {
                label: label.to_string(),
                id,
            }),
        }
    }
}

fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}
