//! Read operations and node-to-record translation.

use std::net::IpAddr;

use assetwatch_core::{
    AlertEvent, AlertId, AlertStatus, AlertType, AlertTypeId, DiscoveredAddress, RecordId,
    ResolutionStatus, ScanConfiguration,
};
use chrono::{DateTime, Utc};
use neo4rs::query;
use uuid::Uuid;

use crate::client::{GraphClient, GraphError};

/// Key of the singleton ScanConfiguration node.
pub(crate) const SCAN_CONFIG_KEY: &str = "default";

impl GraphClient {
    // ── Discovered addresses ─────────────────────────────────────

    /// Look up a discovered address by its unique key.
    pub async fn find_discovered(
        &self,
        address: IpAddr,
    ) -> Result<Option<DiscoveredAddress>, GraphError> {
        let q = query(
            "MATCH (n:DiscoveredAddress {address: $address})
             RETURN n LIMIT 1",
        )
        .param("address", address.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(discovered_from_node(&row_node(&row, "n")?)?)),
            None => Ok(None),
        }
    }

    /// List every discovered address, most recently seen first.
    pub async fn list_discovered_addresses(&self) -> Result<Vec<DiscoveredAddress>, GraphError> {
        let q = query(
            "MATCH (n:DiscoveredAddress)
             RETURN n
             ORDER BY n.last_seen DESC",
        );

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(discovered_from_node(&row_node(&row, "n")?)?);
        }
        Ok(results)
    }

    // ── Alerts ───────────────────────────────────────────────────

    pub async fn find_alert_type(&self, name: &str) -> Result<Option<AlertType>, GraphError> {
        let q = query(
            "MATCH (t:AlertType {name: $name})
             RETURN t LIMIT 1",
        )
        .param("name", name.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(alert_type_from_node(&row_node(&row, "t")?)?)),
            None => Ok(None),
        }
    }

    pub async fn get_alert(&self, id: AlertId) -> Result<Option<AlertEvent>, GraphError> {
        let q = query(
            "MATCH (a:Alert {id: $id})
             RETURN a LIMIT 1",
        )
        .param("id", id.0.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(alert_from_node(&row_node(&row, "a")?)?)),
            None => Ok(None),
        }
    }

    /// List alerts, newest first, optionally filtered by status.
    pub async fn list_alert_events(
        &self,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertEvent>, GraphError> {
        let q = query(
            "MATCH (a:Alert)
             WHERE $status = '' OR a.status = $status
             RETURN a
             ORDER BY a.created_at DESC",
        )
        .param(
            "status",
            status.map(|s| s.as_str().to_string()).unwrap_or_default(),
        );

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(alert_from_node(&row_node(&row, "a")?)?);
        }
        Ok(results)
    }

    // ── Scan configuration ───────────────────────────────────────

    pub async fn scan_configuration(&self) -> Result<ScanConfiguration, GraphError> {
        let q = query(
            "MATCH (c:ScanConfiguration {key: $key})
             RETURN c LIMIT 1",
        )
        .param("key", SCAN_CONFIG_KEY.to_string());

        let Some(row) = self.query_one(q).await? else {
            return Ok(ScanConfiguration::default());
        };
        let node = row_node(&row, "c")?;

        Ok(ScanConfiguration {
            address_ranges: opt_prop(&node, "address_ranges"),
            interval_minutes: node.get::<i64>("interval_minutes").unwrap_or(0),
            enabled: node.get::<bool>("enabled").unwrap_or(false),
        })
    }
}

// ── Node translation ─────────────────────────────────────────────

fn row_node(row: &neo4rs::Row, key: &str) -> Result<neo4rs::Node, GraphError> {
    row.get(key)
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize node: {e}")))
}

/// Optional string property; absent and empty both mean `None`.
fn opt_prop(node: &neo4rs::Node, key: &str) -> Option<String> {
    node.get::<String>(key).ok().filter(|s| !s.is_empty())
}

fn req_prop(node: &neo4rs::Node, key: &str) -> Result<String, GraphError> {
    node.get::<String>(key)
        .map_err(|e| GraphError::Serialization(format!("Missing property {key}: {e}")))
}

fn uuid_prop(node: &neo4rs::Node, key: &str) -> Result<Uuid, GraphError> {
    let raw = req_prop(node, key)?;
    Uuid::parse_str(&raw).map_err(|e| GraphError::Serialization(format!("{key}={raw}: {e}")))
}

fn time_prop(node: &neo4rs::Node, key: &str) -> Result<DateTime<Utc>, GraphError> {
    let raw = req_prop(node, key)?;
    parse_time(&raw).map_err(|e| GraphError::Serialization(format!("{key}={raw}: {e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

fn discovered_from_node(node: &neo4rs::Node) -> Result<DiscoveredAddress, GraphError> {
    let raw_address = req_prop(node, "address")?;
    let address: IpAddr = raw_address
        .parse()
        .map_err(|e| GraphError::Serialization(format!("address={raw_address}: {e}")))?;

    Ok(DiscoveredAddress {
        id: RecordId(uuid_prop(node, "id")?),
        address,
        first_seen: time_prop(node, "first_seen")?,
        last_seen: time_prop(node, "last_seen")?,
        status: ResolutionStatus::from(req_prop(node, "status")?),
        hostname: opt_prop(node, "hostname"),
        mac_address: opt_prop(node, "mac_address"),
        os: opt_prop(node, "os"),
        open_ports: opt_prop(node, "open_ports"),
        raw_evidence: opt_prop(node, "raw_evidence"),
    })
}

fn alert_type_from_node(node: &neo4rs::Node) -> Result<AlertType, GraphError> {
    let severity = req_prop(node, "default_severity")?;
    Ok(AlertType {
        id: AlertTypeId(uuid_prop(node, "id")?),
        name: req_prop(node, "name")?,
        default_severity: severity
            .parse()
            .map_err(|e| GraphError::Serialization(format!("{e}")))?,
    })
}

fn alert_from_node(node: &neo4rs::Node) -> Result<AlertEvent, GraphError> {
    let discovered_id = match opt_prop(node, "discovered_id") {
        Some(raw) => Some(RecordId(Uuid::parse_str(&raw).map_err(|e| {
            GraphError::Serialization(format!("discovered_id={raw}: {e}"))
        })?)),
        None => None,
    };
    let resolved_at = match opt_prop(node, "resolved_at") {
        Some(raw) => Some(
            parse_time(&raw)
                .map_err(|e| GraphError::Serialization(format!("resolved_at={raw}: {e}")))?,
        ),
        None => None,
    };

    Ok(AlertEvent {
        id: AlertId(uuid_prop(node, "id")?),
        type_id: AlertTypeId(uuid_prop(node, "type_id")?),
        severity: req_prop(node, "severity")?
            .parse()
            .map_err(|e| GraphError::Serialization(format!("{e}")))?,
        description: req_prop(node, "description")?,
        discovered_id,
        created_at: time_prop(node, "created_at")?,
        status: req_prop(node, "status")?
            .parse()
            .map_err(|e| GraphError::Serialization(format!("{e}")))?,
        resolved_at,
    })
}
