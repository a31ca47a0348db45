//! Alert emission for newly discovered addresses.

use std::net::IpAddr;

use assetwatch_core::{
    AlertEvent, AlertStatus, DiscoveryStore, NewAlert, RecordId, StoreError, StoreResult,
    NEW_IP_ALERT_TYPE,
};

/// Description text for a new-address alert.
pub fn describe_new_address(address: IpAddr, hostname: Option<&str>) -> String {
    match hostname {
        Some(h) => format!("New IP detected on the network: {address} (hostname: {h})"),
        None => format!("New IP detected on the network: {address}"),
    }
}

/// Raise a "New IP Discovered" alert for a first sighting.
///
/// Returns `Ok(None)` when no such alert type is configured or its
/// configuration cannot be read as a valid type.
pub async fn maybe_emit(
    store: &dyn DiscoveryStore,
    record_id: RecordId,
    address: IpAddr,
    hostname: Option<&str>,
) -> StoreResult<Option<AlertEvent>> {
    let alert_type = match store.find_alert_type_by_name(NEW_IP_ALERT_TYPE).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            tracing::warn!(
                alert_type = NEW_IP_ALERT_TYPE,
                address = %address,
                "Alert type not configured, skipping alert"
            );
            return Ok(None);
        }
        Err(StoreError::Malformed(reason)) => {
            tracing::warn!(
                alert_type = NEW_IP_ALERT_TYPE,
                reason = %reason,
                "Alert type configuration malformed, skipping alert"
            );
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let alert = NewAlert {
        type_id: alert_type.id,
        discovered_id: Some(record_id),
        description: describe_new_address(address, hostname),
        status: AlertStatus::New,
        severity: alert_type.default_severity,
    };

    let event = store.insert_alert(&alert).await?;

    tracing::info!(
        alert_id = %event.id,
        address = %address,
        severity = %event.severity,
        "Alert raised"
    );

    Ok(Some(event))
}
