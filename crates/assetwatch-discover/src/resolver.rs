//! Best-effort reverse DNS.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use dns_lookup::lookup_addr;

#[async_trait]
pub trait HostnameResolver: Send + Sync {
    /// Resolve a hostname for `address`. Any failure is `None`.
    async fn resolve(&self, address: IpAddr) -> Option<String>;
}

/// Resolver backed by the system resolver (`getnameinfo`).
///
/// The lookup is blocking, so it runs on the blocking pool under a timeout.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Reverse lookup; a "hostname" that is just the address rendered back is no name.
fn reverse_lookup(address: IpAddr) -> Option<String> {
    let name = lookup_addr(&address).ok()?;
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name == address.to_string() {
        None
    } else {
        Some(name.to_string())
    }
}

#[async_trait]
impl HostnameResolver for DnsResolver {
    async fn resolve(&self, address: IpAddr) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || reverse_lookup(address));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(name)) => {
                tracing::debug!(address = %address, hostname = ?name, "Reverse lookup");
                name
            }
            Ok(Err(e)) => {
                tracing::debug!(address = %address, error = %e, "Reverse lookup task failed");
                None
            }
            Err(_) => {
                tracing::debug!(
                    address = %address,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Reverse lookup timed out"
                );
                None
            }
        }
    }
}
