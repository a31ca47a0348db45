//! Typed model of nmap's XML report (`-oX -`), deserialized with `quick-xml`.
//!
//! Only the parts a detail scan reads are modelled; everything else in the
//! report is ignored by serde.

use std::net::IpAddr;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// `<nmaprun>`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

/// `<host>`
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<HostAddress>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<OsMatches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostAddress {
    #[serde(rename = "@addr")]
    pub addr: String,
    /// `ipv4`, `ipv6` or `mac`.
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub names: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    /// `user` (as given on the command line) or `PTR`.
    #[serde(rename = "@type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatches {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: Option<String>,
}

impl OsMatch {
    /// Accuracy as a number; missing or unparsable counts as 0.
    pub fn confidence(&self) -> u32 {
        self.accuracy
            .as_deref()
            .and_then(|a| a.trim().parse().ok())
            .unwrap_or(0)
    }
}

impl NmapPort {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }
}

impl NmapHost {
    /// The host's IP address (IPv4 or IPv6), if reported and well-formed.
    pub fn ip(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .filter(|a| a.addr_type == "ipv4" || a.addr_type == "ipv6")
            .find_map(|a| a.addr.parse().ok())
    }

    /// The MAC address; only present when the host shares our broadcast domain.
    pub fn mac(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "mac")
            .map(|a| a.addr.as_str())
    }

    /// The first non-empty hostname nmap reports.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()?
            .names
            .iter()
            .map(|h| h.name.trim())
            .find(|n| !n.is_empty())
    }

    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// The OS match with the highest accuracy. On a tie the first reported wins.
    pub fn os_name(&self) -> Option<&str> {
        let matches = &self.os.as_ref()?.matches;
        let mut best: Option<&OsMatch> = None;
        for m in matches {
            if best.map_or(true, |b| m.confidence() > b.confidence()) {
                best = Some(m);
            }
        }
        best.map(|m| m.name.as_str())
    }

    /// Open ports, in ascending port order.
    pub fn open_ports(&self) -> Vec<&NmapPort> {
        let mut open: Vec<&NmapPort> = self
            .ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.is_open())
            .collect();
        open.sort_by(|a, b| a.port_id.cmp(&b.port_id).then_with(|| a.protocol.cmp(&b.protocol)));
        open
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
