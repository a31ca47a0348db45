//! Configuration for the assetwatch-discover engine.

use std::time::Duration;

use assetwatch_graph::GraphConfig;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `assetwatch.toml` `[discover]` section or
/// `ASSETWATCH__DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Path to the ping binary (default: "ping").
    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    /// Range expression used by manual scans when the request names none.
    #[serde(default)]
    pub default_ranges: Option<String>,

    /// Enable nmap OS fingerprinting (`-O`) in detail scans.
    #[serde(default)]
    pub os_detection: bool,

    /// Number of scan workers processing chunks in parallel.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Addresses per chunk handed to a worker.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Upper bound for a single reverse-DNS lookup.
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Upper bound for one detail scan (nmap process).
    #[serde(default = "default_detail_timeout_secs")]
    pub detail_timeout_secs: u64,

    /// Delay before the first firing of the recurring scan.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// How often the daemon re-reads the persisted scan configuration.
    #[serde(default = "default_config_poll_secs")]
    pub config_poll_secs: u64,
}

/// Liveness probe tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Hard bound on one address, whatever the attempts do.
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
}

impl ProbeConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
        }
    }
}

/// Options for a single detail scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DetailOptions {
    pub os_detection: bool,
}

impl DetailOptions {
    /// Return the nmap flags for these options.
    ///
    /// Version detection on a fast timing profile, treating the host as up so
    /// hosts that drop ICMP but expose ports are still scanned.
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        let mut flags = vec!["-sV", "-T4", "-Pn"];
        if self.os_detection {
            flags.push("-O");
        }
        flags
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_worker_count() -> usize {
    32
}

fn default_chunk_size() -> usize {
    16
}

fn default_attempts() -> u32 {
    2
}

fn default_attempt_timeout_ms() -> u64 {
    1000
}

fn default_overall_timeout_ms() -> u64 {
    3000
}

fn default_dns_timeout_ms() -> u64 {
    2000
}

fn default_detail_timeout_secs() -> u64 {
    300
}

fn default_initial_delay_secs() -> u64 {
    20
}

fn default_config_poll_secs() -> u64 {
    60
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            ping_path: default_ping_path(),
            default_ranges: None,
            os_detection: false,
            worker_count: default_worker_count(),
            chunk_size: default_chunk_size(),
            probe: ProbeConfig::default(),
            dns_timeout_ms: default_dns_timeout_ms(),
            detail_timeout_secs: default_detail_timeout_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            config_poll_secs: default_config_poll_secs(),
        }
    }
}

impl DiscoverConfig {
    /// Load the `[discover]` section from `<file_prefix>.toml` (optional)
    /// overlaid by `ASSETWATCH__DISCOVER__*` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = build_config(file_prefix).map_err(|e| DiscoverError::Config(e.to_string()))?;

        let discover = match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => DiscoverConfig::default(),
            Err(e) => return Err(DiscoverError::Config(e.to_string())),
        };

        discover.validate()?;
        Ok(discover)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(DiscoverError::Config("worker_count must be > 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(DiscoverError::Config("chunk_size must be > 0".to_string()));
        }
        if self.probe.attempts == 0 {
            return Err(DiscoverError::Config("probe.attempts must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn detail_options(&self) -> DetailOptions {
        DetailOptions {
            os_detection: self.os_detection,
        }
    }
}

/// Load the `[neo4j]` section, falling back to defaults for anything unset.
pub fn load_graph_config(file_prefix: &str) -> GraphConfig {
    match build_config(file_prefix) {
        Ok(c) => c.get::<GraphConfig>("neo4j").unwrap_or_default(),
        Err(_) => GraphConfig::default(),
    }
}

fn build_config(file_prefix: &str) -> std::result::Result<config::Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("ASSETWATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
}
