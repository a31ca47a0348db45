//! Nmap process wrapper.
//!
//! Executes nmap as a child process via `tokio::process::Command` against a
//! single address and parses the XML report into typed Rust structs.

use std::io;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{DetailOptions, DiscoverConfig};
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};

/// Output of one engine run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub run: NmapRun,
    /// The report exactly as the engine produced it, kept as evidence.
    pub raw_xml: String,
    pub duration: Duration,
}

/// Something that can run a detail scan against one address.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(&self, address: IpAddr, options: &DetailOptions) -> Result<EngineOutput>;
}

/// Wrapper around the nmap binary.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    nmap_path: String,
    timeout: Duration,
}

impl NmapScanner {
    pub fn new(nmap_path: &str, timeout: Duration) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self::new(
            &config.nmap_path,
            Duration::from_secs(config.detail_timeout_secs),
        )
    }

    /// Verify nmap is installed and accessible, returning its version banner.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// A missing or non-executable binary is an engine fault; any other I/O
    /// failure is internal.
    fn spawn_error(&self, e: io::Error) -> DiscoverError {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                DiscoverError::NmapNotFound {
                    path: format!("{}: {e}", self.nmap_path),
                }
            }
            _ => e.into(),
        }
    }

    fn args(&self, address: IpAddr, options: &DetailOptions) -> Vec<String> {
        let mut args: Vec<String> = options.nmap_flags().into_iter().map(String::from).collect();
        args.push("--host-timeout".to_string());
        args.push(format!("{}s", self.timeout.as_secs().max(1)));
        if address.is_ipv6() {
            args.push("-6".to_string());
        }
        args.extend(["-oX", "-", "--noninteractive"].map(String::from));
        args.push(address.to_string());
        args
    }
}

#[async_trait]
impl ScanEngine for NmapScanner {
    async fn scan(&self, address: IpAddr, options: &DetailOptions) -> Result<EngineOutput> {
        let start = Instant::now();
        let args = self.args(address, options);

        tracing::info!(
            address = %address,
            os_detection = options.os_detection,
            "Starting nmap detail scan"
        );

        let child = Command::new(&self.nmap_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // A little headroom over --host-timeout for nmap's own startup and report.
        let bound = self.timeout + Duration::from_secs(15);
        let output = match tokio::time::timeout(bound, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.spawn_error(e)),
            Err(_) => {
                return Err(DiscoverError::NmapTimeout {
                    secs: bound.as_secs(),
                })
            }
        };

        let duration = start.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        let raw_xml = String::from_utf8_lossy(&output.stdout).into_owned();

        tracing::info!(
            address = %address,
            hosts_up = run.hosts.iter().filter(|h| h.is_up()).count(),
            duration_ms = duration.as_millis() as u64,
            "Nmap detail scan complete"
        );

        Ok(EngineOutput {
            run,
            raw_xml,
            duration,
        })
    }
}
