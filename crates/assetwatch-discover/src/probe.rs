//! Liveness probing: a bounded ICMP echo per address.
//!
//! The probe shells out to the platform `ping` so no raw-socket privileges
//! are needed. Every failure mode (spawn error, non-zero exit, timeout)
//! collapses to "not alive"; nothing here returns an error.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{DiscoverConfig, ProbeConfig};

/// Result of probing one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub alive: bool,
    /// Short diagnostic for logs ("exit 0", "timed out after 3000ms", ...).
    pub detail: String,
}

impl ProbeOutcome {
    pub fn alive(detail: impl Into<String>) -> Self {
        Self {
            alive: true,
            detail: detail.into(),
        }
    }

    pub fn dead(detail: impl Into<String>) -> Self {
        Self {
            alive: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe `address`. Must return within the implementation's own bound.
    async fn probe(&self, address: IpAddr) -> ProbeOutcome;
}

/// `ping`-subprocess prober.
#[derive(Debug, Clone)]
pub struct PingProbe {
    ping_path: String,
    attempts: u32,
    attempt_timeout: Duration,
    overall_timeout: Duration,
}

impl PingProbe {
    pub fn new(ping_path: &str, probe: &ProbeConfig) -> Self {
        Self {
            ping_path: ping_path.to_string(),
            attempts: probe.attempts.max(1),
            attempt_timeout: probe.attempt_timeout(),
            overall_timeout: probe.overall_timeout(),
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self::new(&config.ping_path, &config.probe)
    }

    /// Arguments for one invocation, per platform.
    fn args(&self, address: IpAddr) -> Vec<String> {
        let count = self.attempts.to_string();
        let mut args = Vec::new();

        if cfg!(target_os = "windows") {
            args.extend([
                "-n".to_string(),
                count,
                "-w".to_string(),
                self.attempt_timeout.as_millis().to_string(),
            ]);
        } else if cfg!(target_os = "macos") {
            args.extend([
                "-c".to_string(),
                count,
                "-W".to_string(),
                self.attempt_timeout.as_millis().to_string(),
            ]);
        } else {
            // iputils takes whole seconds.
            let secs = self.attempt_timeout.as_secs().max(1);
            args.extend(["-c".to_string(), count, "-W".to_string(), secs.to_string()]);
            if address.is_ipv6() {
                args.push("-6".to_string());
            }
        }

        args.push(address.to_string());
        args
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn probe(&self, address: IpAddr) -> ProbeOutcome {
        let start = Instant::now();

        let child = Command::new(&self.ping_path)
            .args(self.args(address))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let outcome = match tokio::time::timeout(self.overall_timeout, child).await {
            Ok(Ok(status)) if status.success() => ProbeOutcome::alive("exit 0"),
            Ok(Ok(status)) => match status.code() {
                Some(code) => ProbeOutcome::dead(format!("exit {code}")),
                None => ProbeOutcome::dead("terminated by signal"),
            },
            Ok(Err(e)) => ProbeOutcome::dead(format!("spawn failed: {e}")),
            Err(_) => ProbeOutcome::dead(format!(
                "timed out after {}ms",
                self.overall_timeout.as_millis()
            )),
        };

        tracing::debug!(
            address = %address,
            alive = outcome.alive,
            detail = %outcome.detail,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Liveness probe"
        );

        outcome
    }
}
