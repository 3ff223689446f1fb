//! Radio backends for the candidate tester.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::tester::Radio;
use crate::types::TargetNetwork;

/// Pause after tearing a link down before the next association.
const SETTLE_AFTER_DISCONNECT: Duration = Duration::from_millis(100);

/// Drives the host Wi-Fi interface through NetworkManager's `nmcli`.
///
/// Every attempt connects under a profile name owned by this process, and
/// only that profile is deleted afterwards. Saved profiles of the user are
/// never touched, even when one shares the target's SSID.
#[derive(Debug)]
pub struct SystemRadio {
    interface: String,
    attempts: AtomicU64,
    profile: Mutex<Option<String>>,
}

impl SystemRadio {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            attempts: AtomicU64::new(0),
            profile: Mutex::new(None),
        }
    }

    fn next_profile(&self) -> String {
        let n = self.attempts.fetch_add(1, Ordering::AcqRel);
        format!("keysearch-{}-{}", std::process::id(), n)
    }

    async fn nmcli(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("nmcli")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run nmcli")
    }
}

/// Arguments for `nmcli device wifi connect` under the given profile name.
fn connect_args<'a>(
    target: &'a TargetNetwork,
    passphrase: &'a str,
    interface: &'a str,
    profile: &'a str,
    bssid: &'a str,
) -> Vec<&'a str> {
    let mut args = vec![
        "device",
        "wifi",
        "connect",
        target.ssid.as_str(),
        "password",
        passphrase,
        "ifname",
        interface,
        "name",
        profile,
    ];
    if !target.bssid.is_unset() {
        args.extend(["bssid", bssid]);
    }
    args
}

impl Radio for SystemRadio {
    async fn associate(&self, target: &TargetNetwork, passphrase: &str) -> Result<()> {
        let bssid = target.bssid.to_string();
        let profile = self.next_profile();
        // Recorded before connecting: nmcli may leave the profile behind on failure.
        *self.profile.lock() = Some(profile.clone());
        if target.pmf_required {
            debug!(ssid = %target.ssid, "target enforces management-frame protection");
        }

        let args = connect_args(target, passphrase, &self.interface, &profile, &bssid);
        let output = self.nmcli(&args).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("nmcli connect failed: {}", stderr.trim())
        }
    }

    async fn disconnect(&self) -> Result<()> {
        // "not active" is the normal answer after a rejected attempt.
        if let Err(e) = self.nmcli(&["device", "disconnect", &self.interface]).await {
            warn!(interface = %self.interface, error = %e, "device disconnect failed");
        }

        let profile = self.profile.lock().take();
        if let Some(name) = profile {
            match self.nmcli(&["connection", "delete", "id", &name]).await {
                Ok(out) if !out.status.success() => {
                    debug!(profile = %name, "no attempt profile to delete");
                }
                Ok(_) => {}
                Err(e) => warn!(profile = %name, error = %e, "failed to delete attempt profile"),
            }
        }

        tokio::time::sleep(SETTLE_AFTER_DISCONNECT).await;
        Ok(())
    }
}

/// Counters a [`SimulatedRadio`] keeps about how it was driven.
#[derive(Debug, Default)]
pub struct RadioStats {
    attempts: AtomicU64,
    linked: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RadioStats {
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether a link is currently up.
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    /// Most associations ever running at the same moment.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }
}

struct InFlight<'a>(&'a RadioStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a RadioStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        stats.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Stand-in access point that accepts exactly one passphrase.
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    passphrase: String,
    latency: Duration,
    stats: Arc<RadioStats>,
}

impl SimulatedRadio {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            latency: Duration::ZERO,
            stats: Arc::new(RadioStats::default()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn stats(&self) -> Arc<RadioStats> {
        Arc::clone(&self.stats)
    }
}

impl Radio for SimulatedRadio {
    async fn associate(&self, _target: &TargetNetwork, passphrase: &str) -> Result<()> {
        let _in_flight = InFlight::enter(&self.stats);
        self.stats.attempts.fetch_add(1, Ordering::AcqRel);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        } else {
            tokio::task::yield_now().await;
        }
        if passphrase == self.passphrase {
            self.stats.linked.store(true, Ordering::Release);
            Ok(())
        } else {
            bail!("4-way handshake failed")
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.stats.linked.store(false, Ordering::Release);
        Ok(())
    }
}
