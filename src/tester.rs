use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info, warn};

use crate::types::TargetNetwork;

/// Reference bound on a single association attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// The radio driver as seen by the search engine.
///
/// Implementations only need to talk to the hardware; exclusivity and the
/// attempt deadline are enforced by [`CandidateTester`].
pub trait Radio: Send + Sync + 'static {
    /// Resolve once associated with `target` using `passphrase`, or fail when
    /// the network rejects it. May run forever; callers apply a deadline.
    fn associate(
        &self,
        target: &TargetNetwork,
        passphrase: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drop any link, whether or not one was established.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Result of one attempt. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Accepted,
    Rejected,
    TimedOut,
}

impl Attempt {
    pub fn is_accepted(self) -> bool {
        matches!(self, Attempt::Accepted)
    }
}

/// Tries candidates against the single physical radio, one at a time.
#[derive(Debug)]
pub struct CandidateTester<R> {
    radio: Mutex<R>,
    attempt_timeout: Duration,
}

impl<R: Radio> CandidateTester<R> {
    pub fn new(radio: R) -> Self {
        Self::with_timeout(radio, DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn with_timeout(radio: R, attempt_timeout: Duration) -> Self {
        Self {
            radio: Mutex::new(radio),
            attempt_timeout,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Attempt one association and always leave the radio disconnected.
    ///
    /// The radio lock is held for the attempt and the teardown, so concurrent
    /// callers queue instead of interleaving on the hardware.
    pub async fn try_candidate(&self, target: &TargetNetwork, candidate: &str) -> Attempt {
        let radio = self.radio.lock().await;
        debug!(ssid = %target.ssid, candidate, "trying passphrase");

        let attempt = match time::timeout(self.attempt_timeout, radio.associate(target, candidate)).await {
            Ok(Ok(())) => {
                info!(ssid = %target.ssid, "association accepted");
                Attempt::Accepted
            }
            Ok(Err(e)) => {
                debug!(ssid = %target.ssid, reason = %e, "association rejected");
                Attempt::Rejected
            }
            Err(_) => {
                debug!(ssid = %target.ssid, timeout_ms = self.attempt_timeout.as_millis() as u64, "association timed out");
                Attempt::TimedOut
            }
        };

        if let Err(e) = radio.disconnect().await {
            warn!(error = %e, "failed to disconnect radio after attempt");
        }
        attempt
    }
}
