// # Reachability Probe Trait
//
// Defines the interface for a single reachability test.
//
// ## Implementations
//
// - ICMP via the system ping binary: `soboss-probe-ping` crate
// - Test doubles: scripted probes in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use soboss_core::ReachabilityProbe;
// use std::time::Duration;
//
// let alive = probe.probe("192.168.1.20", Duration::from_secs(2)).await?;
// ```

use async_trait::async_trait;
use std::time::Duration;

/// Trait for reachability probe implementations
///
/// A probe performs exactly one test per call and returns within a bounded
/// time derived from `timeout`. It never retries.
///
/// # Error Semantics
///
/// `Ok(false)` means the host did not answer. `Err(_)` means the probe could
/// not be carried out at all (e.g. the ping binary is missing); callers treat
/// both as "offline".
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Test whether `host` answers within `timeout`
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, crate::Error>;

    /// Name used in log lines
    fn probe_name(&self) -> &'static str {
        "probe"
    }
}
