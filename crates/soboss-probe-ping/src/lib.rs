// # Ping Reachability Probe
//
// This crate provides an ICMP reachability probe for the SoBoss system.
//
// ## Purpose
//
// Sends one echo request to a host through the system `ping` binary and
// reports whether a reply arrived in time. Spawning the binary avoids the
// raw-socket privileges an in-process ICMP implementation would need.
//
// ## Platform Notes
//
// - Linux: `ping -n -c 1 -s 56 -W <secs> <host>`
// - macOS / BSD: `ping -n -c 1 -s 56 -t <secs> <host>`
// - Windows: `ping -n 1 -l 56 -w <millis> <host>`
//
// The wait is the probe timeout rounded to whole seconds, at least one.

use async_trait::async_trait;
use soboss_core::traits::ReachabilityProbe;
use soboss_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Echo payload size in bytes (64-byte packets with the ICMP header)
pub const PACKET_SIZE: u16 = 56;

/// Extra time granted to the child process on top of the probe timeout
const PROCESS_GRACE: Duration = Duration::from_secs(1);

/// System `ping` binary probe
///
/// # Example
///
/// ```rust,no_run
/// use soboss_probe_ping::PingProbe;
/// use soboss_core::traits::ReachabilityProbe;
/// use std::time::Duration;
///
/// # async fn example() -> soboss_core::Result<()> {
/// let probe = PingProbe::new();
/// let alive = probe.probe("192.168.1.20", Duration::from_secs(2)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    packet_size: u16,
}

impl PingProbe {
    /// Probe using `ping` from `PATH`
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
            packet_size: PACKET_SIZE,
        }
    }

    /// Use a specific binary instead of `ping` from `PATH`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for one echo request
    pub fn ping_args(&self, host: &str, timeout: Duration) -> Vec<String> {
        let size = self.packet_size.to_string();

        if cfg!(windows) {
            let millis = wait_secs(timeout) * 1000;
            vec![
                "-n".into(),
                "1".into(),
                "-l".into(),
                size,
                "-w".into(),
                millis.to_string(),
                host.into(),
            ]
        } else if cfg!(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        )) {
            vec![
                "-n".into(),
                "-c".into(),
                "1".into(),
                "-s".into(),
                size,
                "-t".into(),
                wait_secs(timeout).to_string(),
                host.into(),
            ]
        } else {
            vec![
                "-n".into(),
                "-c".into(),
                "1".into(),
                "-s".into(),
                size,
                "-W".into(),
                wait_secs(timeout).to_string(),
                host.into(),
            ]
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool> {
        validate_host(host)?;

        let args = self.ping_args(host, timeout);
        trace!("Running {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::probe(format!("Failed to spawn {}: {}", self.program, e)))?;

        let limit = Duration::from_secs(wait_secs(timeout)) + PROCESS_GRACE;
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("ping {} exited with {}", host, status);
                Ok(status.success())
            }
            Ok(Err(e)) => Err(Error::probe(format!("Failed to wait for {}: {}", self.program, e))),
            Err(_) => {
                debug!("ping {} overran {:?}, killing", host, limit);
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill ping child: {}", e);
                }
                Ok(false)
            }
        }
    }

    fn probe_name(&self) -> &'static str {
        "ping"
    }
}

/// Whole seconds the binary waits for a reply, at least one
fn wait_secs(timeout: Duration) -> u64 {
    let secs = (timeout.as_millis() as f64 / 1000.0).round() as u64;
    secs.max(1)
}

fn validate_host(host: &str) -> Result<()> {
    if host.trim().is_empty() {
        return Err(Error::probe("Empty host address"));
    }
    if host.starts_with('-') {
        return Err(Error::probe(format!("Refusing host address '{}'", host)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_secs_rounds_to_whole_seconds() {
        assert_eq!(wait_secs(Duration::from_millis(1000)), 1);
        assert_eq!(wait_secs(Duration::from_millis(1499)), 1);
        assert_eq!(wait_secs(Duration::from_millis(1500)), 2);
        assert_eq!(wait_secs(Duration::from_millis(200)), 1);
    }

    #[test]
    fn test_args_single_request_host_last() {
        let probe = PingProbe::new();
        let args = probe.ping_args("192.168.1.20", Duration::from_millis(2000));

        assert_eq!(args.last().map(String::as_str), Some("192.168.1.20"));
        assert!(args.contains(&"56".to_string()));
        assert!(args.contains(&"1".to_string()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_args() {
        let probe = PingProbe::new();
        let args = probe.ping_args("tv.local", Duration::from_millis(2000));
        assert_eq!(args, ["-n", "-c", "1", "-s", "56", "-W", "2", "tv.local"]);
    }

    #[tokio::test]
    async fn test_rejects_option_like_host() {
        let probe = PingProbe::new();

        let err = probe.probe("-f", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)));

        let err = probe.probe("  ", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_probe_error() {
        let probe = PingProbe::new().with_program("/nonexistent/soboss-ping");
        let err = probe
            .probe("127.0.0.1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }
}
