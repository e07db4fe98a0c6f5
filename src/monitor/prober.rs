use async_trait::async_trait;
use rand::random;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tokio::process::Command;
use tracing::{debug, warn};

use super::MonitorError;

/// Extra time the `ping` process gets beyond its own `-W` deadline before it is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Sends exactly one echo to an address and reports the round-trip time.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: IpAddr) -> Result<Duration, MonitorError>;
}

/// Probes by running the system `ping` utility once; latency is the wall-clock
/// time the process took.
#[derive(Debug, Clone)]
pub struct CommandPinger {
    program: String,
    timeout: Duration,
    grace: Duration,
}

impl CommandPinger {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            grace: PROCESS_GRACE,
        }
    }

    /// `ping -W` only takes whole seconds.
    fn deadline_secs(&self) -> u64 {
        (self.timeout.as_secs_f64().ceil() as u64).max(1)
    }
}

#[async_trait]
impl Prober for CommandPinger {
    async fn probe(&self, address: IpAddr) -> Result<Duration, MonitorError> {
        let deadline = self.deadline_secs().to_string();
        let target = address.to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(["-c", "1", "-W", deadline.as_str(), target.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout + self.grace, cmd.output()).await {
            Ok(result) => result.map_err(|source| MonitorError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(address = %address, "ping process outlived its deadline; killed.");
                return Err(MonitorError::ProbeTimedOut(address));
            }
        };
        let elapsed = start.elapsed();

        if output.status.success() {
            debug!(
                address = %address,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "Probe succeeded."
            );
            Ok(elapsed)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("no reply ({})", output.status)
            } else {
                stderr
            };
            Err(MonitorError::ProbeFailed { address, reason })
        }
    }
}

/// Probes with a native ICMP echo socket. Needs permission to open ICMP sockets
/// (root, `CAP_NET_RAW`, or `net.ipv4.ping_group_range`).
pub struct IcmpPinger {
    v4: Client,
    v6: Option<Client>,
    timeout: Duration,
}

impl IcmpPinger {
    pub fn new(timeout: Duration) -> Result<Self, MonitorError> {
        let v4 = Client::new(&Config::default())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(
                    error = %e,
                    "IPv6 ICMP socket unavailable; IPv6 containers will not be probed."
                );
                None
            }
        };
        Ok(Self { v4, v6, timeout })
    }
}

#[async_trait]
impl Prober for IcmpPinger {
    async fn probe(&self, address: IpAddr) -> Result<Duration, MonitorError> {
        let client = match address {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self.v6.as_ref().ok_or_else(|| MonitorError::ProbeFailed {
                address,
                reason: "IPv6 ICMP socket unavailable".to_string(),
            })?,
        };

        let mut pinger = client.pinger(address, PingIdentifier(random())).await;
        pinger.timeout(self.timeout);
        match pinger.ping(PingSequence(0), &[]).await {
            Ok((_reply, rtt)) => Ok(rtt),
            Err(SurgeError::Timeout { .. }) => Err(MonitorError::ProbeTimedOut(address)),
            Err(e) => Err(MonitorError::ProbeFailed {
                address,
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_deadline_rounds_up_to_whole_seconds() {
        assert_eq!(CommandPinger::new("ping", Duration::from_millis(200)).deadline_secs(), 1);
        assert_eq!(CommandPinger::new("ping", Duration::from_secs(1)).deadline_secs(), 1);
        assert_eq!(CommandPinger::new("ping", Duration::from_millis(1500)).deadline_secs(), 2);
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let pinger = CommandPinger::new("true", Duration::from_secs(1));
        let rtt = pinger.probe(localhost()).await.unwrap();
        assert!(rtt < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let pinger = CommandPinger::new("false", Duration::from_secs(1));
        let err = pinger.probe(localhost()).await.unwrap_err();
        assert!(matches!(err, MonitorError::ProbeFailed { .. }));
    }

    #[tokio::test]
    async fn test_hung_process_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let pinger = CommandPinger {
            program: script.to_string_lossy().into_owned(),
            timeout: Duration::from_millis(100),
            grace: Duration::from_millis(100),
        };
        let start = Instant::now();
        let err = pinger.probe(localhost()).await.unwrap_err();
        assert!(matches!(err, MonitorError::ProbeTimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
