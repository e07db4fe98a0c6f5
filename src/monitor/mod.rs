//! Container discovery and reachability probing.
use std::net::IpAddr;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

pub mod prober;
pub mod runtime;

pub use prober::{CommandPinger, IcmpPinger, Prober};
pub use runtime::{ContainerRuntime, DockerCli};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    CommandTimedOut { program: String, timeout: Duration },
    #[error("Container {0} has no private address")]
    AddressUnavailable(String),
    #[error("Probe to {address} failed: {reason}")]
    ProbeFailed { address: IpAddr, reason: String },
    #[error("Probe to {0} timed out")]
    ProbeTimedOut(IpAddr),
    #[error("ICMP socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// A successful probe of one container.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub address: IpAddr,
    pub latency_ms: f64,
}

/// Resolves the container's private address and probes it once.
pub async fn measure_container(
    runtime: &dyn ContainerRuntime,
    prober: &dyn Prober,
    container_id: &str,
) -> Result<Measurement, MonitorError> {
    let address = runtime.inspect_address(container_id).await?;
    let rtt = prober.probe(address).await?;
    Ok(Measurement {
        address,
        latency_ms: rtt.as_secs_f64() * 1000.0,
    })
}
