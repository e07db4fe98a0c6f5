use async_trait::async_trait;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::MonitorError;

/// Prints the default bridge address followed by the address on every attached network.
const ADDRESS_TEMPLATE: &str =
    "{{.NetworkSettings.IPAddress}}{{range .NetworkSettings.Networks}} {{.IPAddress}}{{end}}";

/// The local container runtime, queried for running containers and their addresses.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Identifiers of all running containers, in the order the runtime reports them.
    async fn list_running(&self) -> Result<Vec<String>, MonitorError>;

    /// The container's private network address.
    async fn inspect_address(&self, container_id: &str) -> Result<IpAddr, MonitorError>;
}

/// Upper bound for one `ps`/`inspect` call against an unresponsive daemon.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the runtime through its CLI (`docker`, or an argument-compatible
/// one such as `podman`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, MonitorError> {
        debug!(program = %self.program, ?args, "Running container runtime command.");
        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| MonitorError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(MonitorError::CommandTimedOut {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(MonitorError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running(&self) -> Result<Vec<String>, MonitorError> {
        let stdout = self.run(&["ps", "--format", "{{.ID}}"]).await?;
        Ok(parse_container_ids(&stdout))
    }

    async fn inspect_address(&self, container_id: &str) -> Result<IpAddr, MonitorError> {
        let stdout = self
            .run(&["inspect", "-f", ADDRESS_TEMPLATE, container_id])
            .await?;
        parse_address(&stdout)
            .ok_or_else(|| MonitorError::AddressUnavailable(container_id.to_string()))
    }
}

/// One identifier per non-blank line.
pub fn parse_container_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// First whitespace-separated token that is an IP address.
pub fn parse_address(stdout: &str) -> Option<IpAddr> {
    stdout
        .split_whitespace()
        .find_map(|token| token.parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_ids() {
        let out = "3f2a9c1b7d10\n9b8e7f6a5c4d\n";
        assert_eq!(
            parse_container_ids(out),
            vec!["3f2a9c1b7d10".to_string(), "9b8e7f6a5c4d".to_string()]
        );
    }

    #[test]
    fn test_parse_container_ids_empty_output() {
        assert!(parse_container_ids("").is_empty());
        assert!(parse_container_ids("\n\n").is_empty());
    }

    #[test]
    fn test_parse_address_default_bridge() {
        assert_eq!(
            parse_address("172.17.0.2 172.17.0.2\n"),
            Some("172.17.0.2".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_address_user_defined_network() {
        // Not on the default bridge: the first field is empty.
        assert_eq!(
            parse_address(" 10.0.0.5\n"),
            Some("10.0.0.5".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_address_none() {
        assert_eq!(parse_address("\n"), None);
        assert_eq!(parse_address(" <no value>\n"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = DockerCli::new("/nonexistent/pingwatch-runtime");
        let err = cli.list_running().await.unwrap_err();
        assert!(matches!(err, MonitorError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_runtime_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stuck-runtime.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = DockerCli::new(script.to_string_lossy().into_owned())
            .with_timeout(Duration::from_millis(200));
        let start = std::time::Instant::now();
        let err = cli.list_running().await.unwrap_err();
        assert!(matches!(err, MonitorError::CommandTimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_command_failure() {
        let cli = DockerCli::new("false");
        let err = cli.list_running().await.unwrap_err();
        assert!(matches!(err, MonitorError::CommandFailed { .. }));
    }
}
