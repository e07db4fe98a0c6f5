use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::services::PingResultStore;
use crate::monitor::{ContainerRuntime, Prober, measure_container};

/// What one enumerate-and-probe pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub containers: usize,
    pub recorded: usize,
    pub failed: usize,
    pub enumeration_failed: bool,
}

/// Periodically probes every running container and records the successes.
pub struct PollLoop {
    runtime: Arc<dyn ContainerRuntime>,
    prober: Arc<dyn Prober>,
    store: PingResultStore,
    interval: Duration,
}

impl PollLoop {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        prober: Arc<dyn Prober>,
        store: PingResultStore,
        interval: Duration,
    ) -> Self {
        Self {
            runtime,
            prober,
            store,
            interval,
        }
    }

    /// Runs cycles forever. The sleep starts after a cycle finishes, so slow
    /// cycles push the next one back instead of overlapping it.
    pub async fn run(self) {
        info!(
            interval_seconds = self.interval.as_secs(),
            "Container ping loop started."
        );
        loop {
            let report = self.run_cycle().await;
            info!(
                containers = report.containers,
                recorded = report.recorded,
                failed = report.failed,
                enumeration_failed = report.enumeration_failed,
                "Ping cycle finished."
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let container_ids = match self.runtime.list_running().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to get container list.");
                return CycleReport {
                    enumeration_failed: true,
                    ..Default::default()
                };
            }
        };

        let mut report = CycleReport {
            containers: container_ids.len(),
            ..Default::default()
        };

        for container_id in &container_ids {
            let measured =
                measure_container(self.runtime.as_ref(), self.prober.as_ref(), container_id).await;
            let measurement = match measured {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        container_id = %container_id,
                        error = %e,
                        "Skipping container this cycle."
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let address = measurement.address.to_string();
            match self
                .store
                .insert(&address, measurement.latency_ms, Utc::now())
                .await
            {
                Ok(_) => report.recorded += 1,
                Err(e) => {
                    error!(
                        container_id = %container_id,
                        ip_address = %address,
                        error = %e,
                        "Failed to store ping result."
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
