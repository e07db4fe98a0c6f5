use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pingwatch::db::services::{self as db_services, PingResultStore};
use pingwatch::monitor::{CommandPinger, DockerCli, IcmpPinger, MonitorError, Prober};
use pingwatch::server::config::{ProbeMethod, ServerConfig};
use pingwatch::server::poll_loop::PollLoop;
use pingwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

/// Daily-rotated `pingwatch.log.*` files under `log_dir`, which is created if missing.
fn file_appender(log_dir: &str) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pingwatch.log")
        .build(log_dir)
}

fn init_logging(log_dir: &str) -> Result<(), InitError> {
    // Log to a file: JSON format, daily rotation
    let appender = file_appender(log_dir)?;
    let file_layer = fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
    Ok(())
}

fn build_prober(config: &ServerConfig) -> Result<Arc<dyn Prober>, MonitorError> {
    let prober: Arc<dyn Prober> = match config.probe_method {
        ProbeMethod::Command => Arc::new(CommandPinger::new(
            config.ping_bin.clone(),
            config.probe_timeout,
        )),
        ProbeMethod::Icmp => Arc::new(IcmpPinger::new(config.probe_timeout)?),
    };
    Ok(prober)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir)?;
    info!("Starting pingwatch, version: {}", VERSION);

    // --- Database Setup ---
    let db = match db_services::connect(&config.database_url, config.db_max_connections).await
    {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to connect to database.");
            return Err(e.into());
        }
    };
    let store = PingResultStore::new(db);
    store.ensure_schema().await?;

    // --- Container Ping Loop ---
    let prober = build_prober(&config)?;
    let runtime = Arc::new(DockerCli::new(config.runtime_bin.clone()));
    let poll_loop = PollLoop::new(runtime, prober, store.clone(), config.poll_interval);
    let poll_task = tokio::spawn(poll_loop.run());

    // --- Axum HTTP Server Setup ---
    let app = pingwatch::web::create_axum_router(store, &config.allowed_origin)?;
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(
        address = %config.listen_addr,
        allowed_origin = %config.allowed_origin,
        probe_method = ?config.probe_method,
        "HTTP server listening."
    );

    axum::serve(listener, app.into_make_service()).await?;

    // The ping loop never finishes on its own; it is aborted when main exits.
    poll_task.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_appender_creates_missing_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        assert!(file_appender(log_dir.to_str().unwrap()).is_ok());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_file_appender_reports_unusable_log_dir() {
        // A regular file where the directory should be.
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(file_appender(file.path().to_str().unwrap()).is_err());
    }
}
