use anyhow::Result;
use netpulse::config::AppConfig;
use netpulse::control::{self, Command};
use netpulse::monitor::Monitor;
use netpulse::provider::SysinfoProvider;
use netpulse::render;
use netpulse::sink::ConsoleSink;
use netpulse::version;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the connection panel; logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = AppConfig::load()?;
    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        "starting"
    );

    let provider = Arc::new(
        SysinfoProvider::new().map_err(|e| anyhow::anyhow!("metrics provider: {}", e))?,
    );
    let sink = Arc::new(ConsoleSink::new(
        app_config.display.format,
        app_config.display.max_remote_hosts,
    ));
    let monitor = Monitor::new(provider, sink, app_config.monitoring.monitor_config())?;

    if app_config.monitoring.autostart {
        monitor.start();
    } else {
        tracing::info!("type `start` to begin monitoring, `quit` to exit");
    }

    let mut commands = control::spawn_reader(std::io::BufReader::new(std::io::stdin()));
    tokio::select! {
        _ = async {
            while let Some(cmd) = commands.recv().await {
                match cmd {
                    Command::Start => monitor.start(),
                    Command::Stop => monitor.stop(),
                    Command::Status => {
                        let stats = monitor.stats();
                        println!(
                            "{} | bandwidth ticks {} | connection ticks {} | skipped {}",
                            render::status_line(monitor.state()),
                            stats.bandwidth_ticks,
                            stats.connection_ticks,
                            stats.skipped_ticks
                        );
                    }
                    Command::Quit => return,
                }
            }
            // stdin closed (e.g. running detached): keep sampling until a signal
            std::future::pending::<()>().await
        } => {
            tracing::info!("Quit requested");
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    monitor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
