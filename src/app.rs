use std::sync::Arc;
use tracing::{error, info, warn};
use vidrelay::config::Config;
use vidrelay::discord;
use vidrelay::fetch::FetchExecutor;
use vidrelay::observability::Metrics;
use vidrelay::pipeline::Pipeline;
use vidrelay::publish::{EphemeralPublisher, ServerRegistry, detect_public_host};
use vidrelay::retention::RetentionScheduler;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(config: Config) -> Result<(), AnyError> {
    let token = config.discord_token()?.to_string();

    let executor = FetchExecutor::from_config(&config.fetch);
    executor.ensure_work_dir().await?;
    let version = executor.version().await?;
    info!(
        downloader = %config.fetch.downloader,
        %version,
        work_dir = %executor.work_dir().display(),
        timeout_secs = executor.timeout().as_secs(),
        "Downloader ready"
    );

    let public_host = if config.publish.detect_public_host {
        detect_public_host(&config.publish.ip_echo_url, &config.publish.public_host).await
    } else {
        config.publish.public_host.clone()
    };

    let registry = ServerRegistry::new();
    let scheduler = RetentionScheduler::new(registry.clone());
    let publisher =
        EphemeralPublisher::new(&config.publish, registry.clone()).with_public_host(public_host);
    info!(
        public_host = %publisher.public_host(),
        port = %config.publish.port,
        port_range_start = config.publish.port_range_start,
        port_range_end = config.publish.port_range_end,
        "File publishing configured"
    );

    let metrics = Arc::new(Metrics::new());
    let pipeline = Arc::new(Pipeline::new(executor, publisher, scheduler.clone(), metrics.clone()));

    let mut client = discord::connect(&token, pipeline).await?;
    let shard_manager = client.shard_manager.clone();

    info!("vidrelay starting");

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                error!(error = %e, "Discord client stopped");
                scheduler.shutdown().await;
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            shard_manager.shutdown_all().await;
        }
    }

    let pending = scheduler.pending();
    if pending > 0 {
        info!(pending, ports = ?registry.ports(), "Tearing down published files early");
    }
    scheduler.shutdown().await;

    let snapshot = metrics.snapshot();
    info!(
        requests_accepted = snapshot.requests_accepted,
        requests_busy = snapshot.requests_busy,
        fetch_timeouts = snapshot.fetch_timeouts,
        fetch_failures = snapshot.fetch_failures,
        attachments_sent = snapshot.attachments_sent,
        attach_failures = snapshot.attach_failures,
        files_published = snapshot.files_published,
        publish_failures = snapshot.publish_failures,
        "vidrelay stopped"
    );

    Ok(())
}

/// Print the effective settings and probe the downloader
pub async fn check(config: &Config) -> Result<(), AnyError> {
    let executor = FetchExecutor::from_config(&config.fetch);
    let version = executor.version().await?;

    println!("downloader:   {} ({})", config.fetch.downloader, version);
    println!("work_dir:     {}", executor.work_dir().display());
    println!("timeout:      {}s", executor.timeout().as_secs());
    println!(
        "publish:      {}:{} (range {}-{})",
        config.publish.bind_addr,
        config.publish.port,
        config.publish.port_range_start,
        config.publish.port_range_end
    );
    println!(
        "public_host:  {}{}",
        config.publish.public_host,
        if config.publish.detect_public_host {
            " (detected at startup)"
        } else {
            ""
        }
    );
    println!("log mode:     {:?}", config.logging.mode);

    if config.discord.token.is_none() {
        warn!("DISCORD_TOKEN is not set; `run` will refuse to start");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
