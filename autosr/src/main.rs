use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use autosr::api::{ApiServer, ApiServerConfig, AppState};
use autosr::config::{Options, keys};
use autosr::downloader::Downloader;
use autosr::logging::init_logging;
use autosr::track::{
    DEFAULT_SHUTDOWN_GRACE, DrainOutcome, Poller, Recovery, Saver, Shutdown, TargetRegistry,
    TrackList,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::from_env();

    let (logging_config, log_guard) =
        init_logging(&options.get(keys::LOG_DIR)).context("initializing logging")?;
    info!(version = autosr::version(), "autosr starting");

    let shutdown = Shutdown::new();
    let ctx = shutdown.token();
    logging_config.start_retention_cleanup(ctx.clone());

    let modules = autosr::modules::builtin(&options).context("configuring modules")?;
    info!(hosts = ?modules.hosts(), "Modules ready");

    let saver = Saver::new(
        Downloader::from_options(&options).context("configuring downloader")?,
        Recovery::from_options(&options).context("configuring recovery")?,
        shutdown.clone(),
    );
    let registry = Arc::new(TargetRegistry::new(modules, Arc::new(saver)));

    let track_list = Arc::new(TrackList::from_options(&options, Arc::clone(&registry)));
    track_list
        .ensure_exists()
        .await
        .context("creating track list")?;
    track_list
        .reload(&ctx)
        .await
        .context("reading track list")?;
    if let Err(e) = track_list.watch(ctx.clone()) {
        warn!(error = %e, "Track list changes will not be picked up");
    }

    Poller::from_options(Arc::clone(&registry), &options)
        .context("configuring poller")?
        .spawn(ctx.clone());

    let api_config = ApiServerConfig::from_options(&options).context("configuring api")?;
    let state =
        AppState::new(ctx.clone(), Arc::clone(&registry)).with_logging_config(logging_config);
    let server = ApiServer::new(api_config, state);
    let api_ctx = ctx.clone();
    shutdown.spawn(async move {
        if let Err(e) = server.run(api_ctx).await {
            error!(error = %e, "API server stopped");
        }
    });

    wait_for_signal(&ctx).await;

    let grace = options
        .duration_secs(keys::SHUTDOWN_GRACE)
        .unwrap_or(DEFAULT_SHUTDOWN_GRACE);
    match shutdown.drain(grace).await {
        DrainOutcome::Drained => {
            info!("autosr stopped");
            Ok(())
        }
        DrainOutcome::TimedOut => {
            warn!("Forcing exit");
            drop(log_guard);
            std::process::exit(0);
        }
    }
}

/// Wait for Ctrl-C or SIGTERM, or for something else to cancel `ctx`.
async fn wait_for_signal(ctx: &CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = ctx.cancelled() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = ctx.cancelled() => {}
    }
}
