//! # Memorial Lights Server
//!
//! Runs the three long-lived tasks of the controller against one registry:
//! the UDP ingestion listener, the calendar scheduler and the HTTP API.
//! Ctrl-C or SIGTERM broadcasts a shutdown signal to all of them.

use anyhow::{Context, Result};
use lib_memorial::{
    CalendarScheduler, CommandTransport, DeviceService, IngestionListener, JsonFileStore, Registry,
    SnapshotStore, UdpBroadcaster,
};
use std::sync::Arc;
use tokio::signal;

mod memorial_logic;
use memorial_logic::{config, http, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config();
    let log_path = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!("Logging to {}", log_path.display());
    log::debug!("Settings: {:?}", settings);

    let file_store = JsonFileStore::new(&settings.store_path);
    let store_path = file_store.path().to_path_buf();
    let store: Arc<dyn SnapshotStore> = Arc::new(file_store);
    let registry = Arc::new(
        Registry::open(store).with_context(|| format!("opening device store {}", store_path.display()))?,
    );
    log::info!("Loaded {} device(s) from {}", registry.len().await, store_path.display());
    let transport: Arc<dyn CommandTransport> = Arc::new(UdpBroadcaster::new(settings.broadcast_target()));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let listener = IngestionListener::new(registry.clone(), settings.listen_addr())
        .with_buffer_size(settings.recv_buffer_size);
    let listener_handle = tokio::spawn({
        let shutdown = shutdown_tx.subscribe();
        async move { listener.run(shutdown).await }
    });

    let scheduler = CalendarScheduler::new(registry.clone(), transport.clone())
        .with_interval(settings.scheduler_interval);
    log::debug!("Scheduler interval {:?}", scheduler.interval());
    let scheduler_handle = tokio::spawn({
        let shutdown = shutdown_tx.subscribe();
        async move { scheduler.run(shutdown).await }
    });

    let service = DeviceService::new(registry, transport);
    let mut http_handle = tokio::spawn(http::run(settings.http_addr(), service, shutdown_tx.subscribe()));
    let mut http_result = None;

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
        res = &mut http_handle => {
            log::error!("HTTP API exited early, initiating shutdown.");
            http_result = Some(res);
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let (listener_res, scheduler_res) = tokio::join!(listener_handle, scheduler_handle);
    let http_res = match http_result {
        Some(res) => res,
        None => http_handle.await,
    };
    listener_res?;
    scheduler_res?;
    http_res??;

    log::info!("Shutdown complete.");
    Ok(())
}
