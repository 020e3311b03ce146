use std::sync::Arc;

use bagplane::{
    cli::Cli,
    observability::init_tracing,
    store::ConfigStore,
    watcher::{DirectoryWatcher, EventKind, WatchEvent},
    xds::{start_xds_server, SnapshotPublisher, XdsState},
    Result, APP_NAME, VERSION,
};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Cli::parse().into_settings();
    settings.validate()?;

    info!(
        app = APP_NAME,
        version = VERSION,
        directory = %settings.watch.directory.display(),
        xds = %settings.xds.bind_address(),
        "starting control plane"
    );

    let state = Arc::new(XdsState::new(settings.xds.node_id.clone()));
    let publisher = SnapshotPublisher::new(state.clone(), settings.add_http);
    let mut store = ConfigStore::new(settings.listeners.clone(), publisher);

    // Initial load of whatever is already on disk.
    let initial = WatchEvent::new(EventKind::Create, settings.watch.directory.clone());
    match store.apply(&initial) {
        Ok(version) => info!(version, files = store.tracked_files(), "initial snapshot published"),
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => warn!(error = %err, "initial load failed, serving empty snapshot"),
    }

    let (watcher, mut events) = DirectoryWatcher::new(&settings.watch.directory);
    let _watch_handle = watcher.run()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn({
        let state = state.clone();
        let bind_address = settings.xds.bind_address.clone();
        let port = settings.xds.port;
        async move {
            start_xds_server(state, &bind_address, port, async {
                let _ = shutdown_rx.await;
            })
            .await
        }
    });

    // Events are applied serially; the store is the single writer of the
    // snapshot, so no event can observe a half-applied sibling.
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => match store.apply(&event) {
                        Ok(version) => {
                            debug!(version, path = %event.path.display(), "event applied");
                        }
                        Err(err) if err.is_fatal() => {
                            error!(error = %err, "internal invariant violated, shutting down");
                            let _ = shutdown_tx.send(());
                            return Err(err);
                        }
                        Err(err) => {
                            warn!(error = %err, path = %event.path.display(), "event skipped");
                        }
                    },
                    None => {
                        warn!("watcher channel closed");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    if let Err(err) = store.clear() {
        warn!(error = %err, "failed to publish empty snapshot on shutdown");
    }

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "xds server task panicked");
            Ok(())
        }
    }
}
