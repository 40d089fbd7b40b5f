//! Grafana sync daemon entrypoint.
//!
//! Loads declared objects from a manifest directory, starts one controller
//! per resource kind, and reconciles until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use grafana_sync::controller::Controller;
use grafana_sync::error::Result;
use grafana_sync::grafana::{GrafanaApi, GrafanaClient};
use grafana_sync::observe::{EventSink, LogEventSink, SyncMetrics};
use grafana_sync::resources::{DesiredObject, ResourceKind};
use grafana_sync::store::{
    diff_events, ManifestLoader, MemoryStore, ObjectStore, StatusWriter,
};
use grafana_sync::sync::{
    DashboardSyncer, DataSourceSyncer, FolderSyncer, NotificationChannelSyncer, SyncStrategy,
};

use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line options for the sync daemon.
#[derive(Parser, Debug)]
#[command(name = "grafana-sync", version, about = "Reconciles manifest-declared dashboards, datasources and folders into a Grafana server")]
struct Cli {
    /// Base URL of the Grafana server
    #[arg(long, default_value = "http://grafana")]
    grafana: String,

    /// Directory containing declared object manifests
    #[arg(long, default_value = "manifests")]
    manifests: PathBuf,

    /// Number of reconcile workers per resource kind
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Seconds between drift-correction passes (0 disables them)
    #[arg(long = "resync-delete", default_value_t = 30)]
    resync_delete: u64,

    /// Seconds between manifest directory rescans (0 disables them)
    #[arg(long, default_value_t = 10)]
    rescan: u64,

    /// Grafana API key, sent as a bearer token
    #[arg(long, env = "GRAFANA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Main entrypoint.
fn main() -> ExitCode {
    // Load .env before clap resolves env-backed arguments.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// One resource kind's store and controller, wired together.
struct KindRuntime {
    kind: ResourceKind,
    store: Arc<MemoryStore>,
    controller: Arc<Controller>,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let metrics = Arc::new(SyncMetrics::new());
    let events: Arc<dyn EventSink> = Arc::new(LogEventSink::new());
    let grafana: Arc<dyn GrafanaApi> = Arc::new(GrafanaClient::new(
        &cli.grafana,
        cli.api_key.clone(),
        Arc::clone(&metrics),
    )?);

    let kinds: Arc<Vec<KindRuntime>> = Arc::new(
        ResourceKind::ALL
            .iter()
            .map(|&kind| build_kind(kind, &grafana, &events, &metrics))
            .collect(),
    );

    // Initial full listing, then open the cache-sync gate.
    let loader = ManifestLoader::new(&cli.manifests);
    apply_loaded(&kinds, loader.load()?).await?;
    for runtime in kinds.iter() {
        runtime.store.mark_synced();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    spawn_rescan_loop(
        Arc::clone(&kinds),
        loader,
        Duration::from_secs(cli.rescan),
        shutdown_rx.clone(),
    );

    info!(
        grafana = %cli.grafana,
        workers = cli.workers,
        "Starting controllers"
    );

    let resync_interval = Duration::from_secs(cli.resync_delete);
    let mut tasks = JoinSet::new();
    for runtime in kinds.iter() {
        let controller = Arc::clone(&runtime.controller);
        let shutdown = shutdown_rx.clone();
        let workers = cli.workers;
        tasks.spawn(async move {
            controller.run(workers, resync_interval, shutdown).await;
        });
    }
    while tasks.join_next().await.is_some() {}

    info!(totals = %metrics.snapshot(), "Controllers stopped");
    Ok(())
}

/// Wires a store, strategy, and controller for one resource kind.
fn build_kind(
    kind: ResourceKind,
    grafana: &Arc<dyn GrafanaApi>,
    events: &Arc<dyn EventSink>,
    metrics: &Arc<SyncMetrics>,
) -> KindRuntime {
    let store = Arc::new(MemoryStore::new());
    let cache: Arc<dyn ObjectStore> = Arc::clone(&store) as _;
    let status: Arc<dyn StatusWriter> = Arc::clone(&store) as _;

    let strategy: Arc<dyn SyncStrategy> = match kind {
        ResourceKind::Dashboard => Arc::new(DashboardSyncer::new(
            Arc::clone(&cache),
            status,
            Arc::clone(grafana),
        )),
        ResourceKind::DataSource => Arc::new(DataSourceSyncer::new(
            Arc::clone(&cache),
            status,
            Arc::clone(grafana),
        )),
        ResourceKind::Folder => Arc::new(FolderSyncer::new(
            Arc::clone(&cache),
            status,
            Arc::clone(grafana),
        )),
        ResourceKind::AlertNotification => Arc::new(NotificationChannelSyncer::new(
            Arc::clone(&cache),
            status,
            Arc::clone(grafana),
        )),
    };

    let controller = Arc::new(Controller::new(
        strategy,
        cache,
        Arc::clone(events),
        Arc::clone(metrics),
    ));

    KindRuntime {
        kind,
        store,
        controller,
    }
}

/// Diffs freshly loaded objects into each kind's cache and enqueues the
/// resulting events.
async fn apply_loaded(kinds: &[KindRuntime], loaded: Vec<DesiredObject>) -> Result<()> {
    for runtime in kinds {
        let declared: Vec<DesiredObject> = loaded
            .iter()
            .filter(|obj| obj.kind == runtime.kind)
            .cloned()
            .collect();
        let current = runtime.store.list().await?;

        for event in diff_events(&current, declared) {
            runtime.store.apply(&event);
            runtime.controller.handle_event(&event);
        }
    }
    Ok(())
}

/// Periodically re-reads the manifest directory and feeds the diff into
/// the controllers.
///
/// A failed rescan is logged and skipped; the cache keeps its previous
/// contents rather than treating every object as deleted.
fn spawn_rescan_loop(
    kinds: Arc<Vec<KindRuntime>>,
    loader: ManifestLoader,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if interval.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The immediate first tick would duplicate the initial load.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let loaded = match loader.load() {
                        Ok(loaded) => loaded,
                        Err(err) => {
                            warn!(%err, "Manifest rescan failed, keeping previous state");
                            continue;
                        }
                    };
                    if let Err(err) = apply_loaded(&kinds, loaded).await {
                        warn!(%err, "Failed to apply rescanned manifests");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
