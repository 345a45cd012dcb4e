use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod alias;
mod config;
mod dashboard;
mod fuzzy;
mod matches;
mod providers;
mod sc2;

use alias::AliasTable;
use config::Config;
use dashboard::AppState;
use matches::{store, SharedRegistry};
use providers::{AlphaTlProvider, CustomProvider, ProviderRegistry};
use sc2::input::{
    CommandInjector, CommandScreenReader, NoopInjector, NoopOrderDetector, TextOrderDetector,
};
use sc2::monitor::MonitorHandle;
use sc2::{start_game_monitor, HttpGameClient, InputInjector, OrderDetector, ScoreReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let mut registry = store::load(&config.state_file);
    let aliases = AliasTable::load(&config.alias_file);

    let mut providers = ProviderRegistry::default();
    providers.register(Arc::new(CustomProvider));
    providers.register(Arc::new(AlphaTlProvider::new(None)?));

    if let Some(url) = &config.match_url {
        match providers.grab_url(url).await {
            Ok(grabbed) => {
                if let Some(m) = registry.active_mut() {
                    grabbed.apply(m, &aliases);
                    info!(
                        "Grabbed {} vs {} ({})",
                        m.team_or_player(0).unwrap_or_default(),
                        m.team_or_player(1).unwrap_or_default(),
                        m.league()
                    );
                }
            }
            Err(e) => warn!("Could not grab {}: {}", url, e),
        }
    }

    if let Some(m) = registry.active_mut() {
        if m.auto_detect_my_side(&config.my_teams) {
            info!("Casting for side {}", m.my_side());
        }
    }

    let registry = registry.into_shared();
    let cancel = CancellationToken::new();
    let tasks = config.task_flags();

    let persist_task = tokio::spawn(persist_changes(
        registry.clone(),
        config.state_file.clone(),
        cancel.clone(),
    ));

    // Game client monitor feeding the reconciler
    let client = HttpGameClient::new(
        &config.game_client_url,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let MonitorHandle {
        events,
        state: monitor_state,
        task: monitor_task,
    } = start_game_monitor(
        Arc::new(client),
        config.monitor_settings(),
        tasks.clone(),
        cancel.clone(),
    );

    let injector: Arc<dyn InputInjector> = match &config.keystroke_command {
        Some(program) => Arc::new(CommandInjector::new(program, config.focus_command.as_deref())),
        None => Arc::new(NoopInjector),
    };
    let detector: Arc<dyn OrderDetector> = match &config.ocr_command {
        Some(program) => Arc::new(TextOrderDetector::new(CommandScreenReader::new(program))),
        None => Arc::new(NoopOrderDetector),
    };
    let matcher = config.player_matcher(aliases).into_shared();
    let reconciler = ScoreReconciler::new(
        registry.clone(),
        matcher.clone(),
        injector,
        detector,
        config.reconciler_settings(tasks.clone()),
        cancel.clone(),
    );
    let reconciler_task = tokio::spawn(reconciler.run(events));

    // Start the status API
    let app = dashboard::router(AppState {
        registry: registry.clone(),
        matcher,
        alias_file: config.alias_file.clone(),
        monitor_state,
        tasks: tasks.clone(),
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Status API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    cancel.cancel();
    tasks.stop_all();
    for (name, task) in [
        ("monitor", monitor_task),
        ("reconciler", reconciler_task),
        ("persistence", persist_task),
    ] {
        if let Err(e) = task.await {
            warn!("{} task failed: {}", name, e);
        }
    }

    store::save(&config.state_file, &*registry.read().await)?;
    info!("Match state saved to {}", config.state_file.display());
    Ok(())
}

/// Save the registry whenever the active match reports a change.
async fn persist_changes(registry: SharedRegistry, path: PathBuf, cancel: CancellationToken) {
    let mut changes = registry.read().await.subscribe();
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            res = changes.recv() => res,
        };
        match received {
            Ok(change) => debug!("Match changed: {:?}", change),
            Err(RecvError::Lagged(n)) => debug!("Missed {} change notification(s)", n),
            Err(RecvError::Closed) => break,
        }
        // Coalesce a burst into one write.
        while changes.try_recv().is_ok() {}

        let doc = registry.read().await.to_document();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || store::write_document(&target, &doc)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to save match state: {:#}", e),
            Err(e) => warn!("Save task failed: {}", e),
        }
    }
}
