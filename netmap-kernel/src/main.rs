/**
 * NETMAP KERNEL - Point d'entrée du serveur
 *
 * RÔLE : Orchestration : config, scheduler de rafraîchissement, API REST,
 * publication MQTT optionnelle du résumé.
 *
 * ARCHITECTURE : une tâche scheduler (seul écrivain du snapshot), des lecteurs
 * qui ne voient qu'un SnapshotHandle.
 */

use netmap_kernel::health::HealthTracker;
use netmap_kernel::http::{self, AppState};
use netmap_kernel::{load_config, mqtt, ResourceSource, Scheduler, SnapshotStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    cfg.validate().context("invalid kernel configuration")?;
    info!("[kernel] feed={} metadata={}", cfg.feed, cfg.metadata);

    let source = Arc::new(ResourceSource::from_config(&cfg).context("cannot prepare status sources")?);
    let (scheduler, control) = Scheduler::new(source, SnapshotStore::new(), &cfg);
    let snapshots = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run());

    let health = HealthTracker::new();
    match cfg.mqtt.clone() {
        Some(mqtt_cfg) => mqtt::spawn_summary_publisher(snapshots.clone(), mqtt_cfg, health.clone()),
        None => info!("[kernel] no mqtt section, summary publisher disabled"),
    }

    let app_state = AppState {
        snapshots,
        scheduler: control.clone(),
        health,
        icons: cfg.icons.clone(),
        api_key: cfg.http.api_key.clone(),
    };
    if app_state.api_key.is_none() {
        warn!("[kernel] NETMAP_API_KEY not set - POST /refresh is open");
    }
    let app = http::build_router(app_state);

    let addr = cfg.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("[kernel] cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("http server failed")?;

    info!("[kernel] stopping scheduler");
    control.shutdown();
    scheduler_task.await.context("scheduler task panicked")?;
    Ok(())
}
