/*!
Test Harness pour le kernel NetMap

Facilite l'écriture de tests de bout en bout avec:
- Scheduler branché sur une MockStatusSource
- Cycles lancés à la main (sans minuterie) ou boucle réelle démarrée en tâche
- Assertions sur le snapshot publié (compteurs, verdicts, cohérence)
*/

use crate::source_stub::MockStatusSource;
use anyhow::{bail, Result};
use netmap_kernel::config::KernelConfig;
use netmap_kernel::views;
use netmap_kernel::{
    Scheduler, SchedulerControl, Snapshot, SnapshotHandle, SnapshotStore, Verdict, VerdictCounters,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TestHarness {
    pub source: Arc<MockStatusSource>,
    pub control: SchedulerControl,
    pub snapshots: SnapshotHandle,
    scheduler: Option<Scheduler<MockStatusSource>>,
    running: Option<JoinHandle<()>>,
}

impl TestHarness {
    pub fn new(feed: impl Into<Vec<u8>>, metadata: Vec<u8>) -> Self {
        Self::with_config(KernelConfig::default(), feed, metadata)
    }

    pub fn with_config(cfg: KernelConfig, feed: impl Into<Vec<u8>>, metadata: Vec<u8>) -> Self {
        env_logger::try_init().ok();

        let source = Arc::new(MockStatusSource::new(feed, metadata));
        let (scheduler, control) = Scheduler::new(source.clone(), SnapshotStore::new(), &cfg);
        let snapshots = scheduler.handle();
        Self {
            source,
            control,
            snapshots,
            scheduler: Some(scheduler),
            running: None,
        }
    }

    /// Un cycle complet ; renvoie la version publiée
    pub async fn cycle(&mut self) -> Result<u64> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            bail!("scheduler already running in background");
        };
        let version = scheduler.run_cycle().await?;
        log::info!("🔄 cycle published v{version}");
        Ok(version)
    }

    /// Démarre la boucle réelle (premier cycle immédiat)
    pub fn start(&mut self) -> Result<()> {
        let Some(scheduler) = self.scheduler.take() else {
            bail!("scheduler already running");
        };
        self.running = Some(tokio::spawn(scheduler.run()));
        log::info!("▶️  scheduler loop started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.control.shutdown();
        if let Some(task) = self.running.take() {
            tokio::time::timeout(Duration::from_secs(5), task).await??;
        }
        log::info!("⏹️  scheduler loop stopped");
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.snapshots.subscribe()
    }

    /// Attend la publication d'une version >= `version`
    pub async fn wait_for_version(&self, version: u64, timeout_ms: u64) -> Result<()> {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            rx.wait_for(|published| *published >= version),
        )
        .await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => bail!("snapshot store dropped before v{version}"),
            Err(_) => bail!("timeout waiting for snapshot v{version}"),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.get_snapshot()
    }

    pub fn summary_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(views::summary(&self.snapshot()))?)
    }

    pub fn assert_counters(&self, healthy: usize, unhealthy: usize, unknown: usize) -> Result<()> {
        let expected = VerdictCounters { healthy, unhealthy, unknown };
        let actual = self.snapshot().counters;
        if actual != expected {
            bail!("counters mismatch: expected {expected:?}, got {actual:?}");
        }
        Ok(())
    }

    pub fn assert_verdict(&self, key: &str, expected: Verdict) -> Result<()> {
        let actual = self.snapshot().verdict(key);
        if actual != expected {
            bail!("verdict mismatch for '{key}': expected {expected:?}, got {actual:?}");
        }
        Ok(())
    }

    pub fn assert_consistent(&self) -> Result<()> {
        let snapshot = self.snapshot();
        if !snapshot.is_consistent() {
            bail!("snapshot v{} is inconsistent", snapshot.version);
        }
        Ok(())
    }
}
