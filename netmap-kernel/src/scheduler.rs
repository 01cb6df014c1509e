/*!
SCHEDULER DE RAFRAÎCHISSEMENT - Machine à états des cycles

RÔLE :
Récupère périodiquement flux et métadonnées, reconstruit un snapshot complet
et le publie d'un seul échange atomique.

FONCTIONNEMENT :
- Phases : Idle -> Fetching -> Resolving -> Published -> Idle
- Un cycle au démarrage, puis à chaque fin de compte à rebours ou déclenchement manuel
- Les cycles sont strictement sérialisés : une seule tâche, un cycle à la fois
- Déclenchement manuel accepté seulement en Idle (il écourte le compte à rebours),
  ignoré pendant un cycle en cours
- Échec de récupération, flux illisible ou base mal formée : cycle abandonné,
  snapshot précédent conservé, nouvel essai au prochain tick

UTILITÉ :
🎯 Seul écrivain du SnapshotStore
🎯 Fournit l'état du compte à rebours ("Next update in")
*/

use crate::config::KernelConfig;
use crate::feed::{FeedError, FeedParser};
use crate::metadata::{self, MetadataError};
use crate::publish::{SnapshotHandle, SnapshotStore};
use crate::snapshot::Snapshot;
use crate::source::{FetchError, StatusSource};
use crate::state::{new_state, Shared};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Fetching,
    Resolving,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    Accepted,
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("feed rejected: {0}")]
    Feed(#[from] FeedError),
    #[error("metadata rejected: {0}")]
    Metadata(#[from] MetadataError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: Phase,
    pub interval_secs: u64,
    /// None avant la fin du premier cycle ou pendant un cycle
    pub seconds_until_next: Option<u64>,
    pub countdown: Option<String>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_version: u64,
}

#[derive(Debug)]
struct CycleState {
    phase: Phase,
    next_due: Option<Instant>,
    cycles_completed: u64,
    cycles_failed: u64,
    consecutive_failures: u64,
    last_error: Option<String>,
    last_version: u64,
}

impl CycleState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_due: None,
            cycles_completed: 0,
            cycles_failed: 0,
            consecutive_failures: 0,
            last_error: None,
            last_version: 0,
        }
    }
}

pub struct Scheduler<S> {
    source: Arc<S>,
    store: SnapshotStore,
    parser: FeedParser,
    interval: Duration,
    state: Shared<CycleState>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown: Arc<Notify>,
}

/// Poignée clonable : déclenchement manuel, état, arrêt
#[derive(Clone)]
pub struct SchedulerControl {
    state: Shared<CycleState>,
    trigger_tx: mpsc::Sender<()>,
    shutdown: Arc<Notify>,
    interval: Duration,
}

impl<S: StatusSource> Scheduler<S> {
    pub fn new(source: Arc<S>, store: SnapshotStore, cfg: &KernelConfig) -> (Self, SchedulerControl) {
        // capacité 1 : plusieurs clics pendant le compte à rebours ne valent qu'un cycle
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let state = new_state(CycleState::new());
        let shutdown = Arc::new(Notify::new());
        let interval = cfg.refresh_interval();

        let control = SchedulerControl {
            state: state.clone(),
            trigger_tx,
            shutdown: shutdown.clone(),
            interval,
        };
        let scheduler = Self {
            source,
            store,
            parser: FeedParser::new(&cfg.rules),
            interval,
            state,
            trigger_rx,
            shutdown,
        };
        (scheduler, control)
    }

    pub fn handle(&self) -> SnapshotHandle {
        self.store.handle()
    }

    /// Boucle principale, jusqu'à `SchedulerControl::shutdown`
    pub async fn run(mut self) {
        info!("[scheduler] started, refresh every {}s", self.interval.as_secs());
        loop {
            // l'erreur est déjà journalisée et conservée dans l'état
            let _ = self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    debug!("[scheduler] countdown elapsed");
                }
                Some(()) = self.trigger_rx.recv() => {
                    info!("[scheduler] manual refresh");
                }
                _ = self.shutdown.notified() => {
                    info!("[scheduler] shutting down");
                    break;
                }
            }
        }
    }

    /// Un cycle complet, indépendant des minuteries
    pub async fn run_cycle(&mut self) -> Result<u64, CycleError> {
        let cycle_id = Uuid::new_v4();
        self.set_phase(Phase::Fetching);
        // déclenchements arrivés pendant la transition vers Fetching : absorbés par ce cycle
        while self.trigger_rx.try_recv().is_ok() {}

        let result = self.cycle(cycle_id).await;

        let mut st = self.state.lock();
        match &result {
            Ok(version) => {
                st.cycles_completed += 1;
                st.consecutive_failures = 0;
                st.last_error = None;
                st.last_version = *version;
            }
            Err(e) => {
                st.cycles_failed += 1;
                st.consecutive_failures += 1;
                st.last_error = Some(e.to_string());
                warn!(
                    "[scheduler] cycle {cycle_id} failed: {e}, keeping snapshot v{}",
                    st.last_version
                );
            }
        }
        st.phase = Phase::Idle;
        st.next_due = Some(Instant::now() + self.interval);
        result
    }

    async fn cycle(&self, cycle_id: Uuid) -> Result<u64, CycleError> {
        let feed = self.source.fetch_feed().await?;
        let meta = self.source.fetch_metadata().await?;

        self.set_phase(Phase::Resolving);
        let parsed = self.parser.parse(feed.as_slice())?;
        let sites = metadata::load_sites(&meta)?;
        let snapshot = Snapshot::build(parsed, &sites, cycle_id);
        let (locations, errors) = (snapshot.locations.len(), snapshot.errors.len());
        let counters = snapshot.counters;

        let version = self.store.replace(snapshot);
        self.set_phase(Phase::Published);
        info!(
            "[scheduler] published v{version}: {locations} locations ({} healthy, {} unhealthy, {} unknown), {errors} malformed rows",
            counters.healthy, counters.unhealthy, counters.unknown
        );
        Ok(version)
    }

    fn set_phase(&self, phase: Phase) {
        let mut st = self.state.lock();
        st.phase = phase;
        if phase != Phase::Idle {
            st.next_due = None;
        }
    }
}

impl SchedulerControl {
    pub fn trigger(&self) -> TriggerOutcome {
        // verrou tenu pendant l'envoi : le scheduler ne peut pas quitter Idle entre-temps
        let st = self.state.lock();
        if st.phase != Phase::Idle {
            debug!("[scheduler] manual refresh ignored during {:?}", st.phase);
            return TriggerOutcome::Ignored;
        }
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => TriggerOutcome::Accepted,
            Err(TrySendError::Closed(())) => TriggerOutcome::Ignored,
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let st = self.state.lock();
        let seconds_until_next = st
            .next_due
            .map(|due| due.saturating_duration_since(Instant::now()).as_secs());
        SchedulerStatus {
            phase: st.phase,
            interval_secs: self.interval.as_secs(),
            seconds_until_next,
            countdown: seconds_until_next.map(countdown_label),
            cycles_completed: st.cycles_completed,
            cycles_failed: st.cycles_failed,
            consecutive_failures: st.consecutive_failures,
            last_error: st.last_error.clone(),
            last_version: st.last_version,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Arrêt après le cycle en cours
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

pub fn countdown_label(seconds: u64) -> String {
    format!("Next update in: {seconds} seconds")
}
