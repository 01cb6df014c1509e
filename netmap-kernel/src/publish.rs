/*!
PUBLICATION DU SNAPSHOT - Accès en lecture seule + notification de changement

RÔLE :
Détient l'unique snapshot courant. Le scheduler est le seul écrivain (SnapshotStore),
les vues, l'API HTTP et le publieur MQTT ne voient qu'un SnapshotHandle.

FONCTIONNEMENT :
- RwLock<Arc<Snapshot>> : un lecteur clone l'Arc sous verrou puis relâche aussitôt,
  il garde l'ancien snapshot entier même si un remplacement survient entre-temps
- `replace` attribue la version suivante, échange l'Arc, puis notifie une seule fois
  via un canal watch portant la version publiée
- Jamais de verrou tenu au travers d'un `.await`
*/

use crate::snapshot::Snapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub struct SnapshotStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
    notifier: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(0);
        Self {
            current: Arc::new(RwLock::new(Arc::new(Snapshot::empty()))),
            notifier,
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Échange atomique ; renvoie la version attribuée
    pub fn replace(&self, mut snapshot: Snapshot) -> u64 {
        let version = {
            let mut slot = self.current.write();
            snapshot.version = slot.version + 1;
            let version = snapshot.version;
            *slot = Arc::new(snapshot);
            version
        };
        self.notifier.send_replace(version);
        debug!("[publish] snapshot v{version} is now current");
        version
    }

    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            current: self.current.clone(),
            versions: self.notifier.subscribe(),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Vue lecture seule, clonable à volonté
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<RwLock<Arc<Snapshot>>>,
    versions: watch::Receiver<u64>,
}

impl SnapshotHandle {
    pub fn get_snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Récepteur notifié à chaque publication (valeur = version publiée)
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        let mut rx = self.versions.clone();
        rx.mark_unchanged();
        rx
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }
}
