/*!
NETMAP KERNEL - Moteur d'agrégation de l'état réseau du campus

Chaîne d'un cycle : flux -> parseur -> index par bâtiment + lignes en erreur ->
verdict par bâtiment -> snapshot -> publication (HTTP, MQTT, vues).
*/

pub mod config;
pub mod feed;
pub mod health;
pub mod http;
pub mod index;
pub mod metadata;
pub mod models;
pub mod mqtt;
pub mod publish;
pub mod resolver;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod views;

pub use config::{load_config, KernelConfig};
pub use feed::{FeedParser, ParseResult};
pub use index::LocationIndex;
pub use models::{DeviceRecord, DeviceStatus, RawRow, Site, Verdict};
pub use publish::{SnapshotHandle, SnapshotStore};
pub use scheduler::{CycleError, Phase, Scheduler, SchedulerControl, TriggerOutcome};
pub use snapshot::{Snapshot, VerdictCounters};
pub use source::{FetchError, ResourceSource, StatusSource};
