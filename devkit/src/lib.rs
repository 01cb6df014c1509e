/*!
# NetMap DevKit - Sources simulées et utilitaires de test

Bibliothèque facilitant les tests du kernel NetMap avec:
- Source de statut en mémoire (pannes injectables, fetch suspendable)
- Constructeurs de flux CSV et de bases BuildingInfo
- Harness pilotant des cycles de rafraîchissement complets
*/

pub mod fixtures;
pub mod source_stub;
pub mod test_utils;

pub use fixtures::{FeedBuilder, MetadataBuilder};
pub use source_stub::{Failure, FetchCall, MockStatusSource};
pub use test_utils::TestHarness;

#[cfg(test)]
mod e2e;
