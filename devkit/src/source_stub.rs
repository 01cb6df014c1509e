/*!
Source de statut simulée pour tester le kernel sans serveur ni fichiers

Sert un flux et une base en mémoire, enregistre chaque récupération et permet:
- d'injecter une panne sur le flux ou sur les métadonnées
- de remplacer le flux entre deux cycles
- de suspendre le prochain fetch du flux pour observer un cycle en cours
*/

use async_trait::async_trait;
use netmap_kernel::source::{FetchError, StatusSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCall {
    Feed,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Feed,
    Metadata,
}

pub struct MockStatusSource {
    feed: Mutex<Vec<u8>>,
    metadata: Mutex<Vec<u8>>,
    failure: Mutex<Option<Failure>>,
    calls: Mutex<Vec<FetchCall>>,
    hold_next_feed: AtomicBool,
    entered: Notify,
    release: Notify,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockStatusSource {
    pub fn new(feed: impl Into<Vec<u8>>, metadata: Vec<u8>) -> Self {
        Self {
            feed: Mutex::new(feed.into()),
            metadata: Mutex::new(metadata),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            hold_next_feed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn set_feed(&self, feed: impl Into<Vec<u8>>) {
        *lock(&self.feed) = feed.into();
    }

    pub fn set_metadata(&self, metadata: Vec<u8>) {
        *lock(&self.metadata) = metadata;
    }

    pub fn fail(&self, failure: Failure) {
        *lock(&self.failure) = Some(failure);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    pub fn feed_fetches(&self) -> usize {
        lock(&self.calls).iter().filter(|c| **c == FetchCall::Feed).count()
    }

    /// Le prochain fetch du flux attendra `release_feed`
    pub fn hold_next_feed(&self) {
        self.hold_next_feed.store(true, Ordering::SeqCst);
    }

    /// Rend la main une fois le fetch suspendu atteint
    pub async fn wait_until_held(&self) {
        self.entered.notified().await;
    }

    pub fn release_feed(&self) {
        self.release.notify_one();
    }

    fn failing(&self, call: FetchCall) -> Option<FetchError> {
        let failing = match (*lock(&self.failure), call) {
            (Some(Failure::Feed), FetchCall::Feed) => true,
            (Some(Failure::Metadata), FetchCall::Metadata) => true,
            _ => false,
        };
        failing.then(|| FetchError::Status {
            resource: format!("mock://{call:?}").to_lowercase(),
            status: 503,
        })
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    async fn fetch_feed(&self) -> Result<Vec<u8>, FetchError> {
        lock(&self.calls).push(FetchCall::Feed);
        if self.hold_next_feed.swap(false, Ordering::SeqCst) {
            log::debug!("⏸️  feed fetch held");
            self.entered.notify_one();
            self.release.notified().await;
        }
        if let Some(e) = self.failing(FetchCall::Feed) {
            return Err(e);
        }
        Ok(lock(&self.feed).clone())
    }

    async fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError> {
        lock(&self.calls).push(FetchCall::Metadata);
        if let Some(e) = self.failing(FetchCall::Metadata) {
            return Err(e);
        }
        Ok(lock(&self.metadata).clone())
    }
}
