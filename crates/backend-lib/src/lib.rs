// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Matchmaking and match lifecycle backend for anonymous one-to-one chat.

pub mod auth;
pub mod chats;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod leave;
pub mod lifecycle;
pub mod metrics;
pub mod queue;
pub mod router;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod validation;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::{IdentityProvider, TokenIdentityProvider};
use crate::chats::ChatSessionStore;
use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::engine::Matchmaker;
use crate::leave::LeaveHandler;
use crate::lifecycle::MatchLifecycle;
use crate::queue::QueueStore;
use crate::service::RouletteService;
use crate::store::{DocumentStore, KeyedStore, MemoryDocumentStore, MemoryKeyedStore};
use crate::sweeper::CleanupSweeper;

/// Application state shared across all handlers and background tasks
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Bearer token verification
    pub identity: Arc<dyn IdentityProvider>,
    pub queue: QueueStore,
    pub lifecycle: Arc<MatchLifecycle>,
    pub chats: Arc<ChatSessionStore>,
    pub matchmaker: Arc<Matchmaker>,
    pub leave: Arc<LeaveHandler>,
    pub sweeper: Arc<CleanupSweeper>,
    /// Caller-facing operations
    pub service: Arc<RouletteService>,
}

impl AppState {
    /// State backed by the in-process stores
    pub fn new(settings: Settings) -> Self {
        let keyed = Arc::new(MemoryKeyedStore::new(settings.matching.event_buffer));
        let docs = Arc::new(MemoryDocumentStore::new());
        Self::with_stores(settings, keyed, docs)
    }

    /// Wire every component over the given stores
    pub fn with_stores(
        settings: Settings,
        keyed: Arc<dyn KeyedStore>,
        docs: Arc<dyn DocumentStore>,
    ) -> Self {
        let queue = QueueStore::new(keyed.clone());
        let chats = Arc::new(ChatSessionStore::new(docs, settings.chat.clone()));
        let lifecycle = Arc::new(MatchLifecycle::new(
            keyed,
            chats.clone(),
            settings.chat.clone(),
        ));
        let matchmaker = Arc::new(Matchmaker::new(
            queue.clone(),
            lifecycle.clone(),
            settings.matching.max_age_gap,
        ));
        let leave = Arc::new(LeaveHandler::new(
            queue.clone(),
            lifecycle.clone(),
            chats.clone(),
        ));
        let sweeper = Arc::new(CleanupSweeper::new(
            queue.clone(),
            leave.clone(),
            settings.cleanup.queue_ttl(),
            settings.cleanup.interval(),
        ));
        let service = Arc::new(RouletteService::new(
            queue.clone(),
            lifecycle.clone(),
            chats.clone(),
            leave.clone(),
        ));
        let identity = Arc::new(TokenIdentityProvider::new(settings.identity.token_ttl()));

        Self {
            settings: Arc::new(settings),
            identity,
            queue,
            lifecycle,
            chats,
            matchmaker,
            leave,
            sweeper,
            service,
        }
    }

    /// Start the event dispatcher, the queue sweeper and token expiry.
    ///
    /// The dispatcher subscribes to the queue feed here; writes made before
    /// this call do not trigger matching.
    pub fn spawn_background(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let dispatcher = Dispatcher::new(
            self.matchmaker.clone(),
            self.leave.clone(),
            self.settings.matching.partitions,
        );
        let mut handles = dispatcher.spawn(self.queue.subscribe(), shutdown.clone());
        handles.push(tokio::spawn(self.sweeper.clone().run(shutdown.clone())));
        handles.push(tokio::spawn(expire_tokens(
            self.identity.clone(),
            self.settings.cleanup.interval(),
            shutdown,
        )));

        info!(
            partitions = self.settings.matching.partitions,
            sweep_secs = self.settings.cleanup.interval_secs,
            "background tasks started"
        );
        handles
    }
}

async fn expire_tokens(
    identity: Arc<dyn IdentityProvider>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let purged = identity.purge_expired().await;
                if purged > 0 {
                    debug!(purged, "expired identity tokens dropped");
                }
            },
        }
    }
}
