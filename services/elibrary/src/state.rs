//! services/elibrary/src/state.rs
//!
//! Defines the application state: every adapter wired together once at
//! startup and shared by the front end.

use crate::adapters::{
    DemoSeed, FileStorage, HttpClient, HttpLibrary, LocalFallbackStore, NoSeed, TokenStore,
};
use crate::config::Config;
use crate::error::ClientError;
use crate::session::Session;
use crate::sync::{Outbox, Reconciler, SyncedLibrary};
use elibrary_core::ports::{KeyValueStorage, LibraryService, SeedProvider};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared By The Whole Front End)
//=========================================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<Session>,
    pub library: Arc<SyncedLibrary>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Production wiring: file-backed storage and the REST backend.
    pub fn from_config(config: Arc<Config>) -> Result<Self, ClientError> {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::open(&config.data_dir)?);
        let session = Arc::new(Session::restore(TokenStore::new(storage.clone())));
        let http = HttpClient::new(&config.api_base(), session.clone())?;
        let remote: Arc<dyn LibraryService> = Arc::new(HttpLibrary::new(http));
        Ok(Self::assemble(config, storage, session, remote))
    }

    /// Wires the synchronization layer around an arbitrary backend and storage.
    pub fn assemble(
        config: Arc<Config>,
        storage: Arc<dyn KeyValueStorage>,
        session: Arc<Session>,
        remote: Arc<dyn LibraryService>,
    ) -> Self {
        let seed: Arc<dyn SeedProvider> = if config.demo_seed {
            Arc::new(DemoSeed)
        } else {
            Arc::new(NoSeed)
        };
        let local = Arc::new(LocalFallbackStore::new(storage.clone(), seed));
        let outbox = Arc::new(Outbox::new(storage));

        let library = Arc::new(
            SyncedLibrary::new(remote.clone(), local.clone(), outbox.clone(), session.clone())
                .with_demo_auth(config.demo_auth),
        );
        let reconciler = Arc::new(Reconciler::new(
            remote,
            local,
            outbox,
            config.sync_max_attempts,
        ));

        Self {
            config,
            session,
            library,
            reconciler,
        }
    }

    /// Starts periodic reconciliation unless it is disabled in the configuration.
    pub fn start_background_sync(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.config
            .sync_interval
            .map(|every| self.reconciler.clone().spawn(every, cancel))
    }
}
