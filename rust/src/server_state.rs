use std::sync::Arc;

use crate::backends::{FileStorage, PostDatabase, PostgresBackend, S3Storage, SessionResolver};

pub mod config;

pub use config::Config;

/// Everything a request handler might need. Cheap to clone, it's all behind Arcs.
#[derive(Clone)]
pub struct ServerState {
    pub db: Arc<dyn PostDatabase>,
    pub sessions: Arc<dyn SessionResolver>,
    pub storage: Arc<dyn FileStorage>,
    pub config: Arc<Config>,
}

impl ServerState {
    pub fn new(
        db: Arc<dyn PostDatabase>,
        sessions: Arc<dyn SessionResolver>,
        storage: Arc<dyn FileStorage>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            sessions,
            storage,
            config,
        }
    }

    /// Returns a ServerState wired to Postgres and S3. Sessions are read from the same database.
    pub async fn initialize(config: Config, backend: PostgresBackend) -> Self {
        let config = Arc::new(config);
        let storage = S3Storage::new(config.clone()).await;
        let backend = Arc::new(backend);

        Self::new(backend.clone(), backend, Arc::new(storage), config)
    }
}
