pub mod appresult;
pub mod auth;
pub mod broker;
pub mod codec;
pub mod config;
pub mod db;
pub mod hydrate;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

pub use appresult::{AppError, AppResult};

use broker::{Broker, LocalBroker};
use config::Config;
use hydrate::Hydrator;
use store::{SqliteStore, Store};

/// Everything a chat operation needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn Broker>,
    hydrator: Hydrator,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> Self {
        Self {
            hydrator: Hydrator::new(store.clone()),
            store,
            broker,
        }
    }

    /// SQLite storage plus an in-process broker, both sized from `config`.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let store = SqliteStore::connect(config)
            .await
            .map_err(|err| AppError::Storage(err.into()))?;

        tracing::info!(database_url = %config.database_url, "storage ready");
        Ok(Self::new(
            Arc::new(store),
            Arc::new(LocalBroker::new(config.broker_capacity)),
        ))
    }

    pub fn hydrator(&self) -> &Hydrator {
        &self.hydrator
    }
}
