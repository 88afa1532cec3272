pub mod account;
pub mod config;
pub mod controller;
pub mod host;
pub mod models;
pub mod navigation;
pub mod reporter;
pub mod storage;
pub mod tracking;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use log::warn;

pub use account::{AccountService, SyncReport};
pub use config::TrackerConfig;
pub use controller::TrackerController;
pub use host::{PageDetails, PlayerHost};
pub use navigation::{NavigationTrigger, VideoRef};
pub use reporter::{HttpGateway, NetworkGateway, ReportOutcome};
pub use storage::LocalStore;
pub use tracking::{RandomSource, ThreadRandom};

/// Shared services for one browser profile: the local store, the backend
/// gateway and the account flows built on them.
#[derive(Clone)]
pub struct App {
    pub config: Arc<TrackerConfig>,
    pub store: LocalStore,
    pub gateway: Arc<dyn NetworkGateway>,
    pub accounts: AccountService,
}

impl App {
    /// Opens the store and backend described by `config`. Without a
    /// configured `db_path` the store lives in memory.
    pub fn bootstrap(config: TrackerConfig) -> Result<Self> {
        init_logging(&config);
        log::info!("certiflex starting, backend {}", config.api_base);

        let store = match &config.db_path {
            Some(path) => LocalStore::open(path.clone())?,
            None => {
                warn!("no db_path configured, progress will not survive restarts");
                LocalStore::open_in_memory()?
            }
        };

        let gateway: Arc<dyn NetworkGateway> = Arc::new(HttpGateway::from_config(&config)?);
        let accounts = AccountService::new(gateway.clone(), store.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            gateway,
            accounts,
        })
    }

    /// Starts a tracker for one page. Must be called inside a tokio runtime.
    pub fn attach(&self, host: Arc<dyn PlayerHost>) -> TrackerController {
        TrackerController::start(
            (*self.config).clone(),
            host,
            self.gateway.clone(),
            self.store.clone(),
            Box::new(ThreadRandom),
        )
    }
}

pub fn init_logging(config: &TrackerConfig) {
    utils::logging::init(config.debug);
}
