//! Test fixture for ClinicSync integration tests
//!
//! Every fixture owns its own store, so tests can run in parallel.

use clinicsync::{
    create_durable_store, CacheConfig, CachePersister, CacheStore, DurableStore,
    MutationCoordinator, QueryExecutor, StorageType,
};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct SyncFixture {
    pub store: Arc<CacheStore>,
    pub executor: QueryExecutor,
    pub coordinator: MutationCoordinator,
}

impl SyncFixture {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::testing())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        init_logging();
        let store = Arc::new(CacheStore::new(config));
        let executor = QueryExecutor::new(store.clone());
        let coordinator = MutationCoordinator::with_clinic_defaults(executor.clone());
        Self {
            store,
            executor,
            coordinator,
        }
    }
}

/// Sled-backed persister in a temporary directory
///
/// The sled database is opened once and shared by every store the test
/// opens, so a simulated restart never races sled's directory lock.
pub struct PersistenceFixture {
    pub dir: tempfile::TempDir,
    durable: Arc<dyn DurableStore>,
}

impl PersistenceFixture {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let durable = create_durable_store(StorageType::Sled, dir.path().join("query-cache"))?;
        Ok(Self {
            dir,
            durable: Arc::from(durable),
        })
    }

    pub fn config(&self, buster: &str) -> CacheConfig {
        let mut config = CacheConfig::testing();
        config.persistence.storage_type = StorageType::Sled;
        config.persistence.path = Some(self.dir.path().join("query-cache"));
        config.persistence.buster = buster.to_string();
        config
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    /// A fresh, empty store with a persister over the shared database
    pub fn open(&self, buster: &str) -> Result<(Arc<CacheStore>, CachePersister), Box<dyn std::error::Error>> {
        let store = Arc::new(CacheStore::new(self.config(buster)));
        let persister = CachePersister::new(store.clone(), self.durable.clone());
        Ok((store, persister))
    }
}
