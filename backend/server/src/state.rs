use std::sync::Arc;

use super::{config::Config, database::MongoStore, store::ResponseStore};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn ResponseStore>,
}

impl State {
    /// State backed by MongoDB. No connection is opened here; the store
    /// connects on the first request.
    pub fn new(config: Config) -> Arc<Self> {
        let store = Arc::new(MongoStore::new(&config));

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn ResponseStore>) -> Arc<Self> {
        Arc::new(Self { config, store })
    }
}
