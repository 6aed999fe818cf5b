use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::ResultStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub results: ResultStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let results = ResultStore::new(config.server.max_sessions);
        Self {
            config: Arc::new(config),
            results,
        }
    }
}
