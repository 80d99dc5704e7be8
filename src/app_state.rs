use std::sync::Arc;

use crate::config::Config;
use crate::storage::ReportStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ReportStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = ReportStore::new(config.uploads_dir(), config.reports_dir());
        Self {
            config: Arc::new(config),
            store,
        }
    }
}
