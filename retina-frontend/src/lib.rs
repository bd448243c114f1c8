pub mod config;
pub mod handlers;
pub mod model;
pub mod services;
pub mod startup;

use config::Settings;
use model::ModelCache;
use services::Storage;
use std::sync::Arc;

/// Shared application state: settings, the model singleton and the upload archive.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub model: Arc<ModelCache>,
    pub archive: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(settings: Settings, model: Arc<ModelCache>, archive: Arc<dyn Storage>) -> Self {
        Self {
            settings: Arc::new(settings),
            model,
            archive,
        }
    }
}
