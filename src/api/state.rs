use std::path::PathBuf;
use std::sync::Arc;

use crate::{catalog::CatalogHandle, services::RecommendationEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogHandle,
    pub engine: Arc<RecommendationEngine>,
    /// Source re-read by the reload endpoint
    pub catalog_path: PathBuf,
}

impl AppState {
    pub fn new(catalog: CatalogHandle, engine: RecommendationEngine, catalog_path: PathBuf) -> Self {
        Self {
            catalog,
            engine: Arc::new(engine),
            catalog_path,
        }
    }
}
