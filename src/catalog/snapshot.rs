use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::store::{Catalog, CatalogLoadError};

/// Shared pointer to the current catalog snapshot
///
/// Readers clone the inner `Arc` and keep using it for the rest of their
/// request, so a reload never changes the data under an in-flight
/// recommendation. Reloads build the new catalog completely before swapping.
#[derive(Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Returns the snapshot in effect right now
    pub async fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().await.clone()
    }

    /// Loads `path` and swaps it in; on failure the previous snapshot stays active
    pub async fn reload(&self, path: &Path) -> Result<Arc<Catalog>, CatalogLoadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CatalogLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let fresh = Arc::new(Catalog::parse(&bytes, path)?);

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, fresh.clone())
        };

        tracing::info!(
            previous_products = previous.len(),
            products = fresh.len(),
            "Catalog snapshot swapped"
        );

        Ok(fresh)
    }
}
