/// Read-only product catalog
///
/// The catalog is produced by the offline tagging pipeline and loaded once at
/// startup. Nothing mutates a loaded `Catalog`; refreshing means loading a
/// new one and swapping it into the `CatalogHandle`.
pub mod snapshot;
pub mod store;

pub use snapshot::CatalogHandle;
pub use store::{Catalog, CatalogLoadError};
