use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::models::{normalize_tag, Product, ProductId};

/// Why a catalog file could not become a snapshot
#[derive(thiserror::Error, Debug)]
pub enum CatalogLoadError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog {path} is not a JSON array of products: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog record #{index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("duplicate product id `{0}` in catalog")]
    DuplicateId(ProductId),
}

/// Immutable, indexed set of tagged products
#[derive(Debug)]
pub struct Catalog {
    products: Vec<Product>,
    index: HashMap<ProductId, usize>,
    loaded_at: DateTime<Utc>,
}

impl Catalog {
    /// Reads and validates a catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CatalogLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes, path)
    }

    /// Parses raw catalog JSON; `path` is only used in error messages
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, CatalogLoadError> {
        let records: Vec<serde_json::Value> =
            serde_json::from_slice(bytes).map_err(|source| CatalogLoadError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let products = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::from_value::<Product>(record).map_err(|e| {
                    CatalogLoadError::InvalidRecord {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = Self::from_products(products)?;

        tracing::info!(
            path = %path.display(),
            products = catalog.len(),
            "Catalog loaded"
        );

        Ok(catalog)
    }

    /// Builds a catalog from already deserialized products, enforcing record invariants
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogLoadError> {
        let mut index = HashMap::with_capacity(products.len());
        let mut normalized = Vec::with_capacity(products.len());

        let mut derived = 0usize;

        for (position, mut product) in products.into_iter().enumerate() {
            if product.id.is_blank() {
                product.id =
                    ProductId::derive(product.name.as_deref(), &product.category, &product.color);
                derived += 1;
            }
            if product.price < Decimal::ZERO {
                return Err(CatalogLoadError::InvalidRecord {
                    index: position,
                    reason: format!("negative price {} for `{}`", product.price, product.id),
                });
            }
            if index.insert(product.id.clone(), position).is_some() {
                return Err(CatalogLoadError::DuplicateId(product.id));
            }

            product.occasion_tags = dedup_tags(&product.occasion_tags);
            product.style_tags = dedup_tags(&product.style_tags);
            normalized.push(product);
        }

        if derived > 0 {
            tracing::debug!(derived, "Derived ids for records without one");
        }

        Ok(Self {
            products: normalized,
            index,
            loaded_at: Utc::now(),
        })
    }

    pub fn lookup(&self, id: &str) -> Option<&Product> {
        self.index.get(id).map(|&position| &self.products[position])
    }

    /// All products in file order
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn occasion_vocabulary(&self) -> Vec<String> {
        self.collect(|p| p.occasion_tags.clone())
    }

    pub fn style_vocabulary(&self) -> Vec<String> {
        self.collect(|p| p.style_tags.clone())
    }

    pub fn genders(&self) -> Vec<String> {
        self.collect(|p| vec![p.gender.clone()])
    }

    pub fn categories(&self) -> Vec<String> {
        self.collect(|p| vec![p.category.clone()])
    }

    fn collect(&self, field: impl Fn(&Product) -> Vec<String>) -> Vec<String> {
        self.products
            .iter()
            .flat_map(field)
            .filter(|value| !value.starts_with("unspecified"))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// Tagging output may repeat a tag with different casing.
fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}
