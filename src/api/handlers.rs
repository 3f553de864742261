use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Product, ProductId, Role, UserRequest},
    services::Recommendation,
};

use super::AppState;

// Response types

#[derive(Debug, Serialize)]
pub struct CatalogOptionsResponse {
    pub genders: Vec<String>,
    pub categories: Vec<String>,
    pub occasion_tags: Vec<String>,
    pub style_tags: Vec<String>,
    pub product_count: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RecommendedItem {
    pub product_id: ProductId,
    pub role: Option<Role>,
    pub name: String,
    pub category: String,
    pub color: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub currency: String,
    pub image_url: String,
    pub purchase_link: String,
}

impl RecommendedItem {
    fn new(role: Option<Role>, product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            role,
            name: product.display_name().to_string(),
            category: product.category.clone(),
            color: product.color.clone(),
            price: product.price,
            currency: product.currency.clone(),
            image_url: product.image_url.clone(),
            purchase_link: product.purchase_link.clone(),
        }
    }
}

/// Rendered from catalog data, never from what the model echoed back
#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub explanation: String,
    pub items: Vec<RecommendedItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub currency: Option<String>,
    pub attempts: u32,
    pub generated_at: DateTime<Utc>,
}

impl From<&Recommendation> for RecommendationResponse {
    fn from(recommendation: &Recommendation) -> Self {
        Self {
            explanation: recommendation.proposal.explanation.clone(),
            items: recommendation
                .items()
                .map(|(role, product)| RecommendedItem::new(role, product))
                .collect(),
            total_price: recommendation.proposal.total_price,
            currency: recommendation.currency().map(str::to_string),
            attempts: recommendation.attempts,
            generated_at: recommendation.generated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub product_count: usize,
    pub loaded_at: DateTime<Utc>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Option lists for the request form
pub async fn get_catalog_options(State(state): State<AppState>) -> Json<CatalogOptionsResponse> {
    let catalog = state.catalog.snapshot().await;

    Json(CatalogOptionsResponse {
        genders: catalog.genders(),
        categories: catalog.categories(),
        occasion_tags: catalog.occasion_vocabulary(),
        style_tags: catalog.style_vocabulary(),
        product_count: catalog.len(),
        loaded_at: catalog.loaded_at(),
    })
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Product>> {
    let catalog = state.catalog.snapshot().await;
    catalog
        .lookup(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product `{}`", id)))
}

/// Run one recommendation cycle
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<UserRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    tracing::info!(
        request_id = %request_id,
        mode = ?request.mode,
        budget = ?request.budget,
        "Recommendation requested"
    );

    let recommendation = state.engine.recommend(&request).await?;

    Ok(Json(RecommendationResponse::from(&recommendation)))
}

/// Re-read the catalog file and swap it in; in-flight requests keep their snapshot
pub async fn reload_catalog(State(state): State<AppState>) -> AppResult<Json<ReloadResponse>> {
    let catalog = state.catalog.reload(&state.catalog_path).await?;

    Ok(Json(ReloadResponse {
        product_count: catalog.len(),
        loaded_at: catalog.loaded_at(),
    }))
}
