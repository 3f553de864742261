use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use style_advisor::{
    api::{create_router, AppState},
    catalog::{Catalog, CatalogHandle},
    config::Config,
    services::{providers::GeminiProvider, RecommendationEngine},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Without a catalog there is nothing to recommend from
    let catalog = Catalog::load(&config.catalog_path)?;

    let model = GeminiProvider::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.gemini_model.clone(),
    );
    tracing::info!(model = %config.gemini_model, "Using Gemini");

    let catalog = CatalogHandle::new(catalog);
    let engine = RecommendationEngine::new(
        catalog.clone(),
        Arc::new(model),
        config.engine_settings(),
    );
    let state = AppState::new(catalog, engine, config.catalog_path.clone());

    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server running");
    axum::serve(listener, app).await?;

    Ok(())
}
