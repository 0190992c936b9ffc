pub mod api;
pub mod bestsellers;
pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod search;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::scrape_by_query,
        api::scrape_by_path,
        api::scrape_best_sellers,
        api::scrape_item,
        api::receive_webhook,
        api::get_user,
        api::update_game_stats
    ),
    components(
        schemas(
            models::Product,
            models::UserStats,
            models::StatsDelta,
            api::ProductResponse,
            api::LinksResponse,
            api::ItemResponse,
            api::UserStatsResponse,
            api::WebhookResponse,
            error::ErrorResponse
        )
    ),
    tags(
        (name = "scrape", description = "Product scraping"),
        (name = "users", description = "User records and provider webhooks")
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<api::AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::health))
        .route("/api/scrape", get(api::scrape_by_query))
        .route("/api/scrape/:searchItem", get(api::scrape_by_path))
        .route("/api/scrapeBestSellers", get(api::scrape_best_sellers))
        .route("/api/scrapeItem", get(api::scrape_item))
        .route("/api/webhooks", post(api::receive_webhook))
        .route("/api/user/:externalId", get(api::get_user))
        .route("/api/updateGameStats/:externalId", post(api::update_game_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
