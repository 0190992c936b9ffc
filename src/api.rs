use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::bestsellers;
use crate::config::{ScrapeMode, SiteSettings};
use crate::db::UserStore;
use crate::error::{ApiError, ErrorResponse};
use crate::models::{ItemDetails, Product, StatsDelta, UserStats};
use crate::search::SearchService;
use crate::webhook::{self, WebhookVerifier};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub verifier: WebhookVerifier,
    pub static_search: SearchService,
    pub browser_search: SearchService,
    pub default_mode: ScrapeMode,
    pub site: SiteSettings,
}

impl AppState {
    fn search_service(&self, browser: Option<bool>) -> &SearchService {
        let mode = match browser {
            Some(true) => ScrapeMode::Browser,
            Some(false) => ScrapeMode::Static,
            None => self.default_mode,
        };
        match mode {
            ScrapeMode::Static => &self.static_search,
            ScrapeMode::Browser => &self.browser_search,
        }
    }
}

#[derive(Deserialize)]
pub struct ScrapeQuery {
    pub item: Option<String>,
    pub browser: Option<bool>,
}

#[derive(Deserialize)]
pub struct ModeQuery {
    pub browser: Option<bool>,
}

#[derive(Deserialize)]
pub struct ItemQuery {
    pub link: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductResponse {
    pub success: bool,
    pub data: Product,
}

#[derive(Serialize, ToSchema)]
pub struct LinksResponse {
    pub success: bool,
    pub data: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ItemResponse {
    pub success: bool,
    /// `[title, price, imageUrl]`
    #[schema(value_type = Vec<String>)]
    pub data: ItemDetails,
}

#[derive(Serialize, ToSchema)]
pub struct UserStatsResponse {
    pub success: bool,
    pub data: UserStats,
}

#[derive(Serialize, ToSchema)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

/// An empty body means no increments at all.
fn parse_delta(body: &[u8]) -> Result<StatsDelta, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StatsDelta::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid request body: {}", e)))
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

async fn random_match(state: &AppState, term: &str, browser: Option<bool>) -> Result<Json<ProductResponse>, ApiError> {
    let products = state.search_service(browser).search(term).await?;
    let product = products
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("No products found for '{}'", term)))?;

    Ok(Json(ProductResponse {
        success: true,
        data: product,
    }))
}

#[utoipa::path(
    get,
    path = "/api/scrape",
    params(
        ("item" = String, Query, description = "Search term"),
        ("browser" = Option<bool>, Query, description = "Use the headless browser instead of a plain GET")
    ),
    responses(
        (status = 200, description = "One random matching product", body = ProductResponse),
        (status = 400, description = "Missing search term", body = ErrorResponse),
        (status = 404, description = "No products found", body = ErrorResponse)
    ),
    tag = "scrape"
)]
pub async fn scrape_by_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScrapeQuery>,
) -> Result<Json<ProductResponse>, ApiError> {
    let term = required(params.item, "Search item is required")?;
    random_match(&state, &term, params.browser).await
}

#[utoipa::path(
    get,
    path = "/api/scrape/{searchItem}",
    params(
        ("searchItem" = String, Path, description = "Search term"),
        ("browser" = Option<bool>, Query, description = "Use the headless browser instead of a plain GET")
    ),
    responses(
        (status = 200, description = "One random matching product", body = ProductResponse),
        (status = 404, description = "No products found", body = ErrorResponse)
    ),
    tag = "scrape"
)]
pub async fn scrape_by_path(
    State(state): State<Arc<AppState>>,
    Path(search_item): Path<String>,
    Query(params): Query<ModeQuery>,
) -> Result<Json<ProductResponse>, ApiError> {
    let term = required(Some(search_item), "Search item is required")?;
    random_match(&state, &term, params.browser).await
}

#[utoipa::path(
    get,
    path = "/api/scrapeBestSellers",
    responses(
        (status = 200, description = "Distinct item links from the bestsellers page", body = LinksResponse),
        (status = 500, description = "Listing page could not be read", body = ErrorResponse)
    ),
    tag = "scrape"
)]
pub async fn scrape_best_sellers(State(state): State<Arc<AppState>>) -> Result<Json<LinksResponse>, ApiError> {
    let links = bestsellers::scrape_bestsellers(&state.site).await?;
    Ok(Json(LinksResponse {
        success: true,
        data: links,
    }))
}

#[utoipa::path(
    get,
    path = "/api/scrapeItem",
    params(("link" = String, Query, description = "Item page URL")),
    responses(
        (status = 200, description = "Title, price and image of the item", body = ItemResponse),
        (status = 400, description = "Missing link", body = ErrorResponse)
    ),
    tag = "scrape"
)]
pub async fn scrape_item(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ItemQuery>,
) -> Result<Json<ItemResponse>, ApiError> {
    let link = required(params.link, "Item link is required")?;
    let details = bestsellers::scrape_item(&state.site, &link).await?;
    Ok(Json(ItemResponse {
        success: true,
        data: details,
    }))
}

#[utoipa::path(
    post,
    path = "/api/webhooks",
    request_body(content = String, description = "Signed provider event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event handled or ignored", body = WebhookResponse),
        (status = 400, description = "Signature verification failed", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let outcome = webhook::handle_delivery(&state.verifier, state.users.as_ref(), &headers, &body).await?;
    info!(outcome = ?outcome, "webhook processed");
    Ok(Json(WebhookResponse {
        success: true,
        message: "Webhook received".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/user/{externalId}",
    params(("externalId" = String, Path, description = "Identity issued by the auth provider")),
    responses(
        (status = 200, description = "User counters", body = UserStatsResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let user = state
        .users
        .find(&external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserStatsResponse {
        success: true,
        data: user.stats(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/updateGameStats/{externalId}",
    params(("externalId" = String, Path, description = "Identity issued by the auth provider")),
    request_body = StatsDelta,
    responses(
        (status = 200, description = "Updated counters", body = UserStatsResponse),
        (status = 400, description = "Negative or overflowing increment", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn update_game_stats(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
    body: Bytes,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let delta = parse_delta(&body)?;
    if let Some(field) = delta.first_negative() {
        return Err(ApiError::Validation(format!("{} must not be negative", field)));
    }

    let user = state
        .users
        .increment(&external_id, delta)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(external_id = %external_id, "updated game stats");
    Ok(Json(UserStatsResponse {
        success: true,
        data: user.stats(),
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
