use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shop_scraper::api::AppState;
use shop_scraper::config::Config;
use shop_scraper::db::{self, PgUserStore};
use shop_scraper::search::SearchService;
use shop_scraper::webhook::WebhookVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("Connecting to database...");
    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::init_db(&pool).await?;
    info!("Database connected");

    let site = config.site();
    let verifier = WebhookVerifier::new(&config.webhook_secret)?;
    let state = Arc::new(AppState {
        users: Arc::new(PgUserStore::new(pool.clone())),
        verifier,
        static_search: SearchService::static_mode(&site)?,
        browser_search: SearchService::browser_mode(&site, &config.snapshot_path),
        default_mode: config.scrape_mode,
        site,
    });

    let app = shop_scraper::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pool.close().await;
    info!("Database connection closed");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
