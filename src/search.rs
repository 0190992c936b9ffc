use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::BrowserFetcher;
use crate::config::SiteSettings;
use crate::error::ScrapeError;
use crate::extractor::extract_products;
use crate::fetcher::{PageFetcher, StaticFetcher};
use crate::models::Product;

/// Fetch, extract and serialize the products for one search term.
#[derive(Clone)]
pub struct SearchService {
    fetcher: Arc<dyn PageFetcher>,
    snapshot_path: Option<PathBuf>,
}

impl SearchService {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            snapshot_path: None,
        }
    }

    /// Also write every result set to `path`, best effort.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn static_mode(site: &SiteSettings) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(StaticFetcher::new(site)?)))
    }

    pub fn browser_mode(site: &SiteSettings, snapshot_path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(BrowserFetcher::new(site.clone()))).with_snapshot(snapshot_path)
    }

    pub async fn search(&self, term: &str) -> Result<Vec<Product>, ScrapeError> {
        let Some(html) = self.fetcher.fetch(term).await? else {
            info!(term = %term, "failed to fetch HTML content");
            return Ok(Vec::new());
        };

        let products: Vec<Product> = extract_products(&html).collect();
        info!(term = %term, count = products.len(), "extracted products");

        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &products).await;
        }
        Ok(products)
    }
}

/// A result set as a pretty-printed JSON array, the snapshot file format.
pub fn products_json(products: &[Product]) -> Result<String, ScrapeError> {
    Ok(serde_json::to_string_pretty(products)?)
}

async fn write_snapshot(path: &Path, products: &[Product]) {
    let json = match products_json(products) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "could not serialize snapshot");
            return;
        }
    };
    match tokio::fs::write(path, json).await {
        Ok(()) => info!(path = %path.display(), "wrote product snapshot"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not write product snapshot"),
    }
}
