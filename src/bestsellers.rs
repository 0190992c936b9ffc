use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::info;

use crate::browser::with_session;
use crate::config::SiteSettings;
use crate::error::ScrapeError;
use crate::models::{ItemDetails, IMAGE_NOT_FOUND, PRICE_NOT_FOUND, TITLE_NOT_FOUND};

pub const BESTSELLERS_PATH: &str = "/gp/bestsellers/";
pub const CAROUSEL_LINK_SELECTOR: &str = ".a-carousel-card .a-link-normal[href]";
/// Links containing this are review pages, not items.
pub const REVIEW_MARKER: &str = "product-reviews";

static CAROUSEL_LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse(CAROUSEL_LINK_SELECTOR).unwrap());
static PRODUCT_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("#productTitle").unwrap());
static PRODUCT_PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".aok-offscreen").unwrap());
static PRODUCT_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse(".a-dynamic-image").unwrap());

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Drops review links and repeats, keeping first-seen order.
pub fn dedupe_item_links<I>(links: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| !link.is_empty() && !link.contains(REVIEW_MARKER))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Item links from the carousel cards of a listing page, made absolute
/// against `page_url`.
pub fn collect_item_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let hrefs: Vec<String> = document
        .select(&CAROUSEL_LINKS)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| resolve(base.as_ref(), href.trim()))
        .collect();

    dedupe_item_links(hrefs)
}

/// Reads title, price and image from an item page, substituting
/// placeholders for anything that is not there.
pub fn parse_item_details(html: &str, page_url: &str) -> ItemDetails {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let text_of = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
    };

    let title = text_of(&PRODUCT_TITLE).unwrap_or_else(|| TITLE_NOT_FOUND.to_string());
    let price = text_of(&PRODUCT_PRICE).unwrap_or_else(|| PRICE_NOT_FOUND.to_string());
    let image = document
        .select(&PRODUCT_IMAGE)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(|src| resolve(base.as_ref(), src))
        .unwrap_or_else(|| IMAGE_NOT_FOUND.to_string());

    ItemDetails(title, price, image)
}

/// Distinct item links from the bestsellers page.
///
/// Fails when the carousel links never show up.
pub async fn scrape_bestsellers(site: &SiteSettings) -> Result<Vec<String>, ScrapeError> {
    let url = format!("{}{}", site.base_url, BESTSELLERS_PATH);
    let links = with_session(&site.user_agent, move |session| {
        let tab = session.open(&url)?;
        tab.wait_for_element(CAROUSEL_LINK_SELECTOR)
            .map_err(|_| ScrapeError::SelectorMissing(CAROUSEL_LINK_SELECTOR.to_string()))?;
        let html = tab.get_content()?;
        Ok(collect_item_links(&html, &tab.get_url()))
    })
    .await?;

    info!(count = links.len(), "collected bestseller links");
    Ok(links)
}

/// Title, price and image of one item page. Only navigation failures are
/// errors; missing fields come back as placeholders.
pub async fn scrape_item(site: &SiteSettings, link: &str) -> Result<ItemDetails, ScrapeError> {
    let link = link.to_string();
    let details = with_session(&site.user_agent, move |session| {
        session.open(&link)?;
        let tab = session.tab();
        let html = tab.get_content()?;
        Ok(parse_item_details(&html, &tab.get_url()))
    })
    .await?;

    info!(title = %details.title(), "scraped item page");
    Ok(details)
}
