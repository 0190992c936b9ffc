use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SiteSettings;
use crate::error::ScrapeError;
use crate::fetcher::PageFetcher;

/// Appears once a results page has fully rendered.
pub const PAGINATION_SELECTOR: &str = ".s-pagination-strip";

/// A pair of selectors locating the search box and its submit button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBoxVariant {
    pub name: &'static str,
    pub input: &'static str,
    pub submit: &'static str,
}

/// The site serves two markups; tried in this order, first hit wins.
pub const SEARCH_BOX_VARIANTS: [SearchBoxVariant; 2] = [
    SearchBoxVariant {
        name: "primary",
        input: "#twotabsearchtextbox",
        submit: "#nav-search-submit-button",
    },
    SearchBoxVariant {
        name: "secondary",
        input: "input[name='field-keywords']",
        submit: "input[type='submit']",
    },
];

/// Returns the first variant `probe` accepts, in declaration order.
pub fn first_matching_variant<T, F>(variants: &[SearchBoxVariant], mut probe: F) -> Option<(SearchBoxVariant, T)>
where
    F: FnMut(&SearchBoxVariant) -> Option<T>,
{
    variants
        .iter()
        .find_map(|variant| probe(variant).map(|found| (*variant, found)))
}

/// One isolated headless Chrome with a single tab.
///
/// Dropping the session closes the tab and then the browser process, so
/// every exit path out of a scrape releases it.
pub struct BrowserSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl BrowserSession {
    pub fn launch(user_agent: &str) -> anyhow::Result<Self> {
        let ua_arg = format!("--user-agent={}", user_agent);
        let args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new(&ua_arg),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((1920, 1080)),
            args,
            ..Default::default()
        })?;
        let tab = browser.new_tab()?;
        debug!("browser session started");

        Ok(Self { tab, _browser: browser })
    }

    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    pub fn open(&self, url: &str) -> anyhow::Result<&Tab> {
        info!(url = %url, "navigating");
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(&self.tab)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!(error = %e, "tab already gone while closing session");
        }
        debug!("browser session closed");
    }
}

/// Runs `work` against a fresh session on the blocking pool.
pub async fn with_session<T, F>(user_agent: &str, work: F) -> Result<T, ScrapeError>
where
    T: Send + 'static,
    F: FnOnce(&BrowserSession) -> Result<T, ScrapeError> + Send + 'static,
{
    let user_agent = user_agent.to_string();
    tokio::task::spawn_blocking(move || -> Result<T, ScrapeError> {
        let session = BrowserSession::launch(&user_agent)?;
        work(&session)
    })
    .await
    .map_err(|e| ScrapeError::Network(anyhow::anyhow!("browser task failed: {}", e)))?
}

/// Drives the site's own search form and returns the rendered results page.
pub struct BrowserFetcher {
    site: SiteSettings,
}

impl BrowserFetcher {
    pub fn new(site: SiteSettings) -> Self {
        Self { site }
    }
}

fn search_via_form(session: &BrowserSession, base_url: &str, term: &str) -> Result<String, ScrapeError> {
    let tab = session.open(base_url)?;

    let (variant, (input, submit)) = first_matching_variant(&SEARCH_BOX_VARIANTS, |v| {
        match (tab.find_element(v.input), tab.find_element(v.submit)) {
            (Ok(input), Ok(submit)) => Some((input, submit)),
            _ => None,
        }
    })
    .ok_or_else(|| {
        let tried: Vec<&str> = SEARCH_BOX_VARIANTS.iter().map(|v| v.input).collect();
        ScrapeError::SelectorMissing(tried.join(" | "))
    })?;
    debug!(variant = variant.name, "found search box");

    input.click()?;
    input.type_into(term)?;
    submit.click()?;

    // Library default timeout; a page that never paginates fails the request.
    tab.wait_for_element(PAGINATION_SELECTOR)?;
    Ok(tab.get_content()?)
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, term: &str) -> Result<Option<String>, ScrapeError> {
        let base_url = self.site.base_url.clone();
        let term = term.to_string();
        let html = with_session(&self.site.user_agent, move |session| {
            search_via_form(session, &base_url, &term)
        })
        .await?;
        Ok(Some(html))
    }
}
