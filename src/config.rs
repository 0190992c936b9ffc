use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// How product searches obtain their HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    /// Plain HTTP GET against the search path.
    Static,
    /// Drive a headless Chrome through the site's search box.
    Browser,
}

impl std::str::FromStr for ScrapeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "http" => Ok(ScrapeMode::Static),
            "browser" | "chrome" => Ok(ScrapeMode::Browser),
            other => Err(anyhow!("unknown SCRAPE_MODE '{}'", other)),
        }
    }
}

/// Where and as whom the scrapers talk to the shop.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub base_url: String,
    pub user_agent: String,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub webhook_secret: String,
    pub port: u16,
    pub base_url: String,
    pub scrape_mode: ScrapeMode,
    pub snapshot_path: PathBuf,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so defaults can be
    /// exercised without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let webhook_secret = lookup("CLERK_WEBHOOK_SECRET")
            .or_else(|| lookup("CLERK_WEBHOOK_SECRET_KEY"))
            .context("CLERK_WEBHOOK_SECRET must be set")?;

        let port = match lookup("PORT") {
            Some(p) => p.parse().with_context(|| format!("PORT must be a number, got '{}'", p))?,
            None => 7000,
        };
        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(n) => n
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS must be a number, got '{}'", n))?,
            None => 5,
        };
        let scrape_mode = match lookup("SCRAPE_MODE") {
            Some(m) => m.parse()?,
            None => ScrapeMode::Static,
        };

        let base_url = lookup("SCRAPE_BASE_URL")
            .unwrap_or_else(|| "https://www.amazon.com".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database_url,
            database_max_connections,
            webhook_secret,
            port,
            base_url,
            scrape_mode,
            snapshot_path: lookup("SCRAPE_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("products.json")),
            user_agent: lookup("SCRAPE_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn site(&self) -> SiteSettings {
        SiteSettings {
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("CLERK_WEBHOOK_SECRET", "whsec_abc"),
        ]))
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.scrape_mode, ScrapeMode::Static);
        assert_eq!(config.base_url, "https://www.amazon.com");
        assert_eq!(config.snapshot_path, PathBuf::from("products.json"));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn legacy_secret_name_is_accepted() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("CLERK_WEBHOOK_SECRET_KEY", "whsec_legacy"),
        ]))
        .unwrap();
        assert_eq!(config.webhook_secret, "whsec_legacy");
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("CLERK_WEBHOOK_SECRET", "whsec_abc")]));
        assert!(result.is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("CLERK_WEBHOOK_SECRET", "whsec_abc"),
            ("PORT", "8080"),
            ("SCRAPE_MODE", "Browser"),
            ("SCRAPE_BASE_URL", "http://127.0.0.1:9000/"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.scrape_mode, ScrapeMode::Browser);
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn bad_port_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("CLERK_WEBHOOK_SECRET", "whsec_abc"),
            ("PORT", "seven"),
        ]));
        assert!(result.is_err());
    }
}
