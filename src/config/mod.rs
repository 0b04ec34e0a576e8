//! Runtime configuration read from the environment.

pub mod logging;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

use crate::enrich::{ImageSettings, VariantSettings};

/// Everything the binary needs to wire the services together
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite file holding the search cache and favorites
    pub db_path: PathBuf,
    /// How long a persisted search result is served
    pub cache_ttl: Duration,
    /// Timeout handed to scrapers for their primary strategy
    pub scraper_timeout: Duration,
    /// Sources scraped concurrently per search
    pub search_workers: usize,
    pub images: ImageSettings,
    pub variants: VariantSettings,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup; missing or malformed
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, default: u64, min: u64| Duration::from_secs(parsed(&lookup, key, default).max(min));

        Self {
            db_path: lookup("DB_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("offers.db")),
            cache_ttl: secs("CACHE_TTL_SECONDS", 900, 60),
            scraper_timeout: secs("SCRAPER_TIMEOUT_SECONDS", 18, 1),
            search_workers: parsed(&lookup, "SEARCH_WORKERS", 4usize).max(1),
            images: ImageSettings {
                enabled: parsed_flag(&lookup, "IMAGE_ENRICH_ENABLED", true),
                max_per_search: parsed(&lookup, "IMAGE_ENRICH_MAX_PER_SEARCH", 40),
                timeout: secs("IMAGE_ENRICH_TIMEOUT_SECONDS", 8, 3),
                ttl: secs("IMAGE_CACHE_TTL_SECONDS", 21_600, 60),
            },
            variants: VariantSettings {
                max_offers: parsed(&lookup, "EBAY_VARIANT_ENRICH_MAX_OFFERS", 10),
                options_ttl: secs("EBAY_VARIATION_CACHE_TTL_SECONDS", 21_600, 60),
                fr_price_ttl: secs("EBAY_FR_VARIANT_PRICE_CACHE_TTL_SECONDS", 21_600, 300),
            },
            logging: LoggingConfig {
                format: parsed(&lookup, "LOG_FORMAT", LogFormat::Text),
                level: parsed(&lookup, "LOG_LEVEL", LogLevel::Info),
            },
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn parsed_flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
