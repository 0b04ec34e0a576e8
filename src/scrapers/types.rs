use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{PartType, SearchCategory, SearchQuery};

/// Upper bound on offers a single scraper returns
pub const MAX_OFFERS_PER_SOURCE: usize = 120;

/// Search parameters handed to every scraper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeParams {
    /// Phone brand, as typed by the user
    pub brand: String,
    /// Phone model, as typed by the user
    pub model: String,
    /// Screen or donor phone
    pub part_type: PartType,
    /// Price ceiling (EUR); `None` or non-positive means unbounded
    pub max_price_eur: Option<f64>,
    /// Marketplace category restriction
    pub category: SearchCategory,
    /// Per-request timeout for the primary strategy
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ScrapeParams {
    pub fn from_query(query: &SearchQuery, timeout: Duration) -> Self {
        Self {
            brand: query.brand.trim().to_string(),
            model: query.model.trim().to_string(),
            part_type: query.part_type,
            max_price_eur: query.max_price_eur,
            category: query.category,
            timeout,
        }
    }

    /// Ceiling when one was actually requested
    pub fn ceiling(&self) -> Option<f64> {
        self.max_price_eur.filter(|max| *max > 0.0)
    }

    /// Ceiling truncated to whole euros, as marketplaces expect in URLs
    pub fn ceiling_param(&self) -> Option<u64> {
        self.ceiling().map(|max| max as u64)
    }

    /// True when `price` fits under the requested ceiling
    pub fn within_ceiling(&self, price: f64) -> bool {
        self.ceiling().map_or(true, |max| price <= max)
    }

    /// Timeout for fallback strategies, which go through slower proxies
    pub fn fallback_timeout(&self, floor_secs: u64) -> Duration {
        self.timeout.max(Duration::from_secs(floor_secs))
    }
}

impl Default for ScrapeParams {
    fn default() -> Self {
        Self {
            brand: String::new(),
            model: String::new(),
            part_type: PartType::ReplacementScreen,
            max_price_eur: None,
            category: SearchCategory::MobilePhoneParts,
            timeout: Duration::from_secs(18),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
