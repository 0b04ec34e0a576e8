use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::{Offer, Source};
use crate::scrapers::types::ScrapeParams;

/// Common trait for all marketplace scrapers
///
/// Implementations walk their own fallback chain and only return `Err`
/// when every strategy failed outright.
#[async_trait]
pub trait OfferScraper: Send + Sync {
    /// Search the marketplace and return normalized offers
    async fn search(&self, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError>;

    /// Which marketplace this scraper covers
    fn source(&self) -> Source;
}
