//! Search orchestration: cache lookup, concurrent fan-out, merge and persist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::enrich::ImageEnricher;
use crate::error::{StoreError, ValidationError};
use crate::models::{CachedSearch, Offer, ProviderErrors, SearchQuery, SearchResponse, Source};
use crate::normalize::dedupe_offers;
use crate::scrapers::{OfferScraper, ScrapeParams};
use crate::store::Store;

/// Recorded for sources with no registered scraper
pub const PROVIDER_NOT_SUPPORTED: &str = "provider_not_supported";

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// How long a persisted result is served, at least one minute
    pub cache_ttl: Duration,
    /// Primary-strategy timeout handed to every scraper
    pub scraper_timeout: Duration,
    /// Sources scraped at the same time
    pub workers: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(900),
            scraper_timeout: Duration::from_secs(18),
            workers: 4,
        }
    }
}

/// Runs one query against every requested source
pub struct SearchService {
    store: Arc<dyn Store>,
    scrapers: HashMap<Source, Arc<dyn OfferScraper>>,
    images: Option<Arc<ImageEnricher>>,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(store: Arc<dyn Store>, scrapers: Vec<Arc<dyn OfferScraper>>, settings: SearchSettings) -> Self {
        let scrapers = scrapers.into_iter().map(|s| (s.source(), s)).collect();
        Self {
            store,
            scrapers,
            images: None,
            settings: SearchSettings {
                cache_ttl: settings.cache_ttl.max(Duration::from_secs(60)),
                workers: settings.workers.max(1),
                ..settings
            },
        }
    }

    /// Backfill missing thumbnails on fresh results
    pub fn with_image_enricher(mut self, images: Arc<ImageEnricher>) -> Self {
        self.images = Some(images);
        self
    }

    /// Serve `query` from the cache when possible, otherwise scrape every
    /// requested source and persist the merged result.
    ///
    /// Source failures never fail the search; they are reported per source
    /// in `provider_errors`.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ValidationError> {
        query.validate()?;
        let query_key = query.query_key();

        if !query.force_refresh {
            let (key, ttl) = (query_key.clone(), self.settings.cache_ttl);
            match self.with_store(move |store| store.get_cached_search(&key, ttl)).await {
                Ok(Some(cached)) => {
                    info!("Serving {} cached offers for {}", cached.offers.len(), query_key);
                    return Ok(SearchResponse {
                        ok: true,
                        cached: true,
                        query_key,
                        offers: cached.offers,
                        provider_errors: cached.provider_errors,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Search cache unavailable, scraping instead: {}", e),
            }
        }

        info!(
            "Searching {} {} ({}) on {:?}",
            query.brand.trim(),
            query.model.trim(),
            query.part_type.as_str(),
            query.normalized_sources()
        );

        let params = ScrapeParams::from_query(query, self.settings.scraper_timeout);
        let (offers, provider_errors) = self.fan_out(&query.normalized_sources(), &params).await;

        let mut offers = dedupe_offers(offers);
        if let Some(images) = &self.images {
            images.enrich(&mut offers).await;
        }
        sort_offers(&mut offers);

        let payload = CachedSearch {
            offers,
            provider_errors,
        };
        let (key, stored) = (query_key.clone(), payload.clone());
        if let Err(e) = self.with_store(move |store| store.put_cached_search(&key, &stored)).await {
            warn!("Failed to persist search {}: {}", query_key, e);
        }

        info!(
            "Search {} done: {} offers, {} provider errors",
            query_key,
            payload.offers.len(),
            payload.provider_errors.len()
        );
        Ok(SearchResponse {
            ok: true,
            cached: false,
            query_key,
            offers: payload.offers,
            provider_errors: payload.provider_errors,
        })
    }

    /// Run a SQLite call on the blocking pool
    async fn with_store<T, F>(&self, call: F) -> Result<T, String>
    where
        F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || call(&*store)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(join_error) => Err(format!("store task failed: {join_error}")),
        }
    }

    /// Scrape `sources` with at most `workers` in flight. Each scraper runs in
    /// its own task so a panic is contained to its source.
    async fn fan_out(&self, sources: &[Source], params: &ScrapeParams) -> (Vec<Offer>, ProviderErrors) {
        let mut provider_errors = ProviderErrors::new();
        let mut jobs = Vec::new();
        for &source in sources {
            match self.scrapers.get(&source) {
                Some(scraper) => jobs.push((source, Arc::clone(scraper))),
                None => {
                    provider_errors.insert(source.to_string(), PROVIDER_NOT_SUPPORTED.to_string());
                }
            }
        }

        let mut results: Vec<(Source, Result<Vec<Offer>, String>)> = stream::iter(jobs)
            .map(|(source, scraper)| {
                let params = params.clone();
                async move {
                    let task = tokio::spawn(async move { scraper.search(&params).await });
                    let outcome = match task.await {
                        Ok(Ok(offers)) => Ok(offers),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(join_error) => Err(format!("scraper crashed: {join_error}")),
                    };
                    (source, outcome)
                }
            })
            .buffer_unordered(self.settings.workers)
            .collect()
            .await;

        // Completion order is arbitrary; merge in source order
        results.sort_by_key(|(source, _)| *source);

        let mut offers = Vec::new();
        for (source, outcome) in results {
            match outcome {
                Ok(found) => {
                    info!("{} returned {} offers", source, found.len());
                    offers.extend(found);
                }
                Err(message) => {
                    warn!("{} failed: {}", source, message);
                    provider_errors.insert(source.to_string(), message);
                }
            }
        }
        (offers, provider_errors)
    }
}

/// Cheapest total first, ambiguity-adjusted score breaking ties. Offers
/// without a known price go last.
pub fn sort_offers(offers: &mut [Offer]) {
    offers.sort_by(|a, b| {
        a.price_unknown
            .cmp(&b.price_unknown)
            .then_with(|| a.total_eur.total_cmp(&b.total_eur))
            .then_with(|| a.rank_score.total_cmp(&b.rank_score))
    });
}
