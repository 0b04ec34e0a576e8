use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use async_trait::async_trait;

use repair_scout::error::{ScrapeError, StoreError};
use repair_scout::models::{CachedSearch, Favorite, QueryKey};
use repair_scout::scrapers::{OfferScraper, ScrapeParams};
use repair_scout::search::PROVIDER_NOT_SUPPORTED;
use repair_scout::{
    Offer, PartType, SearchQuery, SearchService, SearchSettings, Source, SqliteStore, Store,
};

/// Scraper returning canned offers and counting how often it runs
struct CannedScraper {
    source: Source,
    offers: Vec<Offer>,
    calls: AtomicUsize,
}

impl CannedScraper {
    fn new(source: Source, offers: Vec<Offer>) -> Arc<Self> {
        Arc::new(Self {
            source,
            offers,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OfferScraper for CannedScraper {
    async fn search(&self, _params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.offers.clone())
    }

    fn source(&self) -> Source {
        self.source
    }
}

struct BrokenScraper;

#[async_trait]
impl OfferScraper for BrokenScraper {
    async fn search(&self, _params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        Err(ScrapeError::Exhausted("aliexpress".into()))
    }

    fn source(&self) -> Source {
        Source::Aliexpress
    }
}

struct PanickingScraper;

#[async_trait]
impl OfferScraper for PanickingScraper {
    async fn search(&self, _params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        panic!("parser blew up");
    }

    fn source(&self) -> Source {
        Source::Aliexpress
    }
}

/// SQLite store noting which threads its cache calls ran on
struct ThreadRecordingStore {
    inner: SqliteStore,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadRecordingStore {
    fn record(&self) {
        self.threads.lock().unwrap().push(thread::current().id());
    }
}

impl Store for ThreadRecordingStore {
    fn get_cached_search(&self, key: &QueryKey, ttl: Duration) -> Result<Option<CachedSearch>, StoreError> {
        self.record();
        self.inner.get_cached_search(key, ttl)
    }

    fn put_cached_search(&self, key: &QueryKey, payload: &CachedSearch) -> Result<(), StoreError> {
        self.record();
        self.inner.put_cached_search(key, payload)
    }

    fn add_favorite(&self, source: Source, source_offer_id: &str, offer: &Offer) -> Result<i64, StoreError> {
        self.inner.add_favorite(source, source_offer_id, offer)
    }

    fn delete_favorite(&self, favorite_id: i64) -> Result<bool, StoreError> {
        self.inner.delete_favorite(favorite_id)
    }

    fn find_favorite_by_offer(&self, source: Source, source_offer_id: &str) -> Result<Option<i64>, StoreError> {
        self.inner.find_favorite_by_offer(source, source_offer_id)
    }

    fn list_favorites(&self) -> Result<Vec<Favorite>, StoreError> {
        self.inner.list_favorites()
    }
}

fn screen(source: Source, id: &str, price: f64, shipping: f64) -> Offer {
    Offer::new(
        source,
        id,
        format!("Ecran Samsung Galaxy S21 {id}"),
        format!("https://www.{}.fr/item/{id}", source.as_str()),
        price,
        shipping,
        PartType::ReplacementScreen,
    )
}

fn store() -> Arc<dyn Store> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

fn query(sources: Vec<Source>) -> SearchQuery {
    let mut query = SearchQuery::new("Samsung", "Galaxy S21", PartType::ReplacementScreen);
    query.sources = sources;
    query
}

#[tokio::test]
async fn merges_sources_cheapest_first() {
    let leboncoin = CannedScraper::new(Source::Leboncoin, vec![screen(Source::Leboncoin, "lbc-1", 45.0, 4.0)]);
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(
        store(),
        vec![ebay.clone(), leboncoin.clone()],
        SearchSettings::default(),
    );

    let response = service
        .search(&query(vec![Source::Leboncoin, Source::Ebay]))
        .await
        .unwrap();

    assert!(response.ok);
    assert!(!response.cached);
    let totals: Vec<f64> = response.offers.iter().map(|o| o.total_eur).collect();
    assert_eq!(totals, vec![49.0, 55.0]);
    assert_eq!(response.offers[0].source, Source::Leboncoin);
    assert!(response.provider_errors.is_empty());
}

#[tokio::test]
async fn second_search_is_served_from_cache() {
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(store(), vec![ebay.clone()], SearchSettings::default());
    let query = query(vec![Source::Ebay]);

    let first = service.search(&query).await.unwrap();
    let second = service.search(&query).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.query_key, second.query_key);
    assert_eq!(first.offers, second.offers);
    assert_eq!(ebay.calls(), 1);
}

#[tokio::test]
async fn force_refresh_bypasses_cache() {
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(store(), vec![ebay.clone()], SearchSettings::default());
    let mut query = query(vec![Source::Ebay]);

    service.search(&query).await.unwrap();
    query.force_refresh = true;
    let refreshed = service.search(&query).await.unwrap();

    assert!(!refreshed.cached);
    assert_eq!(ebay.calls(), 2);
}

#[tokio::test]
async fn failing_source_is_reported_not_fatal() {
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(
        store(),
        vec![ebay.clone(), Arc::new(BrokenScraper)],
        SearchSettings::default(),
    );

    let response = service
        .search(&query(vec![Source::Ebay, Source::Aliexpress]))
        .await
        .unwrap();

    assert_eq!(response.offers.len(), 1);
    assert!(response.provider_errors.contains_key("aliexpress"));
    assert!(!response.provider_errors.contains_key("ebay"));
}

#[tokio::test]
async fn panicking_source_is_contained() {
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(
        store(),
        vec![ebay.clone(), Arc::new(PanickingScraper)],
        SearchSettings::default(),
    );

    let response = service
        .search(&query(vec![Source::Ebay, Source::Aliexpress]))
        .await
        .unwrap();

    assert_eq!(response.offers.len(), 1);
    assert!(response.provider_errors["aliexpress"].contains("crashed"));
}

#[tokio::test]
async fn unregistered_source_is_flagged() {
    let ebay = CannedScraper::new(Source::Ebay, vec![]);
    let service = SearchService::new(store(), vec![ebay.clone()], SearchSettings::default());

    let response = service
        .search(&query(vec![Source::Ebay, Source::Leboncoin]))
        .await
        .unwrap();

    assert!(response.offers.is_empty());
    assert_eq!(response.provider_errors["leboncoin"], PROVIDER_NOT_SUPPORTED);
}

#[tokio::test]
async fn duplicate_listings_are_merged() {
    let first = screen(Source::Ebay, "eb-1", 50.0, 5.0);
    let mut tracked = screen(Source::Ebay, "eb-1-copy", 52.0, 5.0);
    tracked.url = format!("{}?utm_source=newsletter", first.url);
    let ebay = CannedScraper::new(Source::Ebay, vec![first, tracked]);
    let service = SearchService::new(store(), vec![ebay.clone()], SearchSettings::default());

    let response = service.search(&query(vec![Source::Ebay])).await.unwrap();

    assert_eq!(response.offers.len(), 1);
    assert_eq!(response.offers[0].source_offer_id, "eb-1");
}

#[tokio::test]
async fn invalid_query_is_rejected_before_scraping() {
    let ebay = CannedScraper::new(Source::Ebay, vec![]);
    let service = SearchService::new(store(), vec![ebay.clone()], SearchSettings::default());
    let mut query = query(vec![Source::Ebay]);
    query.model = "   ".into();

    let err = service.search(&query).await.unwrap_err();
    assert_eq!(err.field, "model");
    assert_eq!(ebay.calls(), 0);
}

#[tokio::test]
async fn cache_calls_run_off_the_async_thread() {
    let store = Arc::new(ThreadRecordingStore {
        inner: SqliteStore::open_in_memory().unwrap(),
        threads: Mutex::new(Vec::new()),
    });
    let ebay = CannedScraper::new(Source::Ebay, vec![screen(Source::Ebay, "eb-1", 50.0, 5.0)]);
    let service = SearchService::new(store.clone(), vec![ebay.clone()], SearchSettings::default());

    service.search(&query(vec![Source::Ebay])).await.unwrap();
    let cached = service.search(&query(vec![Source::Ebay])).await.unwrap();
    assert!(cached.cached);

    let threads = store.threads.lock().unwrap();
    // lookup + write, then the cached lookup
    assert_eq!(threads.len(), 3);
    assert!(threads.iter().all(|id| *id != thread::current().id()));
}
