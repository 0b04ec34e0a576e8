//! Thumbnail lookup for offers that arrived without one.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::cache::TtlCache;
use crate::http::HttpFetcher;
use crate::models::Offer;
use crate::scrapers::dom::absolutize;

const MAX_WORKERS: usize = 8;

/// Hosts never fetched (fixtures and local test servers)
const SKIPPED_HOSTS: [&str; 3] = ["example.com", "localhost", "127.0.0.1"];

/// Meta tags checked in order before falling back to the first `<img>`
static IMAGE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "meta[property='og:image']",
        "meta[property='og:image:url']",
        "meta[name='twitter:image']",
        "meta[name='twitter:image:src']",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});
static FIRST_IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// Tunables for image enrichment
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub enabled: bool,
    /// Offers looked up per search
    pub max_per_search: usize,
    /// Per-page timeout
    pub timeout: Duration,
    /// How long a page's image (or lack of one) is remembered
    pub ttl: Duration,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_search: 40,
            timeout: Duration::from_secs(8),
            ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Fills `image_url` from the offer page's preview metadata
pub struct ImageEnricher {
    fetcher: HttpFetcher,
    settings: ImageSettings,
    by_page: TtlCache<String, Option<String>>,
}

impl ImageEnricher {
    pub fn new(fetcher: HttpFetcher, settings: ImageSettings) -> Self {
        Self {
            fetcher,
            settings: ImageSettings {
                timeout: settings.timeout.max(Duration::from_secs(3)),
                ttl: settings.ttl.max(Duration::from_secs(60)),
                ..settings
            },
            by_page: TtlCache::new(),
        }
    }

    /// Look up images for the first offers lacking one. Failures leave the
    /// offer as it was.
    pub async fn enrich(&self, offers: &mut [Offer]) {
        if !self.settings.enabled || self.settings.max_per_search == 0 {
            return;
        }

        let targets: Vec<(usize, String)> = offers
            .iter()
            .enumerate()
            .filter(|(_, o)| o.image_url.is_none() && !o.url.trim().is_empty())
            .take(self.settings.max_per_search)
            .map(|(idx, o)| (idx, o.url.trim().to_string()))
            .collect();
        if targets.is_empty() {
            return;
        }

        let found: Vec<(usize, String)> = stream::iter(targets)
            .map(|(idx, url)| async move { self.image_for(&url).await.map(|image| (idx, image)) })
            .buffer_unordered(MAX_WORKERS)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        info!("Found images for {} offers", found.len());
        for (idx, image) in found {
            if let Some(offer) = offers.get_mut(idx) {
                offer.image_url = Some(image);
            }
        }
    }

    async fn image_for(&self, page_url: &str) -> Option<String> {
        if is_skipped_host(page_url) {
            return None;
        }
        if let Some(cached) = self.by_page.get(page_url) {
            return cached;
        }

        let image = match self.fetcher.fetch_text(page_url, self.settings.timeout).await {
            Ok(html) => extract_image(page_url, &html),
            Err(e) => {
                debug!("No image for {}: {}", page_url, e);
                None
            }
        };
        self.by_page
            .insert(page_url.to_string(), image.clone(), self.settings.ttl);
        image
    }
}

fn is_skipped_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map_or(false, |host| SKIPPED_HOSTS.contains(&host.as_str()))
}

/// Preview image of a page: OpenGraph, then Twitter card, then the first image.
pub fn extract_image(page_url: &str, html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    IMAGE_META
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(|content| absolutize(page_url, content))
        .or_else(|| {
            document
                .select(&FIRST_IMG)
                .next()
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| absolutize(page_url, src))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PartType, Source};

    #[test]
    fn opengraph_wins_over_twitter_and_img() {
        let html = r#"<html><head>
            <meta name="twitter:image" content="https://cdn.test/tw.jpg">
            <meta property="og:image" content="//cdn.test/og.jpg">
            </head><body><img src="/a.png"></body></html>"#;
        assert_eq!(
            extract_image("https://shop.test/p/1", html).as_deref(),
            Some("https://cdn.test/og.jpg")
        );
    }

    #[test]
    fn falls_back_to_first_image_resolved_against_page() {
        let html = r#"<html><body><img alt="x"><img src="/img/a.png"></body></html>"#;
        assert_eq!(
            extract_image("https://shop.test/p/1", html).as_deref(),
            Some("https://shop.test/img/a.png")
        );
        assert_eq!(extract_image("https://shop.test/p/1", "<p>none</p>"), None);
    }

    #[test]
    fn fixture_hosts_are_skipped() {
        assert!(is_skipped_host("https://example.com/item/1"));
        assert!(is_skipped_host("http://127.0.0.1:8080/x"));
        assert!(!is_skipped_host("https://www.ebay.fr/itm/1"));
        assert!(!is_skipped_host("not a url"));
    }

    #[tokio::test]
    async fn enrich_leaves_skipped_and_illustrated_offers_alone() {
        let enricher = ImageEnricher::new(HttpFetcher::bot().unwrap(), ImageSettings::default());
        let mut offers = vec![
            Offer::new(Source::Ebay, "1", "a", "https://example.com/item/1", 1.0, 0.0, PartType::ReplacementScreen),
            Offer::new(Source::Ebay, "2", "b", "https://example.com/item/2", 1.0, 0.0, PartType::ReplacementScreen)
                .with_image(Some("https://cdn.test/b.jpg".into())),
        ];
        enricher.enrich(&mut offers).await;
        assert_eq!(offers[0].image_url, None);
        assert_eq!(offers[1].image_url.as_deref(), Some("https://cdn.test/b.jpg"));
        assert!(enricher.by_page.is_empty());
    }

    #[tokio::test]
    async fn disabled_enricher_does_nothing() {
        let settings = ImageSettings {
            enabled: false,
            ..ImageSettings::default()
        };
        let enricher = ImageEnricher::new(HttpFetcher::bot().unwrap(), settings);
        let mut offers = vec![Offer::new(
            Source::Leboncoin,
            "1",
            "a",
            "https://www.leboncoin.fr/ad/1",
            1.0,
            0.0,
            PartType::ReplacementScreen,
        )];
        enricher.enrich(&mut offers).await;
        assert_eq!(offers[0].image_url, None);
    }
}
