use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ScrapeError;
use crate::http::{mirror_url, HttpFetcher};
use crate::models::{Offer, PartType, SearchCategory, Source};
use crate::normalize::{normalize_spaces, parse_tagged_price, text_window};
use crate::scrapers::chain::run_chain;
use crate::scrapers::dom::{absolutize, parent_element, text_of, unwrap_search_redirect};
use crate::scrapers::payload::{collect_objects, has_any, numeric, str_field};
use crate::scrapers::traits::OfferScraper;
use crate::scrapers::types::ScrapeParams;

const BASE_URL: &str = "https://www.leboncoin.fr";

/// Search-engine results are noisier, keep fewer of them
const SEARCH_ENGINE_MAX_OFFERS: usize = 80;

static NEXT_DATA: Lazy<Selector> = Lazy::new(|| Selector::parse("#__NEXT_DATA__").unwrap());
static AD_ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/ad/'], a[href*='.htm']").unwrap());
static RESULT_CARD: Lazy<Selector> = Lazy::new(|| Selector::parse(".result").unwrap());
static RESULT_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.result__a").unwrap());
static RESULT_SNIPPET: Lazy<Selector> = Lazy::new(|| Selector::parse(".result__snippet").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

static MIRROR_AD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\]\((?P<url>https://www\.leboncoin\.fr/ad/[^)]+)\)(?P<title>[^\n]+)\n")
        .unwrap()
});
static IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https://(?:img|images)\.leboncoin\.fr/[^\s)]+").unwrap());
static LISTING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([0-9]+)(?:\.htm)?(?:[/?#]|$)").unwrap());

/// Search phrase in the way sellers title their ads
pub fn build_query(brand: &str, model: &str, part_type: PartType, category: SearchCategory) -> String {
    let base = match part_type {
        PartType::ReplacementScreen => format!("ecran {brand} {model} remplacement"),
        PartType::PhoneWithoutScreen => format!("{brand} {model} sans ecran pour pieces"),
    };
    match category {
        SearchCategory::MobilePhoneParts => format!("{base} telephones mobiles pieces"),
        SearchCategory::Auto => base,
    }
}

fn search_url(params: &ScrapeParams) -> String {
    let query = build_query(&params.brand, &params.model, params.part_type, params.category);
    let mut url = format!("{BASE_URL}/recherche?text={}", urlencoding::encode(&query));
    if let Some(max) = params.ceiling_param() {
        url.push_str(&format!("&price=min-{max}"));
    }
    url
}

fn search_engine_url(params: &ScrapeParams) -> String {
    let query = build_query(&params.brand, &params.model, params.part_type, params.category);
    format!(
        "https://duckduckgo.com/html/?q={}",
        urlencoding::encode(&format!("site:leboncoin.fr {query}"))
    )
}

fn listing_id(url: &str) -> String {
    LISTING_ID
        .captures_iter(url)
        .last()
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| url.to_string())
}

fn absolute_ad_url(raw: &str) -> String {
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("{BASE_URL}{raw}")
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Search page, embedded page-data JSON then plain anchors
    DirectPage,
    /// Same search page through the markdown proxy
    Mirror,
    /// `site:` query on a search engine
    SearchEngine,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectPage => "direct",
            Self::Mirror => "mirror",
            Self::SearchEngine => "search-engine",
        })
    }
}

const STRATEGIES: [Strategy; 3] = [Strategy::DirectPage, Strategy::Mirror, Strategy::SearchEngine];

/// Leboncoin scraper
pub struct LeboncoinScraper {
    pub(crate) fetcher: HttpFetcher,
}

impl LeboncoinScraper {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }

    async fn attempt(&self, strategy: Strategy, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        match strategy {
            Strategy::DirectPage => {
                let html = self.fetcher.fetch_text(&search_url(params), params.timeout).await?;
                Ok(parse_search_page(&html, params.part_type))
            }
            Strategy::Mirror => {
                let text = self
                    .fetcher
                    .fetch_text(&mirror_url(&search_url(params)), params.fallback_timeout(24))
                    .await?;
                Ok(parse_mirror(&text, params.part_type))
            }
            Strategy::SearchEngine => {
                let html = self
                    .fetcher
                    .fetch_text(&search_engine_url(params), params.fallback_timeout(20))
                    .await?;
                Ok(parse_search_engine(&html, params))
            }
        }
    }
}

#[async_trait]
impl OfferScraper for LeboncoinScraper {
    async fn search(&self, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        info!("Starting Leboncoin search for {} {}", params.brand, params.model);
        run_chain(Source::Leboncoin, &STRATEGIES, |strategy| self.attempt(strategy, params)).await
    }

    fn source(&self) -> Source {
        Source::Leboncoin
    }
}

/// Parse the direct search page: page-data JSON first, anchors as fallback.
pub fn parse_search_page(html: &str, part_type: PartType) -> Vec<Offer> {
    let document = Html::parse_document(html);

    let offers = parse_next_data(&document, part_type);
    if !offers.is_empty() {
        return offers;
    }
    debug!("No ads in page data, trying plain anchors");
    parse_anchor_cards(&document, part_type)
}

fn is_ad_node(node: &Map<String, Value>) -> bool {
    has_any(node, &["subject", "title"])
        && node.contains_key("url")
        && has_any(node, &["price", "price_cents"])
}

fn parse_next_data(document: &Html, part_type: PartType) -> Vec<Offer> {
    let Some(script) = document.select(&NEXT_DATA).next() else {
        return Vec::new();
    };
    let raw: String = script.text().collect();
    let payload: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unreadable page data: {}", e);
            return Vec::new();
        }
    };

    let mut ads = Vec::new();
    collect_objects(&payload, &is_ad_node, &mut ads);
    ads.into_iter().filter_map(|ad| offer_from_ad(ad, part_type)).collect()
}

fn ad_price(ad: &Map<String, Value>) -> f64 {
    match ad.get("price") {
        Some(Value::Array(items)) if !items.is_empty() => items[0].as_f64().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => ad.get("price_cents").and_then(numeric).map_or(0.0, |cents| cents / 100.0),
    }
}

fn offer_from_ad(ad: &Map<String, Value>, part_type: PartType) -> Option<Offer> {
    let title = str_field(ad, "subject").or_else(|| str_field(ad, "title"))?;
    let raw_url = str_field(ad, "url")?;

    let price = ad_price(ad);
    if price <= 0.0 {
        return None;
    }

    let url = absolute_ad_url(&raw_url);
    let id = str_field(ad, "list_id")
        .or_else(|| str_field(ad, "ad_id"))
        .or_else(|| str_field(ad, "id"))
        .unwrap_or_else(|| listing_id(&raw_url));

    let location = ad
        .get("location")
        .and_then(Value::as_object)
        .and_then(|loc| str_field(loc, "city"));
    let image = ad
        .get("images")
        .and_then(|images| images.get("urls"))
        .and_then(Value::as_object)
        .and_then(|urls| str_field(urls, "small").or_else(|| str_field(urls, "thumb_url")));

    let mut offer = Offer::new(Source::Leboncoin, id, title, url, price, 0.0, part_type)
        .with_location(location)
        .with_image(image);
    offer.posted_at = str_field(ad, "first_publication_date").or_else(|| str_field(ad, "index_date"));
    Some(offer)
}

fn parse_anchor_cards(document: &Html, part_type: PartType) -> Vec<Offer> {
    let mut offers = Vec::new();
    for anchor in document.select(&AD_ANCHOR) {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        let title = text_of(anchor);
        if href.is_empty() || title.chars().count() < 6 {
            continue;
        }

        let card_text = parent_element(anchor).map(text_of).unwrap_or_default();
        let price = parse_tagged_price(&card_text);
        if price <= 0.0 {
            continue;
        }

        let url = absolute_ad_url(href);
        offers.push(Offer::new(Source::Leboncoin, listing_id(href), title, url, price, 0.0, part_type));
    }
    offers
}

/// Parse the markdown rendering of the search page.
pub fn parse_mirror(text: &str, part_type: PartType) -> Vec<Offer> {
    let matches: Vec<_> = MIRROR_AD.captures_iter(text).collect();
    let mut offers = Vec::new();

    for (idx, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let url = normalize_spaces(&caps["url"]);
        let title = normalize_spaces(&caps["title"]);
        if url.is_empty() || title.is_empty() {
            continue;
        }

        // Price text trails the title, up to the next ad link
        let next_start = matches
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let tail = text_window(text, whole.end, (whole.end + 220).min(next_start));
        let price = parse_tagged_price(tail);
        if price <= 0.0 {
            continue;
        }

        // Thumbnails follow the ad link, never cross into the next ad
        let near = text_window(text, whole.start, (whole.end + 900).min(next_start));
        let image = IMAGE_URL
            .find_iter(near)
            .last()
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string());

        offers.push(
            Offer::new(Source::Leboncoin, listing_id(&url), title, url.clone(), price, 0.0, part_type)
                .with_image(image),
        );
    }
    offers
}

/// Parse search-engine results restricted to the marketplace domain.
///
/// Ads without a price in their snippet are kept as unknown-price offers,
/// but only when the user asked for no ceiling.
pub fn parse_search_engine(html: &str, params: &ScrapeParams) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let mut offers = Vec::new();

    for card in document.select(&RESULT_CARD) {
        let Some(link) = card.select(&RESULT_LINK).next() else {
            continue;
        };
        let href = unwrap_search_redirect(link.value().attr("href").unwrap_or(""));
        if !href.contains("leboncoin.fr") {
            continue;
        }

        let title = text_of(link);
        if title.is_empty() {
            continue;
        }
        let snippet = card.select(&RESULT_SNIPPET).next().map(text_of).unwrap_or_default();
        let image = card
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| absolutize(&href, src));

        let price = parse_tagged_price(&format!("{title} {snippet}"));
        let offer = if price > 0.0 {
            if !params.within_ceiling(price) {
                continue;
            }
            Offer::new(Source::Leboncoin, listing_id(&href), title, href.clone(), price, 0.0, params.part_type)
        } else if params.ceiling().is_none() {
            Offer::unpriced(Source::Leboncoin, listing_id(&href), title, href.clone(), params.part_type)
        } else {
            continue;
        };

        offers.push(offer.with_image(image));
        if offers.len() >= SEARCH_ENGINE_MAX_OFFERS {
            break;
        }
    }
    offers
}
