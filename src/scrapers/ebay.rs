use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::enrich::variant::VariantResolver;
use crate::error::ScrapeError;
use crate::http::{mirror_url, HttpFetcher};
use crate::models::{Offer, PartType, SearchCategory, Source};
use crate::normalize::{normalize_spaces, parse_price, parse_tagged_price, text_window};
use crate::scrapers::chain::run_chain;
use crate::scrapers::dom::text_of;
use crate::scrapers::traits::OfferScraper;
use crate::scrapers::types::{ScrapeParams, MAX_OFFERS_PER_SOURCE};

const BASE_URL: &str = "https://www.ebay.fr";

/// eBay category "Mobile phone parts"
const PARTS_CATEGORY_ID: u32 = 15032;

/// How many ids the newest-first snapshot may hold
const RECENT_IDS_LIMIT: usize = 140;

pub const RECENT_IDS_TTL: Duration = Duration::from_secs(15 * 60);

static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("li.s-item").unwrap());
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".s-item__title").unwrap());
static CARD_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.s-item__link").unwrap());
static CARD_PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".s-item__price").unwrap());
static CARD_SHIPPING: Lazy<Selector> = Lazy::new(|| Selector::parse(".s-item__shipping").unwrap());
static CARD_LOCATION: Lazy<Selector> = Lazy::new(|| Selector::parse(".s-item__location").unwrap());
static CARD_CONDITION: Lazy<Selector> = Lazy::new(|| Selector::parse(".SECONDARY_INFO").unwrap());
static CARD_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img.s-item__image-img").unwrap());

static ITEM_PATH_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/itm/(?:[^/?#]+/)?([0-9]{8,20})").unwrap());
static ITEM_QUERY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]item=([0-9]{8,20})").unwrap());
static MIRROR_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(?P<title>[^\]]+)\]\((?P<url>https://www\.ebay\.[^)]+/itm/[^)]+)\)").unwrap()
});
static ITEM_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https://www\.ebay\.[^\s)\]]*/itm/[^\s)\]]+").unwrap());
static IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https://i\.ebayimg\.com/images/[^\s)]+").unwrap());

/// Search phrase in the way sellers title their listings
pub fn build_query(brand: &str, model: &str, part_type: PartType, category: SearchCategory) -> String {
    let base = match part_type {
        PartType::ReplacementScreen => format!("ecran {brand} {model} remplacement"),
        PartType::PhoneWithoutScreen => format!("{brand} {model} pour pieces sans ecran"),
    };
    match category {
        SearchCategory::MobilePhoneParts => format!("{base} telephone mobile pieces"),
        SearchCategory::Auto => base,
    }
}

fn query_for(params: &ScrapeParams) -> String {
    build_query(&params.brand, &params.model, params.part_type, params.category)
}

fn ceiling_suffix(params: &ScrapeParams) -> String {
    params
        .ceiling_param()
        .map(|max| format!("&_udhi={max}"))
        .unwrap_or_default()
}

/// Buy-it-now listings, cheapest total first
fn search_url(params: &ScrapeParams) -> String {
    let category = match params.category {
        SearchCategory::MobilePhoneParts => format!("&_sacat={PARTS_CATEGORY_ID}"),
        SearchCategory::Auto => String::new(),
    };
    format!(
        "{BASE_URL}/sch/i.html?_nkw={}&_sop=15&LH_BIN=1{}{}&rt=nc",
        urlencoding::encode(&query_for(params)),
        ceiling_suffix(params),
        category
    )
}

/// Same search, newly listed first
fn recent_url(params: &ScrapeParams) -> String {
    format!(
        "{BASE_URL}/sch/i.html?_nkw={}&_sop=10&rt=nc{}",
        urlencoding::encode(&query_for(params)),
        ceiling_suffix(params)
    )
}

/// Native listing id from an item URL, or the URL itself when none is found
pub fn extract_offer_id(url: &str) -> String {
    ITEM_PATH_ID
        .captures(url)
        .or_else(|| ITEM_QUERY_ID.captures(url))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| url.to_string())
}

/// Distinct listing ids linked from a page, in page order
pub fn extract_offer_ids(text: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    ITEM_LINK
        .find_iter(text)
        .map(|m| extract_offer_id(m.as_str()))
        .filter(|id| id.len() >= 8 && id.chars().all(|c| c.is_ascii_digit()))
        .filter(|id| seen.insert(id.clone()))
        .take(limit)
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Search result cards on the live page
    DirectPage,
    /// Markdown rendering of the same page
    Mirror,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectPage => "direct",
            Self::Mirror => "mirror",
        })
    }
}

const STRATEGIES: [Strategy; 2] = [Strategy::DirectPage, Strategy::Mirror];

/// eBay scraper with variant pricing and "recently listed" tagging
pub struct EbayScraper {
    pub(crate) fetcher: HttpFetcher,
    pub(crate) variants: Arc<VariantResolver>,
    recent_ids: TtlCache<String, Arc<HashSet<String>>>,
}

impl EbayScraper {
    pub fn new(fetcher: HttpFetcher, variants: Arc<VariantResolver>) -> Self {
        Self {
            fetcher,
            variants,
            recent_ids: TtlCache::new(),
        }
    }

    async fn attempt(&self, strategy: Strategy, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        match strategy {
            Strategy::DirectPage => {
                let html = self.fetcher.fetch_text(&search_url(params), params.timeout).await?;
                Ok(parse_result_cards(&html, params.part_type))
            }
            Strategy::Mirror => {
                let text = self
                    .fetcher
                    .fetch_text(&mirror_url(&search_url(params)), params.fallback_timeout(24))
                    .await?;
                Ok(parse_mirror(&text, params.part_type))
            }
        }
    }

    /// Ids on the newest-first listing of the same search, cached briefly.
    ///
    /// A failed fetch caches an empty set too, so a flaky mirror is not
    /// hammered on every request.
    async fn recent_offer_ids(&self, params: &ScrapeParams) -> Arc<HashSet<String>> {
        let key = format!(
            "{}|{}",
            query_for(params),
            params
                .ceiling_param()
                .map_or_else(|| "none".to_string(), |max| max.to_string())
        );
        if let Some(ids) = self.recent_ids.get(&key) {
            return ids;
        }

        let ids = match self
            .fetcher
            .fetch_text(&mirror_url(&recent_url(params)), params.fallback_timeout(20))
            .await
        {
            Ok(text) => extract_offer_ids(&text, RECENT_IDS_LIMIT),
            Err(e) => {
                debug!("Recent listing snapshot unavailable: {}", e);
                Vec::new()
            }
        };

        let ids = Arc::new(ids.into_iter().collect::<HashSet<_>>());
        self.recent_ids.insert(key, Arc::clone(&ids), RECENT_IDS_TTL);
        ids
    }
}

#[async_trait]
impl OfferScraper for EbayScraper {
    async fn search(&self, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        info!("Starting eBay search for {} {}", params.brand, params.model);

        let mut offers = run_chain(Source::Ebay, &STRATEGIES, |strategy| self.attempt(strategy, params)).await?;

        self.variants.enrich(&mut offers, &params.model).await;

        let recent = self.recent_offer_ids(params).await;
        for offer in offers.iter_mut() {
            offer.is_recently_added = recent.contains(&offer.source_offer_id);
        }

        offers.truncate(MAX_OFFERS_PER_SOURCE);
        Ok(offers)
    }

    fn source(&self) -> Source {
        Source::Ebay
    }
}

/// Structured price element first, euro-tagged card text otherwise
fn price_from(element: Option<ElementRef<'_>>, fallback_text: &str) -> f64 {
    match element.map(text_of) {
        Some(text) => Some(parse_tagged_price(&text))
            .filter(|p| *p > 0.0)
            .unwrap_or_else(|| parse_price(&text)),
        None => parse_tagged_price(fallback_text),
    }
}

/// Parse the live search page's result cards.
pub fn parse_result_cards(html: &str, part_type: PartType) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let mut offers = Vec::new();

    for card in document.select(&CARD) {
        let (Some(title_el), Some(link_el)) =
            (card.select(&CARD_TITLE).next(), card.select(&CARD_LINK).next())
        else {
            continue;
        };

        let title = text_of(title_el);
        if title.is_empty()
            || title.contains("Annonce")
            || title.eq_ignore_ascii_case("new listing")
            || title.to_lowercase().contains("shop on ebay")
        {
            continue;
        }
        let url = link_el.value().attr("href").unwrap_or("").trim().to_string();
        if !url.starts_with("http") {
            continue;
        }

        let card_text = text_of(card);
        let price = price_from(card.select(&CARD_PRICE).next(), &card_text);
        if price <= 0.0 {
            continue;
        }
        let shipping = card
            .select(&CARD_SHIPPING)
            .next()
            .map(|el| price_from(Some(el), ""))
            .unwrap_or(0.0);

        let image = card.select(&CARD_IMAGE).next().and_then(|img| {
            img.value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))
                .map(str::to_string)
        });

        let offer = Offer::new(Source::Ebay, extract_offer_id(&url), title, url, price, shipping, part_type)
            .with_location(card.select(&CARD_LOCATION).next().map(text_of))
            .with_condition(card.select(&CARD_CONDITION).next().map(text_of))
            .with_image(image);
        offers.push(offer);
    }
    offers
}

/// Parse the markdown rendering of the search page.
pub fn parse_mirror(text: &str, part_type: PartType) -> Vec<Offer> {
    let matches: Vec<_> = MIRROR_ITEM.captures_iter(text).collect();
    let mut seen = HashSet::new();
    let mut offers = Vec::new();

    for (idx, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let raw_title = normalize_spaces(&caps["title"]);
        let lowered = raw_title.to_lowercase();
        if raw_title.is_empty() || lowered.starts_with("image ") || lowered.contains("shop on ebay") {
            continue;
        }
        let title = raw_title
            .split("La page s'ouvre")
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let url = normalize_spaces(&caps["url"]);
        if title.is_empty() || url.is_empty() {
            continue;
        }

        let next_start = matches
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let tail = text_window(text, whole.end, (whole.end + 260).min(next_start));
        let price = parse_tagged_price(tail);
        if price <= 0.0 {
            continue;
        }

        // Thumbnails precede the listing link in the rendering
        let prev_end = idx
            .checked_sub(1)
            .and_then(|prev| matches[prev].get(0))
            .map_or(0, |m| m.end());
        let near = text_window(text, whole.start.saturating_sub(700).max(prev_end), whole.end + 80);
        let image = IMAGE_URL
            .find_iter(near)
            .last()
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string());

        let source_offer_id = extract_offer_id(&url);
        if !seen.insert(source_offer_id.clone()) {
            continue;
        }
        offers.push(Offer::new(Source::Ebay, source_offer_id, title, url, price, 0.0, part_type).with_image(image));
    }
    offers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_id_from_item_urls() {
        assert_eq!(extract_offer_id("https://www.ebay.fr/itm/123456789012"), "123456789012");
        assert_eq!(
            extract_offer_id("https://www.ebay.fr/itm/ecran-samsung-s21/123456789012?hash=x"),
            "123456789012"
        );
        assert_eq!(
            extract_offer_id("https://www.ebay.fr/ulk/itm?item=98765432109&x=1"),
            "98765432109"
        );
        assert_eq!(extract_offer_id("https://www.ebay.fr/b/foo"), "https://www.ebay.fr/b/foo");
    }

    #[test]
    fn search_url_has_ceiling_and_category() {
        let params = ScrapeParams {
            brand: "Samsung".into(),
            model: "S21".into(),
            max_price_eur: Some(60.0),
            ..ScrapeParams::default()
        };
        let url = search_url(&params);
        assert!(url.starts_with("https://www.ebay.fr/sch/i.html?_nkw=ecran%20Samsung%20S21%20remplacement"));
        assert!(url.contains("&_udhi=60"));
        assert!(url.contains("&_sacat=15032"));
        assert!(url.contains("LH_BIN=1"));
        assert!(recent_url(&params).contains("_sop=10"));
    }

    #[test]
    fn result_cards_become_offers() {
        let html = r#"<html><body><ul>
          <li class="s-item">
            <div class="s-item__title">Shop on eBay</div>
            <a class="s-item__link" href="https://ebay.com/itm/123456"></a>
            <span class="s-item__price">20,00 EUR</span>
          </li>
          <li class="s-item">
            <img class="s-item__image-img" src="https://i.ebayimg.com/images/g/abc/s-l225.jpg">
            <div class="s-item__title">Ecran OLED Samsung Galaxy S21 5G</div>
            <a class="s-item__link" href="https://www.ebay.fr/itm/234567890123?hash=item36"></a>
            <span class="SECONDARY_INFO">Neuf</span>
            <span class="s-item__price">1 049,90 EUR</span>
            <span class="s-item__shipping">+4,50 EUR de frais de livraison</span>
            <span class="s-item__location">de Chine</span>
          </li>
          <li class="s-item">
            <div class="s-item__title">Annonce sponsorisée</div>
            <a class="s-item__link" href="https://www.ebay.fr/itm/345678901234"></a>
            <span class="s-item__price">5,00 EUR</span>
          </li>
          <li class="s-item">
            <div class="s-item__title">Ecran S21 sans prix</div>
            <a class="s-item__link" href="https://www.ebay.fr/itm/456789012345"></a>
          </li>
        </ul></body></html>"#;

        let offers = parse_result_cards(html, PartType::ReplacementScreen);
        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.source_offer_id, "234567890123");
        assert_eq!(offer.price_eur, 1049.9);
        assert_eq!(offer.shipping_eur, 4.5);
        assert_eq!(offer.total_eur, 1054.4);
        assert_eq!(offer.condition_text.as_deref(), Some("Neuf"));
        assert_eq!(offer.location.as_deref(), Some("de Chine"));
        assert!(offer.image_url.is_some());
    }

    #[test]
    fn mirror_markdown_is_parsed() {
        let text = "![Image 1](https://i.ebayimg.com/images/g/aaa/s-l500.jpg)\n\
                    [Ecran Samsung S21 OLED La page s'ouvre dans une nouvelle fenêtre](https://www.ebay.fr/itm/111111111111?x=1)\n\
                    25,99 EUR + livraison\n\
                    [Image 2: Ecran](https://www.ebay.fr/itm/222222222222)\n\
                    12,00 EUR\n\
                    [Ecran S21 doublon](https://www.ebay.fr/itm/slug/111111111111)\n\
                    30,00 EUR\n\
                    [Ecran S21 sans prix](https://www.ebay.fr/itm/333333333333)\n\
                    bientôt\n";

        let offers = parse_mirror(text, PartType::ReplacementScreen);
        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.title, "Ecran Samsung S21 OLED");
        assert_eq!(offer.source_offer_id, "111111111111");
        assert_eq!(offer.price_eur, 25.99);
        assert!(offer.image_url.as_deref().unwrap().contains("aaa"));
    }

    #[test]
    fn recent_ids_are_distinct_and_numeric() {
        let text = "https://www.ebay.fr/itm/123456789012 \
                    (https://www.ebay.fr/itm/slug/123456789012) \
                    https://www.ebay.com/itm/987654321098?x=1 \
                    https://www.ebay.fr/itm/123456";
        assert_eq!(extract_offer_ids(text, 10), vec!["123456789012", "987654321098"]);
        assert_eq!(extract_offer_ids(text, 1).len(), 1);
    }
}
