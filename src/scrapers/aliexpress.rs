use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::enrich::currency::CurrencyConverter;
use crate::error::ScrapeError;
use crate::http::{mirror_url, HttpFetcher};
use crate::models::{Offer, PartType, SearchCategory, Source};
use crate::normalize::{normalize_spaces, parse_tagged_price, text_window};
use crate::scrapers::chain::run_chain;
use crate::scrapers::dom::{parent_element, text_of, unwrap_search_redirect};
use crate::scrapers::traits::OfferScraper;
use crate::scrapers::types::{ScrapeParams, MAX_OFFERS_PER_SOURCE};

const BASE_URL: &str = "https://fr.aliexpress.com";
const SITE_REFERER: &str = "https://www.aliexpress.com/";
const SEARCH_ENGINE_REFERER: &str = "https://duckduckgo.com/";

/// Titles shorter than this are replaced by a generic label
const MIN_TITLE_LEN: usize = 8;

static ITEM_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href*='/item/']").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

static ITEM_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https://(?:(?:[a-z]{2,3}|www)\.)?aliexpress\.(?:com|us)/item/[0-9]{8,25}\.html(?:\?[^\s)]*)?")
        .unwrap()
});
static ITEM_PATH_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/item/([0-9]{8,25})\.html").unwrap());
static ITEM_QUERY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]itemId=([0-9]{8,25})").unwrap());
static IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https://(?:ae\d+|img)\.alicdn\.com/[^\s)]+").unwrap());
static USD_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([0-9]+(?:\.[0-9]{1,2})?)").unwrap());
static SEARCH_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[[^\]]*?(?P<title>[^\]]+)\]\((?P<ddg>https://duckduckgo\.com/l/\?[^)]+)\)").unwrap()
});

static HEADING_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)###\s*(.+?)\s+\$[0-9]+(?:\.[0-9]{1,2})?").unwrap());
static LINK_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(?P<label>[^\n\]]{12,260})\]\($").unwrap());
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap());
static LEADING_HASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#+\s*").unwrap());
static TRAILING_PRICES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\$[0-9]+(?:\.[0-9]{1,2})?\s+\$[0-9]+(?:\.[0-9]{1,2})?.*$").unwrap());
static DOLLAR_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[0-9]+(?:\.[0-9]{1,2})?").unwrap());
static BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
static IMAGE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b\S+\.(?:png|jpe?g|webp|avif)\)?").unwrap());
static SOLD_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b[0-9]+(?:\.[0-9]+)?\s+sold\b.*$").unwrap());
static DISCOUNT_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\boff on\b.*$").unwrap());

/// Search phrase in English, which the marketplace indexes best
pub fn build_query(brand: &str, model: &str, part_type: PartType, _category: SearchCategory) -> String {
    match part_type {
        PartType::ReplacementScreen => format!("{brand} {model} replacement screen"),
        PartType::PhoneWithoutScreen => format!("{brand} {model} for parts phone"),
    }
}

fn search_url(params: &ScrapeParams) -> String {
    let query = build_query(&params.brand, &params.model, params.part_type, params.category);
    format!(
        "{BASE_URL}/w/wholesale-{}.html?SortType=price_asc",
        urlencoding::encode(&query).replace("%20", "+")
    )
}

fn search_engine_url(params: &ScrapeParams) -> String {
    let query = build_query(&params.brand, &params.model, params.part_type, params.category);
    format!(
        "https://lite.duckduckgo.com/lite/?q={}",
        urlencoding::encode(&format!("site:fr.aliexpress.com/item {query}")).replace("%20", "+")
    )
}

/// Native item id from a product URL, or the URL itself when none is found
pub fn extract_offer_id(url: &str) -> String {
    ITEM_PATH_ID
        .captures(url)
        .or_else(|| ITEM_QUERY_ID.captures(url))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| url.to_string())
}

/// A price as found on the page, before conversion
#[derive(Debug, Clone, PartialEq)]
pub enum Quote {
    Eur(f64),
    Foreign { amount: f64, currency: String },
}

/// A listing whose price may still need converting
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    /// Price readings in order of preference
    pub quotes: Vec<Quote>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Product anchors on the live search page
    DirectPage,
    /// Markdown rendering of the search page
    Mirror,
    /// Site-restricted web search through the markdown proxy
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

/// AliExpress scraper; prices in other currencies are converted to EUR
pub struct AliexpressScraper {
    pub(crate) fetcher: HttpFetcher,
    pub(crate) converter: Arc<CurrencyConverter>,
}

impl AliexpressScraper {
    pub fn new(fetcher: HttpFetcher, converter: Arc<CurrencyConverter>) -> Self {
        Self { fetcher, converter }
    }

    async fn attempt(&self, strategy: Strategy, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        // Every route here is slow; never go below 20s
        let timeout = params.fallback_timeout(20);
        let candidates = match strategy {
            Strategy::DirectPage => {
                let html = self
                    .fetcher
                    .fetch_text_with_referer(&search_url(params), timeout, Some(SITE_REFERER))
                    .await?;
                parse_search_page(&html)
            }
            Strategy::Mirror => {
                let text = self
                    .fetcher
                    .fetch_text_with_referer(&mirror_url(&search_url(params)), timeout, Some(SITE_REFERER))
                    .await?;
                parse_mirror(&text)
            }
            Strategy::SearchEngine => {
                let text = self
                    .fetcher
                    .fetch_text_with_referer(
                        &mirror_url(&search_engine_url(params)),
                        timeout,
                        Some(SEARCH_ENGINE_REFERER),
                    )
                    .await?;
                parse_search_engine(&text)
            }
        };
        debug!("{} AliExpress candidates from {}", candidates.len(), strategy);
        Ok(self.price_candidates(candidates, params).await)
    }

    /// Convert candidate prices and build offers under the ceiling.
    pub(crate) async fn price_candidates(&self, candidates: Vec<Candidate>, params: &ScrapeParams) -> Vec<Offer> {
        let mut seen = HashSet::new();
        let mut offers = Vec::new();

        for candidate in candidates {
            let Some((price, currency)) = self.first_eur_price(&candidate.quotes).await else {
                continue;
            };
            let Some(offer) = build_offer(candidate, price, currency.as_deref(), params) else {
                continue;
            };
            if seen.insert(offer.source_offer_id.clone()) {
                offers.push(offer);
            }
            if offers.len() >= MAX_OFFERS_PER_SOURCE {
                break;
            }
        }
        offers
    }

    /// First quote that converts, with the currency it was converted from
    async fn first_eur_price(&self, quotes: &[Quote]) -> Option<(f64, Option<String>)> {
        for quote in quotes {
            match quote {
                Quote::Eur(amount) if *amount > 0.0 => return Some((*amount, None)),
                Quote::Foreign { amount, currency } if *amount > 0.0 => {
                    if let Some(eur) = self.converter.to_eur(*amount, currency).await {
                        return Some((eur, Some(currency.clone())));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

#[async_trait]
impl OfferScraper for AliexpressScraper {
    async fn search(&self, params: &ScrapeParams) -> Result<Vec<Offer>, ScrapeError> {
        info!("Starting AliExpress search for {} {}", params.brand, params.model);
        run_chain(Source::Aliexpress, &STRATEGIES, |strategy| self.attempt(strategy, params)).await
    }

    fn source(&self) -> Source {
        Source::Aliexpress
    }
}

fn build_offer(candidate: Candidate, price_eur: f64, converted_from: Option<&str>, params: &ScrapeParams) -> Option<Offer> {
    if price_eur <= 0.0 || !params.within_ceiling(price_eur) || candidate.url.is_empty() {
        return None;
    }
    let source_offer_id = extract_offer_id(&candidate.url);
    let title = clean_title(&candidate.title, &source_offer_id);
    let hint = converted_from
        .filter(|c| !c.eq_ignore_ascii_case("EUR"))
        .map(|c| format!("Prix converti depuis {}", c.to_uppercase()));

    Some(
        Offer::new(Source::Aliexpress, source_offer_id, title, candidate.url, price_eur, 0.0, params.part_type)
            .with_image(candidate.image_url)
            .with_condition(hint),
    )
}

/// Strip URLs, image names and sales blurbs from a listing title.
pub fn clean_title(raw: &str, source_offer_id: &str) -> String {
    let title = normalize_spaces(raw);
    let title = BARE_URL.replace_all(&title, "");
    let title = IMAGE_FILE.replace_all(&title, "");
    let title = SOLD_COUNT.replace(&title, "");
    let title = DISCOUNT_TAIL.replace(&title, "");
    let mut title = normalize_spaces(&title);

    let lowered = title.to_lowercase();
    if lowered.contains("aliexpress-media.com") || lowered.contains("alicdn.com") {
        title.clear();
    }
    if title.chars().count() < MIN_TITLE_LEN {
        return format!("AliExpress {source_offer_id}");
    }
    title
}

/// Decode entities, add a scheme to protocol-relative links, drop trailing punctuation.
fn normalize_item_url(raw: &str) -> String {
    let url = normalize_spaces(&html_escape::decode_html_entities(raw));
    let url = match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url,
    };
    url.trim_end_matches([')', '.', ',', ';']).to_string()
}

/// Price embedded in the `pdp_npi` tracking parameter.
///
/// The parameter is a `!`-separated record: currency at index 1, list price
/// at 2 and sale price at 3. The sale price is preferred.
pub fn pdp_npi_quote(url: &str) -> Option<Quote> {
    let parsed = Url::parse(url).ok()?;
    let raw = parsed
        .query_pairs()
        .find(|(k, _)| k == "pdp_npi")
        .map(|(_, v)| v.into_owned())?;
    let decoded = urlencoding::decode(&raw).map(|d| d.into_owned()).unwrap_or(raw);

    let parts: Vec<&str> = decoded.split('!').collect();
    if parts.len() < 4 {
        return None;
    }
    let currency = normalize_spaces(parts[1]).to_uppercase();
    let amount = [3, 2]
        .iter()
        .filter_map(|idx| parts.get(*idx))
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .find(|v| *v > 0.0)?;

    Some(if currency.is_empty() || currency == "EUR" {
        Quote::Eur(amount)
    } else {
        Quote::Foreign { amount, currency }
    })
}

/// Euro amount in snippet text, else the first dollar amount
fn inline_quote(text: &str) -> Option<Quote> {
    let eur = parse_tagged_price(text);
    if eur > 0.0 {
        return Some(Quote::Eur(eur));
    }
    USD_AMOUNT
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .map(|amount| Quote::Foreign {
            amount,
            currency: "USD".to_string(),
        })
}

fn quotes_for(url: &str, snippet: &str) -> Vec<Quote> {
    pdp_npi_quote(url).into_iter().chain(inline_quote(snippet)).collect()
}

fn image_near(text: &str) -> Option<String> {
    IMAGE_URL
        .find_iter(text)
        .last()
        .map(|m| normalize_spaces(m.as_str().trim_end_matches(['.', ',', ';'])))
}

/// Product anchors of the live search page.
pub fn parse_search_page(html: &str) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let mut candidates = Vec::new();

    for anchor in document.select(&ITEM_ANCHOR) {
        let url = normalize_item_url(anchor.value().attr("href").unwrap_or(""));
        if !url.contains("aliexpress") || !url.contains("/item/") {
            continue;
        }

        let parent = parent_element(anchor);
        let anchor_text = text_of(anchor);
        let parent_text = parent.map(text_of).unwrap_or_default();
        let title = if anchor_text.chars().count() >= MIN_TITLE_LEN {
            anchor_text
        } else {
            parent_text.clone()
        };

        let quotes = quotes_for(&url, &parent_text);
        if quotes.is_empty() {
            continue;
        }

        let image_url = anchor
            .select(&IMG)
            .next()
            .or_else(|| parent.and_then(|p| p.select(&IMG).next()))
            .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .map(normalize_item_url)
            .filter(|src| src.starts_with("http"));

        candidates.push(Candidate {
            title,
            url,
            quotes,
            image_url,
        });
    }
    candidates
}

/// Title of the product card surrounding an item link in the markdown rendering
fn title_near(text: &str, start: usize, end: usize) -> String {
    let left = start.saturating_sub(1400);
    let window = text_window(text, left, end + 80);

    if let Some(caps) = HEADING_TITLE.captures_iter(window).last() {
        let candidate = normalize_spaces(&MD_IMAGE.replace_all(&normalize_spaces(&caps[1]), ""));
        if candidate.chars().count() >= MIN_TITLE_LEN {
            return candidate;
        }
    }

    let prefix = text_window(text, left, start);
    if let Some(caps) = LINK_LABEL.captures(prefix) {
        let candidate = clean_markdown_title(&caps["label"]);
        if candidate.chars().count() >= MIN_TITLE_LEN {
            return candidate;
        }
    }

    let prefix = normalize_spaces(&MD_IMAGE.replace_all(&normalize_spaces(prefix), ""));
    let last_chunk = prefix.rsplit(" | ").next().unwrap_or_default();
    let candidate = LEADING_HASHES.replace(last_chunk, "");
    let candidate = normalize_spaces(&DOLLAR_AMOUNT.replace_all(&candidate, ""));
    if candidate.chars().count() >= MIN_TITLE_LEN {
        candidate
    } else {
        String::new()
    }
}

fn clean_markdown_title(raw: &str) -> String {
    let title = normalize_spaces(raw);
    let title = LEADING_HASHES.replace(&title, "");
    let title = normalize_spaces(&MD_IMAGE.replace_all(&title, ""));
    normalize_spaces(&TRAILING_PRICES.replace(&title, ""))
}

/// Item links in the markdown rendering of the search page.
pub fn parse_mirror(text: &str) -> Vec<Candidate> {
    ITEM_URL
        .find_iter(text)
        .filter_map(|m| {
            let url = normalize_item_url(m.as_str());
            if url.is_empty() {
                return None;
            }
            let near = normalize_spaces(text_window(text, m.start().saturating_sub(360), m.end() + 360));
            let quotes = quotes_for(&url, &near);
            if quotes.is_empty() {
                return None;
            }
            Some(Candidate {
                title: title_near(text, m.start(), m.end()),
                image_url: image_near(&near),
                url,
                quotes,
            })
        })
        .collect()
}

/// Result links of a site-restricted web search.
pub fn parse_search_engine(text: &str) -> Vec<Candidate> {
    SEARCH_RESULT
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let redirect = normalize_spaces(&caps["ddg"]);
            let target = unwrap_search_redirect(&redirect);
            if target == redirect {
                return None;
            }
            let mut url = normalize_item_url(&target);
            if let Some(cut) = url.find("&rut=") {
                url.truncate(cut);
            }
            if !url.contains("aliexpress.com/item/") && !url.contains("aliexpress.us/item/") {
                return None;
            }

            let near = normalize_spaces(text_window(
                text,
                whole.start().saturating_sub(200),
                whole.end() + 260,
            ));
            let quotes = quotes_for(&url, &near);
            if quotes.is_empty() {
                return None;
            }
            Some(Candidate {
                title: clean_markdown_title(&caps["title"]),
                image_url: image_near(&near),
                url,
                quotes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_scraper() -> AliexpressScraper {
        let fetcher = HttpFetcher::browser().unwrap();
        let converter = CurrencyConverter::with_rates_url(fetcher.clone(), "http://127.0.0.1:9/v6/latest");
        AliexpressScraper::new(fetcher, Arc::new(converter))
    }

    #[test]
    fn search_urls_use_plus_separated_query() {
        let params = ScrapeParams {
            brand: "Samsung".into(),
            model: "S21".into(),
            ..ScrapeParams::default()
        };
        assert_eq!(
            search_url(&params),
            "https://fr.aliexpress.com/w/wholesale-Samsung+S21+replacement+screen.html?SortType=price_asc"
        );
        assert!(search_engine_url(&params).contains("site%3Afr.aliexpress.com%2Fitem+Samsung"));
    }

    #[test]
    fn pdp_npi_prefers_sale_price() {
        let url = "https://fr.aliexpress.com/item/1005001234567890.html?pdp_npi=4%40dis%21USD%2115.80%2112.34%21%21%21";
        assert_eq!(
            pdp_npi_quote(url),
            Some(Quote::Foreign {
                amount: 12.34,
                currency: "USD".into()
            })
        );
        let url = "https://fr.aliexpress.com/item/1005001234567890.html?pdp_npi=4%40dis%21EUR%219.99%21%21";
        assert_eq!(pdp_npi_quote(url), Some(Quote::Eur(9.99)));
        assert_eq!(pdp_npi_quote("https://fr.aliexpress.com/item/1005001234567890.html"), None);
    }

    #[test]
    fn titles_lose_noise() {
        assert_eq!(clean_title("Ecran S21 OLED 250 sold 4.8 stars", "1"), "Ecran S21 OLED");
        assert_eq!(
            clean_title("LCD Galaxy S21 https://ae01.alicdn.com/kf/a.jpg", "1"),
            "LCD Galaxy S21"
        );
        assert_eq!(clean_title("Ecran 50% off on S21", "77"), "Ecran 50%");
        assert_eq!(clean_title("pic.webp", "1005"), "AliExpress 1005");
    }

    #[test]
    fn search_page_anchors_become_candidates() {
        let html = r#"<html><body>
          <div class="card"><a href="//fr.aliexpress.com/item/1005001234567890.html?pdp_npi=4%40dis%21EUR%2115.80%2112.34%21%21%21"><img src="//ae01.alicdn.com/kf/abc.jpg"><span>Ecran LCD Samsung Galaxy S21 remplacement</span></a></div>
          <div class="card"><a href="https://fr.aliexpress.com/item/1005009999999999.html">x</a><span>Ecran OLED S21 compatible 23,50 €</span></div>
          <div><a href="https://fr.aliexpress.com/item/1005008888888888.html">no price here at all</a></div>
          <div><a href="/category/item/ecrans">Ecrans 5 €</a></div>
        </body></html>"#;

        let candidates = parse_search_page(html);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.title, "Ecran LCD Samsung Galaxy S21 remplacement");
        assert!(first.url.starts_with("https://fr.aliexpress.com/item/1005001234567890.html"));
        assert_eq!(first.quotes[0], Quote::Eur(12.34));
        assert_eq!(first.image_url.as_deref(), Some("https://ae01.alicdn.com/kf/abc.jpg"));

        let second = &candidates[1];
        assert_eq!(second.title, "x Ecran OLED S21 compatible 23,50 €");
        assert_eq!(second.quotes, vec![Quote::Eur(23.5)]);
    }

    #[test]
    fn mirror_titles_come_from_card_headings() {
        let text = "### Ecran LCD pour Samsung Galaxy S21 5G $12.99 $25.00\n\
                    ![img](https://ae01.alicdn.com/kf/S1.jpg)\n\
                    [Voir](https://fr.aliexpress.com/item/1005001111111111.html)\n";
        let candidates = parse_mirror(text);
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.title, "Ecran LCD pour Samsung Galaxy S21 5G");
        assert_eq!(candidate.url, "https://fr.aliexpress.com/item/1005001111111111.html");
        assert_eq!(
            candidate.quotes,
            vec![Quote::Foreign {
                amount: 12.99,
                currency: "USD".into()
            }]
        );
        assert_eq!(candidate.image_url.as_deref(), Some("https://ae01.alicdn.com/kf/S1.jpg"));
    }

    #[test]
    fn search_engine_results_are_unwrapped() {
        let text = "[1. Ecran Samsung S21 AliExpress](https://duckduckgo.com/l/?uddg=https%3A%2F%2Ffr.aliexpress.com%2Fitem%2F1005002222222222.html&rut=abc)\n\
                    Prix 18,90 € livraison gratuite\n\
                    [Autre site](https://duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.org%2Fecran&rut=def)\n";
        let candidates = parse_search_engine(text);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://fr.aliexpress.com/item/1005002222222222.html");
        assert_eq!(candidates[0].title, "1. Ecran Samsung S21 AliExpress");
        assert_eq!(candidates[0].quotes, vec![Quote::Eur(18.9)]);
    }

    #[tokio::test]
    async fn candidates_are_converted_and_capped() {
        let scraper = offline_scraper();
        let params = ScrapeParams {
            brand: "Samsung".into(),
            model: "S21".into(),
            max_price_eur: Some(20.0),
            ..ScrapeParams::default()
        };
        let candidate = |id: &str, quotes: Vec<Quote>| Candidate {
            title: "Ecran Samsung Galaxy S21".into(),
            url: format!("https://fr.aliexpress.com/item/{id}.html"),
            quotes,
            image_url: None,
        };
        let offers = scraper
            .price_candidates(
                vec![
                    candidate(
                        "1005000000000001",
                        vec![Quote::Foreign {
                            amount: 12.99,
                            currency: "USD".into(),
                        }],
                    ),
                    candidate("1005000000000002", vec![Quote::Eur(35.0)]),
                    candidate(
                        "1005000000000003",
                        vec![
                            Quote::Foreign {
                                amount: 10.0,
                                currency: "XYZ".into(),
                            },
                            Quote::Eur(15.0),
                        ],
                    ),
                    candidate("1005000000000001", vec![Quote::Eur(1.0)]),
                ],
                &params,
            )
            .await;

        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].price_eur, 11.95);
        assert_eq!(offers[0].condition_text.as_deref(), Some("Prix converti depuis USD"));
        assert_eq!(offers[1].source_offer_id, "1005000000000003");
        assert_eq!(offers[1].price_eur, 15.0);
        assert_eq!(offers[1].condition_text, None);
    }
}
