//! Multi-variation eBay listings: price the variation matching the model.
//!
//! A listing such as "Ecran Samsung S20 / S21 / S21 FE" shows the cheapest
//! variation's price in search results. The item page embeds an `MSKU` view
//! model mapping menu entries to variations; the entry best matching the
//! requested model decides the price shown to the user.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::http::{mirror_url, HttpFetcher};
use crate::models::Offer;
use crate::normalize::{canonicalize_url, fold_lower, normalize_spaces, round2, text_window};
use crate::scrapers::ebay::extract_offer_id;
use crate::scrapers::payload::{extract_json_object, numeric};

const MSKU_MARKER: &str = r#""MSKU":{"_type":"VariationViewModel""#;

/// Below this score no option counts as the requested model
const MIN_MATCH_SCORE: f64 = 2.0;
const NO_MATCH: f64 = -999.0;

const QUALIFIERS: [&str; 7] = ["pro", "plus", "max", "mini", "ultra", "lite", "fe"];

const MAX_WORKERS: usize = 6;
const ITEM_TIMEOUT: Duration = Duration::from_secs(16);
const MIRROR_TIMEOUT: Duration = Duration::from_secs(18);

/// Empty option lists are retried sooner
const EMPTY_OPTIONS_TTL: Duration = Duration::from_secs(600);

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());
static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-9]+)\b").unwrap());
static FR_EUR_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9]{1,3}(?:[ .][0-9]{3})*,[0-9]{2})\s*EUR").unwrap());

/// Tunables for variant enrichment
#[derive(Debug, Clone)]
pub struct VariantSettings {
    /// Offers examined per search
    pub max_offers: usize,
    /// Lifetime of a listing's option list
    pub options_ttl: Duration,
    /// Lifetime of a French variation price lookup
    pub fr_price_ttl: Duration,
}

impl Default for VariantSettings {
    fn default() -> Self {
        Self {
            max_offers: 10,
            options_ttl: Duration::from_secs(6 * 60 * 60),
            fr_price_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// One menu entry of a multi-variation listing
#[derive(Debug, Clone, PartialEq)]
pub struct VariantOption {
    pub name: String,
    pub variation_ids: Vec<String>,
    /// Cheapest matching variation's price, in `currency`
    pub price: f64,
    pub shipping: f64,
    pub currency: Option<String>,
}

impl VariantOption {
    fn priced_in_eur(&self) -> bool {
        self.currency.as_deref() == Some("EUR")
    }
}

/// Locates and caches per-listing variation data
pub struct VariantResolver {
    pub(crate) fetcher: HttpFetcher,
    settings: VariantSettings,
    options: TtlCache<String, Arc<Vec<VariantOption>>>,
    fr_prices: TtlCache<String, Option<f64>>,
}

impl VariantResolver {
    pub fn new(fetcher: HttpFetcher, settings: VariantSettings) -> Self {
        Self {
            fetcher,
            settings,
            options: TtlCache::new(),
            fr_prices: TtlCache::new(),
        }
    }

    /// Reprice the first item listings in `offers` to the variation
    /// matching `model`. Offers without a confident match stay as they are.
    pub async fn enrich(&self, offers: &mut [Offer], model: &str) {
        let model = normalize_spaces(model);
        if model.is_empty() || self.settings.max_offers == 0 {
            return;
        }

        let targets: Vec<(usize, String)> = offers
            .iter()
            .enumerate()
            .filter(|(_, offer)| offer.url.contains("/itm/"))
            .take(self.settings.max_offers)
            .map(|(idx, offer)| (idx, offer.url.clone()))
            .collect();
        if targets.is_empty() {
            return;
        }

        let model = model.as_str();
        let resolved: Vec<(usize, VariantOption, Option<f64>)> = stream::iter(targets)
            .map(|(idx, url)| async move {
                let option = self.resolve(&url, model).await?;
                let fr_price = self.first_fr_price(&extract_offer_id(&url), &option).await;
                Some((idx, option, fr_price))
            })
            .buffer_unordered(MAX_WORKERS)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        let mut applied = 0;
        for (idx, option, fr_price) in resolved {
            if let Some(offer) = offers.get_mut(idx) {
                if apply_variant(offer, &option, fr_price) {
                    applied += 1;
                }
            }
        }
        info!("Repriced {} eBay listings to the {} variant", applied, model);
    }

    /// Best-matching option of a listing, if any clears the threshold
    async fn resolve(&self, item_url: &str, model: &str) -> Option<VariantOption> {
        let options = self.options_for(item_url).await;
        best_option(&options, model).cloned()
    }

    async fn options_for(&self, item_url: &str) -> Arc<Vec<VariantOption>> {
        let key = canonicalize_url(item_url);
        if let Some(options) = self.options.get(&key) {
            return options;
        }

        let mut found = Vec::new();
        for url in sibling_sites(&key) {
            match self.fetcher.fetch_text(&url, ITEM_TIMEOUT).await {
                Ok(html) => {
                    found = extract_msku(&html).map(|msku| build_options(&msku)).unwrap_or_default();
                    if !found.is_empty() {
                        break;
                    }
                }
                Err(e) => debug!("Item page {} unavailable: {}", url, e),
            }
        }

        let ttl = if found.is_empty() {
            EMPTY_OPTIONS_TTL
        } else {
            self.settings.options_ttl
        };
        let found = Arc::new(found);
        self.options
            .insert(key, Arc::clone(&found), ttl.max(Duration::from_secs(60)));
        found
    }

    async fn first_fr_price(&self, item_id: &str, option: &VariantOption) -> Option<f64> {
        for variation_id in &option.variation_ids {
            if let Some(price) = self.fr_price(item_id, variation_id).await {
                return Some(price);
            }
        }
        None
    }

    /// Price of one variation as the French site displays it
    async fn fr_price(&self, item_id: &str, variation_id: &str) -> Option<f64> {
        if item_id.is_empty() || variation_id.is_empty() {
            return None;
        }
        let key = format!("{item_id}:{variation_id}");
        if let Some(price) = self.fr_prices.get(&key) {
            return price;
        }

        let url = mirror_url(&format!("https://www.ebay.fr/itm/{item_id}?var={variation_id}"));
        let price = match self.fetcher.fetch_text(&url, MIRROR_TIMEOUT).await {
            Ok(text) => extract_fr_price(&text),
            Err(e) => {
                debug!("Variation page {} unavailable: {}", url, e);
                None
            }
        };
        self.fr_prices
            .insert(key, price, self.settings.fr_price_ttl.max(Duration::from_secs(300)));
        price
    }
}

/// Item page on its own site first, then on the other one of .fr/.com
fn sibling_sites(item_url: &str) -> Vec<String> {
    let mut urls = vec![item_url.to_string()];
    if item_url.contains("www.ebay.fr") {
        urls.push(item_url.replace("www.ebay.fr", "www.ebay.com"));
    } else if item_url.contains("www.ebay.com") {
        urls.push(item_url.replace("www.ebay.com", "www.ebay.fr"));
    }
    urls
}

/// Apply a resolved option to `offer`. Returns false when no EUR price is
/// available, in which case the offer is left untouched.
pub fn apply_variant(offer: &mut Offer, option: &VariantOption, fr_price: Option<f64>) -> bool {
    let price = fr_price
        .filter(|p| *p > 0.0)
        .or_else(|| Some(option.price).filter(|p| *p > 0.0 && option.priced_in_eur()));
    let Some(price) = price else {
        return false;
    };

    let shipping = if option.priced_in_eur() {
        option.shipping
    } else {
        offer.shipping_eur
    };
    offer.reprice(price, shipping);
    offer.append_condition(&format!("Variante: {}", option.name));
    true
}

/// The embedded `MSKU` variation view model, if the page has one
pub fn extract_msku(html: &str) -> Option<Value> {
    let idx = html.find(MSKU_MARKER)?;
    let payload = extract_json_object(html, idx + r#""MSKU":"#.len())?;
    serde_json::from_str::<Value>(payload)
        .ok()
        .filter(Value::is_object)
}

/// One option per menu entry, priced at its cheapest matching variation
pub fn build_options(msku: &Value) -> Vec<VariantOption> {
    let (Some(menu), Some(variations)) = (
        msku.get("menuItemMap").and_then(Value::as_object),
        msku.get("variationsMap").and_then(Value::as_object),
    ) else {
        return Vec::new();
    };

    let mut options = Vec::new();
    for row in menu.values().filter_map(Value::as_object) {
        let name = ["displayName", "valueName"]
            .iter()
            .filter_map(|k| row.get(*k).and_then(Value::as_str))
            .map(normalize_spaces)
            .find(|n| !n.is_empty());
        let Some(name) = name else { continue };

        let variation_ids: Vec<String> = row
            .get("matchingVariationIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| match id {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        if variation_ids.is_empty() {
            continue;
        }

        let cheapest = variation_ids
            .iter()
            .filter_map(|id| variations.get(id).and_then(Value::as_object))
            .filter_map(|variation| {
                let (price, currency) = variation_price(variation)?;
                Some((price, variation_shipping(variation), currency))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let Some((price, shipping, currency)) = cheapest else { continue };

        options.push(VariantOption {
            name,
            variation_ids,
            price: round2(price),
            shipping: round2(shipping),
            currency,
        });
    }
    options
}

fn variation_price(variation: &Map<String, Value>) -> Option<(f64, Option<String>)> {
    let bin = variation.get("binModel");
    let candidates = [
        bin.and_then(|b| b.get("price")),
        bin.and_then(|b| b.get("currentPrice")),
        bin.and_then(|b| b.get("displayPrice")),
        variation.get("price"),
    ];

    candidates.into_iter().flatten().find_map(|candidate| {
        let price = numeric(candidate).filter(|p| *p > 0.0)?;
        let currency = candidate
            .get("value")
            .filter(|v| v.is_object())
            .unwrap_or(candidate)
            .get("currency")
            .and_then(Value::as_str)
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
        Some((round2(price), currency))
    })
}

fn variation_shipping(variation: &Map<String, Value>) -> f64 {
    ["shippingCost", "shipping", "deliveryCost", "delivery"]
        .iter()
        .filter_map(|k| variation.get(*k))
        .find_map(|v| numeric(v).filter(|s| *s >= 0.0))
        .map(round2)
        .unwrap_or(0.0)
}

/// How well a menu entry names `model`; higher is better.
///
/// Every model token found scores +2 and every missing one -4. The whole
/// model as a phrase adds 10. Qualifiers (pro, max, fe...) and lettered
/// suffixes (9A for 9) the model does not carry are penalized.
pub fn score_option(option_name: &str, model: &str) -> f64 {
    let option_fold = fold_lower(option_name);
    let model_fold = fold_lower(model);
    if option_fold.is_empty() || model_fold.is_empty() {
        return NO_MATCH;
    }

    let model_tokens: Vec<&str> = TOKEN.find_iter(&model_fold).map(|m| m.as_str()).collect();
    let option_tokens: Vec<&str> = TOKEN.find_iter(&option_fold).map(|m| m.as_str()).collect();
    let present = model_tokens.iter().filter(|t| option_tokens.contains(t)).count();
    if present == 0 {
        return NO_MATCH;
    }

    let missing = model_tokens.len() - present;
    let mut score = (present * 2) as f64 - (missing * 4) as f64;

    if contains_phrase(&option_fold, &model_fold) {
        score += 10.0;
    }

    for qualifier in QUALIFIERS {
        if option_tokens.contains(&qualifier) && !model_tokens.contains(&qualifier) {
            score -= 6.0;
        }
    }

    for caps in BARE_NUMBER.captures_iter(&model_fold) {
        let base = &caps[1];
        if has_lettered_suffix(&option_tokens, base) && !has_lettered_suffix(&model_tokens, base) {
            score -= 12.0;
        }
    }
    score
}

/// `needle` occurs in `haystack` with a word boundary on both sides
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        is_boundary(haystack[..start].chars().next_back(), needle.chars().next())
            && is_boundary(needle.chars().next_back(), haystack[end..].chars().next())
    })
}

fn is_boundary(before: Option<char>, after: Option<char>) -> bool {
    let word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    word(before) != word(after)
}

/// A token such as `9a` for base `9`
fn has_lettered_suffix(tokens: &[&str], base: &str) -> bool {
    tokens.iter().any(|token| {
        token.len() == base.len() + 1
            && token.starts_with(base)
            && token.ends_with(|c: char| c.is_ascii_lowercase())
    })
}

/// Highest-scoring option, provided it clears the match threshold
pub fn best_option<'a>(options: &'a [VariantOption], model: &str) -> Option<&'a VariantOption> {
    let mut best: Option<(&VariantOption, f64)> = None;
    for option in options {
        let score = score_option(&option.name, model);
        if score > best.map_or(NO_MATCH, |(_, s)| s) {
            best = Some((option, score));
        }
    }
    best.filter(|(_, score)| *score >= MIN_MATCH_SCORE)
        .map(|(option, _)| option)
}

/// Variation price from the French item page rendering.
///
/// The price shown for the selected variation is the last `xx,yy EUR`
/// before the condition line, falling back to the compatible-model line.
pub fn extract_fr_price(text: &str) -> Option<f64> {
    let anchors = [
        ["État:", "Etat:", "Condition:"].as_slice(),
        ["Modèle compatible", "Modele compatible"].as_slice(),
    ];
    anchors.iter().find_map(|labels| {
        let idx = labels.iter().find_map(|label| text.find(label))?;
        let segment = text_window(text, idx.saturating_sub(1400), idx + 200);
        let raw = FR_EUR_PRICE.captures_iter(segment).last()?;
        parse_fr_amount(&raw[1])
    })
}

fn parse_fr_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0)
        .map(round2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PartType, Source};

    const ITEM_PAGE: &str = r#"<html><script>$rwidgets({"x":1,"MSKU":{"_type":"VariationViewModel",
        "menuItemMap":{
          "0":{"valueName":"Galaxy S21","displayName":"Galaxy S21","matchingVariationIds":[101,102]},
          "1":{"displayName":"Galaxy S21 Ultra","matchingVariationIds":[103]},
          "2":{"displayName":"Galaxy S21 FE","matchingVariationIds":["104"]},
          "3":{"displayName":"Sans variation","matchingVariationIds":[]}
        },
        "variationsMap":{
          "101":{"binModel":{"price":{"value":{"value":39.9,"currency":"EUR"}}},"shippingCost":{"value":2.5}},
          "102":{"binModel":{"price":{"value":{"value":35.0,"currency":"EUR"}}}},
          "103":{"binModel":{"displayPrice":{"value":{"value":59.0,"currency":"EUR"}}}},
          "104":{"price":{"value":25,"currency":"usd"}}
        }}});</script></html>"#;

    fn options() -> Vec<VariantOption> {
        build_options(&extract_msku(ITEM_PAGE).unwrap())
    }

    #[test]
    fn msku_options_take_cheapest_variation() {
        let options = options();
        assert_eq!(options.len(), 3);

        let base = options.iter().find(|o| o.name == "Galaxy S21").unwrap();
        assert_eq!(base.variation_ids, vec!["101", "102"]);
        assert_eq!(base.price, 35.0);
        assert_eq!(base.shipping, 0.0);
        assert_eq!(base.currency.as_deref(), Some("EUR"));

        let fe = options.iter().find(|o| o.name == "Galaxy S21 FE").unwrap();
        assert_eq!(fe.price, 25.0);
        assert_eq!(fe.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn pages_without_msku_yield_nothing() {
        assert!(extract_msku("<html>no variations</html>").is_none());
        assert!(build_options(&serde_json::json!({"menuItemMap": []})).is_empty());
    }

    #[test]
    fn scoring_prefers_exact_model() {
        assert_eq!(score_option("Galaxy S21", "S21"), 12.0);
        assert_eq!(score_option("Galaxy S21 Ultra", "S21"), 6.0);
        assert_eq!(score_option("Redmi 9", "Redmi 9"), 14.0);
        assert_eq!(score_option("Redmi 9A", "Redmi 9"), -14.0);
        assert_eq!(score_option("iPhone 12", "S21"), NO_MATCH);
        assert_eq!(score_option("", "S21"), NO_MATCH);
    }

    #[test]
    fn phrase_and_suffix_checks_respect_word_edges() {
        assert!(contains_phrase("galaxy s21 (2021)", "s21"));
        assert!(contains_phrase("s21", "s21"));
        assert!(!contains_phrase("galaxy s21fe", "s21"));
        assert!(!contains_phrase("galaxys21", "s21"));
        assert!(contains_phrase("s21fe / s21", "s21"));

        assert!(has_lettered_suffix(&["redmi", "9a"], "9"));
        assert!(!has_lettered_suffix(&["redmi", "9"], "9"));
        assert!(!has_lettered_suffix(&["redmi", "9ab"], "9"));
        assert!(!has_lettered_suffix(&["19a"], "9"));
        assert_eq!(score_option("Galaxy S21 5G", "S21 5G"), 14.0);
    }

    #[test]
    fn best_option_respects_threshold() {
        let options = options();
        assert_eq!(best_option(&options, "S21").unwrap().name, "Galaxy S21");
        assert_eq!(best_option(&options, "Galaxy S21 FE").unwrap().name, "Galaxy S21 FE");
        assert!(best_option(&options, "iPhone 12").is_none());
        assert!(best_option(&[], "S21").is_none());
    }

    #[test]
    fn fr_price_comes_from_before_condition() {
        let text = "Autres vendeurs 1 234,56 EUR\nPrix 45,90 EUR\nÉtat: Neuf";
        assert_eq!(extract_fr_price(text), Some(45.9));

        let text = "Prix 1.049,00 EUR\nModèle compatible: Galaxy S21";
        assert_eq!(extract_fr_price(text), Some(1049.0));

        assert_eq!(extract_fr_price("Prix 45,90 EUR sans repère"), None);
    }

    fn offer() -> Offer {
        Offer::new(
            Source::Ebay,
            "123456789012",
            "Ecran Samsung S20 S21 S21 FE",
            "https://www.ebay.fr/itm/123456789012",
            19.0,
            1.0,
            PartType::ReplacementScreen,
        )
        .with_condition(Some("Neuf".into()))
    }

    #[test]
    fn variant_price_prefers_french_page() {
        let option = options().into_iter().find(|o| o.name == "Galaxy S21").unwrap();
        let mut offer = offer();
        assert!(apply_variant(&mut offer, &option, Some(37.5)));
        assert_eq!(offer.price_eur, 37.5);
        assert_eq!(offer.shipping_eur, 0.0);
        assert_eq!(offer.total_eur, 37.5);
        assert_eq!(offer.condition_text.as_deref(), Some("Neuf | Variante: Galaxy S21"));
    }

    #[test]
    fn foreign_option_price_is_not_used_as_euros() {
        let option = options().into_iter().find(|o| o.name == "Galaxy S21 FE").unwrap();
        let mut offer = offer();
        assert!(!apply_variant(&mut offer, &option, None));
        assert_eq!(offer.price_eur, 19.0);

        assert!(apply_variant(&mut offer, &option, Some(27.0)));
        // Shipping only follows the option when it is priced in EUR
        assert_eq!(offer.shipping_eur, 1.0);
        assert_eq!(offer.total_eur, 28.0);
    }

    #[tokio::test]
    async fn listings_without_item_pages_are_skipped() {
        let resolver = VariantResolver::new(HttpFetcher::browser().unwrap(), VariantSettings::default());
        let mut offers = vec![Offer::new(
            Source::Ebay,
            "x",
            "Ecran S21",
            "https://www.ebay.fr/b/ecrans",
            10.0,
            0.0,
            PartType::ReplacementScreen,
        )];
        resolver.enrich(&mut offers, "S21").await;
        assert_eq!(offers[0].price_eur, 10.0);
        assert!(resolver.options.is_empty());
    }
}
