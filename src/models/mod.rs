use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::normalize::{compute_offer_id, compute_rank_score, normalize_spaces, round2};

/// Marketplace an offer was scraped from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Leboncoin,
    Ebay,
    Aliexpress,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Leboncoin, Source::Ebay, Source::Aliexpress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leboncoin => "leboncoin",
            Self::Ebay => "ebay",
            Self::Aliexpress => "aliexpress",
        }
    }

    fn all() -> Vec<Source> {
        Self::ALL.to_vec()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leboncoin" => Ok(Self::Leboncoin),
            "ebay" => Ok(Self::Ebay),
            "aliexpress" => Ok(Self::Aliexpress),
            other => Err(ValidationError::new("source", format!("unknown source '{other}'"))),
        }
    }
}

/// Which kind of part the user is hunting for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartType {
    /// A bare replacement display
    ReplacementScreen,
    /// A donor phone sold for parts, screen missing or broken
    PhoneWithoutScreen,
}

impl PartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplacementScreen => "replacement_screen",
            Self::PhoneWithoutScreen => "phone_without_screen",
        }
    }
}

impl FromStr for PartType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "replacement_screen" | "screen" => Ok(Self::ReplacementScreen),
            "phone_without_screen" | "parts" => Ok(Self::PhoneWithoutScreen),
            other => Err(ValidationError::new("partType", format!("unknown part type '{other}'"))),
        }
    }
}

/// Marketplace category to restrict the search to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchCategory {
    #[default]
    MobilePhoneParts,
    Auto,
}

impl SearchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MobilePhoneParts => "mobile_phone_parts",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for SearchCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mobile_phone_parts" => Ok(Self::MobilePhoneParts),
            "auto" => Ok(Self::Auto),
            other => Err(ValidationError::new("category", format!("unknown category '{other}'"))),
        }
    }
}

/// One normalized marketplace listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub source: Source,
    pub source_offer_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price_eur: f64,
    #[serde(default)]
    pub shipping_eur: f64,
    pub total_eur: f64,
    #[serde(default)]
    pub price_unknown: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub condition_text: Option<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub is_recently_added: bool,
    pub query_type: PartType,
    pub rank_score: f64,
}

impl Offer {
    /// Build an offer with a resolved price; identity and rank are derived here.
    pub fn new(
        source: Source,
        source_offer_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        price_eur: f64,
        shipping_eur: f64,
        query_type: PartType,
    ) -> Self {
        let source_offer_id = source_offer_id.into();
        let title = normalize_spaces(&title.into());
        let url = url.into();
        let price_eur = round2(price_eur.max(0.0));
        let shipping_eur = round2(shipping_eur.max(0.0));
        let total_eur = round2(price_eur + shipping_eur);

        Self {
            id: compute_offer_id(source, &source_offer_id, &url),
            rank_score: compute_rank_score(&title, total_eur),
            source,
            source_offer_id,
            title,
            url,
            image_url: None,
            price_eur,
            shipping_eur,
            total_eur,
            price_unknown: false,
            location: None,
            condition_text: None,
            posted_at: None,
            is_recently_added: false,
            query_type,
        }
    }

    /// Build an offer whose listing exposes no usable price.
    pub fn unpriced(
        source: Source,
        source_offer_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        query_type: PartType,
    ) -> Self {
        let mut offer = Self::new(source, source_offer_id, title, url, 0.0, 0.0, query_type);
        offer.price_unknown = true;
        offer.condition_text = Some(UNKNOWN_PRICE_LABEL.to_string());
        offer
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.map(|l| normalize_spaces(&l)).filter(|l| !l.is_empty());
        self
    }

    pub fn with_condition(mut self, condition: Option<String>) -> Self {
        self.condition_text = condition.map(|c| normalize_spaces(&c)).filter(|c| !c.is_empty());
        self
    }

    /// Replace the price pair, keeping total and rank consistent with it.
    pub fn reprice(&mut self, price_eur: f64, shipping_eur: f64) {
        self.price_eur = round2(price_eur.max(0.0));
        self.shipping_eur = round2(shipping_eur.max(0.0));
        self.total_eur = round2(self.price_eur + self.shipping_eur);
        self.price_unknown = false;
        self.rank_score = compute_rank_score(&self.title, self.total_eur);
    }

    /// Append a `" | "`-separated note to the condition text.
    pub fn append_condition(&mut self, note: &str) {
        let note = normalize_spaces(note);
        if note.is_empty() {
            return;
        }
        self.condition_text = Some(match self.condition_text.as_deref().map(normalize_spaces) {
            Some(existing) if !existing.is_empty() => format!("{existing} | {note}"),
            _ => note,
        });
    }
}

/// Condition text attached to offers kept without a price
pub const UNKNOWN_PRICE_LABEL: &str = "Prix non communiqué";

/// One search request as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub brand: String,
    pub model: String,
    pub part_type: PartType,
    #[serde(default)]
    pub category: SearchCategory,
    #[serde(default)]
    pub max_price_eur: Option<f64>,
    #[serde(default = "Source::all")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl SearchQuery {
    pub fn new(brand: impl Into<String>, model: impl Into<String>, part_type: PartType) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            part_type,
            category: SearchCategory::default(),
            max_price_eur: None,
            sources: Source::all(),
            force_refresh: false,
        }
    }

    /// Reject malformed input before anything touches the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_length("brand", &self.brand, 60)?;
        check_length("model", &self.model, 80)?;
        if let Some(max) = self.max_price_eur {
            if !max.is_finite() || max < 0.0 {
                return Err(ValidationError::new("maxPriceEur", "must be a finite value >= 0"));
            }
        }
        Ok(())
    }

    /// Requested sources, sorted and without repeats
    pub fn normalized_sources(&self) -> Vec<Source> {
        let mut sources = self.sources.clone();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Cache key over the fields that change what scrapers return.
    pub fn query_key(&self) -> QueryKey {
        let canonical = json!({
            "brand": normalize_spaces(&self.brand).to_lowercase(),
            "model": normalize_spaces(&self.model).to_lowercase(),
            "partType": self.part_type.as_str(),
            "category": self.category.as_str(),
            "maxPriceEur": self.max_price_eur,
            "sources": self.normalized_sources(),
        });
        // serde_json maps are key-ordered, so the encoding is canonical
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        QueryKey(hex(&digest))
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if len > max {
        return Err(ValidationError::new(field, format!("must be at most {max} characters")));
    }
    Ok(())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Deterministic identifier of a normalized search request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(pub String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-source failure messages, keyed by source name
pub type ProviderErrors = BTreeMap<String, String>;

/// Payload persisted in the search cache
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedSearch {
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub provider_errors: ProviderErrors,
}

/// Result of one search operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub ok: bool,
    pub cached: bool,
    pub query_key: QueryKey,
    pub offers: Vec<Offer>,
    pub provider_errors: ProviderErrors,
}

/// A persisted offer the user starred
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub favorite_id: i64,
    pub created_at: DateTime<Utc>,
    pub offer: Offer,
}

/// Request to flip the favorite state of an offer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFavoriteRequest {
    pub source: Source,
    pub source_offer_id: String,
    #[serde(default)]
    pub offer: Option<Offer>,
}

impl ToggleFavoriteRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_length("sourceOfferId", &self.source_offer_id, 120)
    }
}

/// Outcome of a favorite toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub ok: bool,
    pub is_favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_id: Option<i64>,
}
