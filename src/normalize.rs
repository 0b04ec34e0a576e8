//! Text and price normalization shared by every scraper.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{hex, Offer, Source};

/// Penalty added to the rank score per ambiguity phrase found in a title
pub const AMBIGUITY_PENALTY: f64 = 5.0;

/// Title phrases hinting that a listing is not what it seems.
/// Matched as substrings of folded, lower-cased titles, so stems and
/// plurals ("cass" in "cassé", "lot" in "lots") count too.
pub const AMBIGUOUS_PHRASES: [&str; 12] = [
    "pour pieces",
    "pour piece",
    "hs",
    "lot",
    "defectueux",
    "cass",
    "broken",
    "sans ecran",
    "for parts",
    "non working",
    "not working",
    "no screen",
];

static PRICE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]{1,2})?)").unwrap());

static TAGGED_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?P<a>[0-9]{1,3}(?:[ \u{a0}\u{202f}.][0-9]{3})+|[0-9]+)(?P<ad>[.,][0-9]{1,2})?\s*(?:€|euros?\b|eur\b))|(?:(?:€|\beur\b)\s*(?P<b>[0-9]{1,3}(?:[ \u{a0}\u{202f}.][0-9]{3})+|[0-9]+)(?P<bd>[.,][0-9]{1,2})?)",
    )
    .unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace and trim.
pub fn normalize_spaces(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Decompose and drop combining marks so "écran" matches "ecran".
pub fn fold_text(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Fold, lower-case and collapse whitespace.
pub fn fold_lower(text: &str) -> String {
    normalize_spaces(&fold_text(text)).to_lowercase()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Extract the first price-looking number from free text.
///
/// Returns `0.0` when nothing numeric is found. Callers treat zero as
/// "no usable price" and drop the candidate rather than listing it as free.
pub fn parse_price(raw: &str) -> f64 {
    if raw.trim().is_empty() {
        return 0.0;
    }
    let text = fold_text(raw)
        .to_lowercase()
        .replace("eur", "")
        .replace('€', "")
        .replace(',', ".");
    PRICE_TOKEN
        .captures(&text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(round2)
        .unwrap_or(0.0)
}

/// First euro-tagged amount in free text (`12,50 €`, `EUR 1 234,00`).
///
/// Untagged numbers are ignored, so model numbers in titles never pass as
/// prices. Returns `0.0` when no tagged amount is present.
pub fn parse_tagged_price(text: &str) -> f64 {
    let Some(caps) = TAGGED_PRICE.captures(text) else {
        return 0.0;
    };
    let (int_part, dec_part) = match caps.name("a") {
        Some(a) => (a.as_str(), caps.name("ad")),
        None => match caps.name("b") {
            Some(b) => (b.as_str(), caps.name("bd")),
            None => return 0.0,
        },
    };
    let mut number: String = int_part.chars().filter(char::is_ascii_digit).collect();
    if let Some(dec) = dec_part {
        number.push('.');
        number.push_str(&dec.as_str()[1..]);
    }
    number.parse::<f64>().map(round2).unwrap_or(0.0)
}

/// Scheme, authority and path only, trailing slash removed. Identity use only.
///
/// Works on the raw text: host case, explicit ports and non-ASCII paths stay
/// as written, so the same listing URL always hashes to the same id.
pub fn canonicalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let head = &raw[..raw.find(['?', '#']).unwrap_or(raw.len())];

    match head.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => {
            let (netloc, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                netloc,
                strip_path_params(path).trim_end_matches('/')
            )
        }
        _ => strip_path_params(head).trim_end_matches('/').to_string(),
    }
}

fn is_scheme(candidate: &str) -> bool {
    candidate.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Drop `;params` from the last path segment
fn strip_path_params(path: &str) -> &str {
    let last = path.rfind('/').map_or(0, |i| i + 1);
    match path[last..].find(';') {
        Some(i) => &path[..last + i],
        None => path,
    }
}

/// First 20 hex chars of `sha256(source|sourceOfferId|canonicalUrl)`.
pub fn compute_offer_id(source: Source, source_offer_id: &str, url: &str) -> String {
    let payload = format!("{}|{}|{}", source.as_str(), source_offer_id, canonicalize_url(url));
    let digest = Sha256::digest(payload.as_bytes());
    hex(&digest)[..20].to_string()
}

/// Number of distinct ambiguity phrases present in a title
pub fn ambiguity_hits(title: &str) -> usize {
    let folded = fold_lower(title);
    AMBIGUOUS_PHRASES
        .iter()
        .filter(|phrase| folded.contains(*phrase))
        .count()
}

/// `total + 5 × ambiguity hits`, rounded to 3 decimals. Lower ranks better.
pub fn compute_rank_score(title: &str, total_eur: f64) -> f64 {
    round3(total_eur + AMBIGUITY_PENALTY * ambiguity_hits(title) as f64)
}

/// Drop repeats of `(source, canonical url)`; the first occurrence wins.
pub fn dedupe_offers(offers: Vec<Offer>) -> Vec<Offer> {
    let mut seen = HashSet::new();
    offers
        .into_iter()
        .filter(|offer| seen.insert((offer.source, canonicalize_url(&offer.url))))
        .collect()
}

/// Slice `text[start..end]`, widened to the nearest char boundaries.
pub fn text_window(text: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = end.clamp(start, text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}
