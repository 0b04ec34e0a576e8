//! Foreign-currency to EUR conversion with cached exchange rates.

use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::http::HttpFetcher;
use crate::normalize::round2;

pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest";

/// How long a fetched (or fallback) rate is reused
pub const RATE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

const RATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Rates used when the rate service is unreachable
const STATIC_RATES: [(&str, f64); 1] = [("USD", 0.92)];

/// Converts amounts to EUR using a public rates API.
///
/// Rates are cached per currency for [`RATE_TTL`]. Fallback rates are cached
/// the same way, so an outage costs one request per currency per TTL.
pub struct CurrencyConverter {
    pub(crate) fetcher: HttpFetcher,
    rates_url: String,
    rates: TtlCache<String, Option<f64>>,
}

impl CurrencyConverter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self::with_rates_url(fetcher, DEFAULT_RATES_URL)
    }

    /// Use another rates endpoint; `{rates_url}/{CUR}` must answer
    /// `{"rates": {"EUR": <f64>}}`.
    pub fn with_rates_url(fetcher: HttpFetcher, rates_url: &str) -> Self {
        Self {
            fetcher,
            rates_url: rates_url.trim_end_matches('/').to_string(),
            rates: TtlCache::new(),
        }
    }

    /// Multiplier from `currency` to EUR, `None` when no rate is known.
    pub async fn rate_to_eur(&self, currency: &str) -> Option<f64> {
        let code = currency.trim().to_uppercase();
        if code.is_empty() {
            return None;
        }
        if code == "EUR" {
            return Some(1.0);
        }
        if let Some(rate) = self.rates.get(&code) {
            return rate;
        }

        let url = format!("{}/{}", self.rates_url, code);
        let fetched = match self.fetcher.fetch_json(&url, RATE_TIMEOUT).await {
            Ok(body) => body
                .pointer("/rates/EUR")
                .and_then(|v| v.as_f64())
                .filter(|rate| *rate > 0.0),
            Err(e) => {
                warn!("Exchange rate lookup for {} failed: {}", code, e);
                None
            }
        };

        let rate = fetched.or_else(|| static_rate(&code));
        debug!("Rate {} -> EUR: {:?}", code, rate);
        self.rates.insert(code, rate, RATE_TTL);
        rate
    }

    /// `amount` in EUR, rounded to cents.
    pub async fn to_eur(&self, amount: f64, currency: &str) -> Option<f64> {
        let rate = self.rate_to_eur(currency).await?;
        Some(round2(amount * rate))
    }
}

fn static_rate(code: &str) -> Option<f64> {
    STATIC_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, rate)| *rate)
}
