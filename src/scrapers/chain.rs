//! Ordered fallback chain shared by every scraper.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;

use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::models::{Offer, Source};
use crate::scrapers::types::MAX_OFFERS_PER_SOURCE;

/// Try each strategy in order until one yields offers.
///
/// A strategy that errors or comes back empty hands over to the next one.
/// The chain is `Ok(vec![])` when at least one strategy ran cleanly but found
/// nothing, and `Err(Exhausted)` only when every strategy failed.
pub async fn run_chain<S, F, Fut>(
    source: Source,
    strategies: &[S],
    mut attempt: F,
) -> Result<Vec<Offer>, ScrapeError>
where
    S: Copy + Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<Vec<Offer>, ScrapeError>>,
{
    let mut failures = Vec::new();
    let mut ran_cleanly = false;

    for &strategy in strategies {
        match attempt(strategy).await {
            Ok(offers) if !offers.is_empty() => {
                info!("{} strategy '{}' found {} offers", source, strategy, offers.len());
                return Ok(finalize(offers));
            }
            Ok(_) => {
                debug!("{} strategy '{}' found nothing, falling through", source, strategy);
                ran_cleanly = true;
            }
            Err(e) => {
                warn!("{} strategy '{}' failed: {}", source, strategy, e);
                failures.push(format!("{strategy}: {e}"));
            }
        }
    }

    if ran_cleanly || failures.is_empty() {
        warn!("No offers found on {}", source);
        Ok(Vec::new())
    } else {
        Err(ScrapeError::Exhausted(failures.join("; ")))
    }
}

/// Dedupe by offer identity and cap the list.
pub fn finalize(offers: Vec<Offer>) -> Vec<Offer> {
    let mut seen = HashSet::new();
    offers
        .into_iter()
        .filter(|offer| seen.insert(offer.id.clone()))
        .take(MAX_OFFERS_PER_SOURCE)
        .collect()
}
