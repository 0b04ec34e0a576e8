pub mod aliexpress;
pub mod chain;
pub mod dom;
pub mod ebay;
pub mod leboncoin;
pub mod payload;
pub mod traits;
pub mod types;

use std::sync::Arc;

use crate::enrich::{CurrencyConverter, VariantResolver, VariantSettings};
use crate::http::Fetchers;

pub use aliexpress::AliexpressScraper;
pub use ebay::EbayScraper;
pub use leboncoin::LeboncoinScraper;
pub use traits::OfferScraper;
pub use types::{ScrapeParams, MAX_OFFERS_PER_SOURCE};

/// One scraper per supported marketplace, sharing the fetchers' connection pools
pub fn marketplace_scrapers(fetchers: &Fetchers, variants: VariantSettings) -> Vec<Arc<dyn OfferScraper>> {
    let (leboncoin, ebay, aliexpress) = build_scrapers(fetchers, variants);
    vec![Arc::new(leboncoin), Arc::new(ebay), Arc::new(aliexpress)]
}

fn build_scrapers(
    fetchers: &Fetchers,
    variants: VariantSettings,
) -> (LeboncoinScraper, EbayScraper, AliexpressScraper) {
    // eBay item pages refuse the bot agent; its search pages accept it
    let resolver = Arc::new(VariantResolver::new(fetchers.browser.clone(), variants));
    let converter = Arc::new(CurrencyConverter::new(fetchers.bot.clone()));

    (
        LeboncoinScraper::new(fetchers.bot.clone()),
        EbayScraper::new(fetchers.bot.clone(), resolver),
        AliexpressScraper::new(fetchers.browser.clone(), converter),
    )
}
