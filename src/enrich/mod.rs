//! Post-processing steps that refine offers after scraping.

pub mod currency;
pub mod image;
pub mod variant;

pub use currency::CurrencyConverter;
pub use image::{ImageEnricher, ImageSettings};
pub use variant::{VariantResolver, VariantSettings};
