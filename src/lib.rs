//! Phone-repair parts search across second-hand marketplaces.

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod favorites;
pub mod http;
pub mod models;
pub mod normalize;
pub mod scrapers;
pub mod search;
pub mod store;

pub use config::AppConfig;
pub use error::{FavoriteError, ScrapeError, StoreError, ValidationError};
pub use favorites::{FavoriteFilter, FavoritesService};
pub use models::{Offer, PartType, SearchCategory, SearchQuery, SearchResponse, Source};
pub use search::{SearchService, SearchSettings};
pub use store::{SqliteStore, Store};
