//! Favorites on top of the persistent store.

use std::sync::Arc;

use tracing::info;

use crate::error::FavoriteError;
use crate::models::{Favorite, Offer, Source, ToggleFavoriteRequest, ToggleOutcome};
use crate::store::Store;

/// Optional narrowing of a favorites listing
#[derive(Debug, Clone, Default)]
pub struct FavoriteFilter {
    pub source: Option<Source>,
    /// Case-insensitive substring of the offer title
    pub model: Option<String>,
    /// Upper bound on the offer total
    pub max_price_eur: Option<f64>,
}

impl FavoriteFilter {
    fn matches(&self, favorite: &Favorite) -> bool {
        let offer = &favorite.offer;
        if self.source.is_some_and(|s| s != offer.source) {
            return false;
        }
        if let Some(needle) = self.model.as_deref().map(|m| m.trim().to_lowercase()) {
            if !needle.is_empty() && !offer.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        self.max_price_eur.map_or(true, |max| offer.total_eur <= max)
    }
}

pub struct FavoritesService {
    store: Arc<dyn Store>,
}

impl FavoritesService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Favorites matching `filter`, newest first
    pub fn list(&self, filter: &FavoriteFilter) -> Result<Vec<Favorite>, FavoriteError> {
        let favorites = self.store.list_favorites()?;
        Ok(favorites.into_iter().filter(|f| filter.matches(f)).collect())
    }

    /// Store `offer` as a favorite and return its id
    pub fn create(&self, offer: &Offer) -> Result<i64, FavoriteError> {
        let id = self.store.add_favorite(offer.source, &offer.source_offer_id, offer)?;
        info!("Saved favorite {} ({} {})", id, offer.source, offer.source_offer_id);
        Ok(id)
    }

    /// True when the favorite existed
    pub fn delete(&self, favorite_id: i64) -> Result<bool, FavoriteError> {
        Ok(self.store.delete_favorite(favorite_id)?)
    }

    /// Remove the favorite for this offer if there is one, otherwise create
    /// it from the supplied offer.
    pub fn toggle(&self, request: &ToggleFavoriteRequest) -> Result<ToggleOutcome, FavoriteError> {
        request.validate()?;

        let source_offer_id = request.source_offer_id.trim();
        if let Some(existing) = self.store.find_favorite_by_offer(request.source, source_offer_id)? {
            self.store.delete_favorite(existing)?;
            info!("Removed favorite {}", existing);
            return Ok(ToggleOutcome {
                ok: true,
                is_favorite: false,
                favorite_id: None,
            });
        }

        let offer = request.offer.as_ref().ok_or(FavoriteError::MissingOffer)?;
        let id = self.store.add_favorite(request.source, source_offer_id, offer)?;
        info!("Saved favorite {} ({} {})", id, request.source, source_offer_id);
        Ok(ToggleOutcome {
            ok: true,
            is_favorite: true,
            favorite_id: Some(id),
        })
    }
}
