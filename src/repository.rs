//! Listing creation and mutation over a [`ListingStore`].
//!
//! All field validation happens here, before any network call, so a
//! rejected draft never costs an upload or a write.

use std::sync::Arc;

use chrono::Utc;
use garde::Validate;
use metrics::counter;
use tracing::info;

use crate::errors::MarketError;
use crate::listings::store::ListingStore;
use crate::listings::{Listing, ListingDraft, NewListing};
use crate::metrics::{LISTINGS_CREATED_TOTAL, LISTING_MUTATIONS_TOTAL};

/// Identity facts stamped onto every listing at creation.
#[derive(Debug, Clone)]
pub struct SellerContext {
    pub seller_id: String,
    pub campus: String,
    pub display_name: String,
}

/// Validates drafts and persists listings.
pub struct ListingRepository {
    store: Arc<dyn ListingStore>,
}

impl ListingRepository {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Create a listing from a validated draft and already-uploaded
    /// image URLs.  The campus and seller id are copied verbatim from
    /// the seller context so a listing can never land outside its
    /// seller's campus.
    pub async fn create(
        &self,
        draft: &ListingDraft,
        image_urls: Vec<String>,
        seller: &SellerContext,
    ) -> Result<Listing, MarketError> {
        validate_draft(draft)?;
        if image_urls.is_empty() {
            return Err(MarketError::validation(
                "images",
                "a listing needs at least one image",
            ));
        }
        let new = NewListing {
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            price: draft.price,
            category: draft.category,
            condition: draft.condition,
            images: image_urls,
            campus: seller.campus.clone(),
            seller_id: seller.seller_id.clone(),
            seller_name: seller.display_name.clone(),
            created_at: Utc::now().timestamp_millis(),
            is_sold: false,
        };
        let listing = self
            .store
            .insert(new)
            .await
            .map_err(|err| MarketError::persistence("create listing", err))?;
        counter!(LISTINGS_CREATED_TOTAL).increment(1);
        info!(listing_id = %listing.id, campus = %listing.campus, "listing created");
        Ok(listing)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Listing>, MarketError> {
        self.store
            .get(id)
            .await
            .map_err(|err| MarketError::persistence("fetch listing", err))
    }

    /// All listings for a campus, newest first.
    pub async fn fetch_by_campus(&self, campus: &str) -> Result<Vec<Listing>, MarketError> {
        let mut listings = self
            .store
            .query_by_campus(campus)
            .await
            .map_err(|err| MarketError::persistence("fetch campus listings", err))?;
        sort_newest_first(&mut listings);
        Ok(listings)
    }

    /// All listings posted by a seller, newest first, sold included.
    pub async fn fetch_by_owner(&self, seller_id: &str) -> Result<Vec<Listing>, MarketError> {
        let mut listings = self
            .store
            .query_by_owner(seller_id)
            .await
            .map_err(|err| MarketError::persistence("fetch seller listings", err))?;
        sort_newest_first(&mut listings);
        Ok(listings)
    }

    pub async fn set_sold_status(&self, id: &str, sold: bool) -> Result<(), MarketError> {
        self.store
            .set_sold(id, sold)
            .await
            .map_err(|err| MarketError::persistence("update sold flag", err))?;
        counter!(LISTING_MUTATIONS_TOTAL, "kind" => "set_sold").increment(1);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), MarketError> {
        self.store
            .delete(id)
            .await
            .map_err(|err| MarketError::persistence("delete listing", err))?;
        counter!(LISTING_MUTATIONS_TOTAL, "kind" => "delete").increment(1);
        Ok(())
    }
}

pub(crate) fn validate_draft(draft: &ListingDraft) -> Result<(), MarketError> {
    if let Err(report) = draft.validate() {
        let (path, entry) = report
            .iter()
            .next()
            .map(|(path, entry)| (path.to_string(), entry.to_string()))
            .unwrap_or_else(|| ("draft".to_string(), "invalid listing draft".to_string()));
        return Err(MarketError::Validation {
            field: path,
            message: entry,
        });
    }
    if !draft.price.is_finite() || draft.price <= 0.0 {
        return Err(MarketError::validation(
            "price",
            "price must be a positive number",
        ));
    }
    Ok(())
}

fn sort_newest_first(listings: &mut [Listing]) {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
