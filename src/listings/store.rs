//! Listing persistence trait.

use std::future::Future;
use std::pin::Pin;

use super::{Listing, NewListing};

/// Backend-agnostic listing persistence.
///
/// Implementations: [`memory::MemoryListingStore`](super::memory) for
/// tests and [`firestore::FirestoreStore`](super::firestore) for the
/// hosted document database.
pub trait ListingStore: Send + Sync + 'static {
    /// Insert a new listing and return it with its assigned id.
    fn insert(
        &self,
        new: NewListing,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Listing>> + Send + '_>>;

    /// Fetch a single listing by id.
    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Listing>>> + Send + '_>>;

    /// All listings whose campus matches, in no particular order.
    fn query_by_campus(
        &self,
        campus: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>>;

    /// All listings posted by the given seller, in no particular order.
    fn query_by_owner(
        &self,
        seller_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>>;

    /// Set the sold flag.  Idempotent; succeeds when the listing is
    /// already gone.
    fn set_sold(
        &self,
        id: &str,
        sold: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Delete a listing.  Idempotent; succeeds when already gone.
    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}
