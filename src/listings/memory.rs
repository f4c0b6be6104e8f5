//! In-memory listing store for tests and offline development.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use uuid::Uuid;

use super::store::ListingStore;
use super::{Listing, NewListing};

/// `HashMap`-backed [`ListingStore`].
#[derive(Default)]
pub struct MemoryListingStore {
    listings: RwLock<HashMap<String, Listing>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed listing, keeping its id.  Test helper.
    pub fn seed(&self, listing: Listing) {
        let mut listings = self.listings.write().expect("listing lock poisoned");
        listings.insert(listing.id.clone(), listing);
    }

    pub fn len(&self) -> usize {
        self.listings.read().expect("listing lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListingStore for MemoryListingStore {
    fn insert(
        &self,
        new: NewListing,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Listing>> + Send + '_>> {
        Box::pin(async move {
            let listing = new.into_listing(Uuid::new_v4().to_string());
            let mut listings = self.listings.write().expect("listing lock poisoned");
            listings.insert(listing.id.clone(), listing.clone());
            Ok(listing)
        })
    }

    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Listing>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let listings = self.listings.read().expect("listing lock poisoned");
            Ok(listings.get(&id).cloned())
        })
    }

    fn query_by_campus(
        &self,
        campus: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>> {
        let campus = campus.to_string();
        Box::pin(async move {
            let listings = self.listings.read().expect("listing lock poisoned");
            Ok(listings
                .values()
                .filter(|listing| listing.campus == campus)
                .cloned()
                .collect())
        })
    }

    fn query_by_owner(
        &self,
        seller_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>> {
        let seller_id = seller_id.to_string();
        Box::pin(async move {
            let listings = self.listings.read().expect("listing lock poisoned");
            Ok(listings
                .values()
                .filter(|listing| listing.seller_id == seller_id)
                .cloned()
                .collect())
        })
    }

    fn set_sold(
        &self,
        id: &str,
        sold: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut listings = self.listings.write().expect("listing lock poisoned");
            if let Some(listing) = listings.get_mut(&id) {
                listing.is_sold = sold;
            }
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut listings = self.listings.write().expect("listing lock poisoned");
            listings.remove(&id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::{Category, Condition};

    fn draft(title: &str, campus: &str, seller_id: &str) -> NewListing {
        NewListing {
            title: title.to_string(),
            description: String::new(),
            price: 100.0,
            category: Category::Other,
            condition: Condition::UsedFair,
            images: vec!["https://img.example/a.jpg".to_string()],
            campus: campus.to_string(),
            seller_id: seller_id.to_string(),
            seller_name: "Seller".to_string(),
            created_at: 1,
            is_sold: false,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_get_round_trips() {
        let store = MemoryListingStore::new();
        let inserted = store.insert(draft("Lamp", "FUTA", "uid-1")).await.unwrap();
        assert!(!inserted.id.is_empty());

        let fetched = store.get(&inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_campus_query_excludes_other_campuses() {
        let store = MemoryListingStore::new();
        store.insert(draft("Lamp", "FUTA", "uid-1")).await.unwrap();
        store.insert(draft("Desk", "FUTA", "uid-2")).await.unwrap();
        store.insert(draft("Fan", "UNILAG", "uid-3")).await.unwrap();

        let futa = store.query_by_campus("FUTA").await.unwrap();
        assert_eq!(futa.len(), 2);
        assert!(futa.iter().all(|listing| listing.campus == "FUTA"));
    }

    #[tokio::test]
    async fn test_owner_query() {
        let store = MemoryListingStore::new();
        store.insert(draft("Lamp", "FUTA", "uid-1")).await.unwrap();
        store.insert(draft("Desk", "FUTA", "uid-1")).await.unwrap();
        store.insert(draft("Fan", "FUTA", "uid-2")).await.unwrap();

        let mine = store.query_by_owner("uid-1").await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_set_sold_and_delete_are_idempotent() {
        let store = MemoryListingStore::new();
        let listing = store.insert(draft("Lamp", "FUTA", "uid-1")).await.unwrap();

        store.set_sold(&listing.id, true).await.unwrap();
        store.set_sold(&listing.id, true).await.unwrap();
        assert!(store.get(&listing.id).await.unwrap().unwrap().is_sold);

        store.delete(&listing.id).await.unwrap();
        store.delete(&listing.id).await.unwrap();
        assert!(store.get(&listing.id).await.unwrap().is_none());

        // Mutating a missing listing is a no-op, not an error.
        store.set_sold("gone", false).await.unwrap();
    }
}
