//! In-memory marketplace feed with search and category filtering.
//!
//! The engine holds a snapshot of the signed-in user's campus feed and
//! answers browse calls synchronously against it.  Refreshing the
//! snapshot is explicit; nothing here reloads on its own.

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::errors::MarketError;
use crate::listings::{CategoryFilter, Listing};
use crate::repository::ListingRepository;

/// Campus feed snapshot plus filtering.
pub struct MarketplaceQueryEngine {
    repository: Arc<ListingRepository>,
    snapshot: RwLock<Vec<Listing>>,
}

impl MarketplaceQueryEngine {
    pub fn new(repository: Arc<ListingRepository>) -> Self {
        Self {
            repository,
            snapshot: RwLock::new(Vec::new()),
        }
    }

    /// Replace the snapshot with the campus's current unsold listings,
    /// newest first.  Sold listings never enter the feed.
    pub async fn refresh(&self, campus: &str) -> Result<(), MarketError> {
        let listings = self.repository.fetch_by_campus(campus).await?;
        let mut feed: Vec<Listing> = listings
            .into_iter()
            .filter(|listing| !listing.is_sold)
            .collect();
        debug!(campus, count = feed.len(), "feed refreshed");
        let mut snapshot = self.snapshot.write().expect("feed lock poisoned");
        std::mem::swap(&mut *snapshot, &mut feed);
        Ok(())
    }

    /// Filter the snapshot by title substring and category.
    ///
    /// The search is case-insensitive and an empty term matches every
    /// listing.  Snapshot order (newest first) is preserved.
    pub fn browse(&self, search_term: &str, filter: CategoryFilter) -> Vec<Listing> {
        let needle = search_term.trim().to_lowercase();
        let snapshot = self.snapshot.read().expect("feed lock poisoned");
        snapshot
            .iter()
            .filter(|listing| {
                needle.is_empty() || listing.title.to_lowercase().contains(&needle)
            })
            .filter(|listing| filter.matches(listing.category))
            .cloned()
            .collect()
    }

    /// Current snapshot size, before any filtering.
    pub fn feed_len(&self) -> usize {
        self.snapshot.read().expect("feed lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::memory::MemoryListingStore;
    use crate::listings::{Category, Condition};

    fn listing(id: &str, title: &str, category: Category, created_at: i64, sold: bool) -> Listing {
        campus_listing(id, title, category, created_at, sold, "FUTA")
    }

    fn campus_listing(
        id: &str,
        title: &str,
        category: Category,
        created_at: i64,
        sold: bool,
        campus: &str,
    ) -> Listing {
        Listing {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            price: 50.0,
            category,
            condition: Condition::UsedFair,
            images: vec!["https://img.example/x.jpg".to_string()],
            campus: campus.to_string(),
            seller_id: "uid-1".to_string(),
            seller_name: "Ada".to_string(),
            created_at,
            is_sold: sold,
        }
    }

    async fn engine_with_fixture() -> MarketplaceQueryEngine {
        let store = Arc::new(MemoryListingStore::new());
        store.seed(listing("1", "Physics Textbook", Category::Textbooks, 400, false));
        store.seed(listing("2", "Desk Lamp", Category::DormEssentials, 300, false));
        store.seed(listing("3", "Physiology Notes", Category::Textbooks, 200, false));
        store.seed(listing("4", "Sold Blender", Category::Other, 500, true));
        store.seed(campus_listing(
            "5",
            "Physics Holdall",
            Category::Other,
            600,
            false,
            "UNILAG",
        ));
        let engine =
            MarketplaceQueryEngine::new(Arc::new(ListingRepository::new(store)));
        engine.refresh("FUTA").await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_refresh_drops_sold_and_foreign_campus_listings() {
        let engine = engine_with_fixture().await;
        assert_eq!(engine.feed_len(), 3);
        let feed = engine.browse("", CategoryFilter::All);
        assert!(feed.iter().all(|listing| !listing.is_sold));
        assert!(feed.iter().all(|listing| listing.campus == "FUTA"));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let engine = engine_with_fixture().await;
        let hits = engine.browse("PHY", CategoryFilter::All);
        let ids: Vec<&str> = hits.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);

        // Empty term matches everything.
        assert_eq!(engine.browse("  ", CategoryFilter::All).len(), 3);
        assert!(engine.browse("nonexistent", CategoryFilter::All).is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_composes_with_search() {
        let engine = engine_with_fixture().await;
        let hits = engine.browse("phy", CategoryFilter::Only(Category::Textbooks));
        assert_eq!(hits.len(), 2);
        let none = engine.browse("phy", CategoryFilter::Only(Category::Services));
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_browse_preserves_newest_first_order() {
        let engine = engine_with_fixture().await;
        let order: Vec<i64> = engine
            .browse("", CategoryFilter::All)
            .iter()
            .map(|l| l.created_at)
            .collect();
        assert_eq!(order, vec![400, 300, 200]);
    }
}
