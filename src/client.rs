//! Top-level marketplace client facade.
//!
//! Wires the identity gateway, profile store, session resolver, upload
//! coordinator, listing repository, and feed engine together behind
//! one handle.  UI shells call this type and nothing below it.

use std::sync::Arc;

use chrono::Utc;
use garde::Validate;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::MarketError;
use crate::identity::firebase::FirebaseAuthGateway;
use crate::identity::gateway::{Identity, IdentityGateway, SharedIdToken};
use crate::listings::firestore::FirestoreStore;
use crate::listings::store::ListingStore;
use crate::listings::{CategoryFilter, Listing, ListingDraft};
use crate::media::cloudinary::CloudinaryBlobStore;
use crate::media::coordinator::{MediaUploadCoordinator, UploadBatch};
use crate::media::{BlobStore, ImageFile};
use crate::profile::{normalize_phone, ProfileEdit, ProfileStore, UserProfile};
use crate::query::MarketplaceQueryEngine;
use crate::repository::{validate_draft, ListingRepository, SellerContext};
use crate::session::{SessionResolver, SessionState};

/// Result of a successful post, including how many images were
/// dropped along the way.
#[derive(Debug, Clone)]
pub struct PostedListing {
    pub listing: Listing,
    /// Uploads that failed; the listing carries the survivors.
    pub failed_uploads: usize,
}

impl PostedListing {
    /// Informational partial-failure signal for a dismissible notice,
    /// present when at least one upload was dropped from the batch.
    pub fn upload_warning(&self) -> Option<MarketError> {
        (self.failed_uploads > 0).then(|| MarketError::Upload {
            failed: self.failed_uploads,
            total: self.listing.images.len() + self.failed_uploads,
        })
    }
}

/// One handle over the whole client core.
pub struct MarketplaceClient {
    gateway: Arc<dyn IdentityGateway>,
    profiles: Arc<dyn ProfileStore>,
    session: SessionResolver,
    uploads: MediaUploadCoordinator,
    repository: Arc<ListingRepository>,
    feed: MarketplaceQueryEngine,
}

impl MarketplaceClient {
    /// Assemble a client from explicit backends.  Tests use this with
    /// the in-memory implementations.
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        profiles: Arc<dyn ProfileStore>,
        blobs: Arc<dyn BlobStore>,
        listings: Arc<dyn ListingStore>,
    ) -> Self {
        let session = SessionResolver::start(Arc::clone(&gateway), Arc::clone(&profiles));
        let repository = Arc::new(ListingRepository::new(listings));
        let feed = MarketplaceQueryEngine::new(Arc::clone(&repository));
        Self {
            gateway,
            profiles,
            session,
            uploads: MediaUploadCoordinator::new(blobs),
            repository,
            feed,
        }
    }

    /// Assemble a client over the hosted backends named in `config`.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let token = SharedIdToken::new();
        let gateway: Arc<dyn IdentityGateway> = Arc::new(FirebaseAuthGateway::new(
            &config.firebase,
            token.clone(),
        )?);
        let documents = Arc::new(FirestoreStore::new(&config.firebase, token)?);
        let profiles: Arc<dyn ProfileStore> = documents.clone();
        let listings: Arc<dyn ListingStore> = documents;
        let blobs: Arc<dyn BlobStore> = Arc::new(CloudinaryBlobStore::new(&config.cloudinary)?);
        Ok(Self::new(gateway, profiles, blobs, listings))
    }

    // -- Session --------------------------------------------------------------

    /// Current derived session state.
    pub fn session_state(&self) -> SessionState {
        self.session.current()
    }

    /// Watch session state changes.
    pub fn subscribe_session(&self) -> tokio::sync::watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Create an account, then seed its profile document.
    ///
    /// The profile seed is best-effort: the account exists either way
    /// and onboarding will fill in whatever is missing.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Identity, MarketError> {
        let identity = self.gateway.sign_up(email, password, display_name).await?;
        let seed = UserProfile {
            uid: identity.id.clone(),
            email: identity.email.clone(),
            display_name: Some(identity.display_name_or_default().to_string()),
            created_at: Some(Utc::now().timestamp_millis()),
            ..UserProfile::default()
        };
        if let Err(err) = self.profiles.set(&identity.id, seed, true).await {
            warn!(uid = %identity.id, error = %err, "Profile seed write failed");
        }
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, MarketError> {
        self.gateway.sign_in(email, password).await
    }

    /// Exchange a federated provider's OAuth credential for a session.
    pub async fn sign_in_federated(&self, provider_token: &str) -> Result<Identity, MarketError> {
        self.gateway.sign_in_federated(provider_token).await
    }

    pub async fn sign_out(&self) -> Result<(), MarketError> {
        self.gateway.sign_out().await
    }

    /// Record the campus choice and re-derive the session.
    ///
    /// Returns with the session already reflecting the new profile, so
    /// callers can route straight to the marketplace.
    pub async fn complete_onboarding(&self, campus: &str) -> Result<(), MarketError> {
        let campus = campus.trim();
        if campus.is_empty() {
            return Err(MarketError::validation("campus", "pick your campus"));
        }
        let identity = self.require_identity()?;
        let update = UserProfile {
            uid: identity.id.clone(),
            campus: Some(campus.to_string()),
            onboarded: Some(true),
            ..UserProfile::default()
        };
        self.profiles
            .set(&identity.id, update, true)
            .await
            .map_err(|err| MarketError::persistence("write profile", err))?;
        info!(uid = %identity.id, campus, "Onboarding complete");
        self.session.refresh().await;
        Ok(())
    }

    /// Update display name and WhatsApp contact, validated first.
    pub async fn update_profile(
        &self,
        display_name: &str,
        whatsapp: &str,
    ) -> Result<(), MarketError> {
        let identity = self.require_identity()?;
        let edit = ProfileEdit {
            display_name: display_name.trim().to_string(),
            whatsapp: normalize_phone(whatsapp),
        };
        if let Err(report) = edit.validate() {
            let (path, entry) = report
                .iter()
                .next()
                .map(|(path, entry)| (path.to_string(), entry.to_string()))
                .unwrap_or_else(|| ("profile".to_string(), "invalid profile edit".to_string()));
            return Err(MarketError::Validation {
                field: path,
                message: entry,
            });
        }
        let update = UserProfile {
            uid: identity.id.clone(),
            display_name: Some(edit.display_name),
            whatsapp: Some(edit.whatsapp),
            ..UserProfile::default()
        };
        self.profiles
            .set(&identity.id, update, true)
            .await
            .map_err(|err| MarketError::persistence("write profile", err))
    }

    /// Change the signed-in user's password.
    pub async fn change_password(&self, new_password: &str) -> Result<(), MarketError> {
        if new_password.len() < 6 {
            return Err(MarketError::validation(
                "password",
                "password must be at least 6 characters",
            ));
        }
        self.require_identity()?;
        self.gateway.update_password(new_password).await
    }

    /// The signed-in user's profile document, if any.
    pub async fn profile(&self) -> Result<Option<UserProfile>, MarketError> {
        let identity = self.require_identity()?;
        self.profiles
            .get(&identity.id)
            .await
            .map_err(|err| MarketError::ProfileUnavailable { source: err })
    }

    // -- Listings -------------------------------------------------------------

    /// Validate, upload, and persist a new listing.
    ///
    /// The draft is checked before any byte leaves the device; a
    /// validation failure costs nothing.  Uploads tolerate partial
    /// failure, so the listing is created as long as at least one
    /// image survived.
    pub async fn post_listing(
        &self,
        draft: &ListingDraft,
        files: Vec<ImageFile>,
    ) -> Result<PostedListing, MarketError> {
        let seller = self.require_active_seller()?;
        validate_draft(draft)?;
        if files.is_empty() {
            return Err(MarketError::validation(
                "images",
                "add at least one photo of the item",
            ));
        }
        let UploadBatch { urls, failed } = self.uploads.upload(files).await?;
        let listing = self.repository.create(draft, urls, &seller).await?;
        Ok(PostedListing {
            listing,
            failed_uploads: failed,
        })
    }

    /// Flip a listing's sold flag.  Only the seller may do this.
    pub async fn set_sold(&self, listing_id: &str, sold: bool) -> Result<(), MarketError> {
        self.require_ownership(listing_id).await?;
        self.repository.set_sold_status(listing_id, sold).await
    }

    /// Remove a listing.  Only the seller may do this.
    pub async fn delete_listing(&self, listing_id: &str) -> Result<(), MarketError> {
        self.require_ownership(listing_id).await?;
        self.repository.delete(listing_id).await
    }

    /// Fetch one listing by id, for a details view.  Readable without
    /// an active session.
    pub async fn listing(&self, id: &str) -> Result<Option<Listing>, MarketError> {
        self.repository.get(id).await
    }

    /// The signed-in user's own listings, sold ones included, newest
    /// first.
    pub async fn my_listings(&self) -> Result<Vec<Listing>, MarketError> {
        let identity = self.require_identity()?;
        self.repository.fetch_by_owner(&identity.id).await
    }

    // -- Feed -----------------------------------------------------------------

    /// Re-fetch the campus feed.  Requires an onboarded session; the
    /// campus scope comes from the session, never from the caller.
    pub async fn refresh_feed(&self) -> Result<(), MarketError> {
        let seller = self.require_active_seller()?;
        self.feed.refresh(&seller.campus).await
    }

    /// Filter the last-fetched feed by title substring and category.
    pub fn browse(&self, search_term: &str, filter: CategoryFilter) -> Vec<Listing> {
        self.feed.browse(search_term, filter)
    }

    // -- Gates ----------------------------------------------------------------

    fn require_identity(&self) -> Result<Identity, MarketError> {
        self.gateway.current().ok_or(MarketError::SessionRequired)
    }

    fn require_active_seller(&self) -> Result<SellerContext, MarketError> {
        match self.session.current() {
            SessionState::AuthenticatedActive { identity, campus } => Ok(SellerContext {
                seller_id: identity.id.clone(),
                display_name: identity.display_name_or_default().to_string(),
                campus,
            }),
            _ => Err(MarketError::SessionRequired),
        }
    }

    /// Fetch the listing and verify the signed-in user owns it.
    ///
    /// Every mutation funnels through this single check.
    async fn require_ownership(&self, listing_id: &str) -> Result<Listing, MarketError> {
        let identity = self.require_identity()?;
        let listing = self
            .repository
            .get(listing_id)
            .await?
            .ok_or_else(|| MarketError::ListingNotFound {
                id: listing_id.to_string(),
            })?;
        if listing.seller_id != identity.id {
            return Err(MarketError::NotListingOwner {
                id: listing_id.to_string(),
            });
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::memory::MemoryIdentityGateway;
    use crate::listings::memory::MemoryListingStore;
    use crate::listings::{Category, Condition};
    use crate::media::coordinator::MAX_BATCH_IMAGES;
    use crate::profile::MemoryProfileStore;
    use crate::session::View;
    use bytes::Bytes;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Blob store that mints deterministic URLs, failing the file
    /// names listed in `fail`.
    #[derive(Default)]
    struct FakeBlobStore {
        fail: Vec<String>,
        calls: AtomicUsize,
    }

    impl BlobStore for FakeBlobStore {
        fn upload(
            &self,
            file: &ImageFile,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
            let name = file.file_name.clone();
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail.contains(&name) {
                    anyhow::bail!("upload rejected");
                }
                Ok(format!("https://img.example/{name}"))
            })
        }
    }

    struct Harness {
        client: MarketplaceClient,
        gateway: Arc<MemoryIdentityGateway>,
        profiles: Arc<MemoryProfileStore>,
        listings: Arc<MemoryListingStore>,
        blobs: Arc<FakeBlobStore>,
    }

    fn harness_with_blobs(blobs: FakeBlobStore) -> Harness {
        let gateway = Arc::new(MemoryIdentityGateway::new());
        let profiles = Arc::new(MemoryProfileStore::new());
        let listings = Arc::new(MemoryListingStore::new());
        let blobs = Arc::new(blobs);
        let client = MarketplaceClient::new(
            gateway.clone(),
            profiles.clone(),
            blobs.clone(),
            listings.clone(),
        );
        Harness {
            client,
            gateway,
            profiles,
            listings,
            blobs,
        }
    }

    fn harness() -> Harness {
        harness_with_blobs(FakeBlobStore::default())
    }

    fn ada() -> Identity {
        Identity {
            id: "uid-ada".to_string(),
            display_name: Some("Ada".to_string()),
            email: Some("ada@example.edu".to_string()),
            avatar_url: None,
        }
    }

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "Physics Textbook".to_string(),
            description: "Second edition".to_string(),
            price: 1500.0,
            category: Category::Textbooks,
            condition: Condition::UsedLikeNew,
        }
    }

    fn image(name: &str) -> ImageFile {
        ImageFile::new(name, "image/jpeg", Bytes::from_static(b"jpeg"))
    }

    async fn sign_in_onboarded(harness: &Harness, campus: &str) {
        harness.gateway.seed_account("ada@example.edu", "pw", ada());
        let mut watcher = harness.client.subscribe_session();
        harness
            .client
            .sign_in("ada@example.edu", "pw")
            .await
            .unwrap();
        harness.client.complete_onboarding(campus).await.unwrap();
        // Let any in-flight derivation from the sign-in notification
        // settle on the active state before the test proceeds.
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            watcher.wait_for(|s| matches!(s, SessionState::AuthenticatedActive { .. })),
        )
        .await
        .expect("timed out waiting for active session")
        .expect("session channel closed");
    }

    #[tokio::test]
    async fn test_onboarding_gates_then_opens_marketplace() {
        let harness = harness();
        harness.gateway.seed_account("ada@example.edu", "pw", ada());
        harness
            .client
            .sign_in("ada@example.edu", "pw")
            .await
            .unwrap();

        // A fresh account has no campus yet.
        let mut watcher = harness.client.subscribe_session();
        while !matches!(watcher.borrow_and_update().view(), View::Onboarding) {
            watcher.changed().await.unwrap();
        }

        harness.client.complete_onboarding("FUTA").await.unwrap();
        // The sign-in notification may still be resolving in the
        // background; wait for the active state rather than sampling.
        let state = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            watcher.wait_for(|s| matches!(s, SessionState::AuthenticatedActive { .. })),
        )
        .await
        .expect("timed out waiting for active session")
        .expect("session channel closed")
        .clone();
        assert!(matches!(
            state,
            SessionState::AuthenticatedActive { ref campus, .. } if campus == "FUTA"
        ));
        assert_eq!(state.view(), View::Marketplace);

        let profile = harness.profiles.get("uid-ada").await.unwrap().unwrap();
        assert!(profile.is_onboarded());
        assert_eq!(profile.onboarded, Some(true));
    }

    #[tokio::test]
    async fn test_post_listing_requires_active_session() {
        let harness = harness();
        let err = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::SessionRequired));
        assert_eq!(harness.blobs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_post_listing_validates_before_uploading() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;

        let mut bad = draft();
        bad.price = -5.0;
        let err = harness
            .client
            .post_listing(&bad, vec![image("a.jpg")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ValidationError");

        let err = harness
            .client
            .post_listing(&draft(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { ref field, .. } if field == "images"));

        // Nothing was uploaded or stored for either rejection.
        assert_eq!(harness.blobs.calls.load(Ordering::SeqCst), 0);
        assert!(harness.listings.is_empty());
    }

    #[tokio::test]
    async fn test_post_listing_stamps_session_campus() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;

        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg"), image("b.jpg")])
            .await
            .unwrap();
        assert_eq!(posted.listing.campus, "FUTA");
        assert_eq!(posted.listing.seller_id, "uid-ada");
        assert_eq!(posted.failed_uploads, 0);
        assert_eq!(
            posted.listing.images,
            vec![
                "https://img.example/a.jpg".to_string(),
                "https://img.example/b.jpg".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_post_listing_survives_partial_upload_failure() {
        let harness = harness_with_blobs(FakeBlobStore {
            fail: vec!["b.jpg".to_string()],
            calls: AtomicUsize::new(0),
        });
        sign_in_onboarded(&harness, "FUTA").await;

        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg"), image("b.jpg"), image("c.jpg")])
            .await
            .unwrap();
        assert_eq!(posted.failed_uploads, 1);
        assert_eq!(
            posted.listing.images,
            vec![
                "https://img.example/a.jpg".to_string(),
                "https://img.example/c.jpg".to_string()
            ]
        );
        // The partial failure surfaces as a dismissible warning.
        let warning = posted.upload_warning().unwrap();
        assert!(matches!(warning, MarketError::Upload { failed: 1, total: 3 }));
        assert!(warning.user_message().contains("1 of 3"));
    }

    #[tokio::test]
    async fn test_full_success_carries_no_upload_warning() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();
        assert!(posted.upload_warning().is_none());
    }

    #[tokio::test]
    async fn test_post_listing_aborts_when_every_upload_fails() {
        let harness = harness_with_blobs(FakeBlobStore {
            fail: vec!["a.jpg".to_string(), "b.jpg".to_string()],
            calls: AtomicUsize::new(0),
        });
        sign_in_onboarded(&harness, "FUTA").await;

        let err = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg"), image("b.jpg")])
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::UploadsAllFailed { total: 2 }));
        assert!(harness.listings.is_empty());
    }

    #[tokio::test]
    async fn test_oversize_batches_are_capped() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;

        let files: Vec<ImageFile> = (0..6).map(|i| image(&format!("{i}.jpg"))).collect();
        let posted = harness.client.post_listing(&draft(), files).await.unwrap();
        assert_eq!(posted.listing.images.len(), MAX_BATCH_IMAGES);
    }

    #[tokio::test]
    async fn test_mutations_are_ownership_gated() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();

        // The seller can mutate.
        harness.client.set_sold(&posted.listing.id, true).await.unwrap();

        // Someone else cannot.
        harness.gateway.push_identity(Some(Identity {
            id: "uid-mallory".to_string(),
            display_name: None,
            email: None,
            avatar_url: None,
        }));
        let err = harness
            .client
            .delete_listing(&posted.listing.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotListingOwner { .. }));
        assert_eq!(harness.listings.len(), 1);

        let err = harness.client.set_sold("missing", true).await.unwrap_err();
        assert!(matches!(err, MarketError::ListingNotFound { .. }));
    }

    #[tokio::test]
    async fn test_feed_is_campus_scoped_and_refresh_is_explicit() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();

        // Posting does not touch the feed until an explicit refresh.
        assert!(harness.client.browse("", CategoryFilter::All).is_empty());
        harness.client.refresh_feed().await.unwrap();
        assert_eq!(harness.client.browse("", CategoryFilter::All).len(), 1);
        assert_eq!(
            harness
                .client
                .browse("physics", CategoryFilter::Only(Category::Textbooks))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_my_listings_includes_sold() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();
        harness.client.set_sold(&posted.listing.id, true).await.unwrap();

        let mine = harness.client.my_listings().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].is_sold);

        // Sold listings stay out of the public feed.
        harness.client.refresh_feed().await.unwrap();
        assert!(harness.client.browse("", CategoryFilter::All).is_empty());
    }

    #[tokio::test]
    async fn test_listing_fetch_by_id_for_details_view() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();

        let fetched = harness
            .client
            .listing(&posted.listing.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, posted.listing);
        assert!(harness.client.listing("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_validates_then_rotates() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;

        let err = harness.client.change_password("short").await.unwrap_err();
        assert!(matches!(err, MarketError::Validation { ref field, .. } if field == "password"));

        harness.client.change_password("hunter22").await.unwrap();
        harness.client.sign_out().await.unwrap();

        assert!(harness.client.sign_in("ada@example.edu", "pw").await.is_err());
        harness
            .client
            .sign_in("ada@example.edu", "hunter22")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_password_requires_session() {
        let harness = harness();
        let err = harness.client.change_password("hunter22").await.unwrap_err();
        assert!(matches!(err, MarketError::SessionRequired));
    }

    #[tokio::test]
    async fn test_delete_removes_listing_everywhere() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;
        let posted = harness
            .client
            .post_listing(&draft(), vec![image("a.jpg")])
            .await
            .unwrap();
        harness.client.refresh_feed().await.unwrap();
        assert_eq!(harness.client.browse("", CategoryFilter::All).len(), 1);

        harness.client.delete_listing(&posted.listing.id).await.unwrap();

        assert!(harness.client.my_listings().await.unwrap().is_empty());
        harness.client.refresh_feed().await.unwrap();
        assert!(harness.client.browse("", CategoryFilter::All).is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_normalizes_and_validates_whatsapp() {
        let harness = harness();
        sign_in_onboarded(&harness, "FUTA").await;

        harness
            .client
            .update_profile("Ada L.", "0803 555 12-34")
            .await
            .unwrap();
        let profile = harness.profiles.get("uid-ada").await.unwrap().unwrap();
        assert_eq!(profile.whatsapp.as_deref(), Some("08035551234"));
        assert_eq!(profile.display_name.as_deref(), Some("Ada L."));
        // The onboarding campus survives the merge write.
        assert_eq!(profile.campus.as_deref(), Some("FUTA"));

        let err = harness
            .client
            .update_profile("Ada", "12345")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ValidationError");
    }
}
