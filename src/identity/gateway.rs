//! Abstract identity gateway trait.
//!
//! Any identity provider must implement [`IdentityGateway`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can back both the Firebase REST gateway and the
//! in-memory test gateway.  Change notifications ride a tokio `watch`
//! channel: program-order delivery, latest value wins, which is exactly
//! the contract the session resolver needs.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use crate::errors::MarketError;

/// An authenticated user as issued by the identity provider.
///
/// Held only for the duration of a session; never persisted by this
/// crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque user id (uid).
    pub id: String,
    /// Display name, when the provider has one.
    pub display_name: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Avatar URL, when the provider has one.
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Display name with a fallback for providers that issue none.
    pub fn display_name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Campus Student")
    }
}

/// Bearer token shared between the auth gateway and the document store.
///
/// Firebase clients authenticate Firestore calls with the signed-in
/// user's id token; the gateway refreshes this cell on every sign-in
/// and clears it on sign-out.
#[derive(Clone, Default)]
pub struct SharedIdToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedIdToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token.
    pub fn set(&self, token: String) {
        *self.inner.write().expect("token lock poisoned") = Some(token);
    }

    /// Drop the current token (sign-out).
    pub fn clear(&self) {
        *self.inner.write().expect("token lock poisoned") = None;
    }

    /// The current token, if any.
    pub fn get(&self) -> Option<String> {
        self.inner.read().expect("token lock poisoned").clone()
    }
}

/// Async identity provider contract.
pub trait IdentityGateway: Send + Sync + 'static {
    /// Create an account with email/password and a display name.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>>;

    /// Sign in with email/password.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>>;

    /// Sign in with a federated provider's OAuth credential.
    ///
    /// The popup/redirect dance that obtains `provider_token` belongs
    /// to the UI shell; this gateway only exchanges the credential.
    fn sign_in_federated(
        &self,
        provider_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>>;

    /// Change the signed-in user's password.
    ///
    /// Requires an authenticated session; the session survives the
    /// change.
    fn update_password(
        &self,
        new_password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>>;

    /// End the current session.
    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>>;

    /// The currently signed-in identity, or `None`.
    fn current(&self) -> Option<Identity>;

    /// Subscribe to identity changes.  The receiver's current value is
    /// the latest known identity state.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}
