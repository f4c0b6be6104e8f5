//! In-memory identity gateway.
//!
//! Holds accounts in memory with no external provider. Useful for tests
//! and local development. Sign-in state changes are published on the
//! same `watch` channel contract as the real gateway.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use tokio::sync::watch;

use super::gateway::{Identity, IdentityGateway};
use crate::errors::MarketError;

struct Account {
    password: String,
    identity: Identity,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
}

pub struct MemoryIdentityGateway {
    inner: RwLock<Inner>,
    changes: watch::Sender<Option<Identity>>,
}

impl MemoryIdentityGateway {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    /// Seed an account without signing it in.
    pub fn seed_account(&self, email: &str, password: &str, identity: Identity) {
        let mut inner = self.inner.write().expect("gateway lock poisoned");
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
    }

    /// Force the signed-in identity directly (test hook for driving the
    /// session resolver through arbitrary notification sequences).
    pub fn push_identity(&self, identity: Option<Identity>) {
        let mut inner = self.inner.write().expect("gateway lock poisoned");
        inner.current = identity.clone();
        drop(inner);
        let _ = self.changes.send(identity);
    }
}

impl Default for MemoryIdentityGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityGateway for MemoryIdentityGateway {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        let display_name = display_name.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("gateway lock poisoned");
            if inner.accounts.contains_key(&email) {
                return Err(MarketError::Credential {
                    message: "An account with this email already exists".to_string(),
                });
            }
            let identity = Identity {
                id: format!("uid-{}", inner.accounts.len() + 1),
                display_name: Some(display_name),
                email: Some(email.clone()),
                avatar_url: None,
            };
            inner.accounts.insert(
                email,
                Account {
                    password,
                    identity: identity.clone(),
                },
            );
            inner.current = Some(identity.clone());
            drop(inner);
            let _ = self.changes.send(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("gateway lock poisoned");
            let identity = match inner.accounts.get(&email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => {
                    return Err(MarketError::Credential {
                        message: "Incorrect email or password".to_string(),
                    })
                }
            };
            inner.current = Some(identity.clone());
            drop(inner);
            let _ = self.changes.send(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_in_federated(
        &self,
        _provider_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        Box::pin(async move {
            Err(MarketError::Credential {
                message: "Federated sign-in is not available offline".to_string(),
            })
        })
    }

    fn update_password(
        &self,
        new_password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>> {
        let new_password = new_password.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("gateway lock poisoned");
            let current_id = match &inner.current {
                Some(identity) => identity.id.clone(),
                None => return Err(MarketError::SessionRequired),
            };
            for account in inner.accounts.values_mut() {
                if account.identity.id == current_id {
                    account.password = new_password;
                    return Ok(());
                }
            }
            // Identity pushed directly without a seeded account.
            Ok(())
        })
    }

    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("gateway lock poisoned");
            inner.current = None;
            drop(inner);
            let _ = self.changes.send(None);
            Ok(())
        })
    }

    fn current(&self) -> Option<Identity> {
        self.inner
            .read()
            .expect("gateway lock poisoned")
            .current
            .clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.changes.subscribe()
    }
}
