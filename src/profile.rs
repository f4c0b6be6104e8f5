//! User profile documents and the profile store trait.
//!
//! One document per identity, in collection `users`, keyed by uid.
//! Campus presence is the onboarding signal: a profile with a
//! non-empty campus is "onboarded" regardless of any other field.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A user's profile document.
///
/// Field names on the wire match the `users` collection layout:
/// `university` for campus, `photoURL` for the avatar, camelCase for
/// the rest.  `Option` fields are skipped by merge writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity id this profile belongs to.
    #[serde(default)]
    pub uid: String,

    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name shown on listings.
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Campus affiliation. Absent or empty means not onboarded.
    #[serde(rename = "university", default, skip_serializing_if = "Option::is_none")]
    pub campus: Option<String>,

    /// WhatsApp number for off-band buyer/seller contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,

    /// Avatar URL.
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Convenience flag written by the onboarding flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarded: Option<bool>,

    /// Creation timestamp, epoch milliseconds.
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl UserProfile {
    /// Onboarded if and only if the campus field is present and
    /// non-empty.
    pub fn is_onboarded(&self) -> bool {
        self.campus.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Merge `update` into `self`: present fields overwrite, absent
    /// fields keep their current value.
    pub fn merged_with(&self, update: &UserProfile) -> UserProfile {
        UserProfile {
            uid: if update.uid.is_empty() {
                self.uid.clone()
            } else {
                update.uid.clone()
            },
            email: update.email.clone().or_else(|| self.email.clone()),
            display_name: update
                .display_name
                .clone()
                .or_else(|| self.display_name.clone()),
            campus: update.campus.clone().or_else(|| self.campus.clone()),
            whatsapp: update.whatsapp.clone().or_else(|| self.whatsapp.clone()),
            avatar_url: update
                .avatar_url
                .clone()
                .or_else(|| self.avatar_url.clone()),
            onboarded: update.onboarded.or(self.onboarded),
            created_at: update.created_at.or(self.created_at),
        }
    }
}

/// Profile edit input, validated before any network call.
///
/// The WhatsApp pattern accepts Nigerian mobile numbers in local
/// (`080…`) or international (`+23480…`) form; callers should strip
/// spaces and hyphens first (see [`normalize_phone`]).
#[derive(Debug, Clone, garde::Validate)]
pub struct ProfileEdit {
    /// Display name: 1-80 characters.
    #[garde(length(min = 1, max = 80))]
    pub display_name: String,

    /// WhatsApp contact number.
    #[garde(pattern(r"^(?:\+234|0)[789][01][0-9]{8}$"))]
    pub whatsapp: String,
}

/// Strip spaces and hyphens from a phone number before validation.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

/// Async profile store contract.
pub trait ProfileStore: Send + Sync + 'static {
    /// Get the profile document for `uid`, if one exists.
    fn get(
        &self,
        uid: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserProfile>>> + Send + '_>>;

    /// Write the profile document for `uid`.  With `merge` set, only
    /// present fields overwrite; otherwise the document is replaced.
    fn set(
        &self,
        uid: &str,
        profile: UserProfile,
        merge: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

// -- In-memory implementation -------------------------------------------------

/// In-memory profile store for tests and local runs.
pub struct MemoryProfileStore {
    inner: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a profile directly (test hook).
    pub fn seed(&self, profile: UserProfile) {
        let mut inner = self.inner.write().expect("profile lock poisoned");
        inner.insert(profile.uid.clone(), profile);
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(
        &self,
        uid: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserProfile>>> + Send + '_>> {
        let uid = uid.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("profile lock poisoned");
            Ok(inner.get(&uid).cloned())
        })
    }

    fn set(
        &self,
        uid: &str,
        profile: UserProfile,
        merge: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let uid = uid.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("profile lock poisoned");
            let stored = match (merge, inner.get(&uid)) {
                (true, Some(existing)) => existing.merged_with(&profile),
                _ => profile,
            };
            inner.insert(uid, stored);
            Ok(())
        })
    }
}
