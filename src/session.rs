//! Session resolution: the onboarding/gating state machine.
//!
//! Combines the identity gateway's change feed with the profile store
//! into a single derived session signal.  Every identity notification
//! bumps a generation counter; profile fetches carry the generation
//! they were issued under and their result is discarded if a newer
//! notification has superseded them.  A profile fetch failure degrades
//! toward onboarding (asking the user to re-supply campus info), never
//! toward silently granting marketplace access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::gateway::{Identity, IdentityGateway};
use crate::metrics::{PROFILE_FETCH_FAILURES_TOTAL, SESSION_TRANSITIONS_TOTAL};
use crate::profile::ProfileStore;

/// Derived session state.  The four authenticated/anonymous states are
/// mutually exclusive; `Unknown` exists only until the first identity
/// notification has been processed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No identity notification processed yet.
    Unknown,
    /// No identity is signed in.
    Anonymous,
    /// Identity present; profile fetch in flight.
    AuthenticatedPending { identity: Identity },
    /// Identity present; profile loaded (or failed to load) without a
    /// campus.
    AuthenticatedOnboarding { identity: Identity },
    /// Identity present with a campus-complete profile.
    AuthenticatedActive { identity: Identity, campus: String },
}

impl SessionState {
    /// Stable name for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Anonymous => "anonymous",
            SessionState::AuthenticatedPending { .. } => "pending",
            SessionState::AuthenticatedOnboarding { .. } => "onboarding",
            SessionState::AuthenticatedActive { .. } => "active",
        }
    }

    /// Collapse to the view the router should show.
    pub fn view(&self) -> View {
        match self {
            SessionState::Unknown => View::Loading,
            SessionState::Anonymous => View::Landing,
            SessionState::AuthenticatedPending { .. } => View::Loading,
            SessionState::AuthenticatedOnboarding { .. } => View::Onboarding,
            SessionState::AuthenticatedActive { .. } => View::Marketplace,
        }
    }

    /// The signed-in identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Unknown | SessionState::Anonymous => None,
            SessionState::AuthenticatedPending { identity }
            | SessionState::AuthenticatedOnboarding { identity }
            | SessionState::AuthenticatedActive { identity, .. } => Some(identity),
        }
    }

    /// Identity plus campus, only when the session is fully active.
    pub fn active(&self) -> Option<(&Identity, &str)> {
        match self {
            SessionState::AuthenticatedActive { identity, campus } => {
                Some((identity, campus.as_str()))
            }
            _ => None,
        }
    }
}

/// The view the router should render for a session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Landing,
    Loading,
    Onboarding,
    Marketplace,
}

struct ResolverInner {
    gateway: Arc<dyn IdentityGateway>,
    profiles: Arc<dyn ProfileStore>,
    generation: AtomicU64,
    state: watch::Sender<SessionState>,
}

impl ResolverInner {
    /// Claim a new generation, superseding any in-flight derivation.
    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish `next` unless a newer generation has been claimed.
    fn publish(&self, gen: u64, next: SessionState) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != gen {
                debug!("Discarding stale session derivation (generation {gen})");
                return false;
            }
            if *current == next {
                return false;
            }
            counter!(SESSION_TRANSITIONS_TOTAL, "state" => next.name()).increment(1);
            debug!("Session state: {} -> {}", current.name(), next.name());
            *current = next;
            true
        });
    }

    /// Fetch the profile for `identity` and publish the resulting
    /// state, assuming generation `gen` is still current.
    async fn resolve_profile(&self, identity: Identity, gen: u64) {
        let next = match self.profiles.get(&identity.id).await {
            Ok(Some(profile)) if profile.is_onboarded() => {
                let campus = profile.campus.unwrap_or_default();
                SessionState::AuthenticatedActive { identity, campus }
            }
            Ok(_) => SessionState::AuthenticatedOnboarding { identity },
            Err(e) => {
                // Degrade to onboarding: ask for campus info again
                // rather than guessing at marketplace access.
                warn!("Profile fetch failed for {}: {e:#}", identity.id);
                counter!(PROFILE_FETCH_FAILURES_TOTAL).increment(1);
                SessionState::AuthenticatedOnboarding { identity }
            }
        };
        self.publish(gen, next);
    }

    /// React to an identity notification: anonymous immediately, or
    /// pending with a profile fetch spawned for this generation.
    fn handle_notification(self: &Arc<Self>, identity: Option<Identity>) {
        let gen = self.begin();
        match identity {
            None => self.publish(gen, SessionState::Anonymous),
            Some(identity) => {
                self.publish(
                    gen,
                    SessionState::AuthenticatedPending {
                        identity: identity.clone(),
                    },
                );
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    inner.resolve_profile(identity, gen).await;
                });
            }
        }
    }
}

/// Owns the session derivation task.
///
/// Constructed explicitly and injected into the view layer; dropping
/// the resolver stops the subscription, so no derivation can write
/// after teardown.
pub struct SessionResolver {
    inner: Arc<ResolverInner>,
    task: JoinHandle<()>,
}

impl SessionResolver {
    /// Start resolving sessions from the gateway's change feed.
    pub fn start(gateway: Arc<dyn IdentityGateway>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        let inner = Arc::new(ResolverInner {
            gateway,
            profiles,
            generation: AtomicU64::new(0),
            state,
        });

        let mut feed = inner.gateway.subscribe();
        let task_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            loop {
                let identity = feed.borrow_and_update().clone();
                task_inner.handle_notification(identity);
                if feed.changed().await.is_err() {
                    info!("Identity feed closed, session resolver stopping");
                    break;
                }
            }
        });

        Self { inner, task }
    }

    /// Subscribe to derived session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The current derived session state.
    pub fn current(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Re-derive the session for the current identity.
    ///
    /// Called after the onboarding flow acknowledges its profile write,
    /// replacing the full-reload trick with an explicit recomputation.
    /// Waits for the derivation so callers observe the new state on
    /// return.
    pub async fn refresh(&self) {
        let gen = self.inner.begin();
        match self.inner.gateway.current() {
            None => self.inner.publish(gen, SessionState::Anonymous),
            Some(identity) => {
                self.inner
                    .publish(
                        gen,
                        SessionState::AuthenticatedPending {
                            identity: identity.clone(),
                        },
                    );
                self.inner.resolve_profile(identity, gen).await;
            }
        }
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        self.task.abort();
    }
}
