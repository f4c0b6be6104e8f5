//! Campulse core — campus marketplace client engine.
//!
//! This crate provides the non-UI core of a campus-scoped student
//! marketplace: session and onboarding state, profile management,
//! concurrent image uploads, and listing persistence, querying, and
//! ownership-gated mutation.  UI shells embed [`MarketplaceClient`]
//! and render whatever [`session::View`] it derives.

pub mod client;
pub mod config;
pub mod errors;
pub mod identity;
pub mod listings;
pub mod media;
pub mod metrics;
pub mod profile;
pub mod query;
pub mod repository;
pub mod session;

pub use client::{MarketplaceClient, PostedListing};
pub use config::Config;
pub use errors::MarketError;
pub use identity::gateway::Identity;
pub use listings::{Category, CategoryFilter, Condition, Listing, ListingDraft};
pub use media::ImageFile;
pub use profile::UserProfile;
pub use session::{SessionState, View};

use crate::config::LoggingConfig;

/// Initialize tracing from the logging section of the config.
///
/// Honors `RUST_LOG` when set, falling back to the configured level.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));
    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
