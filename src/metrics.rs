//! Metric names for the marketplace core.
//!
//! Uses the `metrics` facade only; the embedding application decides
//! which recorder (if any) to install.  Call [`describe_metrics`] once
//! after installing a recorder so exporters can surface descriptions.

use metrics::{describe_counter, describe_histogram};

// -- Metric name constants ----------------------------------------------------

/// Total image uploads attempted (counter).
pub const UPLOADS_TOTAL: &str = "campulse_uploads_total";

/// Total image uploads that failed (counter).
pub const UPLOAD_FAILURES_TOTAL: &str = "campulse_upload_failures_total";

/// Upload batch duration in seconds (histogram).
pub const UPLOAD_BATCH_DURATION_SECONDS: &str = "campulse_upload_batch_duration_seconds";

/// Total listings created (counter).
pub const LISTINGS_CREATED_TOTAL: &str = "campulse_listings_created_total";

/// Total listing mutations: sold toggles and deletes (counter). Label: kind.
pub const LISTING_MUTATIONS_TOTAL: &str = "campulse_listing_mutations_total";

/// Total session state transitions (counter). Label: state.
pub const SESSION_TRANSITIONS_TOTAL: &str = "campulse_session_transitions_total";

/// Total profile fetches that failed and degraded to onboarding (counter).
pub const PROFILE_FETCH_FAILURES_TOTAL: &str = "campulse_profile_fetch_failures_total";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(UPLOADS_TOTAL, "Total image uploads attempted");
    describe_counter!(UPLOAD_FAILURES_TOTAL, "Total image uploads that failed");
    describe_histogram!(
        UPLOAD_BATCH_DURATION_SECONDS,
        "Upload batch duration in seconds"
    );
    describe_counter!(LISTINGS_CREATED_TOTAL, "Total listings created");
    describe_counter!(
        LISTING_MUTATIONS_TOTAL,
        "Total listing mutations (sold toggles and deletes)"
    );
    describe_counter!(SESSION_TRANSITIONS_TOTAL, "Total session state transitions");
    describe_counter!(
        PROFILE_FETCH_FAILURES_TOTAL,
        "Profile fetches that degraded the session to onboarding"
    );
}
