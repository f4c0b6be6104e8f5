//! Marketplace error types.
//!
//! Every failure an operation can surface is a [`MarketError`] variant.
//! The enum carries a stable `code()` string for logging and telemetry,
//! a `retryable()` hint, and a short `user_message()` suitable for a
//! dismissible notification.  Collaborator internals use `anyhow` and
//! are absorbed through the `Internal` variant.

use thiserror::Error;

/// Errors surfaced at marketplace operation boundaries.
#[derive(Debug, Error)]
pub enum MarketError {
    /// The identity provider rejected a sign-in or sign-up attempt.
    /// The provider's message is passed through verbatim.
    #[error("{message}")]
    Credential { message: String },

    /// The caller attempted an operation that needs an active,
    /// onboarded session.
    #[error("You need to be signed in with a campus selected to do that")]
    SessionRequired,

    /// The user's profile document could not be read.  Recovered by
    /// degrading to the onboarding-required state; never fatal.
    #[error("Your campus profile could not be loaded")]
    ProfileUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// Some uploads in a batch failed.  Informational: the batch still
    /// produced at least one usable URL.
    #[error("{failed} of {total} image uploads failed")]
    Upload { failed: usize, total: usize },

    /// Every upload in the batch failed, so no listing may be created
    /// from it.
    #[error("All image uploads failed, the listing was not posted")]
    UploadsAllFailed { total: usize },

    /// A field failed validation before any network call was made.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The caller tried to mutate a listing it does not own.
    #[error("Only the seller can change or remove this listing")]
    NotListingOwner { id: String },

    /// The listing does not exist (or was deleted concurrently).
    #[error("Listing not found")]
    ListingNotFound { id: String },

    /// A document store read or write failed.  Not retried
    /// automatically.
    #[error("The marketplace could not reach its data store ({context})")]
    Persistence {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Something went wrong, please try again")]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Credential { .. } => "CredentialError",
            MarketError::SessionRequired => "SessionRequired",
            MarketError::ProfileUnavailable { .. } => "ProfileFetchError",
            MarketError::Upload { .. } => "UploadError",
            MarketError::UploadsAllFailed { .. } => "UploadsAllFailed",
            MarketError::Validation { .. } => "ValidationError",
            MarketError::NotListingOwner { .. } => "NotListingOwner",
            MarketError::ListingNotFound { .. } => "ListingNotFound",
            MarketError::Persistence { .. } => "PersistenceError",
            MarketError::Internal(_) => "InternalError",
        }
    }

    /// Whether retrying the same operation unchanged can succeed.
    ///
    /// Validation and ownership failures need different input, not a
    /// retry; everything network-shaped is worth another attempt.
    pub fn retryable(&self) -> bool {
        match self {
            MarketError::Credential { .. } => true,
            MarketError::SessionRequired => false,
            MarketError::ProfileUnavailable { .. } => true,
            MarketError::Upload { .. } => true,
            MarketError::UploadsAllFailed { .. } => true,
            MarketError::Validation { .. } => false,
            MarketError::NotListingOwner { .. } => false,
            MarketError::ListingNotFound { .. } => false,
            MarketError::Persistence { .. } => true,
            MarketError::Internal(_) => true,
        }
    }

    /// Short, actionable message for a dismissible notification.
    pub fn user_message(&self) -> String {
        match self {
            MarketError::Upload { failed, total } => format!(
                "{failed} of {total} photos did not upload. Retry them or post with the rest."
            ),
            MarketError::UploadsAllFailed { .. } => {
                "None of your photos uploaded. Check your connection and try again.".to_string()
            }
            MarketError::Validation { field, message } => format!("{field}: {message}"),
            other => other.to_string(),
        }
    }

    /// Build a validation error for a named field.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        MarketError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a document-store failure with the operation it interrupted.
    pub fn persistence(context: &str, source: anyhow::Error) -> Self {
        MarketError::Persistence {
            context: context.to_string(),
            source,
        }
    }
}
