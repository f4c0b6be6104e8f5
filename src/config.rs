//! Configuration loading and types for the marketplace client core.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs one external
//! collaborator: the identity provider / document store project, the
//! image blob store, and logging.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Firebase project settings (identity provider + document store).
    pub firebase: FirebaseConfig,

    /// Cloudinary settings (image blob store).
    pub cloudinary: CloudinaryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Firebase project configuration.
///
/// The same project backs both the identity provider (Firebase Auth)
/// and the document store (Firestore collections `users` and
/// `products`).
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    /// Web API key for the Identity Toolkit REST endpoints.
    pub api_key: String,

    /// GCP project id hosting the Firestore database.
    pub project_id: String,
}

/// Cloudinary unsigned-upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    /// Cloud (account) identifier in the upload URL.
    pub cloud_name: String,

    /// Unsigned upload preset name.
    #[serde(default = "default_upload_preset")]
    pub upload_preset: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_upload_preset() -> String {
    "campulse_uploads".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
