//! Cloudinary blob store.
//!
//! Uploads images via the unsigned upload endpoint using a multipart
//! POST parameterized by an upload preset and a cloud (account) name.
//! Success is indicated by a `secure_url` field in the JSON response;
//! failure by a non-2xx status or an `error.message` field.

use std::future::Future;
use std::pin::Pin;

use reqwest::multipart;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::{BlobStore, ImageFile};
use crate::config::CloudinaryConfig;

/// Cloudinary API base URL.
const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

// -- Cloudinary response types ------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<UploadErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorDetail {
    message: Option<String>,
}

/// Blob store backed by Cloudinary's unsigned image upload.
pub struct CloudinaryBlobStore {
    client: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryBlobStore {
    /// Create a new Cloudinary blob store.
    pub fn new(config: &CloudinaryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!(
            "Cloudinary blob store initialized: cloud={} preset={}",
            config.cloud_name, config.upload_preset
        );
        Ok(Self {
            client,
            cloud_name: config.cloud_name.clone(),
            upload_preset: config.upload_preset.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{CLOUDINARY_API_BASE}/{}/image/upload", self.cloud_name)
    }

    /// Map an upload failure to an anyhow error with context.
    fn map_upload_error(status: StatusCode, body: &str) -> anyhow::Error {
        if let Ok(parsed) = serde_json::from_str::<UploadResponse>(body) {
            if let Some(detail) = parsed.error {
                return anyhow::anyhow!(
                    "Cloudinary upload rejected: {}",
                    detail.message.unwrap_or_default()
                );
            }
        }
        anyhow::anyhow!("Cloudinary upload failed: HTTP {status} - {body}")
    }
}

impl BlobStore for CloudinaryBlobStore {
    fn upload(
        &self,
        file: &ImageFile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let file = file.clone();
        Box::pin(async move {
            let part = multipart::Part::bytes(file.data.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.content_type)
                .map_err(|e| anyhow::anyhow!("Invalid content type {}: {e}", file.content_type))?;

            let form = multipart::Form::new()
                .part("file", part)
                .text("upload_preset", self.upload_preset.clone());

            let resp = self
                .client
                .post(self.upload_url())
                .multipart(form)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Cloudinary request failed: {e}"))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| anyhow::anyhow!("Cloudinary response read failed: {e}"))?;

            if !status.is_success() {
                return Err(Self::map_upload_error(status, &body));
            }

            let parsed: UploadResponse = serde_json::from_str(&body)
                .map_err(|e| anyhow::anyhow!("Malformed Cloudinary response: {e}"))?;

            match parsed.secure_url {
                Some(url) => {
                    debug!("Uploaded {} -> {url}", file.file_name);
                    Ok(url)
                }
                None => Err(Self::map_upload_error(status, &body)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_format() {
        let store = CloudinaryBlobStore::new(&CloudinaryConfig {
            cloud_name: "demo-cloud".to_string(),
            upload_preset: "campulse_uploads".to_string(),
        })
        .unwrap();
        assert_eq!(
            store.upload_url(),
            "https://api.cloudinary.com/v1_1/demo-cloud/image/upload"
        );
    }

    #[test]
    fn test_success_response_parsing() {
        let body = r#"{
            "public_id": "abc",
            "secure_url": "https://res.cloudinary.com/demo/image/upload/abc.jpg"
        }"#;
        let parsed: UploadResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.secure_url.as_deref(),
            Some("https://res.cloudinary.com/demo/image/upload/abc.jpg")
        );
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_error_response_parsing() {
        let body = r#"{"error": {"message": "Upload preset not found"}}"#;
        let err = CloudinaryBlobStore::map_upload_error(StatusCode::BAD_REQUEST, body);
        assert!(err.to_string().contains("Upload preset not found"));
    }

    #[test]
    fn test_unparseable_error_body_keeps_status() {
        let err = CloudinaryBlobStore::map_upload_error(StatusCode::BAD_GATEWAY, "oops");
        assert!(err.to_string().contains("502"));
    }
}
