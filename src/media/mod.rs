//! Image upload: the blob store trait, the Cloudinary client, and the
//! batch coordinator.

pub mod cloudinary;
pub mod coordinator;

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// One image file selected by the user.
#[derive(Debug, Clone)]
pub struct ImageFile {
    /// Original file name, kept for logging and retry context.
    pub file_name: String,
    /// MIME content type (e.g. `image/jpeg`).
    pub content_type: String,
    /// Raw bytes of the image.
    pub data: Bytes,
}

impl ImageFile {
    pub fn new(file_name: &str, content_type: &str, data: Bytes) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            data,
        }
    }
}

/// Async blob store contract.
///
/// A successful upload yields a durable public URL for the stored
/// object.
pub trait BlobStore: Send + Sync + 'static {
    /// Upload one file, returning its public URL.
    fn upload(
        &self,
        file: &ImageFile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}
