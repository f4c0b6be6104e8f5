//! Concurrent batch upload coordination.
//!
//! Each file in a batch uploads independently and concurrently; the
//! batch never fails atomically.  Survivor URLs come back in the order
//! the files were submitted, not the order uploads completed, so the
//! display order of a listing's images matches what the user picked.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, warn};

use super::{BlobStore, ImageFile};
use crate::errors::MarketError;
use crate::metrics::{UPLOADS_TOTAL, UPLOAD_BATCH_DURATION_SECONDS, UPLOAD_FAILURES_TOTAL};

/// Maximum images per listing batch.
///
/// The add-file interaction enforces this upstream; the coordinator
/// enforces it again so an over-long batch can never fan out unbounded
/// parallel uploads.
pub const MAX_BATCH_IMAGES: usize = 4;

/// Outcome of a batch upload with at least one survivor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    /// Public URLs of the uploads that succeeded, in submission order.
    pub urls: Vec<String>,
    /// Number of uploads that failed.
    pub failed: usize,
}

impl UploadBatch {
    /// Total files processed.
    pub fn total(&self) -> usize {
        self.urls.len() + self.failed
    }
}

/// Drives concurrent uploads of a bounded set of image files.
pub struct MediaUploadCoordinator {
    blobs: Arc<dyn BlobStore>,
}

impl MediaUploadCoordinator {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Upload a batch of files concurrently.
    ///
    /// Individual failures are tolerated and excluded from the result;
    /// a failure on one file never cancels its siblings.  Returns
    /// [`MarketError::UploadsAllFailed`] when no upload survives (the
    /// caller must then abort listing creation to preserve the
    /// at-least-one-image invariant).
    pub async fn upload(&self, mut files: Vec<ImageFile>) -> Result<UploadBatch, MarketError> {
        let submitted = files.len();
        if submitted > MAX_BATCH_IMAGES {
            warn!(
                "Upload batch of {submitted} files exceeds the {MAX_BATCH_IMAGES}-image cap, \
                 extra files ignored"
            );
            files.truncate(MAX_BATCH_IMAGES);
        }
        let total = files.len();
        if total == 0 {
            return Err(MarketError::UploadsAllFailed { total: 0 });
        }

        let started = Instant::now();
        counter!(UPLOADS_TOTAL).increment(total as u64);

        // Spawn every upload up front so they run concurrently, then
        // join in submission order to keep survivor order stable.
        let handles: Vec<_> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let blobs = Arc::clone(&self.blobs);
                tokio::spawn(async move {
                    let name = file.file_name.clone();
                    (index, name, blobs.upload(&file).await)
                })
            })
            .collect();

        let mut urls = Vec::with_capacity(total);
        let mut failed = 0usize;
        for handle in handles {
            match handle.await {
                Ok((index, name, Ok(url))) => {
                    debug!("Upload {index} ({name}) succeeded");
                    urls.push(url);
                }
                Ok((index, name, Err(e))) => {
                    warn!("Upload {index} ({name}) failed: {e:#}");
                    failed += 1;
                }
                Err(e) => {
                    warn!("Upload task aborted: {e}");
                    failed += 1;
                }
            }
        }

        counter!(UPLOAD_FAILURES_TOTAL).increment(failed as u64);
        histogram!(UPLOAD_BATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        if urls.is_empty() {
            return Err(MarketError::UploadsAllFailed { total });
        }
        Ok(UploadBatch { urls, failed })
    }
}
