use chrono::{DateTime, Utc};
use sanitize_filename::sanitize;
use std::sync::Arc;

use super::{ImageIntakeError, ImageStrategy, SelectedFile};
use crate::posting::models::{Image, StoredImage};
use crate::storage::{ObjectMetadata, ObjectRef, ObjectStorage, StorageError};

/// Uploads images to object storage and references them by download URL.
pub struct ExternalStrategy {
    storage: Arc<dyn ObjectStorage>,
    folder: String,
    max_bytes: Option<usize>,
}

impl ExternalStrategy {
    pub fn new(storage: Arc<dyn ObjectStorage>, folder: impl Into<String>, max_bytes: Option<usize>) -> Self {
        Self {
            storage,
            folder: folder.into(),
            max_bytes,
        }
    }

    /// `<folder>/<millis>_<nonce>_<sanitized name>`. The nonce keeps two files
    /// with the same name in one batch apart.
    pub fn object_name(&self, filename: &str, at: DateTime<Utc>) -> String {
        let cleaned = sanitize(filename).replace(char::is_whitespace, "_");
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}_{}_{}",
            self.folder.trim_end_matches('/'),
            at.timestamp_millis(),
            &nonce[..8],
            cleaned
        )
    }
}

#[async_trait::async_trait]
impl ImageStrategy for ExternalStrategy {
    fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    async fn transform(&self, file: SelectedFile, mime: String) -> Result<Image, ImageIntakeError> {
        let uploaded_at = Utc::now();
        let path = self.object_name(&file.filename, uploaded_at);
        let metadata = ObjectMetadata {
            content_type: mime,
            original_filename: file.filename.clone(),
            uploaded_at,
        };

        let object = self.storage.upload(&path, file.data, &metadata).await?;
        let url = match self.storage.download_url(&object).await {
            Ok(url) => url,
            Err(e) => {
                // Nothing will ever reference the object now.
                if let Err(cleanup) = self.storage.delete(&object).await {
                    log::warn!("Could not remove orphaned object {}: {}", object.path, cleanup);
                }
                return Err(e.into());
            }
        };

        Ok(Image::Stored(StoredImage {
            url,
            path: object.path,
            filename: file.filename,
        }))
    }

    async fn discard(&self, image: &Image) -> Result<(), StorageError> {
        match image.backing_path() {
            Some(path) => {
                self.storage
                    .delete(&ObjectRef {
                        path: path.to_string(),
                    })
                    .await
            }
            None => Ok(()),
        }
    }
}
