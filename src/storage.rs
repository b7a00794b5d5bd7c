use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use url::Url;

use crate::config::SupabaseConfig;

/// Metadata recorded alongside every uploaded object.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub content_type: String,
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Handle to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub path: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(String),
    #[error("storage rejected {path} with status {status}: {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },
}

#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<ObjectRef, StorageError>;

    async fn download_url(&self, object: &ObjectRef) -> Result<String, StorageError>;

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError>;
}

pub struct SupabaseStorage {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.supabase_url.trim_end_matches('/')
    }

    /// `<base>/storage/v1/object/<scope..>/<bucket>/<path>`, every segment
    /// percent-encoded so names like `a#1.png` survive.
    fn storage_url(&self, scope: &[&str], path: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(self.base_url())
            .map_err(|e| StorageError::Request(format!("invalid SUPABASE_URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Request("SUPABASE_URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(scope)
            .push(&self.config.bucket_name)
            .extend(path.split('/'));
        Ok(url)
    }

    fn object_url(&self, path: &str) -> Result<Url, StorageError> {
        self.storage_url(&[], path)
    }

    pub fn public_url(&self, path: &str) -> Result<String, StorageError> {
        Ok(self.storage_url(&["public"], path)?.to_string())
    }

    async fn check(response: reqwest::Response, path: &str) -> Result<(), StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Rejected {
            path: path.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<ObjectRef, StorageError> {
        log::debug!("Uploading {} bytes to {}", data.len(), path);
        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| StorageError::Request(e.to_string()))?;
        let file_part = Part::bytes(data)
            .file_name(metadata.original_filename.clone())
            .mime_str(&metadata.content_type)
            .map_err(|e| StorageError::Request(e.to_string()))?;
        let form = Form::new()
            .text("cacheControl", "3600")
            .text("metadata", metadata_json)
            .part("", file_part);

        let response = self
            .client
            .post(self.object_url(path)?)
            .bearer_auth(&self.config.supabase_anon_key)
            .header("apikey", &self.config.supabase_anon_key)
            .header("x-upsert", "false")
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Self::check(response, path).await?;

        log::info!("Uploaded object {}", path);
        Ok(ObjectRef {
            path: path.to_string(),
        })
    }

    async fn download_url(&self, object: &ObjectRef) -> Result<String, StorageError> {
        self.public_url(&object.path)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.object_url(&object.path)?)
            .bearer_auth(&self.config.supabase_anon_key)
            .header("apikey", &self.config.supabase_anon_key)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Self::check(response, &object.path).await?;
        log::info!("Deleted object {}", object.path);
        Ok(())
    }
}
