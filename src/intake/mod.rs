//! Image intake pipeline.
//!
//! Turns raw selected files into [`Image`] values ready to be attached to a
//! draft. Validation (MIME type, size cap) is shared; the transformation is
//! delegated to one [`ImageStrategy`] per deployment:
//! - `inline` - decode, downscale, re-encode as JPEG, embed as a data URL
//! - `external` - upload to object storage, reference by download URL
//!
//! Every file of a batch is an independent task. Outcomes are collected with
//! [`settle_all`] and reported in input order; a failing file never affects
//! its siblings.

mod external;
mod inline;

pub use external::ExternalStrategy;
pub use inline::{fit_within, InlineStrategy};

use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::notification::Notification;
use crate::posting::models::Image;
use crate::storage::StorageError;

/// A file picked by the admin, before any processing.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    /// Bytes received. Equals `data.len()` unless the upload was cut off.
    pub size: usize,
}

impl SelectedFile {
    pub fn new(filename: impl Into<String>, content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            size: data.len(),
            data,
        }
    }

    /// A file whose upload went past the size cap; its bytes were not kept.
    pub fn oversized(filename: impl Into<String>, content_type: Option<&str>, size: usize) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            data: Vec::new(),
            size,
        }
    }

    /// Declared content type, falling back to a guess from the file extension.
    pub fn mime_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
            _ => mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageIntakeError {
    #[error("{mime} is not an image")]
    InvalidType { mime: String },
    #[error("file is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode image: {0}")]
    Encode(String),
    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),
    #[error("processing was interrupted")]
    Aborted,
}

/// Best-effort deletion of a backing object that failed. Logged, never surfaced.
#[derive(Debug, Clone, thiserror::Error)]
#[error("could not delete backing object {path}: {source}")]
pub struct StorageCleanupError {
    pub path: String,
    #[source]
    pub source: StorageError,
}

#[async_trait::async_trait]
pub trait ImageStrategy: Send + Sync {
    /// Size cap applied before transforming, if any.
    fn max_bytes(&self) -> Option<usize>;

    async fn transform(&self, file: SelectedFile, mime: String) -> Result<Image, ImageIntakeError>;

    /// Releases whatever backs `image`. Inline images own nothing.
    async fn discard(&self, image: &Image) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct IntakeSuccess {
    pub index: usize,
    pub filename: String,
    pub image: Image,
}

#[derive(Debug, Clone)]
pub struct IntakeFailure {
    pub index: usize,
    pub filename: String,
    pub error: ImageIntakeError,
}

/// Disjoint per-file outcomes of one batch, each list in input order.
#[derive(Debug, Clone, Default)]
pub struct IntakeReport {
    pub succeeded: Vec<IntakeSuccess>,
    pub failed: Vec<IntakeFailure>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

impl IntakeReport {
    pub fn images(&self) -> Vec<Image> {
        self.succeeded.iter().map(|s| s.image.clone()).collect()
    }

    pub fn failed_files(&self) -> Vec<FailedFile> {
        self.failed
            .iter()
            .map(|f| FailedFile {
                filename: f.filename.clone(),
                reason: f.error.to_string(),
            })
            .collect()
    }

    pub fn notification(&self) -> Notification {
        let total = self.succeeded.len() + self.failed.len();
        if self.failed.is_empty() {
            return Notification::success(format!("{} image(s) added", self.succeeded.len()));
        }

        let names = self
            .failed
            .iter()
            .map(|f| format!("{} ({})", f.filename, f.error))
            .collect::<Vec<_>>()
            .join(", ");
        if self.succeeded.is_empty() {
            Notification::error(format!("No images were added. Failed: {}", names))
        } else {
            Notification::warning(format!(
                "Added {} of {} images. Failed: {}",
                self.succeeded.len(),
                total,
                names
            ))
        }
    }
}

/// Runs every job as its own task and waits for all of them. Outcomes come
/// back in input order; `None` marks a job whose task panicked or was
/// cancelled.
pub async fn settle_all<T, F>(jobs: Vec<F>) -> Vec<Option<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = jobs.into_iter().map(tokio::spawn).collect();
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("Intake task did not complete: {}", e);
                None
            }
        })
        .collect()
}

/// Validates and transforms batches of files with the configured strategy.
#[derive(Clone)]
pub struct ImageIntake {
    strategy: Arc<dyn ImageStrategy>,
}

impl ImageIntake {
    pub fn new(strategy: Arc<dyn ImageStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> Arc<dyn ImageStrategy> {
        self.strategy.clone()
    }

    fn check(&self, file: &SelectedFile) -> Result<String, ImageIntakeError> {
        let mime = file.mime_type();
        if !mime.starts_with("image/") {
            return Err(ImageIntakeError::InvalidType { mime });
        }
        if let Some(limit) = self.strategy.max_bytes() {
            if file.size > limit {
                return Err(ImageIntakeError::TooLarge {
                    size: file.size,
                    limit,
                });
            }
        }
        Ok(mime)
    }

    pub async fn process(&self, files: Vec<SelectedFile>) -> IntakeReport {
        let mut report = IntakeReport::default();
        let mut pending = Vec::new();
        let mut jobs = Vec::new();

        for (index, file) in files.into_iter().enumerate() {
            match self.check(&file) {
                Ok(mime) => {
                    let strategy = self.strategy.clone();
                    pending.push((index, file.filename.clone()));
                    jobs.push(async move { strategy.transform(file, mime).await });
                }
                Err(error) => {
                    log::info!("Rejected {}: {}", file.filename, error);
                    report.failed.push(IntakeFailure {
                        index,
                        filename: file.filename,
                        error,
                    });
                }
            }
        }

        let outcomes = settle_all(jobs).await;
        for ((index, filename), outcome) in pending.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(image)) => report.succeeded.push(IntakeSuccess {
                    index,
                    filename,
                    image,
                }),
                Some(Err(error)) => {
                    log::warn!("Image intake failed for {}: {}", filename, error);
                    report.failed.push(IntakeFailure {
                        index,
                        filename,
                        error,
                    });
                }
                None => report.failed.push(IntakeFailure {
                    index,
                    filename,
                    error: ImageIntakeError::Aborted,
                }),
            }
        }
        report.failed.sort_by_key(|f| f.index);

        log::info!(
            "Image batch processed: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    /// Releases images that will never be persisted, without waiting.
    pub fn discard_later(&self, images: Vec<Image>) {
        if images.iter().all(|img| img.backing_path().is_none()) {
            return;
        }
        let strategy = self.strategy.clone();
        tokio::spawn(async move {
            release_images(strategy.as_ref(), &images).await;
        });
    }
}

/// Deletes the backing objects of `images`, continuing past failures.
pub async fn release_images(
    strategy: &dyn ImageStrategy,
    images: &[Image],
) -> Vec<StorageCleanupError> {
    let mut failures = Vec::new();
    for image in images {
        let Some(path) = image.backing_path() else {
            continue;
        };
        if let Err(source) = strategy.discard(image).await {
            let failure = StorageCleanupError {
                path: path.to_string(),
                source,
            };
            log::warn!("{}", failure);
            failures.push(failure);
        }
    }
    failures
}
