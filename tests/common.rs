//! Shared fixtures for the integration tests: mock object storage, a store
//! that can be told to fail, a gated image strategy and small helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use newsdesk_server::intake::{ImageIntakeError, ImageStrategy, SelectedFile};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use newsdesk_server::posting::models::{Image, StoredImage, CREATED_AT_FIELD};
use newsdesk_server::storage::{ObjectMetadata, ObjectRef, ObjectStorage, StorageError};
use newsdesk_server::store::{
    Document, DocumentStore, InMemoryStore, Snapshot, SnapshotStream, StoreError,
};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify};

/// In-memory object storage that records every call.
pub struct MockObjectStorage {
    files: Arc<Mutex<HashMap<String, (Vec<u8>, ObjectMetadata)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    upload_count: AtomicUsize,
    pub fail_uploads_containing: Option<String>,
    pub fail_download_url: bool,
    pub fail_deletes: bool,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            upload_count: AtomicUsize::new(0),
            fail_uploads_containing: None,
            fail_download_url: false,
            fail_deletes: false,
        }
    }

    pub async fn has_file(&self, path: &str) -> bool {
        self.files.lock().await.contains_key(path)
    }

    pub async fn metadata(&self, path: &str) -> Option<ObjectMetadata> {
        self.files.lock().await.get(path).map(|(_, m)| m.clone())
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<ObjectRef, StorageError> {
        if let Some(ref marker) = self.fail_uploads_containing {
            if path.contains(marker.as_str()) {
                return Err(StorageError::Rejected {
                    path: path.to_string(),
                    status: 500,
                    message: "Mock upload failure".to_string(),
                });
            }
        }
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .await
            .insert(path.to_string(), (data, metadata.clone()));
        Ok(ObjectRef {
            path: path.to_string(),
        })
    }

    async fn download_url(&self, object: &ObjectRef) -> Result<String, StorageError> {
        if self.fail_download_url {
            return Err(StorageError::Request("Mock URL failure".to_string()));
        }
        Ok(format!("http://test.example.com/{}", object.path))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        if self.fail_deletes {
            return Err(StorageError::Request("Mock delete failure".to_string()));
        }
        self.files.lock().await.remove(&object.path);
        self.deleted.lock().await.push(object.path.clone());
        Ok(())
    }
}

/// Wraps the in-memory store and fails reads or writes on demand.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub create_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Permission("Mock write failure".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Network("Mock read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        self.check_read()?;
        self.inner.subscribe(collection).await
    }

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.check_read()?;
        self.inner.fetch_all(collection).await
    }

    async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        self.check_write()?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.delete(collection, id).await
    }
}

/// In-memory store whose clock runs `lag` behind the application's. Every
/// document it hands out has its `createdAt` shifted back.
pub struct LaggingStore {
    pub inner: InMemoryStore,
    lag: chrono::Duration,
}

impl LaggingStore {
    pub fn new(lag: chrono::Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            lag,
        }
    }
}

fn shift(mut doc: Document, lag: chrono::Duration) -> Document {
    let stamp = doc
        .fields
        .get(CREATED_AT_FIELD)
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
    if let Some(at) = stamp {
        doc.fields.insert(
            CREATED_AT_FIELD.to_string(),
            serde_json::to_value(at - lag).unwrap(),
        );
    }
    doc
}

#[async_trait::async_trait]
impl DocumentStore for LaggingStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        let lag = self.lag;
        let feed = self.inner.subscribe(collection).await?;
        Ok(feed
            .map(move |item| item.map(|snap| snap.into_iter().map(|d| shift(d, lag)).collect()))
            .boxed())
    }

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        let snapshot = self.inner.fetch_all(collection).await?;
        Ok(snapshot.into_iter().map(|d| shift(d, self.lag)).collect())
    }

    async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        Ok(shift(self.inner.create(collection, fields).await?, self.lag))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        Ok(shift(self.inner.update(collection, id, fields).await?, self.lag))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }
}

/// In-memory store whose first `events` feed fails right after its initial
/// snapshot. Later subscriptions behave normally.
pub struct BrokenFeedStore {
    pub inner: InMemoryStore,
    broken: AtomicBool,
    pub subscribes: AtomicUsize,
}

impl BrokenFeedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            broken: AtomicBool::new(true),
            subscribes: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for BrokenFeedStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if collection == "events" && self.broken.swap(false, Ordering::SeqCst) {
            let initial = self.inner.fetch_all(collection).await?;
            let error = StoreError::Network("Mock feed dropped".to_string());
            return Ok(futures::stream::iter(vec![Ok(initial), Err(error)]).boxed());
        }
        self.inner.subscribe(collection).await
    }

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.inner.fetch_all(collection).await
    }

    async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        self.inner.create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }
}

/// Field map of a minimal valid event.
pub fn event_fields(name: &str) -> Map<String, Value> {
    match serde_json::json!({
        "name": name,
        "description": "Written by another admin",
        "date": "2024-06-01T00:00:00.000Z",
        "images": []
    }) {
        Value::Object(fields) => fields,
        _ => unreachable!(),
    }
}

/// Strategy whose transforms block until released, for racing draft resets
/// against a running batch.
#[derive(Default)]
pub struct GatedStrategy {
    pub started: Notify,
    pub gate: Notify,
    pub discarded: std::sync::Mutex<Vec<String>>,
}

impl GatedStrategy {
    pub fn discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ImageStrategy for GatedStrategy {
    fn max_bytes(&self) -> Option<usize> {
        None
    }

    async fn transform(&self, file: SelectedFile, _mime: String) -> Result<Image, ImageIntakeError> {
        self.started.notify_one();
        self.gate.notified().await;
        Ok(Image::Stored(StoredImage {
            url: format!("http://test.example.com/images/{}", file.filename),
            path: format!("images/{}", file.filename),
            filename: file.filename,
        }))
    }

    async fn discard(&self, image: &Image) -> Result<(), StorageError> {
        if let Some(path) = image.backing_path() {
            self.discarded.lock().unwrap().push(path.to_string());
        }
        Ok(())
    }
}

/// A solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn png_file(name: &str) -> SelectedFile {
    SelectedFile::new(name, Some("image/png"), png_bytes(4, 3))
}

pub fn text_file(name: &str) -> SelectedFile {
    SelectedFile::new(name, Some("text/plain"), b"not an image".to_vec())
}

/// Waits up to two seconds for `path` to be deleted from `storage`.
pub async fn wait_for_delete(storage: &MockObjectStorage, path: &str) -> bool {
    for _ in 0..100 {
        if storage.deleted().await.iter().any(|p| p == path) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Polls `check` for up to two seconds.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
