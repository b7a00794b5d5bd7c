use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::cache::LocalCache;
use crate::config::SyncMode;
use crate::intake::{release_images, ImageStrategy, StorageCleanupError};
use crate::notification::Notification;
use crate::posting::models::{DecodeError, Post, PostBody, PostKind};
use crate::store::{DocumentStore, Snapshot, SnapshotStream, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("could not save to {collection}: {source}")]
    RemoteWrite {
        collection: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("could not load {collection}: {source}")]
    RemoteRead {
        collection: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("could not encode post: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store returned an unreadable post: {0}")]
    Decode(#[from] DecodeError),
}

impl SyncError {
    pub fn notification(&self) -> Notification {
        Notification::error(self.to_string())
    }
}

/// Result of a delete that went through. Cleanup failures are informational.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub cleanup_failures: Vec<StorageCleanupError>,
}

/// Decodes a snapshot, skipping documents that do not fit the collection.
pub fn decode_snapshot(kind: PostKind, snapshot: Snapshot) -> Vec<Post> {
    snapshot
        .into_iter()
        .filter_map(|doc| match Post::from_document(kind, doc) {
            Ok(post) => Some(post),
            Err(e) => {
                log::warn!("Skipping document in {}: {}", kind.collection(), e);
                None
            }
        })
        .collect()
}

/// Standing subscriptions feeding a cache. Dropping it cancels all of them.
#[derive(Debug)]
pub struct LiveSubscription {
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        log::debug!("Cancelled {} live feed(s)", self.tasks.len());
    }
}

fn load_failure(kind: PostKind) -> String {
    format!("Failed to load {}. Please try again later.", kind.collection())
}

/// Reopens a failed feed, waiting `delay` before every attempt.
async fn resubscribe(store: &dyn DocumentStore, kind: PostKind, delay: Duration) -> SnapshotStream {
    loop {
        tokio::time::sleep(delay).await;
        match store.subscribe(kind.collection()).await {
            Ok(feed) => {
                log::info!("Resubscribed to {}", kind.collection());
                return feed;
            }
            Err(e) => log::warn!("Resubscribing to {} failed: {}", kind.collection(), e),
        }
    }
}

async fn follow(
    kind: PostKind,
    mut feed: SnapshotStream,
    cache: Arc<LocalCache>,
    retry: Option<(Arc<dyn DocumentStore>, Duration)>,
) {
    loop {
        match feed.next().await {
            Some(Ok(snapshot)) => {
                let posts = decode_snapshot(kind, snapshot);
                log::debug!("{} snapshot: {} post(s)", kind.collection(), posts.len());
                cache.apply_snapshot(kind, posts);
            }
            Some(Err(e)) => {
                log::error!("Live feed for {} failed: {}", kind.collection(), e);
                cache.fail(kind, load_failure(kind));
                match &retry {
                    Some((store, delay)) => feed = resubscribe(store.as_ref(), kind, *delay).await,
                    None => return,
                }
            }
            None => {
                log::debug!("Live feed for {} ended", kind.collection());
                return;
            }
        }
    }
}

/// Connects a [`LocalCache`] to the remote store.
#[derive(Clone)]
pub struct SyncAdapter {
    store: Arc<dyn DocumentStore>,
    cache: Arc<LocalCache>,
    images: Arc<dyn ImageStrategy>,
    mode: SyncMode,
    resubscribe_after: Option<Duration>,
}

impl SyncAdapter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<LocalCache>,
        images: Arc<dyn ImageStrategy>,
        mode: SyncMode,
    ) -> Self {
        Self {
            store,
            cache,
            images,
            mode,
            resubscribe_after: None,
        }
    }

    /// Live feeds that fail are reopened after `delay` instead of staying
    /// failed until the caller subscribes again.
    pub fn resubscribe_after(mut self, delay: Duration) -> Self {
        self.resubscribe_after = Some(delay);
        self
    }

    pub fn cache(&self) -> Arc<LocalCache> {
        self.cache.clone()
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Brings all three collections into the cache. Live mode returns the
    /// subscription guard; snapshot mode loads once and returns `None`.
    pub async fn activate(&self) -> Result<Option<LiveSubscription>, SyncError> {
        match self.mode {
            SyncMode::Live => self.subscribe(&PostKind::ALL).await.map(Some),
            SyncMode::Snapshot => {
                for kind in PostKind::ALL {
                    self.refresh(kind).await?;
                }
                Ok(None)
            }
        }
    }

    /// Opens one subscription per kind. Either all of them start or none do.
    pub async fn subscribe(&self, kinds: &[PostKind]) -> Result<LiveSubscription, SyncError> {
        let mut feeds = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let feed = self
                .store
                .subscribe(kind.collection())
                .await
                .map_err(|source| {
                    log::error!("Failed to subscribe to {}: {}", kind.collection(), source);
                    self.cache.fail(kind, load_failure(kind));
                    SyncError::RemoteRead {
                        collection: kind.collection(),
                        source,
                    }
                })?;
            feeds.push((kind, feed));
        }

        let retry = self.resubscribe_after.map(|delay| (self.store.clone(), delay));
        let tasks = feeds
            .into_iter()
            .map(|(kind, feed)| tokio::spawn(follow(kind, feed, self.cache.clone(), retry.clone())))
            .collect();
        log::info!("Subscribed to {} collection(s)", kinds.len());
        Ok(LiveSubscription { tasks })
    }

    /// One-shot load of a collection.
    pub async fn refresh(&self, kind: PostKind) -> Result<(), SyncError> {
        match self.store.fetch_all(kind.collection()).await {
            Ok(snapshot) => {
                self.cache.apply_snapshot(kind, decode_snapshot(kind, snapshot));
                Ok(())
            }
            Err(source) => {
                log::error!("Failed to fetch {}: {}", kind.collection(), source);
                self.cache.fail(kind, load_failure(kind));
                Err(SyncError::RemoteRead {
                    collection: kind.collection(),
                    source,
                })
            }
        }
    }

    /// Saves a new post. The cached copy carries the store's `createdAt`, so a
    /// later snapshot of the same id always replaces it.
    pub async fn create(&self, body: PostBody) -> Result<Post, SyncError> {
        let kind = body.kind();
        let collection = kind.collection();
        let fields = body.to_fields()?;

        log::debug!("Creating document in {}", collection);
        let stored = self
            .store
            .create(collection, fields)
            .await
            .map_err(|source| SyncError::RemoteWrite { collection, source })?;

        let post = Post {
            body,
            ..Post::from_document(kind, stored)?
        };
        self.cache.splice(post.clone());
        log::info!("Created {} in {}", post.id, collection);
        Ok(post)
    }

    /// Rewrites the user fields of `id`. `createdAt` is never touched.
    pub async fn update(&self, id: &str, body: PostBody) -> Result<Post, SyncError> {
        let kind = body.kind();
        let collection = kind.collection();
        let fields = body.to_fields()?;

        log::debug!("Updating {} in {}", id, collection);
        let stored = self
            .store
            .update(collection, id, fields)
            .await
            .map_err(|source| SyncError::RemoteWrite { collection, source })?;

        let post = Post {
            body,
            ..Post::from_document(kind, stored)?
        };
        self.cache.splice(post.clone());
        log::info!("Updated {} in {}", id, collection);
        Ok(post)
    }

    /// Deletes the document, then releases the backing objects of its images.
    /// Cleanup failures do not undo or fail the delete.
    pub async fn delete(&self, kind: PostKind, id: &str) -> Result<DeleteOutcome, SyncError> {
        let collection = kind.collection();
        let images = self
            .cache
            .get(kind, id)
            .map(|p| p.body.images().to_vec())
            .unwrap_or_default();

        log::debug!("Deleting {} from {} ({} image(s))", id, collection, images.len());
        self.store
            .delete(collection, id)
            .await
            .map_err(|source| SyncError::RemoteWrite { collection, source })?;
        self.cache.remove(kind, id);
        log::info!("Deleted {} from {}", id, collection);

        let cleanup_failures = release_images(self.images.as_ref(), &images).await;
        Ok(DeleteOutcome { cleanup_failures })
    }
}
