//! Admin dashboard sessions.
//!
//! An [`AdminSession`] ties together one draft, one sync adapter with its own
//! cache and (in live mode) the subscriptions feeding it. Sessions are kept in
//! the application state registry and dropped on idle timeout or logout, which
//! cancels their subscriptions.

pub mod handlers;
pub mod multipart_parser;

use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SyncMode;
use crate::draft::{
    AddImagesOutcome, Draft, DraftError, DraftField, DraftManager, ValidationErrors,
};
use crate::intake::{ImageIntake, SelectedFile};
use crate::notification::Notification;
use crate::posting::models::{Image, Post, PostKind};
use crate::store::DocumentStore;
use crate::sync::{DeleteOutcome, FeedStatus, LiveSubscription, LocalCache, SyncAdapter, SyncError};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("{kind} post {id} is not loaded")]
    NotFound { kind: PostKind, id: String },
    #[error(transparent)]
    Draft(#[from] DraftError),
}

impl AdminError {
    pub fn notification(&self) -> Notification {
        match self {
            AdminError::Validation(errors) => errors.to_notification(),
            AdminError::Sync(e) => e.notification(),
            other => Notification::error(other.to_string()),
        }
    }
}

/// A submission that reached the store.
#[derive(Debug)]
pub struct Submitted {
    pub post: Post,
    pub updated: bool,
}

impl Submitted {
    pub fn notification(&self) -> Notification {
        let verb = if self.updated { "updated" } else { "created" };
        Notification::success(format!("{} {} successfully", self.post.kind().label(), verb))
    }
}

pub fn deleted_notification(kind: PostKind, outcome: &DeleteOutcome) -> Notification {
    if outcome.cleanup_failures.is_empty() {
        Notification::success(format!("{} deleted successfully", kind.label()))
    } else {
        Notification::warning(format!(
            "{} deleted successfully, but {} stored image(s) could not be removed",
            kind.label(),
            outcome.cleanup_failures.len()
        ))
    }
}

/// Per-session settings shared by every session of a deployment.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub sync_mode: SyncMode,
    pub require_article_images: bool,
}

pub struct AdminSession {
    id: Uuid,
    draft: DraftManager,
    sync: SyncAdapter,
    feeds: Mutex<Option<LiveSubscription>>,
}

impl AdminSession {
    /// Mounts a dashboard: empty event draft, caches loaded or subscribed.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        intake: ImageIntake,
        settings: SessionSettings,
    ) -> Result<Self, SyncError> {
        let sync = SyncAdapter::new(
            store,
            Arc::new(LocalCache::new()),
            intake.strategy(),
            settings.sync_mode,
        );
        let feeds = sync.activate().await?;
        let id = Uuid::new_v4();
        log::info!("Opened admin session {} ({:?} mode)", id, settings.sync_mode);

        Ok(Self {
            id,
            draft: DraftManager::new(PostKind::Event, intake, settings.require_article_images),
            sync,
            feeds: Mutex::new(feeds),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> PostKind {
        self.draft.kind()
    }

    pub fn draft(&self) -> Draft {
        self.draft.draft()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.sync.cache().posts(self.kind())
    }

    pub fn status(&self) -> FeedStatus {
        self.sync.cache().status(self.kind())
    }

    pub fn is_live(&self) -> bool {
        self.feeds.lock().as_ref().is_some_and(LiveSubscription::is_active)
    }

    /// Switches pages. The draft is replaced even when the kind is unchanged.
    pub fn select_kind(&self, kind: PostKind) {
        self.draft.reset(kind);
    }

    pub fn set_field(&self, field: DraftField, value: impl Into<String>) {
        self.draft.set_field(field, value);
    }

    pub async fn add_images(&self, files: Vec<SelectedFile>) -> AddImagesOutcome {
        self.draft.add_images(files).await
    }

    pub fn remove_image(&self, index: usize) -> Result<Image, AdminError> {
        Ok(self.draft.remove_image(index)?)
    }

    /// Loads one of the listed posts into the draft.
    pub fn edit(&self, id: &str) -> Result<(), AdminError> {
        let kind = self.kind();
        let post = self
            .sync
            .cache()
            .get(kind, id)
            .ok_or_else(|| AdminError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        self.draft.load(&post);
        Ok(())
    }

    /// Validates and saves the draft. On any failure the draft is left as it was.
    pub async fn submit(&self) -> Result<Submitted, AdminError> {
        let prepared = self.draft.prepare().map_err(AdminError::Validation)?;

        let submitted = match prepared.editing {
            Some(ref id) => {
                let post = self.sync.update(id, prepared.body).await?;
                self.draft.release_saved(prepared.released);
                Submitted {
                    post,
                    updated: true,
                }
            }
            None => Submitted {
                post: self.sync.create(prepared.body).await?,
                updated: false,
            },
        };

        if !self.draft.complete(prepared.generation) {
            log::debug!("Draft moved on while {} was being saved", submitted.post.id);
        }
        Ok(submitted)
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome, AdminError> {
        Ok(self.sync.delete(self.kind(), id).await?)
    }

    /// Recovers from a failed feed. Live sessions reopen every subscription,
    /// replacing the old ones; snapshot sessions reload the current page.
    pub async fn refresh(&self) -> Result<(), AdminError> {
        match self.sync.mode() {
            SyncMode::Live => {
                let feeds = self.sync.subscribe(&PostKind::ALL).await?;
                let previous = self.feeds.lock().replace(feeds);
                drop(previous);
                Ok(())
            }
            SyncMode::Snapshot => Ok(self.sync.refresh(self.kind()).await?),
        }
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        log::info!("Closed admin session {}", self.id);
    }
}
