use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use super::reconcile::{reconcile, splice, without};
use crate::posting::models::{Post, PostKind};

/// Load state of one cached collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum FeedStatus {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug)]
struct Entry {
    posts: Vec<Post>,
    status: FeedStatus,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            status: FeedStatus::Loading,
        }
    }
}

/// In-memory mirror of the three collections. Readers get clones; only the
/// sync adapter writes.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: RwLock<HashMap<PostKind, Entry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached posts of `kind`, newest first.
    pub fn posts(&self, kind: PostKind) -> Vec<Post> {
        self.entries
            .read()
            .get(&kind)
            .map(|e| e.posts.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, kind: PostKind, id: &str) -> Option<Post> {
        self.entries
            .read()
            .get(&kind)
            .and_then(|e| e.posts.iter().find(|p| p.id == id).cloned())
    }

    pub fn status(&self, kind: PostKind) -> FeedStatus {
        self.entries
            .read()
            .get(&kind)
            .map(|e| e.status.clone())
            .unwrap_or(FeedStatus::Loading)
    }

    /// Replaces the entry with `incoming`, atomically for readers.
    pub(crate) fn apply_snapshot(&self, kind: PostKind, incoming: Vec<Post>) {
        let mut entries = self.entries.write();
        let entry = entries.entry(kind).or_default();
        entry.posts = reconcile(&entry.posts, incoming);
        entry.status = FeedStatus::Ready;
    }

    pub(crate) fn splice(&self, post: Post) {
        let mut entries = self.entries.write();
        let entry = entries.entry(post.kind()).or_default();
        entry.posts = splice(&entry.posts, post);
    }

    pub(crate) fn remove(&self, kind: PostKind, id: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&kind) {
            entry.posts = without(&entry.posts, id);
        }
    }

    /// Marks the feed as failed. Cached posts stay visible.
    pub(crate) fn fail(&self, kind: PostKind, message: impl Into<String>) {
        let mut entries = self.entries.write();
        entries.entry(kind).or_default().status = FeedStatus::Failed(message.into());
    }
}
