//! Remote document store.
//!
//! The store is the source of truth for posts. It is consumed through the
//! [`DocumentStore`] trait so the sync layer does not care whether it talks to
//! the in-process store or to Supabase:
//! - `memory` - in-process store with push notifications
//! - `postgrest` - Supabase PostgREST tables, live feeds by polling

mod memory;
mod postgrest;
#[cfg(test)]
mod postgrest_tests;

pub use memory::InMemoryStore;
pub use postgrest::PostgrestStore;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One document: opaque id plus its field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Full ordered content of a collection, newest `createdAt` first.
pub type Snapshot = Vec<Document>;

/// Live feed of full snapshots. Dropping the stream cancels the subscription.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a standing subscription. The first item is the current snapshot.
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError>;

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError>;

    /// Adds a document and returns it as stored: assigned id plus the store's
    /// own `createdAt`.
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError>;

    /// Merges `fields` into an existing document and returns it as stored.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
