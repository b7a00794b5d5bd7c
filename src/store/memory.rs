use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{Document, DocumentStore, Snapshot, SnapshotStream, StoreError};
use crate::posting::models::CREATED_AT_FIELD;

#[derive(Default)]
struct Collections {
    docs: HashMap<String, Vec<(DateTime<Utc>, Document)>>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Collections {
    fn snapshot(&self, collection: &str) -> Snapshot {
        let mut entries: Vec<&(DateTime<Utc>, Document)> = self
            .docs
            .get(collection)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        entries.into_iter().map(|(_, doc)| doc.clone()).collect()
    }

    /// Server clock that never repeats or goes backwards.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(stamp);
        stamp
    }
}

/// In-process document store. Every write pushes a fresh snapshot to the
/// subscribers of the touched collection.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<String>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
            changes,
        }
    }

    fn notify(&self, collection: &str) {
        // No receivers just means nobody is subscribed right now.
        let _ = self.changes.send(collection.to_string());
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        // Subscribe before reading so no write can slip between the two.
        let rx = self.changes.subscribe();
        let initial = self.inner.read().snapshot(collection);

        let inner = self.inner.clone();
        let name = collection.to_string();
        let updates = BroadcastStream::new(rx).filter_map(move |event| {
            let item = match event {
                Ok(changed) if changed == name => Some(Ok(inner.read().snapshot(&name))),
                Ok(_) => None,
                // A lagging subscriber still gets the latest full state.
                Err(_) => Some(Ok(inner.read().snapshot(&name))),
            };
            futures::future::ready(item)
        });

        log::debug!("memory store: subscription opened on '{}'", collection);
        Ok(stream::once(futures::future::ready(Ok(initial)))
            .chain(updates)
            .boxed())
    }

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        Ok(self.inner.read().snapshot(collection))
    }

    async fn create(&self, collection: &str, mut fields: Map<String, Value>) -> Result<Document, StoreError> {
        let stored = {
            let mut inner = self.inner.write();
            let created_at = inner.next_created_at();
            fields.insert(
                CREATED_AT_FIELD.to_string(),
                serde_json::to_value(created_at).map_err(|e| StoreError::Decode(e.to_string()))?,
            );
            let doc = Document {
                id: uuid::Uuid::new_v4().to_string(),
                fields,
            };
            inner
                .docs
                .entry(collection.to_string())
                .or_default()
                .push((created_at, doc.clone()));
            doc
        };
        self.notify(collection);
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let stored = {
            let mut inner = self.inner.write();
            let doc = inner
                .docs
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|(_, d)| d.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (key, value) in fields {
                // createdAt belongs to the server.
                if key != CREATED_AT_FIELD {
                    doc.1.fields.insert(key, value);
                }
            }
            doc.1.clone()
        };
        self.notify(collection);
        Ok(stored)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write();
            let docs = inner.docs.get_mut(collection).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            let before = docs.len();
            docs.retain(|(_, d)| d.id != id);
            if docs.len() == before {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
        }
        self.notify(collection);
        Ok(())
    }
}
