use futures::stream::{self, StreamExt};
use postgrest::Postgrest;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{Document, DocumentStore, Snapshot, SnapshotStream, StoreError};
use crate::config::SupabaseConfig;
use crate::posting::models::CREATED_AT_FIELD;

// postgrest pins its own reqwest version, so responses are handled through a
// macro instead of naming its types.
macro_rules! execute {
    ($request:expr, $collection:expr, $id:expr) => {{
        let response = $request
            .execute()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(status, body, $collection, $id)
    }};
}

pub(super) fn check_status(
    status: u16,
    body: String,
    collection: &str,
    id: Option<&str>,
) -> Result<String, StoreError> {
    match status {
        200..=299 => Ok(body),
        401 | 403 => Err(StoreError::Permission(body)),
        404 => Err(StoreError::NotFound {
            collection: collection.to_string(),
            id: id.unwrap_or_default().to_string(),
        }),
        413 | 429 => Err(StoreError::Quota(body)),
        _ => Err(StoreError::Network(format!("status {}: {}", status, body))),
    }
}

/// Row layout shared by the `events`, `news` and `blogs` tables.
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    created_at: Value,
    #[serde(default)]
    data: Map<String, Value>,
}

impl From<Row> for Document {
    fn from(row: Row) -> Self {
        let mut fields = row.data;
        fields.insert(CREATED_AT_FIELD.to_string(), row.created_at);
        Document { id: row.id, fields }
    }
}

pub(super) fn decode_rows(body: &str) -> Result<Snapshot, StoreError> {
    let rows: Vec<Row> = serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(rows.into_iter().map(Document::from).collect())
}

/// First row of a `return=representation` response.
fn first_row(body: &str) -> Result<Option<Document>, StoreError> {
    Ok(decode_rows(body)?.into_iter().next())
}

/// Runs `fetch` every `interval` and yields a snapshot only when it differs
/// from the last one yielded (`first` to begin with). Errors pass through.
pub(super) fn poll_changes<F, Fut>(first: Snapshot, interval: Duration, fetch: F) -> SnapshotStream
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Snapshot, StoreError>> + Send + 'static,
{
    let fetch = Arc::new(fetch);
    stream::unfold(first, move |last| {
        let fetch = fetch.clone();
        async move {
            loop {
                tokio::time::sleep(interval).await;
                match fetch().await {
                    Ok(snapshot) if snapshot == last => continue,
                    Ok(snapshot) => return Some((Ok(snapshot.clone()), snapshot)),
                    Err(e) => return Some((Err(e), last)),
                }
            }
        }
    })
    .boxed()
}

/// Document store backed by Supabase PostgREST.
///
/// PostgREST has no push channel, so `subscribe` polls and only emits when the
/// collection actually changed.
#[derive(Clone)]
pub struct PostgrestStore {
    client: Arc<Postgrest>,
    poll_interval: Duration,
}

impl PostgrestStore {
    pub fn new(config: &SupabaseConfig, poll_interval: Duration) -> Self {
        let client = Postgrest::new(format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')))
            .insert_header("apikey", config.supabase_anon_key.clone())
            .insert_header(
                "Authorization",
                format!("Bearer {}", config.supabase_anon_key),
            );
        Self {
            client: Arc::new(client),
            poll_interval,
        }
    }

    fn strip_server_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
        fields.remove(CREATED_AT_FIELD);
        fields
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgrestStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        let first = self.fetch_all(collection).await?;
        let interval = self.poll_interval;
        let store = self.clone();
        let name = collection.to_string();

        let polls = poll_changes(first.clone(), interval, move || {
            let store = store.clone();
            let name = name.clone();
            async move { store.fetch_all(&name).await }
        });

        log::debug!(
            "postgrest store: polling '{}' every {:?}",
            collection,
            interval
        );
        Ok(stream::once(futures::future::ready(Ok(first)))
            .chain(polls)
            .boxed())
    }

    async fn fetch_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        let body = execute!(
            self.client
                .from(collection)
                .select("id,created_at,data")
                .order("created_at.desc"),
            collection,
            None
        )?;
        decode_rows(&body)
    }

    async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        let payload = json!({ "data": Self::strip_server_fields(fields) }).to_string();
        let body = execute!(self.client.from(collection).insert(payload), collection, None)?;
        first_row(&body)?.ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))
    }

    // The jsonb column is replaced as a whole; callers always send the full
    // user field set.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let payload = json!({ "data": Self::strip_server_fields(fields) }).to_string();
        let body = execute!(
            self.client.from(collection).eq("id", id).update(payload),
            collection,
            Some(id)
        )?;
        // An empty representation means the filter matched nothing.
        first_row(&body)?.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        execute!(
            self.client.from(collection).eq("id", id).delete(),
            collection,
            Some(id)
        )?;
        Ok(())
    }
}
