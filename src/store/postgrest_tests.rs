#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::posting::models::{Post, PostKind};
    use crate::store::postgrest::{check_status, decode_rows, poll_changes};
    use crate::store::{Document, Snapshot, StoreError};

    fn doc(id: &str, name: &str) -> Document {
        let serde_json::Value::Object(fields) = json!({ "name": name }) else {
            unreachable!()
        };
        Document {
            id: id.to_string(),
            fields,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(check_status(201, "[]".to_string(), "news", None).unwrap(), "[]");
        assert!(matches!(
            check_status(401, "jwt expired".to_string(), "news", None),
            Err(StoreError::Permission(_))
        ));
        assert!(matches!(
            check_status(403, String::new(), "news", None),
            Err(StoreError::Permission(_))
        ));
        assert!(matches!(
            check_status(429, String::new(), "news", None),
            Err(StoreError::Quota(_))
        ));
        match check_status(404, String::new(), "news", Some("abc")) {
            Err(StoreError::NotFound { collection, id }) => {
                assert_eq!(collection, "news");
                assert_eq!(id, "abc");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(matches!(
            check_status(500, "boom".to_string(), "news", None),
            Err(StoreError::Network(_))
        ));
    }

    #[test]
    fn test_rows_decode_with_postgres_timestamps() {
        let body = json!([{
            "id": "7c1e",
            "created_at": "2024-05-01T10:15:30.123456+00:00",
            "data": {
                "title": "Road works",
                "category": "Local",
                "content": "<p>closed</p>",
                "date": "2024-05-01T00:00:00.000Z",
                "images": []
            }
        }])
        .to_string();

        let snapshot = decode_rows(&body).unwrap();
        let post = Post::from_document(PostKind::News, snapshot[0].clone()).unwrap();

        assert_eq!(post.id, "7c1e");
        assert_eq!(post.created_at.to_rfc3339(), "2024-05-01T10:15:30.123456+00:00");
        assert_eq!(post.body.label(), "Road works");
    }

    #[test]
    fn test_row_without_data_decodes_to_bare_document() {
        let body = json!([{ "id": "1", "created_at": "2024-05-01T10:15:30+00:00" }]).to_string();

        let snapshot = decode_rows(&body).unwrap();

        assert_eq!(snapshot[0].fields.len(), 1);
        assert!(matches!(decode_rows("{\"message\":\"oops\"}"), Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_poll_emits_only_on_change() {
        // Two unchanged polls, then a change, then the same again.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let snapshot: Snapshot = if n < 2 {
                    vec![doc("a", "first")]
                } else {
                    vec![doc("a", "renamed")]
                };
                Ok(snapshot)
            }
        };
        let mut feed = poll_changes(vec![doc("a", "first")], Duration::from_millis(5), fetch);

        let changed = feed.next().await.unwrap().unwrap();
        assert_eq!(changed, vec![doc("a", "renamed")]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let next = tokio::time::timeout(Duration::from_millis(60), feed.next()).await;
        assert!(next.is_err());
        assert!(calls.load(Ordering::SeqCst) > 3);
    }

    #[tokio::test]
    async fn test_poll_passes_errors_through() {
        let fetch = || async { Err::<Snapshot, _>(StoreError::Network("offline".to_string())) };
        let mut feed = poll_changes(Vec::new(), Duration::from_millis(5), fetch);

        assert!(matches!(feed.next().await, Some(Err(StoreError::Network(_)))));
    }
}
