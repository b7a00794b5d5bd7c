#[cfg(test)]
mod tests {
    use crate::posting::models::{
        ArticlePost, DecodeError, EventPost, Image, InlineImage, Post, PostBody, PostKind, StoredImage,
    };
    use crate::store::Document;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn document(id: &str, value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(fields) => Document {
                id: id.to_string(),
                fields,
            },
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(PostKind::Event.collection(), "events");
        assert_eq!(PostKind::News.collection(), "news");
        assert_eq!(PostKind::Blog.collection(), "blogs");
        assert_eq!(PostKind::from_collection("blogs"), Some(PostKind::Blog));
        assert_eq!(PostKind::from_collection("blog"), None);
        assert_eq!("Events".parse::<PostKind>(), Ok(PostKind::Event));
    }

    #[test]
    fn test_decode_event_document() {
        let doc = document(
            "e1",
            json!({
                "name": "Spring Fair",
                "description": "Stalls and music",
                "date": "2024-05-01T00:00:00.000Z",
                "createdAt": "2024-04-01T10:00:00Z",
                "images": [{
                    "base64": "data:image/jpeg;base64,AAAA",
                    "mimeType": "image/png",
                    "filename": "fair.png",
                    "processedAt": "2024-04-01T09:59:00Z"
                }]
            }),
        );

        let post = Post::from_document(PostKind::Event, doc).unwrap();

        assert_eq!(post.id, "e1");
        assert_eq!(post.kind(), PostKind::Event);
        assert_eq!(post.created_at, Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap());
        assert_eq!(post.body.label(), "Spring Fair");
        match &post.body.images()[0] {
            Image::Inline(img) => assert_eq!(img.mime_type, "image/png"),
            other => panic!("expected inline image, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_stored_image_and_missing_images() {
        let doc = document(
            "n1",
            json!({
                "title": "Road works",
                "category": "Local",
                "content": "<p>Closed</p>",
                "date": "2024-05-02",
                "createdAt": "2024-04-02T10:00:00Z",
            }),
        );
        let post = Post::from_document(PostKind::News, doc).unwrap();
        assert!(post.body.images().is_empty());

        let stored: Image = serde_json::from_value(json!({
            "url": "https://cdn.example/images/1_cat.jpg",
            "path": "images/1_cat.jpg",
            "filename": "cat.jpg"
        }))
        .unwrap();
        assert_eq!(stored.backing_path(), Some("images/1_cat.jpg"));
        assert_eq!(stored.source(), "https://cdn.example/images/1_cat.jpg");
    }

    #[test]
    fn test_decode_rejects_missing_created_at() {
        let doc = document("x", json!({ "name": "a", "description": "b", "date": "2024-01-01" }));

        let err = Post::from_document(PostKind::Event, doc).unwrap_err();
        assert!(matches!(err, DecodeError::MissingCreatedAt { .. }));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let doc = document(
            "x",
            json!({ "name": "only an event", "createdAt": "2024-01-01T00:00:00Z" }),
        );

        let err = Post::from_document(PostKind::Blog, doc).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { kind: PostKind::Blog, .. }));
    }

    #[test]
    fn test_document_fields_have_no_kind_tag() {
        let post = Post {
            id: "b1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            body: PostBody::Blog(ArticlePost {
                title: "Hello".to_string(),
                category: "Life".to_string(),
                content: "<b>hi</b>".to_string(),
                date: "2024-01-01T00:00:00.000Z".to_string(),
                images: vec![Image::Stored(StoredImage {
                    url: "https://x/y.jpg".to_string(),
                    path: "images/y.jpg".to_string(),
                    filename: "y.jpg".to_string(),
                })],
            }),
        };

        let doc = post.to_document().unwrap();
        assert!(!doc.fields.contains_key("kind"));
        assert!(doc.fields.contains_key("createdAt"));

        let back = Post::from_document(PostKind::Blog, doc).unwrap();
        assert_eq!(back, post);
    }

    #[test]
    fn test_post_json_carries_kind_tag() {
        let post = Post {
            id: "e2".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            body: PostBody::Event(EventPost {
                name: "Meetup".to_string(),
                description: "Talks".to_string(),
                date: "2024-02-02T00:00:00.000Z".to_string(),
                images: vec![Image::Inline(InlineImage {
                    base64: "data:image/jpeg;base64,AA".to_string(),
                    mime_type: "image/jpeg".to_string(),
                    filename: "a.jpg".to_string(),
                    processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                })],
            }),
        };

        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["kind"], "Event");
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(value["images"][0]["mimeType"], "image/jpeg");
    }
}
