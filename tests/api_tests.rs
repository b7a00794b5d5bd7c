//! HTTP tests for the public feed and admin session routes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use common::{event_fields, png_bytes, BrokenFeedStore};
use newsdesk_server::admin::SessionSettings;
use newsdesk_server::config::SyncMode;
use newsdesk_server::intake::{ImageIntake, InlineStrategy};
use newsdesk_server::store::{DocumentStore, InMemoryStore};
use newsdesk_server::{configure_api, AppState};
use serde_json::{json, Value};

async fn state() -> web::Data<AppState> {
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        ImageIntake::new(Arc::new(InlineStrategy::new(800, 70, None))),
        SessionSettings {
            sync_mode: SyncMode::Snapshot,
            require_article_images: true,
        },
        Duration::from_secs(60),
        Duration::from_millis(20),
    )
    .await
    .unwrap();
    web::Data::new(state)
}

fn multipart_body(boundary: &str, files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, (name, content_type, data)) in files.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file{}\"; filename=\"{}\"\r\n",
                i, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[actix_web::test]
async fn test_unknown_collection_is_404() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;

    let req = test::TestRequest::get().uri("/api/podcasts").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_empty_feed_is_ready() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let req = test::TestRequest::get().uri("/api/news").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["collection"], "news");
    assert_eq!(body["status"]["state"], "ready");
    assert_eq!(body["posts"], json!([]));
}

#[actix_web::test]
async fn test_stream_is_event_stream() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;

    let req = test::TestRequest::get().uri("/api/events/stream").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");
}

#[actix_web::test]
async fn test_unknown_session_is_404() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/admin/sessions/{}", uuid::Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_news_publishing_flow() {
    // Arrange
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;
    let req = test::TestRequest::post().uri("/api/admin/sessions").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session: Value = test::read_body_json(resp).await;
    let sid = session["id"].as_str().unwrap().to_string();
    assert_eq!(session["draft"]["collection"], "events");

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/sessions/{}/kind", sid))
        .set_json(json!({ "kind": "news" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["draft"]["collection"], "news");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/admin/sessions/{}/draft", sid))
        .set_json(json!({
            "title": "Road works",
            "category": "Local",
            "content": "<p>Main street closed</p>",
            "date": "2024-05-01"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["draft"]["fields"]["title"], "Road works");

    // Act: submit without images is refused
    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/sessions/{}/draft/submit", sid))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let failure: Value = test::read_body_json(resp).await;
    assert_eq!(failure["problems"][0]["field"], "images");

    // Act: upload one good and one bad file
    let boundary = "newsdeskboundary";
    let payload = multipart_body(
        boundary,
        &[
            ("road.png", "image/png", png_bytes(20, 10)),
            ("notes.txt", "text/plain", b"hello".to_vec()),
        ],
    );
    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/sessions/{}/draft/images", sid))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(payload)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["notification"]["severity"], "warning");
    assert_eq!(body["failed"][0]["filename"], "notes.txt");
    assert_eq!(body["session"]["draft"]["images"][0]["filename"], "road.png");

    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/sessions/{}/draft/submit", sid))
        .to_request();
    let resp = test::call_service(&app, req).await;

    // Assert
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["notification"]["message"], "News created successfully");
    assert_eq!(body["session"]["draft"]["fields"]["title"], "");
    let id = body["session"]["posts"][0]["id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let req = test::TestRequest::get().uri(&format!("/api/news/{}", id)).to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(post["heading"], "Road works");
    assert_eq!(post["displayDate"], "May 1, 2024");
    assert!(post["cover"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/sessions/{}/posts/{}", sid, id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["notification"]["message"], "News deleted successfully");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/sessions/{}", sid))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_public_feed_recovers_after_failure() {
    let store = Arc::new(BrokenFeedStore::new());
    let state = AppState::new(
        store.clone(),
        ImageIntake::new(Arc::new(InlineStrategy::new(800, 70, None))),
        SessionSettings {
            sync_mode: SyncMode::Snapshot,
            require_article_images: true,
        },
        Duration::from_secs(60),
        Duration::from_millis(20),
    )
    .await
    .unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;
    store.inner.create("events", event_fields("Back online")).await.unwrap();

    let mut body = Value::Null;
    for _ in 0..100 {
        let req = test::TestRequest::get().uri("/api/events").to_request();
        body = test::call_and_read_body_json(&app, req).await;
        if body["posts"].as_array().is_some_and(|p| !p.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(body["status"]["state"], "ready");
    assert_eq!(body["posts"][0]["heading"], "Back online");
}

#[actix_web::test]
async fn test_refresh_route_reloads_session() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_api)).await;
    let req = test::TestRequest::post().uri("/api/admin/sessions").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let sid = session["id"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/sessions/{}/refresh", sid))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"]["state"], "ready");
}

#[actix_web::test]
async fn test_upload_over_size_cap_is_rejected_per_file() {
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        ImageIntake::new(Arc::new(InlineStrategy::new(800, 70, Some(1024)))),
        SessionSettings {
            sync_mode: SyncMode::Snapshot,
            require_article_images: true,
        },
        Duration::from_secs(60),
        Duration::from_millis(20),
    )
    .await
    .unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;
    let req = test::TestRequest::post().uri("/api/admin/sessions").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let sid = session["id"].as_str().unwrap();

    let boundary = "newsdeskboundary";
    let payload = multipart_body(
        boundary,
        &[
            ("big.png", "image/png", vec![7u8; 4096]),
            ("small.png", "image/png", png_bytes(4, 3)),
        ],
    );
    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/sessions/{}/draft/images", sid))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(payload)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["failed"][0]["filename"], "big.png");
    assert_eq!(body["failed"][0]["reason"], "file is 4096 bytes, the limit is 1024");
    assert_eq!(body["session"]["draft"]["images"][0]["filename"], "small.png");
}
