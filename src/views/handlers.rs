use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;

use super::{project, FeedResponse, PostView};
use crate::db::AppState;
use crate::posting::models::PostKind;
use crate::sync::decode_snapshot;
use crate::ErrorResponse;

fn unknown_collection(name: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
        "Unknown collection '{}'",
        name
    )))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Public Feed",
    get,
    path = "/{collection}",
    responses(
        (status = 200, description = "Posts of the collection, newest first", body = FeedResponse),
        (status = 404, description = "Unknown collection", body = ErrorResponse)
    ),
    params(
        ("collection" = String, Path, description = "events, news or blogs")
    )
)]
pub async fn list_posts(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let name = path.into_inner();
    let Some(kind) = PostKind::from_collection(&name) else {
        return unknown_collection(&name);
    };

    HttpResponse::Ok().json(FeedResponse {
        collection: name,
        status: data.public.status(kind),
        posts: project(&data.public.posts(kind)),
    })
}

#[utoipa::path(
    context_path = "/api",
    tag = "Public Feed",
    get,
    path = "/{collection}/{id}",
    responses(
        (status = 200, description = "Post found", body = PostView),
        (status = 404, description = "Unknown collection or post", body = ErrorResponse)
    ),
    params(
        ("collection" = String, Path, description = "events, news or blogs"),
        ("id" = String, Path, description = "Document id")
    )
)]
pub async fn get_post(
    path: web::Path<(String, String)>,
    data: web::Data<AppState>,
) -> impl Responder {
    let (name, id) = path.into_inner();
    let Some(kind) = PostKind::from_collection(&name) else {
        return unknown_collection(&name);
    };

    match data.public.get(kind, &id) {
        Some(post) => HttpResponse::Ok().json(PostView::from(&post)),
        None => HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
            "No {} post with id {}",
            name, id
        ))),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Public Feed",
    get,
    path = "/{collection}/stream",
    responses(
        (status = 200, description = "Server-sent events, one full snapshot per change", content_type = "text/event-stream"),
        (status = 404, description = "Unknown collection", body = ErrorResponse),
        (status = 503, description = "Store subscription failed", body = ErrorResponse)
    ),
    params(
        ("collection" = String, Path, description = "events, news or blogs")
    )
)]
pub async fn stream_posts(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let name = path.into_inner();
    let Some(kind) = PostKind::from_collection(&name) else {
        return unknown_collection(&name);
    };

    let feed = match data.store.subscribe(kind.collection()).await {
        Ok(feed) => feed,
        Err(e) => {
            log::error!("Could not open stream for {}: {}", name, e);
            return HttpResponse::ServiceUnavailable()
                .json(ErrorResponse::new("ServiceUnavailable", &e.to_string()));
        }
    };

    let event_stream = feed.map(move |item| {
        let event = match item {
            Ok(snapshot) => {
                let views = project(&decode_snapshot(kind, snapshot));
                match serde_json::to_string(&views) {
                    Ok(json) => format!("data: {}\n\n", json),
                    Err(e) => format!("event: error\ndata: {}\n\n", e),
                }
            }
            Err(e) => format!("event: error\ndata: {}\n\n", e),
        };
        Ok::<_, std::io::Error>(web::Bytes::from(event))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(event_stream)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/{collection}/stream").route(web::get().to(stream_posts)))
        .service(web::resource("/{collection}/{id}").route(web::get().to(get_post)))
        .service(web::resource("/{collection}").route(web::get().to(list_posts)));
}
