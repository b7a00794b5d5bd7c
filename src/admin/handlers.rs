//! Dashboard endpoints. Every route below `/admin/sessions/{sid}` acts on one
//! open [`AdminSession`].

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::multipart_parser::MultipartParser;
use super::{deleted_notification, AdminError, AdminSession};
use crate::db::AppState;
use crate::draft::{DraftField, DraftFields};
use crate::intake::FailedFile;
use crate::notification::Notification;
use crate::posting::models::PostKind;
use crate::sync::FeedStatus;
use crate::views::{project, PostView};
use crate::ErrorResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct DraftImageView {
    pub filename: String,
    pub src: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DraftView {
    pub collection: String,
    pub editing: Option<String>,
    pub fields: DraftFields,
    pub images: Vec<DraftImageView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub live: bool,
    pub status: FeedStatus,
    pub draft: DraftView,
    pub posts: Vec<PostView>,
}

impl SessionResponse {
    fn of(session: &AdminSession) -> Self {
        let draft = session.draft();
        Self {
            id: session.id(),
            live: session.is_live(),
            status: session.status(),
            draft: DraftView {
                collection: draft.kind.collection().to_string(),
                editing: draft.editing.clone(),
                images: draft
                    .images
                    .iter()
                    .map(|img| DraftImageView {
                        filename: img.filename().to_string(),
                        src: img.source().to_string(),
                    })
                    .collect(),
                fields: draft.fields,
            },
            posts: project(&session.posts()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub notification: Notification,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImagesResponse {
    pub notification: Notification,
    pub failed: Vec<FailedFile>,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldProblem {
    pub field: String,
    pub message: String,
}

/// A rejected action; the session is unchanged.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionFailure {
    pub notification: Notification,
    pub problems: Vec<FieldProblem>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectKindRequest {
    /// `events`, `news` or `blogs`.
    pub kind: String,
}

/// Fields to overwrite; absent fields are left alone.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DraftPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
}

impl DraftPatch {
    fn into_changes(self) -> Vec<(DraftField, String)> {
        [
            (DraftField::Name, self.name),
            (DraftField::Description, self.description),
            (DraftField::Title, self.title),
            (DraftField::Category, self.category),
            (DraftField::Content, self.content),
            (DraftField::Date, self.date),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }
}

fn failure(error: &AdminError) -> HttpResponse {
    let problems = match error {
        AdminError::Validation(errors) => errors
            .iter()
            .map(|e| FieldProblem {
                field: e.field.to_string(),
                message: e.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };
    let body = ActionFailure {
        notification: error.notification(),
        problems,
    };
    match error {
        AdminError::Validation(_) => HttpResponse::UnprocessableEntity().json(body),
        AdminError::Sync(_) => HttpResponse::BadGateway().json(body),
        AdminError::NotFound { .. } => HttpResponse::NotFound().json(body),
        AdminError::Draft(_) => HttpResponse::BadRequest().json(body),
    }
}

async fn find_session(data: &AppState, sid: Uuid) -> Result<Arc<AdminSession>, HttpResponse> {
    data.session(&sid).await.ok_or_else(|| {
        HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
            "Admin session {} not found or expired",
            sid
        )))
    })
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    post,
    path = "/admin/sessions",
    responses(
        (status = 201, description = "Session opened on an empty event draft", body = SessionResponse),
        (status = 502, description = "Collections could not be loaded", body = ErrorResponse)
    )
)]
pub async fn open_session(data: web::Data<AppState>) -> impl Responder {
    match data.open_session().await {
        Ok(session) => HttpResponse::Created().json(SessionResponse::of(&session)),
        Err(e) => {
            log::error!("Failed to open admin session: {}", e);
            HttpResponse::BadGateway().json(ErrorResponse::new("BadGateway", &e.to_string()))
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    get,
    path = "/admin/sessions/{sid}",
    responses(
        (status = 200, description = "Current draft and listed posts", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn get_session(sid: web::Path<Uuid>, data: web::Data<AppState>) -> impl Responder {
    match find_session(&data, sid.into_inner()).await {
        Ok(session) => HttpResponse::Ok().json(SessionResponse::of(&session)),
        Err(resp) => resp,
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    delete,
    path = "/admin/sessions/{sid}",
    responses(
        (status = 204, description = "Session closed, subscriptions cancelled"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn close_session(sid: web::Path<Uuid>, data: web::Data<AppState>) -> impl Responder {
    let sid = sid.into_inner();
    if data.close_session(&sid).await {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
            "Admin session {} not found or expired",
            sid
        )))
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    put,
    path = "/admin/sessions/{sid}/kind",
    request_body = SelectKindRequest,
    responses(
        (status = 200, description = "Page switched, draft reset", body = SessionResponse),
        (status = 400, description = "Unknown kind", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn select_kind(
    sid: web::Path<Uuid>,
    req: web::Json<SelectKindRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let session = match find_session(&data, sid.into_inner()).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let kind = match PostKind::from_str(&req.kind) {
        Ok(kind) => kind,
        Err(e) => return HttpResponse::BadRequest().json(ErrorResponse::bad_request(&e)),
    };

    session.select_kind(kind);
    HttpResponse::Ok().json(SessionResponse::of(&session))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    patch,
    path = "/admin/sessions/{sid}/draft",
    request_body = DraftPatch,
    responses(
        (status = 200, description = "Draft fields updated", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn update_draft(
    sid: web::Path<Uuid>,
    req: web::Json<DraftPatch>,
    data: web::Data<AppState>,
) -> impl Responder {
    let session = match find_session(&data, sid.into_inner()).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    for (field, value) in req.into_inner().into_changes() {
        session.set_field(field, value);
    }
    HttpResponse::Ok().json(SessionResponse::of(&session))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    post,
    path = "/admin/sessions/{sid}/draft/images",
    request_body(content_type = "multipart/form-data", description = "One or more `file*` parts"),
    responses(
        (status = 200, description = "Batch processed; failures listed per file", body = ImagesResponse),
        (status = 400, description = "No files in payload", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn add_images(
    sid: web::Path<Uuid>,
    payload: Multipart,
    data: web::Data<AppState>,
) -> impl Responder {
    let session = match find_session(&data, sid.into_inner()).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let max_bytes = data.intake.strategy().max_bytes();
    let files = match MultipartParser::parse_image_files(payload, max_bytes).await {
        Ok(files) => files,
        Err(e) => return HttpResponse::from(e),
    };

    let outcome = session.add_images(files).await;
    HttpResponse::Ok().json(ImagesResponse {
        notification: outcome.notification(),
        failed: outcome.report.failed_files(),
        session: SessionResponse::of(&session),
    })
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    delete,
    path = "/admin/sessions/{sid}/draft/images/{index}",
    responses(
        (status = 200, description = "Image removed from the draft", body = ActionResponse),
        (status = 400, description = "No image at that position", body = ActionFailure),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("sid" = Uuid, Path, description = "Session id"),
        ("index" = usize, Path, description = "Zero-based image position")
    )
)]
pub async fn remove_image(
    path: web::Path<(Uuid, usize)>,
    data: web::Data<AppState>,
) -> impl Responder {
    let (sid, index) = path.into_inner();
    let session = match find_session(&data, sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match session.remove_image(index) {
        Ok(image) => HttpResponse::Ok().json(ActionResponse {
            notification: Notification::info(format!("Removed {}", image.filename())),
            session: SessionResponse::of(&session),
        }),
        Err(e) => failure(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    post,
    path = "/admin/sessions/{sid}/draft/submit",
    responses(
        (status = 200, description = "Post updated", body = ActionResponse),
        (status = 201, description = "Post created", body = ActionResponse),
        (status = 422, description = "Required fields missing; draft kept", body = ActionFailure),
        (status = 502, description = "Store rejected the write; draft kept", body = ActionFailure),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn submit_draft(sid: web::Path<Uuid>, data: web::Data<AppState>) -> impl Responder {
    let session = match find_session(&data, sid.into_inner()).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match session.submit().await {
        Ok(submitted) => {
            let body = ActionResponse {
                notification: submitted.notification(),
                session: SessionResponse::of(&session),
            };
            if submitted.updated {
                HttpResponse::Ok().json(body)
            } else {
                HttpResponse::Created().json(body)
            }
        }
        Err(e) => {
            log::warn!("Submit rejected for session {}: {}", session.id(), e);
            failure(&e)
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    post,
    path = "/admin/sessions/{sid}/refresh",
    responses(
        (status = 200, description = "Feeds reopened or the current page reloaded", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 502, description = "The store is still unreachable", body = ActionFailure)
    ),
    params(("sid" = Uuid, Path, description = "Session id"))
)]
pub async fn refresh_session(sid: web::Path<Uuid>, data: web::Data<AppState>) -> impl Responder {
    let session = match find_session(&data, sid.into_inner()).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match session.refresh().await {
        Ok(()) => HttpResponse::Ok().json(SessionResponse::of(&session)),
        Err(e) => {
            log::warn!("Refresh failed for session {}: {}", session.id(), e);
            failure(&e)
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    post,
    path = "/admin/sessions/{sid}/posts/{id}/edit",
    responses(
        (status = 200, description = "Post loaded into the draft", body = SessionResponse),
        (status = 404, description = "Session or post not found", body = ActionFailure)
    ),
    params(
        ("sid" = Uuid, Path, description = "Session id"),
        ("id" = String, Path, description = "Id of a post on the current page")
    )
)]
pub async fn edit_post(
    path: web::Path<(Uuid, String)>,
    data: web::Data<AppState>,
) -> impl Responder {
    let (sid, id) = path.into_inner();
    let session = match find_session(&data, sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match session.edit(&id) {
        Ok(()) => HttpResponse::Ok().json(SessionResponse::of(&session)),
        Err(e) => failure(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    delete,
    path = "/admin/sessions/{sid}/posts/{id}",
    responses(
        (status = 200, description = "Post deleted", body = ActionResponse),
        (status = 502, description = "Store rejected the delete", body = ActionFailure),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("sid" = Uuid, Path, description = "Session id"),
        ("id" = String, Path, description = "Id of a post on the current page")
    )
)]
pub async fn delete_post(
    path: web::Path<(Uuid, String)>,
    data: web::Data<AppState>,
) -> impl Responder {
    let (sid, id) = path.into_inner();
    let session = match find_session(&data, sid).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };

    match session.delete(&id).await {
        Ok(outcome) => HttpResponse::Ok().json(ActionResponse {
            notification: deleted_notification(session.kind(), &outcome),
            session: SessionResponse::of(&session),
        }),
        Err(e) => failure(&e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/admin/sessions").route(web::post().to(open_session)))
        .service(
            web::resource("/admin/sessions/{sid}")
                .route(web::get().to(get_session))
                .route(web::delete().to(close_session)),
        )
        .service(web::resource("/admin/sessions/{sid}/kind").route(web::put().to(select_kind)))
        .service(
            web::resource("/admin/sessions/{sid}/refresh").route(web::post().to(refresh_session)),
        )
        .service(web::resource("/admin/sessions/{sid}/draft").route(web::patch().to(update_draft)))
        .service(
            web::resource("/admin/sessions/{sid}/draft/images").route(web::post().to(add_images)),
        )
        .service(
            web::resource("/admin/sessions/{sid}/draft/images/{index}")
                .route(web::delete().to(remove_image)),
        )
        .service(
            web::resource("/admin/sessions/{sid}/draft/submit").route(web::post().to(submit_draft)),
        )
        .service(
            web::resource("/admin/sessions/{sid}/posts/{id}/edit").route(web::post().to(edit_post)),
        )
        .service(
            web::resource("/admin/sessions/{sid}/posts/{id}").route(web::delete().to(delete_post)),
        );
}
