use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod admin;
pub mod config;
pub mod db;
pub mod draft;
pub mod intake;
pub mod notification;
pub mod posting;
pub mod storage;
pub mod store;
pub mod sync;
pub mod views;


pub use crate::config::AppConfig;
pub use crate::db::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::views::handlers::list_posts,
        crate::views::handlers::get_post,
        crate::views::handlers::stream_posts,
        crate::admin::handlers::open_session,
        crate::admin::handlers::get_session,
        crate::admin::handlers::close_session,
        crate::admin::handlers::select_kind,
        crate::admin::handlers::update_draft,
        crate::admin::handlers::add_images,
        crate::admin::handlers::remove_image,
        crate::admin::handlers::submit_draft,
        crate::admin::handlers::refresh_session,
        crate::admin::handlers::edit_post,
        crate::admin::handlers::delete_post
    ),
    components(
        schemas(
            views::PostView,
            views::FeedResponse,
            sync::FeedStatus,
            draft::DraftFields,
            intake::FailedFile,
            notification::Notification,
            notification::Severity,
            admin::handlers::SessionResponse,
            admin::handlers::DraftView,
            admin::handlers::DraftImageView,
            admin::handlers::ActionResponse,
            admin::handlers::ActionFailure,
            admin::handlers::FieldProblem,
            admin::handlers::ImagesResponse,
            admin::handlers::SelectKindRequest,
            admin::handlers::DraftPatch,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Public Feed", description = "Read-only event, news and blog feeds."),
        (name = "Admin", description = "Dashboard sessions: drafts, images, submit, edit and delete.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Localhost")
    )
)]
pub struct ApiDoc;

/// Registers every API route under `/api`. Admin routes go first so that
/// `/admin/...` never matches a collection name.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(admin::handlers::config)
            .configure(views::handlers::config),
    );
}

pub async fn run() -> std::io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = match AppState::from_config(&config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to start. Check STORE_BACKEND and the SUPABASE_* settings in .env. Error: {}", e);
            std::process::exit(1);
        }
    };

    let prometheus = match PrometheusMetricsBuilder::new("newsdesk_server")
        .endpoint("/metrics")
        .build()
    {
        Ok(prometheus) => prometheus,
        Err(e) => {
            log::error!("Failed to create Prometheus metrics middleware: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let origins = config.cors_allowed_origins.clone();
    log::info!(
        "Starting server at http://0.0.0.0:{} ({:?} store, {:?} images, {:?} sync)",
        port,
        config.store_backend,
        config.image.strategy,
        config.sync_mode
    );

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .configure(configure_api)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
