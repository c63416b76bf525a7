pub mod api;
pub mod config;
pub mod entities;
pub mod handlers;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::document_service::DocumentService;
use crate::services::storage::BlobStorage;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::documents::upload_document,
        handlers::documents::list_documents,
        handlers::documents::get_document_status,
        handlers::documents::modify_document,
        handlers::documents::download_modified_document,
    ),
    components(
        schemas(
            handlers::documents::DocumentResponse,
            handlers::documents::UploadResponse,
            handlers::documents::ModifyRequest,
            handlers::documents::ModifyResponse,
        )
    ),
    tags(
        (name = "documents", description = "Document upload, status, and AI modification")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn BlobStorage>,
    pub documents: Arc<DocumentService>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    // Body limit sits above the validation limit so oversized uploads get a
    // 400 from the validator, not a transport-level 413
    let body_limit = state.config.max_file_size + 2 * 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/upload/", post(handlers::documents::upload_document))
        .route("/api/documents/", get(handlers::documents::list_documents))
        .route(
            "/api/status/:id/",
            get(handlers::documents::get_document_status),
        )
        .route(
            "/api/modify/:id/",
            post(handlers::documents::modify_document),
        )
        .route(
            "/api/download/:id/",
            get(handlers::documents::download_modified_document),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
