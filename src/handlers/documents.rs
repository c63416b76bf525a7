use crate::api::error::AppError;
use crate::entities::{documents, prelude::*};
use crate::services::converter::TargetFormat;
use crate::utils::validation::validate_upload;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_GUIDELINES_CHARS: usize = 2000;

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
    pub status: String,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub modified_file: Option<String>,
    pub modification_guidelines: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<documents::Model> for DocumentResponse {
    fn from(model: documents::Model) -> Self {
        Self {
            id: model.id,
            original_filename: model.original_filename,
            file_size: model.file_size,
            content_type: model.content_type,
            status: model.status,
            uploaded_at: model.uploaded_at,
            processed_at: model.processed_at,
            modified_file: model.modified_file_key,
            modification_guidelines: model.modification_guidelines,
            modified_at: model.modified_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub document: DocumentResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct ModifyRequest {
    pub guidelines: String,
}

#[derive(Serialize, ToSchema)]
pub struct ModifyResponse {
    pub message: String,
    pub document_id: String,
    pub guidelines: String,
}

#[utoipa::path(
    post,
    path = "/api/upload/",
    request_body(content = Multipart, description = "Document upload (PDF or Word)"),
    responses(
        (status = 201, description = "Document uploaded successfully", body = UploadResponse),
        (status = 400, description = "Validation failure")
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        let declared_type = field.content_type().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let valid = validate_upload(
            &filename,
            declared_type.as_deref(),
            &bytes,
            state.config.max_file_size,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

        upload = Some((valid, bytes.to_vec()));
    }

    let (valid, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let document = state.documents.create_document(valid, bytes).await?;

    // Processing runs out-of-band; the upload response does not wait for it
    let service = state.documents.clone();
    let document_id = document.id.clone();
    tokio::spawn(async move {
        let _ = service.process(&document_id).await;
    });

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Document uploaded successfully".to_string(),
            document: document.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/documents/",
    responses(
        (status = 200, description = "Up to 20 most recent documents", body = [DocumentResponse])
    ),
    tag = "documents"
)]
pub async fn list_documents(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let documents = Documents::find()
        .order_by_desc(documents::Column::UploadedAt)
        .limit(20)
        .all(&state.db)
        .await?;

    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/status/{id}/",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document status", body = DocumentResponse),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn get_document_status(
    State(state): State<crate::AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let document = Documents::find_by_id(&document_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    Ok(Json(document.into()))
}

#[utoipa::path(
    post,
    path = "/api/modify/{id}/",
    params(("id" = String, Path, description = "Document ID")),
    request_body = ModifyRequest,
    responses(
        (status = 202, description = "Modification accepted", body = ModifyResponse),
        (status = 400, description = "Invalid guidelines or document state"),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn modify_document(
    State(state): State<crate::AppState>,
    Path(document_id): Path<String>,
    Json(request): Json<ModifyRequest>,
) -> Result<(StatusCode, Json<ModifyResponse>), AppError> {
    if request.guidelines.trim().is_empty() {
        return Err(AppError::BadRequest("Guidelines must not be empty".to_string()));
    }
    if request.guidelines.chars().count() > MAX_GUIDELINES_CHARS {
        return Err(AppError::BadRequest(format!(
            "Guidelines cannot exceed {} characters",
            MAX_GUIDELINES_CHARS
        )));
    }

    let document = state
        .documents
        .request_modification(&document_id, request.guidelines.clone())
        .await?;

    if state.config.inline_modification {
        state
            .documents
            .run_modification(&document.id)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
    } else {
        // Fire-and-forget: faults are logged and the document lands in
        // `failed`, while this request keeps its 202
        let service = state.documents.clone();
        let id = document.id.clone();
        tokio::spawn(async move {
            let _ = service.run_modification(&id).await;
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ModifyResponse {
            message: "Document modification requested".to_string(),
            document_id: document.id,
            guidelines: request.guidelines,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/download/{id}/",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Modified document attachment"),
        (status = 404, description = "Modified document not available")
    ),
    tag = "documents"
)]
pub async fn download_modified_document(
    State(state): State<crate::AppState>,
    Path(document_id): Path<String>,
) -> Result<Response, AppError> {
    let document = Documents::find_by_id(&document_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    let modified_key = document
        .modified_file_key
        .ok_or_else(|| AppError::NotFound("Modified document not available".to_string()))?;

    let bytes = state.storage.get(&modified_key).await.map_err(|e| {
        tracing::error!("Failed to load modified blob {}: {}", modified_key, e);
        AppError::Internal("Failed to retrieve file".to_string())
    })?;

    let filename = modified_key
        .rsplit('/')
        .next()
        .unwrap_or(modified_key.as_str())
        .to_string();
    let content_type = TargetFormat::from_content_type(&document.content_type).mime();

    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];

    Ok((headers, Body::from(bytes)).into_response())
}
