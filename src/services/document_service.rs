use crate::api::error::AppError;
use crate::entities::{documents, prelude::*};
use crate::services::converter::{self, TargetFormat};
use crate::services::extraction;
use crate::services::lifecycle::{self, DocumentStatus};
use crate::services::rewrite::RewriteEngine;
use crate::services::storage::BlobStorage;
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::ValidUpload;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the document pipelines: upload intake, processing, and
/// guideline-driven modification. Every status-mutating path holds the
/// per-document-id lock, so two requests for the same id serialize.
pub struct DocumentService {
    db: DatabaseConnection,
    storage: Arc<dyn BlobStorage>,
    engine: Arc<RewriteEngine>,
    locks: KeyedMutex,
}

impl DocumentService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn BlobStorage>,
        engine: Arc<RewriteEngine>,
    ) -> Self {
        Self {
            db,
            storage,
            engine,
            locks: KeyedMutex::new(),
        }
    }

    pub fn locks(&self) -> &KeyedMutex {
        &self.locks
    }

    /// Stores the uploaded blob and inserts the document as `pending`.
    pub async fn create_document(
        &self,
        upload: ValidUpload,
        bytes: Vec<u8>,
    ) -> Result<documents::Model, AppError> {
        let id = Uuid::new_v4().to_string();
        let extension = upload
            .filename
            .rsplit('.')
            .next()
            .filter(|ext| !ext.is_empty() && *ext != upload.filename)
            .unwrap_or("bin")
            .to_lowercase();
        let file_key = format!("documents/{}.{}", id, extension);
        let file_size = bytes.len() as i64;

        self.storage
            .put(&file_key, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        let now = Utc::now();
        let document = documents::ActiveModel {
            id: Set(id),
            original_filename: Set(upload.filename),
            file_size: Set(file_size),
            content_type: Set(upload.content_type),
            status: Set(DocumentStatus::Pending.as_str().to_string()),
            file_key: Set(file_key),
            modified_file_key: Set(None),
            modification_guidelines: Set(None),
            analysis: Set(None),
            uploaded_at: Set(now),
            status_changed_at: Set(now),
            processed_at: Set(None),
            modified_at: Set(None),
        };

        Ok(document.insert(&self.db).await?)
    }

    /// Processing pipeline: `pending -> processing`, extract + analyze,
    /// `-> completed`. Any fault forces `failed` and propagates.
    pub async fn process(&self, document_id: &str) -> Result<()> {
        let _guard = self.locks.lock(document_id).await;

        let document = self.fetch(document_id).await?;
        let document =
            lifecycle::apply_transition(&self.db, document, DocumentStatus::Processing).await?;

        match self.process_inner(document).await {
            Ok(()) => {
                tracing::info!("Document {} processed successfully", document_id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to process document {}: {}", document_id, e);
                self.force_failed(document_id).await;
                Err(e)
            }
        }
    }

    async fn process_inner(&self, document: documents::Model) -> Result<()> {
        let bytes = self.storage.get(&document.file_key).await?;
        let text = extraction::extract_text(&bytes, &document.content_type)?;
        let analysis = analyze_content(&text);

        lifecycle::apply_transition_with(
            &self.db,
            document,
            DocumentStatus::Completed,
            |active| {
                active.analysis = Set(Some(analysis));
            },
        )
        .await?;
        Ok(())
    }

    /// Accepts a modification request: stores the guidelines and moves the
    /// document into `modifying`. 404 for unknown ids, 400 when the current
    /// state does not admit modification.
    pub async fn request_modification(
        &self,
        document_id: &str,
        guidelines: String,
    ) -> Result<documents::Model, AppError> {
        let _guard = self.locks.lock(document_id).await;

        let document = self.fetch(document_id).await?;
        let current = DocumentStatus::parse(&document.status)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if !current.can_transition_to(DocumentStatus::Modifying) {
            return Err(AppError::BadRequest(format!(
                "Document is not ready for modification (status: {})",
                current
            )));
        }

        // A previous modification's output is stale the moment a new request
        // is accepted; the key holds only while status is `modified`.
        let previous_key = document.modified_file_key.clone();

        let document = lifecycle::apply_transition_with(
            &self.db,
            document,
            DocumentStatus::Modifying,
            |active| {
                active.modification_guidelines = Set(Some(guidelines));
                active.modified_file_key = Set(None);
            },
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

        if let Some(key) = previous_key {
            if let Err(e) = self.storage.delete(&key).await {
                tracing::warn!("Failed to delete superseded blob {}: {}", key, e);
            }
        }

        Ok(document)
    }

    /// Modification pipeline for a document already in `modifying`: extract,
    /// rewrite, and either render + store the result (`-> modified`) or
    /// record that nothing changed (`-> no_changes`). Faults force `failed`
    /// and propagate to the caller.
    pub async fn run_modification(&self, document_id: &str) -> Result<DocumentStatus> {
        let _guard = self.locks.lock(document_id).await;

        let document = self.fetch(document_id).await?;
        if DocumentStatus::parse(&document.status)? != DocumentStatus::Modifying {
            return Err(anyhow!(
                "Document {} is not in modifying state",
                document_id
            ));
        }

        match self.modify_inner(document).await {
            Ok(status) => {
                tracing::info!("Document {} modified successfully: {}", document_id, status);
                Ok(status)
            }
            Err(e) => {
                tracing::error!("Failed to modify document {}: {}", document_id, e);
                self.force_failed(document_id).await;
                Err(e)
            }
        }
    }

    async fn modify_inner(&self, document: documents::Model) -> Result<DocumentStatus> {
        let guidelines = document.modification_guidelines.clone().unwrap_or_default();

        let bytes = self.storage.get(&document.file_key).await?;
        let text = extraction::extract_text(&bytes, &document.content_type)?;
        let outcome = self.engine.rewrite(&text, &guidelines).await;
        tracing::debug!("Rewrite report:\n{}", outcome.report(&guidelines));

        if !outcome.changed {
            lifecycle::apply_transition(&self.db, document, DocumentStatus::NoChanges).await?;
            return Ok(DocumentStatus::NoChanges);
        }

        let format = TargetFormat::from_content_type(&document.content_type);
        let rendered = converter::render_as_file(&outcome.text, format)?;
        // Basename carries the original stem so the download attachment reads
        // `modified_{stem}.{ext}`; the id segment keeps keys unique across
        // documents sharing a filename.
        let stem = file_stem(&document.original_filename);
        let modified_key = format!(
            "documents/modified/{}/modified_{}.{}",
            document.id,
            stem,
            format.extension()
        );
        self.storage
            .put(&modified_key, rendered)
            .await
            .context("storing modified document")?;

        let transition = lifecycle::apply_transition_with(
            &self.db,
            document,
            DocumentStatus::Modified,
            |active| {
                active.modified_file_key = Set(Some(modified_key.clone()));
            },
        )
        .await;

        if let Err(e) = transition {
            // Do not leave an orphaned blob behind the failed transition
            let _ = self.storage.delete(&modified_key).await;
            return Err(e.into());
        }

        Ok(DocumentStatus::Modified)
    }

    async fn fetch(&self, document_id: &str) -> Result<documents::Model, AppError> {
        Documents::find_by_id(document_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
    }

    /// Boundary handler for pipeline faults: the document lands in `failed`
    /// no matter which state the fault interrupted.
    async fn force_failed(&self, document_id: &str) {
        let found = Documents::find_by_id(document_id).one(&self.db).await;
        match found {
            Ok(Some(document)) => {
                let mut active: documents::ActiveModel = document.into();
                active.status = Set(DocumentStatus::Failed.as_str().to_string());
                active.status_changed_at = Set(Utc::now());
                if let Err(e) = active.update(&self.db).await {
                    tracing::error!("Failed to mark document {} as failed: {}", document_id, e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to load document {} for failure: {}", document_id, e);
            }
        }
    }
}

/// Filename without its final extension. The input is the sanitized
/// original filename, so it carries no path separators.
fn file_stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// Word/character counts plus a short preview, stored with the document
/// after processing.
fn analyze_content(text: &str) -> serde_json::Value {
    let preview: String = if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    };

    json!({
        "word_count": text.split_whitespace().count(),
        "character_count": text.chars().count(),
        "preview": preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database;
    use crate::services::converter;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use sea_orm::Database;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStorage {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStorage {
        fn new() -> Self {
            Self {
                blobs: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl BlobStorage for MemoryStorage {
        async fn put(&self, key: &str, data: Vec<u8>) -> AnyResult<()> {
            self.blobs.lock().unwrap().insert(key.to_string(), data);
            Ok(())
        }

        async fn get(&self, key: &str) -> AnyResult<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow!("no blob {}", key))
        }

        async fn delete(&self, key: &str) -> AnyResult<()> {
            self.blobs.lock().unwrap().remove(key);
            Ok(())
        }
    }

    async fn setup_service() -> DocumentService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();
        DocumentService::new(
            db,
            Arc::new(MemoryStorage::new()),
            Arc::new(RewriteEngine::new(None)),
        )
    }

    async fn upload_pdf(service: &DocumentService, text: &str) -> documents::Model {
        let bytes = converter::render_pdf(text).unwrap();
        service
            .create_document(
                ValidUpload {
                    filename: "test.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                },
                bytes,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_completes_and_analyzes() {
        let service = setup_service().await;
        let doc = upload_pdf(&service, "Sample document with several words.").await;
        assert_eq!(doc.status, "pending");

        service.process(&doc.id).await.unwrap();

        let doc = service.fetch(&doc.id).await.unwrap();
        assert_eq!(doc.status, "completed");
        assert!(doc.processed_at.is_some());
        let analysis = doc.analysis.unwrap();
        assert!(analysis["word_count"].as_u64().unwrap() >= 5);
    }

    #[tokio::test]
    async fn test_process_failure_forces_failed() {
        let service = setup_service().await;
        let doc = service
            .create_document(
                ValidUpload {
                    filename: "broken.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                },
                b"%PDF-1.4 but not really".to_vec(),
            )
            .await
            .unwrap();

        assert!(service.process(&doc.id).await.is_err());
        let doc = service.fetch(&doc.id).await.unwrap();
        assert_eq!(doc.status, "failed");
        assert!(doc.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_modification_produces_modified_file() {
        let service = setup_service().await;
        let doc = upload_pdf(&service, "This document don't have proper grammar.").await;
        service.process(&doc.id).await.unwrap();

        service
            .request_modification(&doc.id, "make it formal".to_string())
            .await
            .unwrap();
        let status = service.run_modification(&doc.id).await.unwrap();
        assert_eq!(status, DocumentStatus::Modified);

        let doc = service.fetch(&doc.id).await.unwrap();
        assert_eq!(doc.status, "modified");
        assert!(doc.modified_at.is_some());
        let key = doc.modified_file_key.clone().unwrap();
        assert!(key.ends_with("/modified_test.pdf"), "key: {key}");
        assert!(key.contains(&doc.id));

        let rendered = service
            .storage
            .get(doc.modified_file_key.as_deref().unwrap())
            .await
            .unwrap();
        let text = crate::services::extraction::extract_pdf_text(&rendered).unwrap();
        assert!(text.contains("do not"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("report.pdf"), "report");
        assert_eq!(file_stem("archive.tar.docx"), "archive.tar");
        assert_eq!(file_stem("no_extension"), "no_extension");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[tokio::test]
    async fn test_modification_no_changes() {
        let service = setup_service().await;
        let doc = upload_pdf(&service, "A perfect sentence.").await;
        service.process(&doc.id).await.unwrap();

        service
            .request_modification(&doc.id, "fix grammar".to_string())
            .await
            .unwrap();
        let status = service.run_modification(&doc.id).await.unwrap();
        assert_eq!(status, DocumentStatus::NoChanges);

        let doc = service.fetch(&doc.id).await.unwrap();
        assert_eq!(doc.status, "no_changes");
        assert!(doc.modified_file_key.is_none());
        assert!(doc.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_remodification_clears_stale_modified_file() {
        let service = setup_service().await;
        let doc = upload_pdf(&service, "We can't allow this.").await;
        service.process(&doc.id).await.unwrap();

        service
            .request_modification(&doc.id, "make it formal".to_string())
            .await
            .unwrap();
        service.run_modification(&doc.id).await.unwrap();
        let key = service
            .fetch(&doc.id)
            .await
            .unwrap()
            .modified_file_key
            .unwrap();

        // Second request with guidelines no rule matches: the document ends
        // in `no_changes` and the first run's blob and key are gone
        service
            .request_modification(&doc.id, "translate to French".to_string())
            .await
            .unwrap();
        let status = service.run_modification(&doc.id).await.unwrap();
        assert_eq!(status, DocumentStatus::NoChanges);

        let doc = service.fetch(&doc.id).await.unwrap();
        assert!(doc.modified_file_key.is_none());
        assert!(service.storage.get(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_modify_rejected_while_pending() {
        let service = setup_service().await;
        let doc = upload_pdf(&service, "text").await;

        let err = service
            .request_modification(&doc.id, "formal".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_document_is_modifiable_again() {
        let service = setup_service().await;
        let doc = service
            .create_document(
                ValidUpload {
                    filename: "broken.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                },
                b"%PDF-1.4 junk".to_vec(),
            )
            .await
            .unwrap();
        let _ = service.process(&doc.id).await;

        // Modification re-entry from `failed` is allowed; it then fails
        // again on extraction and lands back in `failed`.
        service
            .request_modification(&doc.id, "fix grammar".to_string())
            .await
            .unwrap();
        assert!(service.run_modification(&doc.id).await.is_err());
        let doc = service.fetch(&doc.id).await.unwrap();
        assert_eq!(doc.status, "failed");
    }
}
