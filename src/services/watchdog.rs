use crate::entities::{documents, prelude::*};
use crate::services::lifecycle::DocumentStatus;
use crate::utils::keyed_mutex::KeyedMutex;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Forces documents stuck in an in-flight state past `stale_after` to
/// `failed`. The async execution backing a transition may have died without
/// updating status; this sweep is the safety net. Log-only: sweep faults
/// never propagate.
pub async fn sweep_stale_documents(
    db: &DatabaseConnection,
    stale_after: Duration,
) -> Result<u64, sea_orm::DbErr> {
    let cutoff = Utc::now() - chrono::Duration::from_std(stale_after).unwrap_or_default();

    let stuck = Documents::find()
        .filter(documents::Column::Status.is_in([
            DocumentStatus::Processing.as_str(),
            DocumentStatus::Modifying.as_str(),
        ]))
        .filter(documents::Column::StatusChangedAt.lt(cutoff))
        .all(db)
        .await?;

    let mut count = 0u64;
    for document in stuck {
        tracing::warn!(
            "Document {} stuck in '{}' since {}, forcing to failed",
            document.id,
            document.status,
            document.status_changed_at
        );
        let mut active: documents::ActiveModel = document.into();
        active.status = Set(DocumentStatus::Failed.as_str().to_string());
        active.status_changed_at = Set(Utc::now());
        match active.update(db).await {
            Ok(_) => count += 1,
            Err(e) => tracing::error!("Failed to sweep stuck document: {}", e),
        }
    }

    if count > 0 {
        tracing::info!("Watchdog swept {} stuck document(s)", count);
    }
    Ok(count)
}

/// Periodic staleness sweep worker.
pub struct StaleDocumentWatchdog {
    db: DatabaseConnection,
    locks: KeyedMutex,
    stale_after: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StaleDocumentWatchdog {
    pub fn new(
        db: DatabaseConnection,
        locks: KeyedMutex,
        stale_after: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            locks,
            stale_after,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Staleness watchdog started (threshold {:?}, interval {:?})",
            self.stale_after,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("Staleness watchdog shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    if let Err(e) = sweep_stale_documents(&self.db, self.stale_after).await {
                        tracing::error!("Watchdog sweep failed: {}", e);
                    }
                    self.locks.cleanup();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database;
    use sea_orm::Database;

    async fn insert_document(
        db: &DatabaseConnection,
        status: &str,
        status_age: chrono::Duration,
    ) -> documents::Model {
        let now = Utc::now();
        documents::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            original_filename: Set("test.pdf".to_string()),
            file_size: Set(1024),
            content_type: Set("application/pdf".to_string()),
            status: Set(status.to_string()),
            file_key: Set("documents/test.pdf".to_string()),
            modified_file_key: Set(None),
            modification_guidelines: Set(None),
            analysis: Set(None),
            uploaded_at: Set(now - status_age),
            status_changed_at: Set(now - status_age),
            processed_at: Set(None),
            modified_at: Set(None),
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sweeps_stale_in_flight_documents() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();

        let stale = insert_document(&db, "processing", chrono::Duration::minutes(10)).await;
        let stale_mod = insert_document(&db, "modifying", chrono::Duration::minutes(6)).await;

        let count = sweep_stale_documents(&db, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(count, 2);

        for id in [&stale.id, &stale_mod.id] {
            let doc = Documents::find_by_id(id).one(&db).await.unwrap().unwrap();
            assert_eq!(doc.status, "failed");
        }
    }

    #[tokio::test]
    async fn test_leaves_fresh_and_terminal_documents_alone() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();

        let fresh = insert_document(&db, "processing", chrono::Duration::minutes(1)).await;
        let done = insert_document(&db, "completed", chrono::Duration::minutes(60)).await;

        let count = sweep_stale_documents(&db, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(count, 0);

        let doc = Documents::find_by_id(&fresh.id).one(&db).await.unwrap().unwrap();
        assert_eq!(doc.status, "processing");
        let doc = Documents::find_by_id(&done.id).one(&db).await.unwrap().unwrap();
        assert_eq!(doc.status, "completed");
    }
}
