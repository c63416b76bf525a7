use crate::entities::documents;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use thiserror::Error;

/// Processing status of a document.
///
/// Two paths share the field: upload processing
/// (`pending -> processing -> completed | failed`) and modification
/// (`completed | failed | modified | no_changes -> modifying ->
/// modified | no_changes | failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Modifying,
    Modified,
    NoChanges,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Unknown document status: {0}")]
    UnknownStatus(String),
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Modifying => "modifying",
            DocumentStatus::Modified => "modified",
            DocumentStatus::NoChanges => "no_changes",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LifecycleError> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            "modifying" => Ok(DocumentStatus::Modifying),
            "modified" => Ok(DocumentStatus::Modified),
            "no_changes" => Ok(DocumentStatus::NoChanges),
            other => Err(LifecycleError::UnknownStatus(other.to_string())),
        }
    }

    /// States the watchdog treats as in-flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, DocumentStatus::Processing | DocumentStatus::Modifying)
    }

    /// The allowed-edge set of the state machine.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            (Completed, Modifying)
            | (Failed, Modifying)
            | (Modified, Modifying)
            | (NoChanges, Modifying) => true,
            (Modifying, Modified) | (Modifying, NoChanges) | (Modifying, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies a validated transition to a document row: writes the new status,
/// bumps the staleness clock, and stamps `processed_at`/`modified_at` on the
/// transitions that set them.
pub async fn apply_transition<C: ConnectionTrait>(
    db: &C,
    document: documents::Model,
    next: DocumentStatus,
) -> Result<documents::Model, TransitionError> {
    apply_transition_with(db, document, next, |_| {}).await
}

/// Like [`apply_transition`], with extra column writes folded into the same
/// update so invariants hold atomically (e.g. `modified_file_key` is set in
/// the same row version that becomes `modified`).
pub async fn apply_transition_with<C, F>(
    db: &C,
    document: documents::Model,
    next: DocumentStatus,
    mutate: F,
) -> Result<documents::Model, TransitionError>
where
    C: ConnectionTrait,
    F: FnOnce(&mut documents::ActiveModel),
{
    let current = DocumentStatus::parse(&document.status)?;
    if !current.can_transition_to(next) {
        return Err(LifecycleError::InvalidTransition {
            from: current.as_str(),
            to: next.as_str(),
        }
        .into());
    }

    let now = Utc::now();
    let mut active: documents::ActiveModel = document.into();
    active.status = Set(next.as_str().to_string());
    active.status_changed_at = Set(now);

    match next {
        DocumentStatus::Completed => {
            active.processed_at = Set(Some(now));
        }
        DocumentStatus::Modified | DocumentStatus::NoChanges => {
            active.modified_at = Set(Some(now));
        }
        _ => {}
    }

    mutate(&mut active);

    Ok(active.update(db).await?)
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

#[cfg(test)]
mod tests {
    use super::DocumentStatus::*;
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for status in [
            Pending, Processing, Completed, Failed, Modifying, Modified, NoChanges,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(matches!(
            DocumentStatus::parse("unknown"),
            Err(LifecycleError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_processing_path_edges() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_modification_path_edges() {
        for state in [Completed, Failed, Modified, NoChanges] {
            assert!(state.can_transition_to(Modifying), "{state} -> modifying");
        }
        assert!(Modifying.can_transition_to(Modified));
        assert!(Modifying.can_transition_to(NoChanges));
        assert!(Modifying.can_transition_to(Failed));

        // Not ready for modification yet
        assert!(!Pending.can_transition_to(Modifying));
        assert!(!Processing.can_transition_to(Modifying));
        assert!(!Modifying.can_transition_to(Modifying));
    }

    #[test]
    fn test_in_flight_states() {
        assert!(Processing.is_in_flight());
        assert!(Modifying.is_in_flight());
        for state in [Pending, Completed, Failed, Modified, NoChanges] {
            assert!(!state.is_in_flight());
        }
    }
}
