use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
    pub status: String,
    /// Blob key of the uploaded file, e.g. `documents/{uuid}.pdf`.
    pub file_key: String,
    /// Blob key of the rewritten file. Set iff status is `modified`.
    pub modified_file_key: Option<String>,
    pub modification_guidelines: Option<String>,
    /// Word/character counts and a preview, produced during processing.
    pub analysis: Option<Json>,
    pub uploaded_at: DateTimeUtc,
    /// Bumped on every status transition; the watchdog's staleness clock.
    pub status_changed_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    pub modified_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
