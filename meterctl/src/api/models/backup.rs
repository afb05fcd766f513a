//! API response models for database backup and restore.

use crate::db::models::backup::BackupImportCounts;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    pub imported: BackupImportCounts,
}

impl From<BackupImportCounts> for ImportResponse {
    fn from(counts: BackupImportCounts) -> Self {
        Self {
            success: true,
            message: format!(
                "Imported {} users, {} model prices and {} usage records",
                counts.users, counts.model_prices, counts.user_usage_records
            ),
            imported: counts,
        }
    }
}
