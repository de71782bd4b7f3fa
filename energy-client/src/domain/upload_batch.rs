use time::OffsetDateTime;

use super::OwnerId;

/// One uploaded file and its processing status.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UploadBatch {
    pub id: i64,
    #[sqlx(rename = "owner_id")]
    pub owner: OwnerId,
    pub payload: String,
    pub submitted_at: OffsetDateTime,
    pub processed: bool,
}
