use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::reputation::{KarmaMetadata, KarmaTransaction};

#[derive(Debug, FromRow, Serialize, Deserialize)]
pub struct KarmaRow {
    pub id: Uuid,
    pub sequence: i64,
    pub user_id: Uuid,
    pub action: String,
    pub points: i64,
    pub reason: String,
    pub metadata: Json<KarmaMetadata>,
    pub created_at: DateTime<Utc>,
}

impl KarmaRow {
    /// Rows with an action this build does not know are skipped by the caller.
    pub fn into_transaction(self) -> Option<KarmaTransaction> {
        Some(KarmaTransaction {
            id: self.id,
            sequence: u64::try_from(self.sequence).ok()?,
            user_id: self.user_id,
            action: self.action.parse().ok()?,
            points: self.points,
            reason: self.reason,
            metadata: self.metadata.0,
            created_at: self.created_at,
        })
    }
}
