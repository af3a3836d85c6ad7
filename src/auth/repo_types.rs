use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Refresh token row. One row per (user, user_agent, user_ip) tuple;
/// re-issuing for the same tuple rotates the token value in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub token: Uuid,
    pub user_id: Uuid,
    pub user_agent: String,
    pub user_ip: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}
