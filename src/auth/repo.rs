use crate::auth::repo_types::RefreshToken;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

impl RefreshToken {
    /// Issue a refresh token for (user, agent, ip). An existing row for the
    /// same tuple is rotated: new token value, new expiry.
    pub async fn issue(
        db: &PgPool,
        user_id: Uuid,
        user_agent: &str,
        user_ip: &str,
        ttl_minutes: i64,
    ) -> anyhow::Result<RefreshToken> {
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO tokens (token, user_id, user_agent, user_ip, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, user_agent, user_ip)
            DO UPDATE SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
            RETURNING token, user_id, user_agent, user_ip, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(user_agent)
        .bind(user_ip)
        .bind(expires_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Consume a token for rotation: delete the row and return it. A second
    /// call with the same token finds nothing, so replay is impossible.
    pub async fn consume(db: &PgPool, token: Uuid) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            DELETE FROM tokens
            WHERE token = $1
            RETURNING token, user_id, user_agent, user_ip, expires_at, created_at
            "#,
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Delete a single token (logout). Returns the number of rows removed.
    pub async fn delete(db: &PgPool, token: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every token of the user owning `token` (logout everywhere).
    pub async fn delete_all_for_owner(db: &PgPool, token: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE user_id = (SELECT user_id FROM tokens WHERE token = $1)
            "#,
        )
        .bind(token)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::User;

    async fn seed_user(db: &PgPool, email: &str) -> User {
        User::create(db, email, "hash").await.expect("seed user")
    }

    #[sqlx::test]
    async fn consumed_token_cannot_be_replayed(pool: PgPool) {
        let user = seed_user(&pool, "rotate@example.com").await;
        let issued = RefreshToken::issue(&pool, user.id, "firefox", "10.0.0.1", 60)
            .await
            .expect("issue");

        let consumed = RefreshToken::consume(&pool, issued.token)
            .await
            .expect("consume")
            .expect("token row present");
        assert_eq!(consumed.user_id, user.id);

        // The row is gone; presenting the same token again finds nothing.
        assert!(RefreshToken::consume(&pool, issued.token)
            .await
            .expect("consume")
            .is_none());
    }

    #[sqlx::test]
    async fn reissue_for_same_client_invalidates_prior_token(pool: PgPool) {
        let user = seed_user(&pool, "reissue@example.com").await;
        let first = RefreshToken::issue(&pool, user.id, "firefox", "10.0.0.1", 60)
            .await
            .expect("first issue");
        let second = RefreshToken::issue(&pool, user.id, "firefox", "10.0.0.1", 60)
            .await
            .expect("second issue");

        assert_ne!(first.token, second.token);
        assert!(RefreshToken::consume(&pool, first.token)
            .await
            .expect("consume")
            .is_none());
        assert!(RefreshToken::consume(&pool, second.token)
            .await
            .expect("consume")
            .is_some());
    }

    #[sqlx::test]
    async fn delete_all_for_owner_clears_every_session(pool: PgPool) {
        let user = seed_user(&pool, "everywhere@example.com").await;
        let desktop = RefreshToken::issue(&pool, user.id, "firefox", "10.0.0.1", 60)
            .await
            .expect("issue");
        let phone = RefreshToken::issue(&pool, user.id, "safari", "10.0.0.2", 60)
            .await
            .expect("issue");

        let deleted = RefreshToken::delete_all_for_owner(&pool, desktop.token)
            .await
            .expect("delete all");
        assert_eq!(deleted, 2);
        assert!(RefreshToken::consume(&pool, phone.token)
            .await
            .expect("consume")
            .is_none());
    }
}
