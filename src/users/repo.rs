use crate::users::repo_types::User;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, password_hash, roles, provider, is_blocked, email_verified, created_at, updated_at";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE email = $1
            "#,
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find by either identifier: UUIDs look up by id, anything else by email.
    pub async fn find_by_id_or_email(db: &PgPool, raw: &str) -> anyhow::Result<Option<User>> {
        match raw.parse::<Uuid>() {
            Ok(id) => Self::find_by_id(db, id).await,
            Err(_) => Self::find_by_email(db, raw).await,
        }
    }

    /// Create a new local user with the default `user` role.
    pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Update password hash and/or email; `None` keeps the current value.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        password_hash: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = COALESCE($2, password_hash),
                email = COALESCE($3, email),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(password_hash)
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Flip the blocked flag, returning the updated row.
    pub async fn toggle_blocked(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_blocked = NOT is_blocked, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Record a completed email confirmation.
    pub async fn set_email_verified(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email_verified = TRUE, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Delete a user; refresh tokens go with it via the FK cascade.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<(Uuid, String)>> {
        let deleted = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            DELETE FROM users
            WHERE id = $1
            RETURNING id, email
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(deleted)
    }
}
