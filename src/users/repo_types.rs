use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role granted to a user. Stored as a Postgres enum array on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl PgHasArrayType for Role {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_user_role")
    }
}

/// How the account was created. Only `local` is issued by this service;
/// `google` is kept for rows imported from the previous OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_provider", rename_all = "lowercase")]
pub enum Provider {
    Local,
    Google,
}

/// User record in the database. Serialized as-is only into the cache;
/// API responses go through `UserResponse`, which drops the hash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String, // Argon2 hash
    pub roles: Vec<Role>,
    pub provider: Provider,
    pub is_blocked: bool,
    pub email_verified: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin_roles(roles: &[Role]) -> bool {
        roles.contains(&Role::Admin)
    }
}
