use crate::users::repo_types::{Provider, Role, User};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Public part of the user returned to the client. Never carries the hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
    pub provider: Provider,
    pub is_blocked: bool,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            roles: user.roles,
            provider: user.provider,
            is_blocked: user.is_blocked,
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Request body for `PUT /user/update-user`.
/// `email` names the target account; only admins may set `change_user_email`.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub password: Option<String>,
    pub password_repeat: Option<String>,
    pub change_user_email: Option<String>,
}

/// Response for `DELETE /user/:id`.
#[derive(Debug, Serialize)]
pub struct DeletedUserResponse {
    pub id: Uuid,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_never_exposes_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "safe@example.com".into(),
            password_hash: "super-secret-hash".into(),
            roles: vec![Role::User],
            provider: Provider::Local,
            is_blocked: false,
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(json.contains("safe@example.com"));
        assert!(!json.contains("super-secret-hash"));
        assert!(!json.contains("password"));
    }
}
