use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{AdminUser, AuthUser},
        password::hash_password,
        services::{is_valid_email, passwords_match, validate_password},
    },
    state::AppState,
    users::{
        dto::{DeletedUserResponse, UpdateUserRequest, UserResponse},
        repo_types::User,
        services as user_services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/:id_or_email", get(get_user).delete(delete_user))
        .route(
            "/user/set-block-unblock-user/:id_or_email",
            put(set_block_unblock_user),
        )
        .route("/user/update-user", put(update_user))
}

#[instrument(skip(state, _auth))]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id_or_email): Path<String>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    let user = user_services::find_one(&state, &id_or_email)
        .await
        .map_err(|e| {
            error!(error = %e, "find_one failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No user with id/email {}", id_or_email),
            )
        })?;
    Ok(Json(UserResponse::from(user)))
}

#[instrument(skip(state, auth))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeletedUserResponse>, (StatusCode, String)> {
    let id = id
        .parse::<Uuid>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user id".to_string()))?;
    let AuthUser(claims) = auth;
    if !user_services::can_modify(claims.sub, &claims.roles, id) {
        warn!(actor = %claims.sub, target = %id, "delete forbidden");
        return Err((StatusCode::FORBIDDEN, "No access to this user".into()));
    }

    // Drop cache entries first so a concurrent lookup cannot resurrect them.
    if let Ok(Some(user)) = User::find_by_id(&state.db, id).await {
        user_services::invalidate_user(&state, &user).await;
    }

    let (id, email) = User::delete(&state.db, id)
        .await
        .map_err(|e| {
            error!(error = %e, "user delete failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    info!(user_id = %id, "user deleted");
    Ok(Json(DeletedUserResponse { id, email }))
}

#[instrument(skip(state, _admin))]
pub async fn set_block_unblock_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id_or_email): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, String)> {
    let user = user_services::find_one(&state, &id_or_email)
        .await
        .map_err(|e| {
            error!(error = %e, "find_one failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No user with id/email {}", id_or_email),
            )
        })?;

    user_services::invalidate_user(&state, &user).await;

    let updated = User::toggle_blocked(&state.db, user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "toggle_blocked failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    // Re-populate so a lookup racing the invalidate cannot pin the stale
    // block flag for a full TTL; auth reads blocked-status through the cache.
    user_services::cache_user(&state, &updated).await;

    info!(user_id = %updated.id, is_blocked = updated.is_blocked, "block flag toggled");
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!(
                "Block status of {} changed to {}",
                updated.email, updated.is_blocked
            ),
        }),
    ))
}

#[instrument(skip(state, auth, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    let AuthUser(claims) = auth;
    let is_admin = User::is_admin_roles(&claims.roles);

    if payload.email != claims.email && !is_admin {
        warn!(actor = %claims.sub, "update of another account forbidden");
        return Err((
            StatusCode::FORBIDDEN,
            "No permission for this operation".into(),
        ));
    }

    if payload.password.is_none() && payload.change_user_email.is_none() {
        return Err((StatusCode::BAD_REQUEST, "Nothing to update".into()));
    }

    let password_hash = match &payload.password {
        Some(password) => {
            if let Err(msg) = validate_password(password) {
                return Err((StatusCode::BAD_REQUEST, msg.into()));
            }
            let repeat = payload.password_repeat.as_deref().unwrap_or_default();
            if !passwords_match(password, repeat) {
                return Err((StatusCode::BAD_REQUEST, "Passwords do not match".into()));
            }
            Some(hash_password(password).map_err(|e| {
                error!(error = %e, "hash_password failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            })?)
        }
        None => None,
    };

    // Only admins may move an account to a new email address.
    let new_email = match (&payload.change_user_email, is_admin) {
        (Some(email), true) => {
            let email = email.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
            }
            Some(email)
        }
        (Some(_), false) => {
            return Err((
                StatusCode::FORBIDDEN,
                "Only admins may change an email".into(),
            ));
        }
        (None, _) => None,
    };

    let target = user_services::find_one(&state, &payload.email)
        .await
        .map_err(|e| {
            error!(error = %e, "find_one failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No user with email {}", payload.email),
            )
        })?;

    user_services::invalidate_user(&state, &target).await;

    let updated = User::update(
        &state.db,
        target.id,
        password_hash.as_deref(),
        new_email.as_deref(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "user update failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?
    .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    user_services::cache_user(&state, &updated).await;

    info!(user_id = %updated.id, "user updated");
    Ok(Json(UserResponse::from(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Claims, TokenKind};
    use crate::users::repo_types::Role;
    use sqlx::PgPool;
    use time::OffsetDateTime;

    fn claims_for(id: Uuid, email: &str, roles: Vec<Role>) -> Claims {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        Claims {
            sub: id,
            email: email.into(),
            roles,
            exp: now + 300,
            iat: now,
            iss: "test-issuer".into(),
            aud: "test-aud".into(),
            kind: TokenKind::Access,
        }
    }

    #[sqlx::test]
    async fn block_toggle_recaches_the_updated_row(pool: PgPool) {
        let mut state = AppState::fake();
        state.db = pool;

        let user = User::create(&state.db, "blockme@example.com", "hash")
            .await
            .expect("create user");
        user_services::cache_user(&state, &user).await;

        let admin = AdminUser(claims_for(
            Uuid::new_v4(),
            "admin@example.com",
            vec![Role::User, Role::Admin],
        ));
        let (status, _) = set_block_unblock_user(
            State(state.clone()),
            admin,
            Path("blockme@example.com".into()),
        )
        .await
        .expect("toggle succeeds");
        assert_eq!(status, StatusCode::ACCEPTED);

        // Auth reads the blocked flag through the cache, so both entries
        // must already carry the new value.
        for key in [
            user_services::id_key(user.id),
            user_services::email_key(&user.email),
        ] {
            let json = state
                .cache
                .get(&key)
                .await
                .expect("cache read")
                .expect("entry present");
            let cached: User = serde_json::from_str(&json).expect("decode");
            assert!(cached.is_blocked);
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_request_an_email_change() {
        let state = AppState::fake();
        let claims = claims_for(Uuid::new_v4(), "self@example.com", vec![Role::User]);

        let err = update_user(
            State(state),
            AuthUser(claims),
            Json(UpdateUserRequest {
                email: "self@example.com".into(),
                password: None,
                password_repeat: None,
                change_user_email: Some("new@example.com".into()),
            }),
        )
        .await
        .err()
        .expect("must be forbidden");

        assert_eq!(err.0, StatusCode::FORBIDDEN);
        assert_eq!(err.1, "Only admins may change an email");
    }
}
