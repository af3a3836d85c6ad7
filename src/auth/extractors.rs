use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use std::convert::Infallible;
use tracing::warn;

use crate::auth::jwt::{Claims, JwtKeys};
use crate::state::AppState;
use crate::users::repo_types::User;
use crate::users::services;

/// Extracts and validates a bearer access token, then checks the user still
/// exists and is not blocked (through the cached lookup). Carries the claims.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|_| {
            warn!("invalid or expired token");
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            )
        })?;

        // The token may outlive the account state; re-check on every request.
        let user = services::find_one(state, &claims.sub.to_string())
            .await
            .map_err(|e| {
                warn!(error = %e, "user lookup failed during auth");
                (StatusCode::UNAUTHORIZED, "User not found".to_string())
            })?
            .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

        if user.is_blocked {
            warn!(user_id = %user.id, "blocked user rejected");
            return Err((StatusCode::UNAUTHORIZED, "User is blocked".to_string()));
        }

        Ok(AuthUser(claims))
    }
}

/// `AuthUser` plus the `admin` role.
pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !User::is_admin_roles(&claims.roles) {
            return Err((StatusCode::FORBIDDEN, "Admin role required".to_string()));
        }
        Ok(AdminUser(claims))
    }
}

/// Client fingerprint used to key refresh-token rows.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub user_agent: String,
    pub user_ip: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AgentInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let user_ip = parts
            .headers
            .get("x-real-ip")
            .or_else(|| parts.headers.get("x-forwarded-for"))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(AgentInfo {
            user_agent,
            user_ip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::{Provider, Role};
    use axum::http::Request;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn make_user(roles: Vec<Role>, is_blocked: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "extract@example.com".into(),
            password_hash: "hash".into(),
            roles,
            provider: Provider::Local,
            is_blocked,
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn bearer_parts(token: &str) -> Parts {
        Request::builder()
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn cached_user_with_valid_token_authenticates() {
        let state = AppState::fake();
        let user = make_user(vec![Role::User], false);
        services::cache_user(&state, &user).await;
        let token = JwtKeys::from_ref(&state).sign_access(&user).expect("sign");

        let AuthUser(claims) = AuthUser::from_request_parts(&mut bearer_parts(&token), &state)
            .await
            .expect("authenticates");
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn blocked_user_is_rejected_even_with_valid_token() {
        let state = AppState::fake();
        let user = make_user(vec![Role::User], true);
        services::cache_user(&state, &user).await;
        let token = JwtKeys::from_ref(&state).sign_access(&user).expect("sign");

        let err = AuthUser::from_request_parts(&mut bearer_parts(&token), &state)
            .await
            .err()
            .expect("blocked user must be rejected");
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
        assert_eq!(err.1, "User is blocked");
    }

    #[tokio::test]
    async fn admin_extractor_rejects_plain_user() {
        let state = AppState::fake();
        let user = make_user(vec![Role::User], false);
        services::cache_user(&state, &user).await;
        let token = JwtKeys::from_ref(&state).sign_access(&user).expect("sign");

        let err = AdminUser::from_request_parts(&mut bearer_parts(&token), &state)
            .await
            .err()
            .expect("admin route must reject plain users");
        assert_eq!(err.0, StatusCode::FORBIDDEN);
        assert_eq!(err.1, "Admin role required");
    }
}
