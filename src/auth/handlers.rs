use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest},
        extractors::AgentInfo,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::RefreshToken,
        services::{is_valid_email, passwords_match, validate_password},
    },
    state::AppState,
    users::{dto::UserResponse, repo_types::User, services as user_services},
};

/// Cookie carrying the opaque refresh token.
pub const REFRESH_COOKIE: &str = "refreshtoken";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh-tokens", get(refresh_tokens))
        .route("/auth/logout", get(logout))
        .route("/auth/logout-all", get(logout_all))
}

fn set_cookie_value(token: Uuid, secure: bool) -> String {
    let mut cookie = format!("{}={}; HttpOnly; SameSite=Lax; Path=/", REFRESH_COOKIE, token);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_cookie_value(secure: bool) -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", REFRESH_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cookie_headers(value: String) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = value.parse() {
        headers.insert(SET_COOKIE, v);
    }
    headers
}

/// Pull the refresh token out of the `Cookie` request header.
pub(crate) fn refresh_token_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in cookie_header.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name.trim() == REFRESH_COOKIE && !value.trim().is_empty() {
                return value.trim().parse::<Uuid>().ok();
            }
        }
    }
    None
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if let Err(msg) = validate_password(&payload.password) {
        warn!("password rejected by policy");
        return Err((StatusCode::BAD_REQUEST, msg.into()));
    }
    if !passwords_match(&payload.password, &payload.password_repeat) {
        return Err((StatusCode::BAD_REQUEST, "Passwords do not match".into()));
    }

    // Ensure email is not taken
    if let Ok(Some(_)) = user_services::find_one(&state, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let user = match User::create(&state.db, &payload.email, &hash).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    user_services::cache_user(&state, &user).await;

    // Confirmation mail is best-effort: the account exists either way and
    // the link can be re-requested later.
    let keys = JwtKeys::from_ref(&state);
    match keys.sign_confirm(&user) {
        Ok(token) => {
            let url = format!("{}?token={}", state.config.smtp.confirm_base_url, token);
            if let Err(e) = state.mailer.send_confirmation(&user.email, &url).await {
                error!(error = %e, user_id = %user.id, "confirmation mail failed");
            }
        }
        Err(e) => error!(error = %e, user_id = %user.id, "confirm token signing failed"),
    }

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    agent: AgentInfo,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match user_services::find_one(&state, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_one failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let ok = match verify_password(&payload.password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    if user.is_blocked {
        warn!(user_id = %user.id, "blocked user login attempt");
        return Err((StatusCode::UNAUTHORIZED, "Account is blocked".into()));
    }

    let tokens = issue_token_pair(&state, &user, &agent).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(tokens)
}

#[instrument(skip(state))]
pub async fn refresh_tokens(
    State(state): State<AppState>,
    agent: AgentInfo,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<AuthResponse>), (StatusCode, String)> {
    let token = refresh_token_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "Unknown session".to_string()))?;

    // Rotation: the presented token is gone after this, valid or not.
    let row = match RefreshToken::consume(&state.db, token).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            warn!("refresh with unknown token");
            return Err((StatusCode::UNAUTHORIZED, "Unknown session".into()));
        }
        Err(e) => {
            error!(error = %e, "refresh token consume failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if row.is_expired(OffsetDateTime::now_utc()) {
        warn!(user_id = %row.user_id, "expired refresh token");
        return Err((StatusCode::UNAUTHORIZED, "Session expired".into()));
    }

    let user = match user_services::find_one(&state, &row.user_id.to_string()).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(user_id = %row.user_id, "refresh for missing user");
            return Err((StatusCode::FORBIDDEN, "User not found".into()));
        }
        Err(e) => {
            error!(error = %e, "find_one failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if user.is_blocked {
        warn!(user_id = %user.id, "blocked user refresh attempt");
        return Err((StatusCode::UNAUTHORIZED, "Account is blocked".into()));
    }

    let tokens = issue_token_pair(&state, &user, &agent).await?;
    info!(user_id = %user.id, "tokens refreshed");
    Ok(tokens)
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<MessageResponse>), (StatusCode, String)> {
    let token = refresh_token_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "Unknown session".to_string()))?;

    let deleted = RefreshToken::delete(&state.db, token).await.map_err(|e| {
        error!(error = %e, "logout delete failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    if deleted == 0 {
        return Err((StatusCode::UNAUTHORIZED, "Unknown session".into()));
    }

    info!("user logged out");
    Ok((
        cookie_headers(clear_cookie_value(state.config.secure_cookie)),
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn logout_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<MessageResponse>), (StatusCode, String)> {
    let token = refresh_token_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "Unknown session".to_string()))?;

    let deleted = RefreshToken::delete_all_for_owner(&state.db, token)
        .await
        .map_err(|e| {
            error!(error = %e, "logout-all delete failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    if deleted == 0 {
        return Err((StatusCode::UNAUTHORIZED, "Unknown session".into()));
    }

    info!(sessions = deleted, "user logged out everywhere");
    Ok((
        cookie_headers(clear_cookie_value(state.config.secure_cookie)),
        Json(MessageResponse {
            message: "Logged out on all devices".into(),
        }),
    ))
}

/// Sign an access token, rotate the refresh row for this client and build
/// the Set-Cookie response headers.
async fn issue_token_pair(
    state: &AppState,
    user: &User,
    agent: &AgentInfo,
) -> Result<(HeaderMap, Json<AuthResponse>), (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let refresh = RefreshToken::issue(
        &state.db,
        user.id,
        &agent.user_agent,
        &agent.user_ip,
        state.config.jwt.refresh_ttl_minutes,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "refresh token issue failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((
        cookie_headers(set_cookie_value(refresh.token, state.config.secure_cookie)),
        Json(AuthResponse::bearer(access_token)),
    ))
}


#[cfg(test)]
mod handler_tests {
    use super::*;
    use crate::users::repo_types::{Provider, Role};
    use crate::users::services::cache_user;
    use sqlx::PgPool;

    fn agent() -> AgentInfo {
        AgentInfo {
            user_agent: "firefox".into(),
            user_ip: "10.0.0.1".into(),
        }
    }

    fn make_user(email: &str, password_hash: &str, is_blocked: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            roles: vec![Role::User],
            provider: Provider::Local,
            is_blocked,
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn registering_a_taken_email_is_a_conflict() {
        let state = AppState::fake();
        // No database behind the fake state, so the duplicate has to come
        // out of the cached lookup.
        cache_user(&state, &make_user("taken@example.com", "hash", false)).await;

        let err = register(
            State(state),
            Json(RegisterRequest {
                email: "Taken@example.com".into(),
                password: "abc123!x".into(),
                password_repeat: "abc123!x".into(),
            }),
        )
        .await
        .err()
        .expect("duplicate must be rejected");

        assert_eq!(err.0, StatusCode::CONFLICT);
        assert_eq!(err.1, "Email already registered");
    }

    #[tokio::test]
    async fn blocked_user_cannot_login() {
        let state = AppState::fake();
        let hash = hash_password("abc123!x").expect("hash");
        cache_user(&state, &make_user("blocked@example.com", &hash, true)).await;

        let err = login(
            State(state),
            agent(),
            Json(LoginRequest {
                email: "blocked@example.com".into(),
                password: "abc123!x".into(),
            }),
        )
        .await
        .err()
        .expect("blocked account must not log in");

        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
        assert_eq!(err.1, "Account is blocked");
    }

    #[sqlx::test]
    async fn blocked_user_cannot_refresh(pool: PgPool) {
        let mut state = AppState::fake();
        state.db = pool;

        let user = User::create(&state.db, "banned@example.com", "hash")
            .await
            .expect("create user");
        let refresh = RefreshToken::issue(&state.db, user.id, "firefox", "10.0.0.1", 60)
            .await
            .expect("issue");
        User::toggle_blocked(&state.db, user.id)
            .await
            .expect("toggle")
            .expect("user exists");

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            format!("{}={}", REFRESH_COOKIE, refresh.token)
                .parse()
                .unwrap(),
        );

        let err = refresh_tokens(State(state), agent(), headers)
            .await
            .err()
            .expect("blocked account must not refresh");

        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
        assert_eq!(err.1, "Account is blocked");
    }
}
