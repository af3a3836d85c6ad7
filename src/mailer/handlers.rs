use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{dto::MessageResponse, jwt::JwtKeys},
    state::AppState,
    users::{repo_types::User, services as user_services},
};

pub fn mailer_routes() -> Router<AppState> {
    Router::new().route("/mailer/confirm-email", get(confirm_email))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailQuery {
    pub token: Option<String>,
}

#[instrument(skip(state, query))]
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmEmailQuery>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Token not provided".to_string()))?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_confirm(&token).map_err(|e| {
        warn!(error = %e, "invalid confirmation token");
        (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
    })?;

    let user = user_services::find_one(&state, &claims.sub.to_string())
        .await
        .map_err(|e| {
            error!(error = %e, "find_one failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid token".to_string()))?;

    // The link is void if the account moved to another address meanwhile.
    if user.email != claims.email {
        warn!(user_id = %user.id, "confirmation token email mismatch");
        return Err((StatusCode::UNAUTHORIZED, "Invalid token".into()));
    }

    user_services::invalidate_user(&state, &user).await;

    let updated = User::set_email_verified(&state.db, user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "set_email_verified failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid token".to_string()))?;

    user_services::cache_user(&state, &updated).await;

    info!(user_id = %updated.id, "email confirmed");
    Ok(Json(MessageResponse {
        message: "Email confirmed".into(),
    }))
}
