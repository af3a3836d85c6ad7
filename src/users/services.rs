use crate::state::AppState;
use crate::users::repo_types::{Role, User};
use tracing::warn;
use uuid::Uuid;

pub fn id_key(id: Uuid) -> String {
    format!("user:id:{}", id)
}

pub fn email_key(email: &str) -> String {
    format!("user:email:{}", email)
}

/// Cache key for a raw `:id_or_email` path segment.
fn lookup_key(raw: &str) -> String {
    match raw.parse::<Uuid>() {
        Ok(id) => id_key(id),
        Err(_) => email_key(raw),
    }
}

/// Look up a user by id or email, going through the cache first.
/// Cache trouble is logged and degrades to a plain DB read.
pub async fn find_one(state: &AppState, raw: &str) -> anyhow::Result<Option<User>> {
    let key = lookup_key(raw);
    match state.cache.get(&key).await {
        Ok(Some(json)) => match serde_json::from_str::<User>(&json) {
            Ok(user) => return Ok(Some(user)),
            Err(e) => warn!(error = %e, key = %key, "stale cache entry, falling back to db"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, key = %key, "cache read failed"),
    }

    let user = User::find_by_id_or_email(&state.db, raw).await?;
    if let Some(ref user) = user {
        cache_user(state, user).await;
    }
    Ok(user)
}

/// Store a user under both its id key and its email key.
pub async fn cache_user(state: &AppState, user: &User) {
    let json = match serde_json::to_string(user) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "user serialization failed");
            return;
        }
    };
    let ttl = state.config.cache_ttl_seconds;
    for key in [id_key(user.id), email_key(&user.email)] {
        if let Err(e) = state.cache.set_ex(&key, &json, ttl).await {
            warn!(error = %e, key = %key, "cache write failed");
        }
    }
}

/// Drop both cache entries of a user. Safe to call for users never cached.
pub async fn invalidate_user(state: &AppState, user: &User) {
    let keys = [id_key(user.id), email_key(&user.email)];
    if let Err(e) = state.cache.del(&keys).await {
        warn!(error = %e, user_id = %user.id, "cache invalidation failed");
    }
}

/// A user may act on a record if it is their own or they are an admin.
pub fn can_modify(actor_id: Uuid, actor_roles: &[Role], target_id: Uuid) -> bool {
    actor_id == target_id || User::is_admin_roles(actor_roles)
}
