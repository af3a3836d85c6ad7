use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::mailer_routes()
}
