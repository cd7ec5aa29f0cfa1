use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::patch,
    Router,
};

mod dto;
pub mod handlers;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me/profile", patch(handlers::update_profile))
        .route("/me/avatar", patch(handlers::update_avatar))
        .route("/me/cover-image", patch(handlers::update_cover_image))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}
