use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::PublicUser,
        extractors::CurrentUser,
        handlers::is_valid_email,
        repo::User,
    },
    error::ApiError,
    media::{self, UploadItem},
    state::AppState,
};

use super::dto::UpdateProfileRequest;

/// PATCH /me/profile { full_name?, email? }
#[instrument(skip(state, user, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let full_name = payload
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string());
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    if full_name.is_none() && email.is_none() {
        return Err(ApiError::validation("full_name or email is required"));
    }
    if let Some(email) = &email {
        if !is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(ApiError::validation("invalid email"));
        }
    }

    let updated =
        User::update_profile(&state.db, user.id, full_name.as_deref(), email.as_deref()).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(updated.into()))
}

/// Pull the single expected file out of a multipart body.
async fn single_file(multipart: &mut Multipart, name: &str) -> Result<Option<UploadItem>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(name) {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("could not read uploaded file: {e}")))?;
        return Ok(Some(UploadItem { body, content_type }));
    }
    Ok(None)
}

/// PATCH /me/avatar (multipart: avatar file)
#[instrument(skip(state, user, multipart))]
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<PublicUser>, ApiError> {
    let Some(item) = single_file(&mut multipart, "avatar").await? else {
        return Err(ApiError::validation("avatar file is required"));
    };
    let url = media::store_image(&state, "avatars", item)
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::validation("could not store avatar")
        })?;

    let updated = User::set_avatar_url(&state.db, user.id, &url).await?;
    media::remove_stored(&state, &user.avatar_url).await;
    info!(user_id = %user.id, "avatar updated");
    Ok(Json(updated.into()))
}

/// PATCH /me/cover-image (multipart: cover_image file)
#[instrument(skip(state, user, multipart))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<PublicUser>, ApiError> {
    let Some(item) = single_file(&mut multipart, "cover_image").await? else {
        return Err(ApiError::validation("cover_image file is required"));
    };
    let url = media::store_image(&state, "covers", item).await.map_err(|e| {
        warn!(error = %e, "cover image upload failed");
        ApiError::validation("could not store cover image")
    })?;

    let updated = User::set_cover_image_url(&state.db, user.id, &url).await?;
    if let Some(old) = &user.cover_image_url {
        media::remove_stored(&state, old).await;
    }
    info!(user_id = %user.id, "cover image updated");
    Ok(Json(updated.into()))
}
