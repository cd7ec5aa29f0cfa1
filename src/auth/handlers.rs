use axum::{
    extract::{multipart::Field, FromRef, Multipart, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RefreshRequest,
            TokenPairResponse,
        },
        extractors::{CurrentUser, ACCESS_COOKIE, REFRESH_COOKIE},
        password::{hash_password, verify_password},
        repo::{NewUser, User},
        tokens::TokenKeys,
    },
    error::ApiError,
    media::{self, UploadItem},
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn session_cookie(name: &'static str, value: String, ttl: std::time::Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(ttl.as_secs() as i64));
    cookie
}

fn with_session_cookies(
    jar: CookieJar,
    keys: &TokenKeys,
    access_token: &str,
    refresh_token: &str,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        access_token.to_string(),
        keys.access_ttl(),
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        refresh_token.to_string(),
        keys.refresh_ttl(),
    ))
}

fn without_session_cookies(jar: CookieJar) -> CookieJar {
    let mut access = Cookie::new(ACCESS_COOKIE, "");
    access.set_path("/");
    let mut refresh = Cookie::new(REFRESH_COOKIE, "");
    refresh.set_path("/");
    jar.remove(access).remove(refresh)
}

#[derive(Default)]
struct RegisterForm {
    full_name: String,
    email: String,
    username: String,
    password: String,
    avatar: Option<UploadItem>,
    cover_image: Option<UploadItem>,
}

async fn text_part(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::validation(format!("could not read form field: {e}")))
}

async fn file_part(field: Field<'_>) -> Result<UploadItem, ApiError> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = field
        .bytes()
        .await
        .map_err(|e| ApiError::validation(format!("could not read uploaded file: {e}")))?;
    Ok(UploadItem { body, content_type })
}

/// POST /auth/register (multipart: full_name, email, username, password,
/// avatar file, optional cover_image file)
#[instrument(skip(state, multipart))]
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let mut form = RegisterForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|n| n.to_string()) else {
            continue;
        };
        match name.as_str() {
            "full_name" => form.full_name = text_part(field).await?,
            "email" => form.email = text_part(field).await?,
            "username" => form.username = text_part(field).await?,
            "password" => form.password = text_part(field).await?,
            "avatar" => form.avatar = Some(file_part(field).await?),
            "cover_image" => form.cover_image = Some(file_part(field).await?),
            _ => {}
        }
    }

    let full_name = form.full_name.trim().to_string();
    let email = form.email.trim().to_lowercase();
    let username = form.username.trim().to_lowercase();
    let password = form.password.trim().to_string();

    if full_name.is_empty() || email.is_empty() || username.is_empty() || password.is_empty() {
        warn!("registration with missing fields");
        return Err(ApiError::validation(
            "full_name, email, username and password are required",
        ));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("invalid email"));
    }

    if User::exists_with_username_or_email(&state.db, &username, &email).await? {
        warn!(username = %username, "username or email already taken");
        return Err(ApiError::conflict("username or email already registered"));
    }

    let Some(avatar) = form.avatar else {
        return Err(ApiError::validation("avatar is required"));
    };
    let avatar_url = media::store_image(&state, "avatars", avatar)
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::validation("could not store avatar")
        })?;
    let cover_image_url = match form.cover_image {
        Some(cover) => Some(media::store_image(&state, "covers", cover).await.map_err(
            |e| {
                warn!(error = %e, "cover image upload failed");
                ApiError::validation("could not store cover image")
            },
        )?),
        None => None,
    };

    // Hash once, immediately before the create that persists it.
    let password_hash = hash_password(&password)?;

    let user = User::create(
        &state.db,
        NewUser {
            username: &username,
            email: &email,
            full_name: &full_name,
            avatar_url: &avatar_url,
            cover_image_url: cover_image_url.as_deref(),
            password_hash: &password_hash,
        },
    )
    .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// POST /auth/login { username?, email?, password }
#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let username = payload
        .username
        .as_deref()
        .map(|u| u.trim().to_lowercase())
        .filter(|u| !u.is_empty());
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    let password = payload
        .password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let Some(password) = password else {
        return Err(ApiError::validation("password is required"));
    };
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation("username or email is required"));
    }

    // Unknown account and wrong password answer identically.
    let user =
        User::find_by_username_or_email(&state.db, username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| {
                warn!("login for unknown account");
                ApiError::unauthorized("invalid credentials")
            })?;

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let keys = TokenKeys::from_ref(&state);
    let access_token = keys.sign_access(&user)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    User::store_refresh_token(&state.db, user.id, &refresh_token).await?;

    info!(user_id = %user.id, "user logged in");
    let jar = with_session_cookies(jar, &keys, &access_token, &refresh_token);
    Ok((
        jar,
        Json(LoginResponse {
            user: user.into(),
            access_token,
            refresh_token,
        }),
    ))
}

/// POST /auth/refresh rotates the pair. The presented token must still
/// occupy the user's refresh slot; the conditional update makes a replay
/// of a superseded token lose even under concurrent attempts.
#[instrument(skip(state, jar, body))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<TokenPairResponse>), ApiError> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing refresh token"))?;

    let keys = TokenKeys::from_ref(&state);
    let claims = keys.verify_refresh(&presented).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        ApiError::unauthorized("invalid refresh token")
    })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "refresh for unknown user");
            ApiError::unauthorized("invalid refresh token")
        })?;

    let access_token = keys.sign_access(&user)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    let rotated =
        User::rotate_refresh_token(&state.db, user.id, &presented, &refresh_token).await?;
    if !rotated {
        warn!(user_id = %user.id, "stale refresh token presented");
        return Err(ApiError::unauthorized(
            "refresh token expired or already used",
        ));
    }

    info!(user_id = %user.id, "session refreshed");
    let jar = with_session_cookies(jar, &keys, &access_token, &refresh_token);
    Ok((
        jar,
        Json(TokenPairResponse {
            access_token,
            refresh_token,
        }),
    ))
}

/// POST /auth/logout clears the refresh slot and both cookies. Idempotent.
#[instrument(skip(state, jar, user))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    User::clear_refresh_token(&state.db, user.id).await?;
    info!(user_id = %user.id, "user logged out");
    Ok((without_session_cookies(jar), StatusCode::OK))
}

/// POST /auth/change-password { old_password, new_password }
#[instrument(skip(state, user, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let old_password = payload
        .old_password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let new_password = payload
        .new_password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let (Some(old_password), Some(new_password)) = (old_password, new_password) else {
        return Err(ApiError::validation(
            "old_password and new_password are required",
        ));
    };

    if !verify_password(old_password, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong old password");
        return Err(ApiError::unauthorized("old password does not match"));
    }

    let password_hash = hash_password(new_password)?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(StatusCode::OK)
}

/// GET /me
#[instrument(skip(user))]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}
