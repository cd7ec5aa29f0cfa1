use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::User;

/// Login accepts either identifier; at least one must be supplied.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body form of the refresh call; the cookie takes precedence when both
/// are present.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

/// Response for login: sanitized user plus the pair, mirrored in cookies.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Public part of the user returned to clients. Password hash and the
/// refresh slot never appear here.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar_url: user.avatar_url,
            cover_image_url: user.cover_image_url,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_strips_credentials() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "a@x.com".into(),
            full_name: "Ann".into(),
            avatar_url: "https://cdn.fake.local/avatars/a.png".into(),
            cover_image_url: Some("https://cdn.fake.local/covers/c.png".into()),
            password_hash: "$argon2id$secret".into(),
            refresh_token: Some("live-token".into()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("\"username\":\"ann\""));
        assert!(!json.contains("password"));
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("live-token"));
    }

    #[test]
    fn login_request_accepts_either_identifier() {
        let by_name: LoginRequest =
            serde_json::from_str(r#"{"username":"ann","password":"p1"}"#).unwrap();
        assert_eq!(by_name.username.as_deref(), Some("ann"));
        assert!(by_name.email.is_none());

        let by_email: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"p1"}"#).unwrap();
        assert!(by_email.username.is_none());
        assert_eq!(by_email.email.as_deref(), Some("a@x.com"));
    }
}
