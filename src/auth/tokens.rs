use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::repo::User, config::TokenConfig, state::AppState};

/// Access-token payload. Carries enough identity for stateless
/// authorization; resolved against the store by the extractor anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Refresh-token payload: user id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Signing/verification material for both token families. Built once from
/// config and injected; never read from ambient state.
#[derive(Clone)]
pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.tokens)
    }
}

impl TokenKeys {
    pub fn from_config(cfg: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_days as u64) * 24 * 60 * 60),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn timestamps(&self, ttl: Duration) -> (usize, usize) {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        let (iat, exp) = self.timestamps(self.access_ttl);
        let claims = AccessClaims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        debug!(user_id = %user.id, "access token signed");
        Ok(token)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        let (iat, exp) = self.timestamps(self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user_id,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        debug!(user_id = %user_id, "refresh token signed");
        Ok(token)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &self.validation())?;
        debug!(user_id = %data.claims.sub, "access token verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<RefreshClaims> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation())?;
        debug!(user_id = %data.claims.sub, "refresh token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 10,
        }
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "a@x.com".into(),
            full_name: "Ann".into(),
            avatar_url: "https://cdn.fake.local/avatars/a.png".into(),
            cover_image_url: None,
            password_hash: "hash".into(),
            refresh_token: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn access_token_roundtrip() {
        let keys = TokenKeys::from_config(&test_config());
        let user = test_user();
        let token = keys.sign_access(&user).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify access");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "ann");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn refresh_token_roundtrip() {
        let keys = TokenKeys::from_config(&test_config());
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn pair_encodes_the_same_user() {
        let keys = TokenKeys::from_config(&test_config());
        let user = test_user();
        let access = keys.sign_access(&user).unwrap();
        let refresh = keys.sign_refresh(user.id).unwrap();
        assert_eq!(
            keys.verify_access(&access).unwrap().sub,
            keys.verify_refresh(&refresh).unwrap().sub
        );
    }

    #[test]
    fn secrets_are_independent() {
        let keys = TokenKeys::from_config(&test_config());
        let user = test_user();
        let refresh = keys.sign_refresh(user.id).unwrap();
        // A refresh token must not pass access verification, and vice versa.
        assert!(keys.verify_access(&refresh).is_err());
        let access = keys.sign_access(&user).unwrap();
        assert!(keys.verify_refresh(&access).is_err());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let keys = TokenKeys::from_config(&test_config());
        let mut other = test_config();
        other.access_secret = "some-other-secret".into();
        let forged = TokenKeys::from_config(&other)
            .sign_access(&test_user())
            .unwrap();
        assert!(keys.verify_access(&forged).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = test_config();
        let keys = TokenKeys::from_config(&cfg);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            username: "ann".into(),
            email: "a@x.com".into(),
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
            iss: cfg.issuer.clone(),
            aud: cfg.audience.clone(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(cfg.access_secret.as_bytes()),
        )
        .unwrap();
        assert!(keys.verify_access(&token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        let keys = TokenKeys::from_config(&test_config());
        assert!(keys.verify_access("not-a-jwt").is_err());
        assert!(keys.verify_refresh("").is_err());
    }
}
