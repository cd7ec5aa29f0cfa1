use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::{
    auth::{repo::User, tokens::TokenKeys},
    error::ApiError,
    state::AppState,
};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Pull the access token out of the request: cookie first, then the
/// `Authorization: Bearer` header.
pub(crate) fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

/// Extractor guarding protected routes: validates the access token and
/// resolves the caller's user record. Handlers receive the full row but
/// only ever answer with the sanitized view. Never renews tokens.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = access_token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing access token"))?;

        let keys = TokenKeys::from_ref(state);
        let claims = keys.verify_access(&token).map_err(|e| {
            warn!(error = %e, "access token rejected");
            ApiError::unauthorized("invalid or expired access token")
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for unknown user");
                ApiError::unauthorized("invalid access token")
            })?;

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_is_preferred_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            access_token_from_headers(&headers).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn bearer_header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(access_token_from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn other_cookies_do_not_match() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=xyz"),
        );
        assert_eq!(access_token_from_headers(&headers), None);
    }

    #[test]
    fn non_bearer_scheme_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(access_token_from_headers(&headers), None);
    }

    #[test]
    fn empty_request_has_no_token() {
        assert_eq!(access_token_from_headers(&HeaderMap::new()), None);
    }
}
