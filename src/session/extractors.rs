use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Extracts and validates the access token, returning the user ID.
/// Accepts a bearer `Authorization` header or the `accessToken` cookie.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(|t| t.to_string());

        let token = match bearer {
            Some(t) => t,
            None => Cookies::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|cookies| cookies.get(ACCESS_COOKIE).map(|c| c.value().to_string()))
                .ok_or_else(|| ApiError::Unauthorized("Access token required".into()))?,
        };

        let user_id = state.sessions.verify_access(&token)?;
        Ok(AuthUser(user_id))
    }
}
