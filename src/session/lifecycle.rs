use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::jwt::JwtKeys;
use crate::session::store::TokenStore;

/// Freshly signed access/refresh pair. Field names match the wire format
/// the clients expect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Owns the access/refresh token lifecycle: issuance after a password was
/// verified, stateless access checks, rotation, and revocation. Only the
/// most recently issued refresh token is honored; the stored slot on the
/// user record is the single source of truth.
#[derive(Clone)]
pub struct SessionManager {
    keys: Arc<JwtKeys>,
    store: Arc<dyn TokenStore>,
}

impl SessionManager {
    pub fn new(keys: JwtKeys, store: Arc<dyn TokenStore>) -> Self {
        Self {
            keys: Arc::new(keys),
            store,
        }
    }

    /// Mint a fresh pair for a user whose credentials were just verified.
    /// The refresh token is persisted over any prior value, so an earlier
    /// session's refresh token stops rotating from this point on.
    pub async fn issue(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        let access_token = self.keys.sign_access(user_id)?;
        let refresh_token = self.keys.sign_refresh(user_id)?;
        let stored = self.store.store_refresh_token(user_id, &refresh_token).await?;
        if !stored {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "user {user_id} does not resolve while issuing tokens"
            )));
        }
        info!(user_id = %user_id, "session issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Stateless check: signature, expiry and token kind only.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, ApiError> {
        if token.is_empty() {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }
        let claims = self.keys.verify_access(token).map_err(|e| {
            debug!(error = %e, "access token rejected");
            ApiError::Unauthorized("Invalid or expired access token".into())
        })?;
        Ok(claims.sub)
    }

    /// Exchange a valid refresh token for a brand-new pair, invalidating the
    /// consumed one. The equality check against the stored value and its
    /// replacement are one compare-and-swap, so a superseded or reused token
    /// loses cleanly even under concurrent rotations.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, ApiError> {
        if presented.is_empty() {
            return Err(ApiError::Unauthorized("Refresh token required".into()));
        }
        let claims = self.keys.verify_refresh(presented).map_err(|e| {
            debug!(error = %e, "refresh token rejected");
            ApiError::Unauthorized("Invalid or expired refresh token".into())
        })?;

        let access_token = self.keys.sign_access(claims.sub)?;
        let refresh_token = self.keys.sign_refresh(claims.sub)?;
        let swapped = self
            .store
            .swap_refresh_token(claims.sub, presented, &refresh_token)
            .await?;
        if !swapped {
            warn!(user_id = %claims.sub, "refresh token reuse or superseded token");
            return Err(ApiError::Unauthorized(
                "Refresh token is expired or already used".into(),
            ));
        }
        info!(user_id = %claims.sub, "session rotated");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Clear the stored refresh token; every previously issued refresh token
    /// for this user fails the equality check from now on.
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.store.clear_refresh_token(user_id).await?;
        info!(user_id = %user_id, "session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::session::store::MemoryTokenStore;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        }
    }

    fn make_manager() -> (SessionManager, Uuid) {
        let store = Arc::new(MemoryTokenStore::default());
        let user_id = Uuid::new_v4();
        store.add_user(user_id);
        let manager = SessionManager::new(JwtKeys::from_config(&jwt_config()), store);
        (manager, user_id)
    }

    fn unauthorized(err: &ApiError) -> bool {
        matches!(err, ApiError::Unauthorized(_))
    }

    #[tokio::test]
    async fn issue_then_verify_access_resolves_user() {
        let (manager, user_id) = make_manager();
        let pair = manager.issue(user_id).await.expect("issue");
        let resolved = manager.verify_access(&pair.access_token).expect("verify");
        assert_eq!(resolved, user_id);
    }

    #[tokio::test]
    async fn rotate_succeeds_exactly_once_per_token() {
        let (manager, user_id) = make_manager();
        let pair = manager.issue(user_id).await.expect("issue");

        let rotated = manager.rotate(&pair.refresh_token).await.expect("rotate");
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // the consumed token is now superseded
        let err = manager.rotate(&pair.refresh_token).await.unwrap_err();
        assert!(unauthorized(&err));

        // the fresh one still works
        manager.rotate(&rotated.refresh_token).await.expect("rotate fresh");
    }

    #[tokio::test]
    async fn rotate_fails_while_no_session_active() {
        let (manager, user_id) = make_manager();
        // signature-valid token, but the stored slot is absent
        let keys = JwtKeys::from_config(&jwt_config());
        let token = keys.sign_refresh(user_id).expect("sign");
        let err = manager.rotate(&token).await.unwrap_err();
        assert!(unauthorized(&err));
    }

    #[tokio::test]
    async fn revoke_invalidates_outstanding_refresh_token() {
        let (manager, user_id) = make_manager();
        let pair = manager.issue(user_id).await.expect("issue");
        manager.revoke(user_id).await.expect("revoke");

        // still cryptographically valid, but the equality check fails
        let err = manager.rotate(&pair.refresh_token).await.unwrap_err();
        assert!(unauthorized(&err));
    }

    #[tokio::test]
    async fn new_login_supersedes_previous_session() {
        let (manager, user_id) = make_manager();
        let first = manager.issue(user_id).await.expect("first login");
        let second = manager.issue(user_id).await.expect("second login");

        let err = manager.rotate(&first.refresh_token).await.unwrap_err();
        assert!(unauthorized(&err));
        manager.rotate(&second.refresh_token).await.expect("current session rotates");
    }

    #[tokio::test]
    async fn rotate_rejects_unknown_user() {
        let (manager, _) = make_manager();
        let keys = JwtKeys::from_config(&jwt_config());
        let token = keys.sign_refresh(Uuid::new_v4()).expect("sign");
        let err = manager.rotate(&token).await.unwrap_err();
        assert!(unauthorized(&err));
    }

    #[tokio::test]
    async fn rotate_rejects_forged_and_empty_tokens() {
        let (manager, user_id) = make_manager();
        manager.issue(user_id).await.expect("issue");

        let err = manager.rotate("").await.unwrap_err();
        assert!(unauthorized(&err));

        let forged = JwtKeys::from_config(&JwtConfig {
            refresh_secret: "someone-elses-secret".into(),
            ..jwt_config()
        })
        .sign_refresh(user_id)
        .expect("sign forged");
        let err = manager.rotate(&forged).await.unwrap_err();
        assert!(unauthorized(&err));
    }

    #[tokio::test]
    async fn verify_access_rejects_bad_tokens() {
        let (manager, user_id) = make_manager();
        let pair = manager.issue(user_id).await.expect("issue");

        // refresh token is not an access token
        assert!(unauthorized(&manager.verify_access(&pair.refresh_token).unwrap_err()));
        assert!(unauthorized(&manager.verify_access("").unwrap_err()));
        assert!(unauthorized(&manager.verify_access("garbage.token.here").unwrap_err()));

        let expired = JwtKeys::from_config(&jwt_config()).sign_access_expired(user_id);
        assert!(unauthorized(&manager.verify_access(&expired).unwrap_err()));

        let wrong_secret = JwtKeys::from_config(&JwtConfig {
            access_secret: "wrong".into(),
            ..jwt_config()
        })
        .sign_access(user_id)
        .expect("sign");
        assert!(unauthorized(&manager.verify_access(&wrong_secret).unwrap_err()));
    }

    #[tokio::test]
    async fn issue_fails_for_unresolvable_user() {
        let store = Arc::new(MemoryTokenStore::default());
        let manager = SessionManager::new(JwtKeys::from_config(&jwt_config()), store);
        let err = manager.issue(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
