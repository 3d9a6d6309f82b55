use axum::async_trait;
use uuid::Uuid;

/// Narrow view of the credential store that the session lifecycle needs:
/// the single `refresh_token` slot on each user record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Unconditionally set the stored refresh token, superseding any prior
    /// session. Returns `false` when the user id does not resolve.
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> anyhow::Result<bool>;

    /// Atomically replace `current` with `next`. Returns `false` when the
    /// user id does not resolve, the slot is empty, or the stored value is
    /// not exactly `current` — the caller must treat all three as a rejected
    /// rotation.
    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> anyhow::Result<bool>;

    /// Clear the stored refresh token so outstanding tokens stop matching.
    async fn clear_refresh_token(&self, user_id: Uuid) -> anyhow::Result<()>;
}

/// In-memory store used by `AppState::fake()` and unit tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    slots: std::sync::Mutex<std::collections::HashMap<Uuid, Option<String>>>,
}

impl MemoryTokenStore {
    /// Register a user id so token operations against it resolve.
    pub fn add_user(&self, user_id: Uuid) {
        self.slots.lock().unwrap().insert(user_id, None);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> anyhow::Result<bool> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(&user_id) {
            Some(slot) => {
                *slot = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(&user_id) {
            Some(slot) if slot.as_deref() == Some(current) => {
                *slot = Some(next.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(&user_id) {
            *slot = None;
        }
        Ok(())
    }
}
