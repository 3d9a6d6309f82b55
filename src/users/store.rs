use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::session::store::TokenStore;
use crate::users::repo_types::{NewUser, User};

/// Credential store contract the account layer depends on. Records
/// returned here are full rows; sanitization happens in the DTO layer.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn create(&self, new: NewUser<'_>) -> anyhow::Result<User>;

    /// Update fullname and email, returning the fresh record.
    async fn update_profile(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;

    async fn update_avatar(&self, id: Uuid, url: &str) -> anyhow::Result<Option<User>>;

    async fn update_cover_image(&self, id: Uuid, url: &str) -> anyhow::Result<Option<User>>;
}

/// In-memory credential store for unit tests. Like the Postgres
/// implementation it also backs the session `TokenStore`, since the
/// refresh token slot lives on the user record.
#[derive(Default)]
pub struct MemoryUserStore {
    users: std::sync::Mutex<std::collections::HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        let found = users.values().find(|u| {
            username.is_some_and(|name| u.username == name)
                || email.is_some_and(|mail| u.email == mail)
        });
        Ok(found.cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, new: NewUser<'_>) -> anyhow::Result<User> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username.to_string(),
            email: new.email.to_string(),
            fullname: new.fullname.to_string(),
            avatar_url: new.avatar_url.to_string(),
            cover_image_url: new.cover_image_url.map(str::to_string),
            password_hash: new.password_hash.to_string(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|u| {
            u.fullname = fullname.to_string();
            u.email = email.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&id)
            .map(|u| u.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn update_avatar(&self, id: Uuid, url: &str) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|u| {
            u.avatar_url = url.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_cover_image(&self, id: Uuid, url: &str) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|u| {
            u.cover_image_url = Some(url.to_string());
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }
}

#[async_trait]
impl TokenStore for MemoryUserStore {
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&user_id)
            .map(|u| u.refresh_token = Some(token.to_string()))
            .is_some())
    }

    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user_id) {
            Some(u) if u.refresh_token.as_deref() == Some(current) => {
                u.refresh_token = Some(next.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(u) = users.get_mut(&user_id) {
            u.refresh_token = None;
        }
        Ok(())
    }
}
