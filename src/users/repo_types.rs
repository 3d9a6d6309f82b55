use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                         // unique user ID
    pub username: String,                 // unique handle, stored lowercase
    pub email: String,                    // unique email, stored lowercase
    pub fullname: String,                 // display name
    pub avatar_url: String,               // always present after creation
    pub cover_image_url: Option<String>,  // optional banner
    #[serde(skip_serializing)]
    pub password_hash: String,            // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,    // current session token, not exposed
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields required to insert a new user.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub fullname: &'a str,
    pub avatar_url: &'a str,
    pub cover_image_url: Option<&'a str>,
    pub password_hash: &'a str,
}
