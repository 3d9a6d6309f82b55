use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::TokenPair;
use crate::state::AppState;
use crate::users::dto::LoginRequest;
use crate::users::password::{hash_password, verify_password};
use crate::users::repo_types::{NewUser, User};

const MIN_PASSWORD_LEN: usize = 8;

/// One uploaded image from a multipart request.
pub struct ImagePart {
    pub body: Bytes,
    pub content_type: String,
}

/// Parsed registration form: text fields plus the image parts.
#[derive(Default)]
pub struct RegisterForm {
    pub fullname: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<ImagePart>,
    pub cover_image: Option<ImagePart>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// The pre-insert uniqueness check races with concurrent writers; a unique
/// violation that slips past it must still surface as a conflict, not an
/// internal error.
fn conflict_on_unique_violation(e: anyhow::Error, message: &str) -> ApiError {
    if let Some(sqlx::Error::Database(db_err)) = e.downcast_ref::<sqlx::Error>() {
        if db_err.code().as_deref() == Some("23505") {
            return ApiError::Conflict(message.into());
        }
    }
    ApiError::Internal(e)
}

async fn upload_image(st: &AppState, folder: &str, img: &ImagePart) -> Result<String, ApiError> {
    let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
    let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
    let url = st
        .storage
        .upload(&key, img.body.clone(), &img.content_type)
        .await?;
    Ok(url)
}

/// Delete the object a profile image URL pointed at. Replacing an image
/// must not fail because cleanup of the old one did.
async fn delete_old_image(st: &AppState, url: &str) {
    if let Some(key) = st.storage.key_for_url(url) {
        if let Err(e) = st.storage.delete(&key).await {
            warn!(error = %e, key = %key, "failed to delete replaced image");
        }
    }
}

/// Register a new account. Uploads happen before the insert, so a stored
/// user row always carries an avatar URL and a password hash together.
pub async fn register_user(st: &AppState, mut form: RegisterForm) -> Result<User, ApiError> {
    form.fullname = form.fullname.trim().to_string();
    form.email = form.email.trim().to_lowercase();
    form.username = form.username.trim().to_lowercase();

    if [&form.fullname, &form.email, &form.username, &form.password]
        .iter()
        .any(|f| f.is_empty())
    {
        return Err(ApiError::Validation("All fields are required".into()));
    }
    if !is_valid_email(&form.email) {
        warn!(email = %form.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // checked before any store or upload call
    let avatar = form
        .avatar
        .as_ref()
        .ok_or_else(|| ApiError::Validation("Avatar image is required".into()))?;

    if st
        .users
        .find_by_username_or_email(Some(&form.username), Some(&form.email))
        .await?
        .is_some()
    {
        warn!(username = %form.username, "username or email already registered");
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar_url = upload_image(st, "avatars", avatar).await?;
    let cover_image_url = match &form.cover_image {
        Some(img) => Some(upload_image(st, "covers", img).await?),
        None => None,
    };

    let password_hash = hash_password(&form.password)?;
    let user = st
        .users
        .create(NewUser {
            username: &form.username,
            email: &form.email,
            fullname: &form.fullname,
            avatar_url: &avatar_url,
            cover_image_url: cover_image_url.as_deref(),
            password_hash: &password_hash,
        })
        .await
        .map_err(|e| {
            conflict_on_unique_violation(e, "User with email or username already exists")
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Verify credentials and issue a fresh token pair.
pub async fn login(st: &AppState, mut payload: LoginRequest) -> Result<(User, TokenPair), ApiError> {
    payload.username = payload.username.map(|u| u.trim().to_lowercase());
    payload.email = payload.email.map(|e| e.trim().to_lowercase());

    if payload.username.as_deref().unwrap_or("").is_empty()
        && payload.email.as_deref().unwrap_or("").is_empty()
    {
        return Err(ApiError::Validation("Username or email is required".into()));
    }

    let user = st
        .users
        .find_by_username_or_email(payload.username.as_deref(), payload.email.as_deref())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let pair = st.sessions.issue(user.id).await?;
    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok((user, pair))
}

pub async fn change_password(
    st: &AppState,
    user_id: Uuid,
    old_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if !verify_password(old_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Invalid old password".into()));
    }

    let hash = hash_password(new_password)?;
    if !st.users.update_password(user_id, &hash).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(user_id = %user_id, "password changed");
    Ok(())
}

/// Update fullname and email, returning the freshly updated record.
pub async fn update_account(
    st: &AppState,
    user_id: Uuid,
    fullname: &str,
    email: &str,
) -> Result<User, ApiError> {
    let fullname = fullname.trim();
    let email = email.trim().to_lowercase();

    if fullname.is_empty() || email.is_empty() {
        return Err(ApiError::Validation("All fields are required".into()));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }

    if let Some(existing) = st.users.find_by_username_or_email(None, Some(&email)).await? {
        if existing.id != user_id {
            return Err(ApiError::Conflict("Email already in use".into()));
        }
    }

    let user = st
        .users
        .update_profile(user_id, fullname, &email)
        .await
        .map_err(|e| conflict_on_unique_violation(e, "Email already in use"))?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    info!(user_id = %user_id, "account details updated");
    Ok(user)
}

pub async fn update_avatar(st: &AppState, user_id: Uuid, img: ImagePart) -> Result<User, ApiError> {
    let current = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let url = upload_image(st, "avatars", &img).await?;
    let user = st
        .users
        .update_avatar(user_id, &url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    delete_old_image(st, &current.avatar_url).await;
    info!(user_id = %user_id, "avatar updated");
    Ok(user)
}

pub async fn update_cover_image(
    st: &AppState,
    user_id: Uuid,
    img: ImagePart,
) -> Result<User, ApiError> {
    let current = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let url = upload_image(st, "covers", &img).await?;
    let user = st
        .users
        .update_cover_image(user_id, &url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if let Some(old) = &current.cover_image_url {
        delete_old_image(st, old).await;
    }
    info!(user_id = %user_id, "cover image updated");
    Ok(user)
}
