use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tower_cookies::{Cookie, Cookies};
use tracing::instrument;

use crate::{
    error::ApiError,
    response::ApiResponse,
    session::{AuthUser, TokenPair, ACCESS_COOKIE, REFRESH_COOKIE},
    state::AppState,
    users::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, PublicUser, RefreshRequest,
            UpdateAccountRequest,
        },
        services::{self, ImagePart, RegisterForm},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB, image uploads
}

// --- cookie channel ---

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .build()
}

fn set_session_cookies(cookies: &Cookies, pair: &TokenPair) {
    cookies.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone()));
    cookies.add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone()));
}

fn clear_session_cookies(cookies: &Cookies) {
    cookies.remove(session_cookie(ACCESS_COOKIE, String::new()));
    cookies.remove(session_cookie(REFRESH_COOKIE, String::new()));
}

// --- multipart helpers ---

fn multipart_err(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {e}"))
}

/// Read one image part; an empty file is treated as not provided.
async fn image_part(field: Field<'_>) -> Result<Option<ImagePart>, ApiError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let body = field.bytes().await.map_err(multipart_err)?;
    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImagePart { body, content_type }))
}

async fn parse_register_form(multipart: &mut Multipart) -> Result<RegisterForm, ApiError> {
    let mut form = RegisterForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "fullname" => form.fullname = field.text().await.map_err(multipart_err)?,
            "email" => form.email = field.text().await.map_err(multipart_err)?,
            "username" => form.username = field.text().await.map_err(multipart_err)?,
            "password" => form.password = field.text().await.map_err(multipart_err)?,
            "avatar" => form.avatar = image_part(field).await?,
            "coverImage" => form.cover_image = image_part(field).await?,
            _ => {}
        }
    }
    Ok(form)
}

/// Pull a single named file out of a multipart body.
async fn single_image_part(multipart: &mut Multipart, name: &str) -> Result<ImagePart, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() == Some(name) {
            if let Some(img) = image_part(field).await? {
                return Ok(img);
            }
        }
    }
    Err(ApiError::Validation(format!("{name} file is required")))
}

// --- handlers ---

#[instrument(skip(state, multipart))]
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), ApiError> {
    let form = parse_register_form(&mut multipart).await?;
    let user = services::register_user(&state, form).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            user.into(),
            "User registered successfully",
        )),
    ))
}

#[instrument(skip(state, cookies, payload))]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let (user, pair) = services::login(&state, payload).await?;
    set_session_cookies(&cookies, &pair);
    Ok(Json(ApiResponse::ok(
        AuthResponse::new(user, pair),
        "User logged in successfully",
    )))
}

#[instrument(skip(state, cookies))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    cookies: Cookies,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state.sessions.revoke(user_id).await?;
    clear_session_cookies(&cookies);
    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "User logged out successfully",
    )))
}

#[instrument(skip(state, cookies, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<ApiResponse<TokenPair>>, ApiError> {
    let presented = cookies
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| payload.and_then(|Json(p)| p.refresh_token))
        .ok_or_else(|| ApiError::Unauthorized("Refresh token required".into()))?;

    let pair = state.sessions.rotate(&presented).await?;
    set_session_cookies(&cookies, &pair);
    Ok(Json(ApiResponse::ok(pair, "Access token refreshed")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    services::change_password(&state, user_id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(ApiResponse::ok(
        user.into(),
        "Current user fetched successfully",
    )))
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user =
        services::update_account(&state, user_id, &payload.fullname, &payload.email).await?;
    Ok(Json(ApiResponse::ok(
        user.into(),
        "Account details updated successfully",
    )))
}

#[instrument(skip(state, multipart))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let img = single_image_part(&mut multipart, "avatar").await?;
    let user = services::update_avatar(&state, user_id, img).await?;
    Ok(Json(ApiResponse::ok(
        user.into(),
        "Avatar updated successfully",
    )))
}

#[instrument(skip(state, multipart))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let img = single_image_part(&mut multipart, "coverImage").await?;
    let user = services::update_cover_image(&state, user_id, img).await?;
    Ok(Json(ApiResponse::ok(
        user.into(),
        "Cover image updated successfully",
    )))
}
