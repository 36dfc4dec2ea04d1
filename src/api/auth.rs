//! Sign-in, sign-out and self-service account endpoints.

use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::Identity;
use crate::services::{AuthError, LoginOutcome, Profile, Registration, RequestContext};

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound => Self::NotFound("User not found".to_string()),
            AuthError::Validation(errors) => Self::validation(errors.join(" ")),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::internal(msg),
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .register(
            Registration {
                email: payload.email,
                password: payload.password,
                first_name: payload.first_name,
                last_name: payload.last_name,
                phone_number: payload.phone_number,
            },
            &ctx,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Registration successful",
    ))))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Invalid email or password"));
    }

    let outcome = state
        .auth_service()
        .login(payload.email.trim(), &payload.password, &ctx)
        .await?;

    let identity = match outcome {
        LoginOutcome::Success(identity) => identity,
        LoginOutcome::LockedOut => {
            metrics::counter!("auth_logins_total", "outcome" => "locked_out").increment(1);
            return Err(ApiError::validation("Account is locked out"));
        }
        LoginOutcome::Failed => {
            metrics::counter!("auth_logins_total", "outcome" => "failed").increment(1);
            return Err(ApiError::validation("Invalid email or password"));
        }
    };

    let (_, cookie) = state
        .cookies()
        .issue(&identity.id, payload.remember_me, Utc::now())?;

    metrics::counter!("auth_logins_total", "outcome" => "success").increment(1);
    tracing::info!(user_id = %identity.id, "User signed in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(MessageResponse::new("Login successful"))),
    ))
}

/// POST /api/auth/logout
///
/// Always succeeds; without a session there is nothing to audit.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: Option<CurrentUser>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth_service()
        .logout(caller.as_ref().map(|c| &c.identity), &ctx)
        .await;

    let cookie = state.cookies().clear()?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(MessageResponse::new("Logout successful"))),
    ))
}

/// GET /api/auth/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
) -> Result<Json<ApiResponse<Profile>>, ApiError> {
    let profile = state.auth_service().get_profile(caller.id()).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<Identity>>, ApiError> {
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }

    let identity = state
        .auth_service()
        .update_profile(
            caller.id(),
            payload.first_name,
            payload.last_name,
            payload.phone_number,
            &ctx,
        )
        .await?;

    Ok(Json(ApiResponse::success(identity)))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .change_password(
            caller.id(),
            &payload.current_password,
            &payload.new_password,
            &ctx,
        )
        .await?;

    tracing::info!(user_id = %caller.id(), "Password changed");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password changed successfully",
    ))))
}

/// DELETE /api/auth/account
///
/// Deactivates the caller and clears its cookie.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth_service()
        .deactivate(caller.id(), caller.id(), &ctx)
        .await?;

    let cookie = state.cookies().clear()?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(MessageResponse::new(
            "Account deactivated",
        ))),
    ))
}
