//! 登录和账号接口

use crate::error::Result;
use crate::handlers::JsonBody;
use crate::server::extract::AuthUser;
use crate::server::state::AppState;
use crate::services::validate_input;
use crate::types::{ApiResponse, ChangePasswordRequest, LoginRequest, LoginResult, MessageData, Profile};
use axum::{extract::State, Json};

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResult>>> {
    validate_input(&request)?;
    let result = state.users.login(&request.username, &request.password).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /api/auth/profile
pub async fn profile(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Profile>>> {
    let profile = state.users.get_profile(&claims.sub).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// PUT /api/auth/change-password
pub async fn change_password(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageData>>> {
    validate_input(&request)?;
    let result = state
        .users
        .change_password(&claims.sub, &request.current_password, &request.new_password)
        .await?;
    Ok(Json(ApiResponse::ok(result)))
}
