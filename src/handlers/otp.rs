//! 家长OTP接口（无需登录）

use crate::error::Result;
use crate::handlers::JsonBody;
use crate::server::state::AppState;
use crate::services::validate_input;
use crate::types::{ApiResponse, TokenInfo, VerifiedAccess, VerifyOtpRequest};
use axum::{
    extract::{Path, State},
    Json,
};

/// POST /api/otp/verify
pub async fn verify(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<VerifiedAccess>>> {
    validate_input(&request)?;
    let access = state.otp.verify_by_token(&request.token, &request.code).await?;
    Ok(Json(ApiResponse::ok(access)))
}

/// GET /api/otp/info/{token}
pub async fn info(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<TokenInfo>>> {
    let info = state.otp.token_info(&token).await?;
    Ok(Json(ApiResponse::ok(info)))
}
