//! 缺勤记录接口和通知信文件访问

use crate::error::{AppError, Result};
use crate::handlers::{JsonBody, ListQuery};
use crate::server::extract::{extract_bearer_token, AdminUser};
use crate::server::state::AppState;
use crate::services::absenteeism_service::parse_warning_number;
use crate::services::UploadedFile;
use crate::types::{
    AbsenteeismDetail, AbsenteeismListItem, AbsenteeismPage, AbsenteeismStats, ApiResponse,
    GenerateOtpRequest, MessageData, NotificationLink, WarningCount,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

/// 上传表单中的文件字段名
const FILE_FIELD: &str = "pdf";

/// GET /api/absenteeism/stats
pub async fn stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AbsenteeismStats>>> {
    Ok(Json(ApiResponse::ok(state.absenteeism.stats().await?)))
}

/// GET /api/absenteeism
pub async fn list(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<AbsenteeismPage>>> {
    let page = state
        .absenteeism
        .list(query.page_request(), query.student_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/absenteeism/warning-count/{student_id}
pub async fn warning_count(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<ApiResponse<WarningCount>>> {
    Ok(Json(ApiResponse::ok(state.absenteeism.warning_count(&student_id).await?)))
}

/// GET /api/absenteeism/{id}
pub async fn get(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AbsenteeismDetail>>> {
    Ok(Json(ApiResponse::ok(state.absenteeism.get(&id).await?)))
}

/// POST /api/absenteeism（multipart: pdf, studentId, warningNumber）
pub async fn create(
    _admin: AdminUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<AbsenteeismListItem>>)> {
    let max_size = state.config.upload.max_size;
    let mut student_id = String::new();
    let mut warning_number = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_size))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| upload_error(e, max_size))?;
                upload = Some(UploadedFile {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            "studentId" => {
                student_id = field.text().await.map_err(|e| upload_error(e, max_size))?;
            }
            "warningNumber" => {
                warning_number = Some(field.text().await.map_err(|e| upload_error(e, max_size))?);
            }
            _ => {}
        }
    }

    let record = state
        .absenteeism
        .create(&student_id, parse_warning_number(warning_number.as_deref()), upload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

/// 请求体超过限制时给出文件大小提示
fn upload_error(err: MultipartError, max_size: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation(format!(
            "Dosya boyutu en fazla {} MB olabilir.",
            max_size / (1024 * 1024)
        ))
    } else {
        err.into()
    }
}

/// POST /api/absenteeism/{id}/generate-otp
pub async fn generate_otp(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<GenerateOtpRequest>,
) -> Result<Json<ApiResponse<NotificationLink>>> {
    let link = state.absenteeism.generate_otp_and_link(&id, request).await?;
    Ok(Json(ApiResponse::ok(link)))
}

/// DELETE /api/absenteeism/{id}
pub async fn delete(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageData>>> {
    Ok(Json(ApiResponse::ok(state.absenteeism.delete(&id).await?)))
}

/// 文件访问凭据：管理员会话令牌或家长OTP令牌
#[derive(Debug, Default, Deserialize)]
pub struct FileAccessQuery {
    pub jwt: Option<String>,
    pub token: Option<String>,
}

/// 管理员令牌（请求头或 ?jwt=）或已验证的OTP令牌（?token=）均可访问文件
async fn authorize_file(
    state: &AppState,
    headers: &HeaderMap,
    query: &FileAccessQuery,
    id: &str,
) -> Result<()> {
    let admin_tokens = extract_bearer_token(headers)
        .into_iter()
        .chain(query.jwt.as_deref().filter(|t| !t.is_empty()));

    for token in admin_tokens {
        if let Ok(claims) = state.tokens.verify(token) {
            if claims.is_admin() {
                return Ok(());
            }
        }
    }

    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        if state.otp.authorizes_file(token, id).await? {
            return Ok(());
        }
    }

    log::warn!("🚫 拒绝访问记录 {} 的文件", id);
    Err(AppError::permission("Bu dosyaya erişim yetkiniz yok."))
}

async fn serve_file(
    state: &AppState,
    headers: &HeaderMap,
    query: &FileAccessQuery,
    id: &str,
    disposition: &str,
) -> Result<Response> {
    authorize_file(state, headers, query, id).await?;

    let served = state.absenteeism.resolve_file(id).await?;
    let data = tokio::fs::read(&served.path).await?;

    let headers = [
        (header::CONTENT_TYPE, served.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("{}; filename=\"{}\"", disposition, served.download_name),
        ),
    ];

    Ok((headers, data).into_response())
}

/// GET /api/absenteeism/{id}/pdf
pub async fn view_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FileAccessQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    serve_file(&state, &headers, &query, &id, "inline").await
}

/// GET /api/absenteeism/{id}/pdf/download
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FileAccessQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    serve_file(&state, &headers, &query, &id, "attachment").await
}
