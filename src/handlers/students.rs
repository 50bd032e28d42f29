//! 学生和家长管理接口（仅管理员）

use crate::error::Result;
use crate::handlers::{JsonBody, ListQuery};
use crate::server::extract::AdminUser;
use crate::server::state::AppState;
use crate::services::validate_input;
use crate::types::{
    ApiResponse, AssignParentRequest, BulkDeleteRequest, BulkDeleteResult, MessageData, NewStudent,
    ParentSummary, ParentUpdate, Student, StudentDetail, StudentPage, StudentUpdate,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

/// GET /api/students
pub async fn list(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<StudentPage>>> {
    let page = state
        .students
        .list(query.page_request(), query.search.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/students/{id}
pub async fn get(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StudentDetail>>> {
    Ok(Json(ApiResponse::ok(state.students.get(&id).await?)))
}

/// POST /api/students
pub async fn create(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewStudent>,
) -> Result<(StatusCode, Json<ApiResponse<StudentDetail>>)> {
    let detail = state.students.create(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(detail))))
}

/// PUT /api/students/{id}
pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<StudentUpdate>,
) -> Result<Json<ApiResponse<Student>>> {
    Ok(Json(ApiResponse::ok(state.students.update(&id, update).await?)))
}

/// DELETE /api/students/{id}
pub async fn delete(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageData>>> {
    Ok(Json(ApiResponse::ok(state.students.delete(&id).await?)))
}

/// POST /api/students/bulk-delete
pub async fn bulk_delete(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BulkDeleteRequest>,
) -> Result<Json<ApiResponse<BulkDeleteResult>>> {
    Ok(Json(ApiResponse::ok(state.students.bulk_delete(&request.ids).await?)))
}

/// POST /api/students/{id}/assign-parent
pub async fn assign_parent(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AssignParentRequest>,
) -> Result<Json<ApiResponse<StudentDetail>>> {
    validate_input(&request)?;
    let detail = state.students.assign_parent(&id, &request.parent_id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// PUT /api/students/parents/{parent_id}
pub async fn update_parent(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    JsonBody(update): JsonBody<ParentUpdate>,
) -> Result<Json<ApiResponse<ParentSummary>>> {
    let summary = state.students.update_parent(&parent_id, update).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// DELETE /api/students/{id}/parents/{parent_id}
pub async fn remove_parent(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path((id, parent_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<StudentDetail>>> {
    let detail = state.students.remove_parent(&id, &parent_id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}
