//! 错误处理模块

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("UUID错误: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("哈希错误: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("会话令牌错误: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("上传错误: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    Business(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("其他错误: {0}")]
    Other(String),
}

impl AppError {
    /// 创建业务逻辑错误
    pub fn business<T: Into<String>>(msg: T) -> Self {
        Self::Business(msg.into())
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// 创建认证错误
    pub fn authentication<T: Into<String>>(msg: T) -> Self {
        Self::Authentication(msg.into())
    }

    /// 创建权限错误
    pub fn permission<T: Into<String>>(msg: T) -> Self {
        Self::Permission(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn too_many_requests<T: Into<String>>(msg: T) -> Self {
        Self::TooManyRequests(msg.into())
    }

    /// 对应的HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Business(_) | AppError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Permission(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的消息；内部错误不暴露细节
    pub fn client_message(&self) -> String {
        match self {
            AppError::Multipart(_) => "Dosya yükleme isteği okunamadı.".to_string(),
            _ if self.status_code().is_server_error() => "Sunucu hatası.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("❌ 请求处理失败: {}", self);
        }

        let body = serde_json::json!({
            "success": false,
            "message": self.client_message(),
        });

        (status, Json(body)).into_response()
    }
}

/// 应用程序Result类型
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::authentication("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::permission("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::too_many_requests("x").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Other("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        assert_eq!(err.client_message(), "Sunucu hatası.");

        let err = AppError::not_found("Öğrenci bulunamadı.");
        assert_eq!(err.client_message(), "Öğrenci bulunamadı.");
    }
}
