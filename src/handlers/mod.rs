//! HTTP请求处理器模块

pub mod absenteeism;
pub mod auth;
pub mod health;
pub mod otp;
pub mod students;

use crate::error::AppError;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// JSON请求体，解析失败时返回统一格式的400
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                log::debug!("请求体解析失败: {}", rejection.body_text());
                Err(AppError::validation("Geçersiz istek verisi."))
            }
        }
    }
}

/// 列表查询参数，数字无法解析时使用默认值
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub student_id: Option<String>,
}

impl ListQuery {
    pub fn page_request(&self) -> crate::types::PageRequest {
        crate::types::PageRequest::new(parse_number(&self.page), parse_number(&self.limit))
    }
}

fn parse_number(raw: &Option<String>) -> Option<i64> {
    raw.as_deref().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageRequest;

    #[test]
    fn test_list_query_defaults() {
        let query = ListQuery {
            page: Some("abc".to_string()),
            limit: Some(" 50 ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.page_request(), PageRequest { page: 1, limit: 50 });
        assert_eq!(ListQuery::default().page_request(), PageRequest::new(None, None));
    }
}
