//! 业务服务模块

pub mod absenteeism_service;
pub mod file_store;
pub mod notification;
pub mod student_service;

pub use absenteeism_service::AbsenteeismService;
pub use file_store::{FileStore, ServedFile, UploadedFile};
pub use student_service::StudentService;

use crate::error::{AppError, Result};
use validator::Validate;

/// 校验请求数据，失败时返回第一条错误信息
pub fn validate_input<T: Validate>(input: &T) -> Result<()> {
    let errors = match input.validate() {
        Ok(()) => return Ok(()),
        Err(errors) => errors,
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);

    let message = fields
        .iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Geçersiz istek verisi.".to_string());

    Err(AppError::validation(message))
}
