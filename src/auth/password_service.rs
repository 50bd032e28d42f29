//! 密码服务模块 - bcrypt哈希与校验
//!
//! 用户登录密码和OTP验证码都只以bcrypt哈希形式落库。
//! 哈希计算放在阻塞线程池中执行，避免占用异步运行时。

use crate::error::{AppError, Result};

/// 密码服务
pub struct PasswordService;

impl PasswordService {
    /// 计算bcrypt哈希
    pub async fn hash(plain: &str, cost: u32) -> Result<String> {
        let plain = plain.to_string();
        tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|e| AppError::Other(format!("哈希任务异常退出: {}", e)))?
            .map_err(AppError::from)
    }

    /// 校验明文与哈希是否匹配，哈希格式损坏时视为不匹配
    pub async fn verify(plain: &str, hash: &str) -> Result<bool> {
        let plain = plain.to_string();
        let hash = hash.to_string();
        let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
            .await
            .map_err(|e| AppError::Other(format!("哈希任务异常退出: {}", e)))?;

        match outcome {
            Ok(matched) => Ok(matched),
            Err(e) => {
                log::warn!("⚠️ 无法解析存储的密码哈希: {}", e);
                Ok(false)
            }
        }
    }

    /// 家长账号的初始密码：手机号后6位
    pub fn initial_parent_password(phone: &str) -> String {
        let chars: Vec<char> = phone.trim().chars().collect();
        let start = chars.len().saturating_sub(6);
        chars[start..].iter().collect()
    }
}
