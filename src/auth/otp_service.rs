//! OTP服务模块 - 家长访问通知信的一次性密码
//!
//! 每个OTP绑定一条缺勤记录和一个家长手机号：
//! - 4位数字验证码只在签发时以明文返回，库中仅保存bcrypt哈希
//! - 家长链接中携带8位十六进制令牌，通过令牌定位OTP
//! - 超过有效期、被新OTP取代或错误次数达到上限后不可再验证
//! - 验证成功后该令牌在有效期内可用于查看/下载文件

use crate::auth::PasswordService;
use crate::config::AppConfig;
use crate::database::{AbsenteeismRepository, Database, OtpRepository};
use crate::error::{AppError, Result};
use crate::services::notification::clean_phone;
use crate::types::{OtpCode, OtpIssue, TokenInfo, VerifiedAccess, VerifiedRecord};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

/// 验证码位数
pub const OTP_CODE_LENGTH: usize = 4;

/// 生成唯一令牌的最大重试次数
const MAX_TOKEN_ATTEMPTS: usize = 8;

const LINK_EXPIRED: &str = "Bu bağlantının süresi dolmuş.";
const RECORD_NOT_FOUND: &str = "Devamsızlık kaydı bulunamadı.";

/// 生成4位数字验证码（1000-9999）
pub fn generate_code() -> String {
    OsRng.gen_range(1000..=9999u32).to_string()
}

/// 生成8位十六进制链接令牌
pub fn generate_token() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 验证码格式检查：恰好4位数字
pub fn is_valid_code_format(code: &str) -> bool {
    code.len() == OTP_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

/// OTP服务
pub struct OtpService {
    database: Database,
    config: Arc<AppConfig>,
}

impl OtpService {
    pub fn new(database: Database, config: Arc<AppConfig>) -> Self {
        Self { database, config }
    }

    /// 为缺勤记录+家长手机号签发新的OTP，旧的未使用OTP同时作废
    pub async fn create_otp(&self, absenteeism_id: &str, parent_phone: &str) -> Result<OtpIssue> {
        let phone = clean_phone(parent_phone);
        if phone.is_empty() {
            return Err(AppError::validation("Geçerli bir telefon numarası giriniz."));
        }

        if AbsenteeismRepository::find_by_id(self.database.pool(), absenteeism_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found(RECORD_NOT_FOUND));
        }

        let code = generate_code();
        let code_hash = PasswordService::hash(&code, self.config.otp.hash_cost).await?;
        let expires_at = Utc::now() + Duration::minutes(self.config.otp.expiry_minutes);

        let mut tx = self.database.begin_transaction().await?;
        let superseded = OtpRepository::invalidate_unused(&mut tx, absenteeism_id, &phone).await?;
        let token = Self::unique_token(&mut tx).await?;
        let otp = OtpCode::new(absenteeism_id, &phone, code_hash, token.clone(), expires_at);
        OtpRepository::create(&mut tx, &otp).await?;
        tx.commit().await?;

        log::info!(
            "🔐 为记录 {} 签发OTP，令牌 {}，作废旧OTP {} 个",
            absenteeism_id,
            token,
            superseded
        );

        Ok(OtpIssue {
            code,
            expires_at,
            parent_phone: phone,
            token,
        })
    }

    /// 通过链接令牌验证家长输入的验证码
    pub async fn verify_by_token(&self, token: &str, code: &str) -> Result<VerifiedAccess> {
        if !is_valid_code_format(code) {
            return Err(AppError::validation("OTP 4 haneli olmalıdır."));
        }

        let now = Utc::now();
        let otp = match OtpRepository::find_by_token(self.database.pool(), token.trim()).await? {
            Some(otp) if otp.is_open(now) => otp,
            _ => return Err(AppError::authentication(LINK_EXPIRED)),
        };

        let max_attempts = self.config.otp.max_attempts;
        let mut tx = self.database.begin_transaction().await?;
        let claimed = OtpRepository::claim_attempt(&mut tx, &otp.id, max_attempts).await?;
        tx.commit().await?;

        let used = match claimed {
            Some(used) => used,
            None => {
                log::warn!("🚫 令牌 {} 错误次数已达上限", otp.token);
                return Err(AppError::too_many_requests(
                    "Çok fazla hatalı deneme. Lütfen okul idaresinden yeni link talep edin.",
                ));
            }
        };

        if !PasswordService::verify(code, &otp.code_hash).await? {
            let remaining = (max_attempts - used).max(0);
            log::warn!("❌ 令牌 {} 验证码错误，剩余 {} 次", otp.token, remaining);
            return Err(AppError::authentication(format!(
                "Geçersiz şifre. {} deneme hakkınız kaldı.",
                remaining
            )));
        }

        // 正确的验证码不计入错误次数
        let mut tx = self.database.begin_transaction().await?;
        OtpRepository::release_attempt(&mut tx, &otp.id).await?;
        OtpRepository::mark_verified(&mut tx, &otp.id, now).await?;
        AbsenteeismRepository::mark_viewed(&mut tx, &otp.absenteeism_id).await?;
        tx.commit().await?;

        let (record, student) =
            AbsenteeismRepository::find_with_student(self.database.pool(), &otp.absenteeism_id)
                .await?
                .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))?;

        log::info!("✅ 令牌 {} 验证成功，记录 {} 已标记为已查看", otp.token, record.id);

        Ok(VerifiedAccess {
            absenteeism: VerifiedRecord { record, student },
        })
    }

    /// 令牌状态，供家长页面展示
    pub async fn token_info(&self, token: &str) -> Result<TokenInfo> {
        let otp = OtpRepository::find_by_token(self.database.pool(), token.trim())
            .await?
            .ok_or_else(|| AppError::not_found("Geçersiz bağlantı."))?;

        let (_, student) =
            AbsenteeismRepository::find_with_student(self.database.pool(), &otp.absenteeism_id)
                .await?
                .ok_or_else(|| AppError::not_found("Geçersiz bağlantı."))?;

        Ok(TokenInfo {
            is_expired: otp.is_expired(Utc::now()),
            is_used: otp.is_used,
            is_verified: otp.is_verified(),
            student_name: student.full_name,
            class_name: student.class_name,
        })
    }

    /// 令牌是否允许访问指定记录的文件
    pub async fn authorizes_file(&self, token: &str, absenteeism_id: &str) -> Result<bool> {
        let otp = OtpRepository::find_by_token(self.database.pool(), token.trim()).await?;
        Ok(otp.map_or(false, |otp| otp.grants_file_access(absenteeism_id, Utc::now())))
    }

    async fn unique_token(tx: &mut Transaction<'_, Sqlite>) -> Result<String> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = generate_token();
            if !OtpRepository::token_exists(tx, &token).await? {
                return Ok(token);
            }
        }

        Err(AppError::Other("无法生成唯一的链接令牌".to_string()))
    }
}
