//! OTP表操作模块

use crate::error::Result;
use crate::types::OtpCode;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};

/// OTP数据库操作
pub struct OtpRepository;

impl OtpRepository {
    /// 创建新OTP
    pub async fn create(tx: &mut Transaction<'_, Sqlite>, otp: &OtpCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_codes (id, absenteeism_id, parent_phone, code_hash, token, expires_at,
                                   is_used, attempt_count, verified_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&otp.id)
        .bind(&otp.absenteeism_id)
        .bind(&otp.parent_phone)
        .bind(&otp.code_hash)
        .bind(&otp.token)
        .bind(otp.expires_at)
        .bind(otp.is_used)
        .bind(otp.attempt_count)
        .bind(otp.verified_at)
        .bind(otp.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 通过链接令牌查找OTP
    pub async fn find_by_token(pool: &sqlx::Pool<Sqlite>, token: &str) -> Result<Option<OtpCode>> {
        let row = sqlx::query(
            r#"
            SELECT id, absenteeism_id, parent_phone, code_hash, token, expires_at,
                   is_used, attempt_count, verified_at, created_at
            FROM otp_codes
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Self::row_to_otp))
    }

    /// 检查令牌是否已存在
    pub async fn token_exists(tx: &mut Transaction<'_, Sqlite>, token: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM otp_codes WHERE token = ? LIMIT 1")
            .bind(token)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row.is_some())
    }

    /// 作废同一记录+手机号下所有未使用的OTP
    pub async fn invalidate_unused(
        tx: &mut Transaction<'_, Sqlite>,
        absenteeism_id: &str,
        parent_phone: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE otp_codes
            SET is_used = 1
            WHERE absenteeism_id = ? AND parent_phone = ? AND is_used = 0
            "#,
        )
        .bind(absenteeism_id)
        .bind(parent_phone)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 占用一次尝试机会，已达上限时返回 None
    ///
    /// 计数在比对验证码之前原子地增加，并发请求不会超过上限。
    pub async fn claim_attempt(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        max_attempts: i64,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            UPDATE otp_codes
            SET attempt_count = attempt_count + 1
            WHERE id = ? AND attempt_count < ?
            RETURNING attempt_count
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|row| row.get("attempt_count")))
    }

    /// 归还一次尝试机会（验证码正确时）
    pub async fn release_attempt(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE otp_codes SET attempt_count = MAX(attempt_count - 1, 0) WHERE id = ?",
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 记录验证成功时间（只记录第一次）
    pub async fn mark_verified(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE otp_codes SET verified_at = COALESCE(verified_at, ?) WHERE id = ?",
        )
        .bind(verified_at)
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 获取记录的OTP历史（最新的在前）
    pub async fn find_by_absenteeism(
        pool: &sqlx::Pool<Sqlite>,
        absenteeism_id: &str,
    ) -> Result<Vec<OtpCode>> {
        let rows = sqlx::query(
            r#"
            SELECT id, absenteeism_id, parent_phone, code_hash, token, expires_at,
                   is_used, attempt_count, verified_at, created_at
            FROM otp_codes
            WHERE absenteeism_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(absenteeism_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Self::row_to_otp).collect())
    }

    fn row_to_otp(row: sqlx::sqlite::SqliteRow) -> OtpCode {
        OtpCode {
            id: row.get("id"),
            absenteeism_id: row.get("absenteeism_id"),
            parent_phone: row.get("parent_phone"),
            code_hash: row.get("code_hash"),
            token: row.get("token"),
            expires_at: row.get("expires_at"),
            is_used: row.get("is_used"),
            attempt_count: row.get("attempt_count"),
            verified_at: row.get("verified_at"),
            created_at: row.get("created_at"),
        }
    }
}
