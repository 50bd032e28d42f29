//! 用户表操作模块

use crate::error::{AppError, Result};
use crate::types::{User, UserRole};
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

/// 用户数据库操作
pub struct UserRepository;

impl UserRepository {
    /// 创建新用户
    pub async fn create(tx: &mut Transaction<'_, Sqlite>, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 通过ID查找用户
    pub async fn find_by_id(pool: &sqlx::Pool<Sqlite>, id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    /// 通过用户名查找用户
    pub async fn find_by_username(
        pool: &sqlx::Pool<Sqlite>,
        username: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    /// 在事务中通过用户名查找用户（批量建档时使用）
    pub async fn find_by_username_tx(
        tx: &mut Transaction<'_, Sqlite>,
        username: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    /// 更新密码哈希
    pub async fn update_password(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 统计指定角色的用户数
    pub async fn count_by_role(pool: &sqlx::Pool<Sqlite>, role: UserRole) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE role = ?")
            .bind(role.as_str())
            .fetch_one(pool)
            .await?;

        Ok(row.get("count"))
    }

    /// 将数据库行转换为User结构
    fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<User> {
        let role_str: String = row.get("role");
        let role = UserRole::from_str(&role_str)
            .ok_or_else(|| AppError::business(format!("无效的用户角色: {}", role_str)))?;

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            role,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{is_unique_violation, test_database};

    #[tokio::test]
    async fn test_user_crud() -> Result<()> {
        let (db, _dir) = test_database().await?;
        let pool = db.pool();

        let user = User::new("admin", "hash-1".to_string(), UserRole::Admin);
        let mut tx = db.begin_transaction().await?;
        UserRepository::create(&mut tx, &user).await?;
        tx.commit().await?;

        let found = UserRepository::find_by_username(pool, "admin").await?.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, UserRole::Admin);
        assert_eq!(found.password_hash, "hash-1");

        let mut tx = db.begin_transaction().await?;
        assert!(UserRepository::update_password(&mut tx, &user.id, "hash-2").await?);
        tx.commit().await?;

        let found = UserRepository::find_by_id(pool, &user.id).await?.unwrap();
        assert_eq!(found.password_hash, "hash-2");

        assert_eq!(UserRepository::count_by_role(pool, UserRole::Admin).await?, 1);
        assert_eq!(UserRepository::count_by_role(pool, UserRole::Parent).await?, 0);
        assert!(UserRepository::find_by_username(pool, "nobody").await?.is_none());

        db.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() -> Result<()> {
        let (db, _dir) = test_database().await?;

        let mut tx = db.begin_transaction().await?;
        UserRepository::create(&mut tx, &User::new("905551234567", "h".into(), UserRole::Parent)).await?;
        let err = UserRepository::create(&mut tx, &User::new("905551234567", "h".into(), UserRole::Parent))
            .await
            .unwrap_err();
        match err {
            AppError::Database(ref e) => assert!(is_unique_violation(e)),
            other => panic!("unexpected error: {:?}", other),
        }
        drop(tx);

        db.close().await;
        Ok(())
    }
}
