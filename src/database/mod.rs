//! 数据库模块

pub mod absenteeism;
pub mod otp;
pub mod parent;
pub mod student;
pub mod user;

// 重新导出数据库操作
pub use absenteeism::AbsenteeismRepository;
pub use otp::OtpRepository;
pub use parent::ParentRepository;
pub use student::StudentRepository;
pub use user::UserRepository;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// 数据库连接池类型
pub type DbPool = Pool<Sqlite>;

/// 数据库管理器
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// 初始化数据库连接
    pub async fn new(database_url: &str) -> Result<Self> {
        // 确保数据库文件所在目录存在
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // 创建连接池
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let database = Self { pool };

        // 初始化数据库表结构
        database.init_tables().await?;

        Ok(database)
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// 初始化数据库表结构
    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'ADMIN',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                school_number TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                class_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users (id) ON DELETE CASCADE,
                full_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 学生与家长多对多关系
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS student_parents (
                student_id TEXT NOT NULL REFERENCES students (id) ON DELETE CASCADE,
                parent_id TEXT NOT NULL REFERENCES parents (id) ON DELETE CASCADE,
                PRIMARY KEY (student_id, parent_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS absenteeism (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES students (id) ON DELETE CASCADE,
                warning_number INTEGER NOT NULL DEFAULT 1,
                file_path TEXT NOT NULL,
                viewed_by_parent BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS otp_codes (
                id TEXT PRIMARY KEY,
                absenteeism_id TEXT NOT NULL REFERENCES absenteeism (id) ON DELETE CASCADE,
                parent_phone TEXT NOT NULL,
                code_hash TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                expires_at DATETIME NOT NULL,
                is_used BOOLEAN NOT NULL DEFAULT 0,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                verified_at DATETIME,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 创建索引
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_students_class ON students (class_name, school_number)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_student_parents_parent ON student_parents (parent_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_absenteeism_student ON absenteeism (student_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_otp_absenteeism_phone ON otp_codes (absenteeism_id, parent_phone)")
            .execute(&self.pool)
            .await?;

        log::info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 检查数据库连接
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 关闭数据库连接
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// 开始事务
    pub async fn begin_transaction(&self) -> Result<sqlx::Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }
}

/// 判断是否为唯一约束冲突
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// 测试辅助：在临时目录中创建数据库，目录需与数据库一同存活
#[cfg(test)]
pub(crate) async fn test_database() -> Result<(Database, tempfile::TempDir)> {
    let dir = tempfile::TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.to_string_lossy());
    let database = Database::new(&db_url).await?;
    Ok((database, dir))
}
