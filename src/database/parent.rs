//! 家长表及学生-家长关联操作模块

use crate::error::Result;
use crate::types::{Parent, ParentSummary, ParentUpdate};
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

/// 家长数据库操作
pub struct ParentRepository;

impl ParentRepository {
    /// 创建新家长
    pub async fn create(tx: &mut Transaction<'_, Sqlite>, parent: &Parent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO parents (id, user_id, full_name, phone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&parent.id)
        .bind(&parent.user_id)
        .bind(&parent.full_name)
        .bind(&parent.phone)
        .bind(parent.created_at)
        .bind(parent.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 通过ID查找家长
    pub async fn find_by_id(pool: &sqlx::Pool<Sqlite>, id: &str) -> Result<Option<Parent>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, full_name, phone, created_at, updated_at
            FROM parents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Self::row_to_parent))
    }

    /// 在事务中通过登录账号查找家长
    pub async fn find_by_user_id_tx(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> Result<Option<Parent>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, full_name, phone, created_at, updated_at
            FROM parents
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(Self::row_to_parent))
    }

    /// 更新家长信息（仅更新提供的字段）
    pub async fn update(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        update: &ParentUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE parents
            SET full_name = COALESCE(?, full_name),
                phone = COALESCE(?, phone),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.full_name.as_deref().map(str::trim))
        .bind(update.phone.as_deref().map(str::trim))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 关联学生与家长（已关联时忽略）
    pub async fn link(
        tx: &mut Transaction<'_, Sqlite>,
        student_id: &str,
        parent_id: &str,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO student_parents (student_id, parent_id) VALUES (?, ?)")
            .bind(student_id)
            .bind(parent_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// 解除学生与家长的关联
    pub async fn unlink(
        tx: &mut Transaction<'_, Sqlite>,
        student_id: &str,
        parent_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM student_parents WHERE student_id = ? AND parent_id = ?")
            .bind(student_id)
            .bind(parent_id)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 检查学生与家长是否已关联
    pub async fn is_linked(
        pool: &sqlx::Pool<Sqlite>,
        student_id: &str,
        parent_id: &str,
    ) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM student_parents WHERE student_id = ? AND parent_id = ? LIMIT 1")
            .bind(student_id)
            .bind(parent_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.is_some())
    }

    /// 获取学生的所有家长
    pub async fn find_by_student(
        pool: &sqlx::Pool<Sqlite>,
        student_id: &str,
    ) -> Result<Vec<ParentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.full_name, p.phone
            FROM parents p
            INNER JOIN student_parents sp ON sp.parent_id = p.id
            WHERE sp.student_id = ?
            ORDER BY p.full_name ASC
            "#,
        )
        .bind(student_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ParentSummary {
                id: row.get("id"),
                full_name: row.get("full_name"),
                phone: row.get("phone"),
            })
            .collect())
    }

    fn row_to_parent(row: sqlx::sqlite::SqliteRow) -> Parent {
        Parent {
            id: row.get("id"),
            user_id: row.get("user_id"),
            full_name: row.get("full_name"),
            phone: row.get("phone"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
