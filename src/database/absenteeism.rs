//! 缺勤记录表操作模块

use crate::error::Result;
use crate::types::{Absenteeism, AbsenteeismStats, AbsenteeismSummary, PageRequest, StudentRef};
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

/// 缺勤记录数据库操作
pub struct AbsenteeismRepository;

impl AbsenteeismRepository {
    /// 创建新缺勤记录
    pub async fn create(tx: &mut Transaction<'_, Sqlite>, record: &Absenteeism) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO absenteeism (id, student_id, warning_number, file_path, viewed_by_parent, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.student_id)
        .bind(record.warning_number)
        .bind(&record.file_path)
        .bind(record.viewed_by_parent)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 通过ID查找记录
    pub async fn find_by_id(pool: &sqlx::Pool<Sqlite>, id: &str) -> Result<Option<Absenteeism>> {
        let row = sqlx::query(
            r#"
            SELECT id, student_id, warning_number, file_path, viewed_by_parent, created_at, updated_at
            FROM absenteeism
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| Self::row_to_record(&row)))
    }

    /// 查找记录及其学生信息
    pub async fn find_with_student(
        pool: &sqlx::Pool<Sqlite>,
        id: &str,
    ) -> Result<Option<(Absenteeism, StudentRef)>> {
        let row = sqlx::query(
            r#"
            SELECT a.id, a.student_id, a.warning_number, a.file_path, a.viewed_by_parent, a.created_at, a.updated_at,
                   s.full_name, s.class_name, s.school_number
            FROM absenteeism a
            INNER JOIN students s ON s.id = a.student_id
            WHERE a.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| (Self::row_to_record(&row), Self::row_to_student_ref(&row))))
    }

    /// 分页查询记录，附带学生信息和OTP数量
    pub async fn list(
        pool: &sqlx::Pool<Sqlite>,
        student_id: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<(Absenteeism, StudentRef, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.student_id, a.warning_number, a.file_path, a.viewed_by_parent, a.created_at, a.updated_at,
                   s.full_name, s.class_name, s.school_number,
                   (SELECT COUNT(*) FROM otp_codes o WHERE o.absenteeism_id = a.id) AS otp_count
            FROM absenteeism a
            INNER JOIN students s ON s.id = a.student_id
            WHERE (?1 IS NULL OR a.student_id = ?1)
            ORDER BY s.class_name ASC, s.school_number ASC, a.warning_number ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(student_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    Self::row_to_record(row),
                    Self::row_to_student_ref(row),
                    row.get::<i64, _>("otp_count"),
                )
            })
            .collect())
    }

    /// 统计记录数（可按学生过滤）
    pub async fn count(pool: &sqlx::Pool<Sqlite>, student_id: Option<&str>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM absenteeism WHERE (?1 IS NULL OR student_id = ?1)",
        )
        .bind(student_id)
        .fetch_one(pool)
        .await?;

        Ok(row.get("count"))
    }

    /// 学生的缺勤记录摘要（最新的在前）
    pub async fn summaries_by_student(
        pool: &sqlx::Pool<Sqlite>,
        student_id: &str,
    ) -> Result<Vec<AbsenteeismSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, warning_number, created_at, viewed_by_parent
            FROM absenteeism
            WHERE student_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AbsenteeismSummary {
                id: row.get("id"),
                warning_number: row.get("warning_number"),
                created_at: row.get("created_at"),
                viewed_by_parent: row.get("viewed_by_parent"),
            })
            .collect())
    }

    /// 标记家长已查看
    pub async fn mark_viewed(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE absenteeism
            SET viewed_by_parent = 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除记录（OTP级联删除）
    pub async fn delete(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM absenteeism WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 学生名下所有记录的文件路径
    pub async fn file_paths_by_student(
        tx: &mut Transaction<'_, Sqlite>,
        student_id: &str,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT file_path FROM absenteeism WHERE student_id = ?")
            .bind(student_id)
            .fetch_all(&mut **tx)
            .await?;

        Ok(rows.iter().map(|row| row.get("file_path")).collect())
    }

    /// 获取记录统计信息
    pub async fn get_statistics(pool: &sqlx::Pool<Sqlite>) -> Result<AbsenteeismStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN viewed_by_parent = 1 THEN 1 ELSE 0 END), 0) AS viewed,
                COALESCE(SUM(CASE WHEN viewed_by_parent = 0 THEN 1 ELSE 0 END), 0) AS pending
            FROM absenteeism
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(AbsenteeismStats {
            total: row.get("total"),
            viewed_count: row.get("viewed"),
            pending_count: row.get("pending"),
        })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Absenteeism {
        Absenteeism {
            id: row.get("id"),
            student_id: row.get("student_id"),
            warning_number: row.get("warning_number"),
            file_path: row.get("file_path"),
            viewed_by_parent: row.get("viewed_by_parent"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_student_ref(row: &sqlx::sqlite::SqliteRow) -> StudentRef {
        StudentRef {
            full_name: row.get("full_name"),
            class_name: row.get("class_name"),
            school_number: row.get("school_number"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{test_database, Database, StudentRepository};
    use crate::types::Student;

    async fn setup(db: &Database) -> Result<(Student, Student)> {
        let first = Student::new("2001", "Elif Şahin", "9-B");
        let second = Student::new("1001", "Ahmet Yılmaz", "9-A");

        let mut tx = db.begin_transaction().await?;
        StudentRepository::create(&mut tx, &first).await?;
        StudentRepository::create(&mut tx, &second).await?;
        tx.commit().await?;

        Ok((first, second))
    }

    #[tokio::test]
    async fn test_record_crud_and_listing() -> Result<()> {
        let (db, _dir) = test_database().await?;
        let pool = db.pool();
        let (first, second) = setup(&db).await?;

        let r1 = Absenteeism::new(&first.id, 1, "uploads/a.pdf");
        let r2 = Absenteeism::new(&second.id, 1, "uploads/b.png");
        let r3 = Absenteeism::new(&second.id, 2, "uploads/c.jpg");

        let mut tx = db.begin_transaction().await?;
        for record in [&r1, &r2, &r3] {
            AbsenteeismRepository::create(&mut tx, record).await?;
        }
        tx.commit().await?;

        let page = PageRequest::new(None, None);
        let listed = AbsenteeismRepository::list(pool, None, page).await?;
        let ids: Vec<_> = listed.iter().map(|(r, _, _)| r.id.clone()).collect();
        assert_eq!(ids, vec![r2.id.clone(), r3.id.clone(), r1.id.clone()]);
        assert_eq!(listed[0].1.full_name, "Ahmet Yılmaz");
        assert_eq!(listed[0].2, 0);

        let only_second = AbsenteeismRepository::list(pool, Some(&second.id), page).await?;
        assert_eq!(only_second.len(), 2);
        assert_eq!(AbsenteeismRepository::count(pool, Some(&second.id)).await?, 2);
        assert_eq!(AbsenteeismRepository::count(pool, None).await?, 3);

        let (record, student) = AbsenteeismRepository::find_with_student(pool, &r1.id).await?.unwrap();
        assert_eq!(record.file_path, "uploads/a.pdf");
        assert_eq!(student.school_number, "2001");

        let summaries = AbsenteeismRepository::summaries_by_student(pool, &second.id).await?;
        assert_eq!(summaries.len(), 2);

        let mut tx = db.begin_transaction().await?;
        assert!(AbsenteeismRepository::delete(&mut tx, &r1.id).await?);
        tx.commit().await?;
        assert!(AbsenteeismRepository::find_by_id(pool, &r1.id).await?.is_none());

        db.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_statistics() -> Result<()> {
        let (db, _dir) = test_database().await?;
        let pool = db.pool();

        let empty = AbsenteeismRepository::get_statistics(pool).await?;
        assert_eq!(empty, AbsenteeismStats { total: 0, viewed_count: 0, pending_count: 0 });

        let (first, _) = setup(&db).await?;
        let viewed = Absenteeism::new(&first.id, 1, "uploads/a.pdf");
        let pending = Absenteeism::new(&first.id, 2, "uploads/b.pdf");

        let mut tx = db.begin_transaction().await?;
        AbsenteeismRepository::create(&mut tx, &viewed).await?;
        AbsenteeismRepository::create(&mut tx, &pending).await?;
        assert!(AbsenteeismRepository::mark_viewed(&mut tx, &viewed.id).await?);
        tx.commit().await?;

        let stats = AbsenteeismRepository::get_statistics(pool).await?;
        assert_eq!(stats, AbsenteeismStats { total: 2, viewed_count: 1, pending_count: 1 });

        db.close().await;
        Ok(())
    }
}
