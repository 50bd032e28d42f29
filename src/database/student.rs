//! 学生表操作模块

use crate::error::{AppError, Result};
use crate::types::{PageRequest, Student, StudentStatus, StudentUpdate};
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

/// 学生数据库操作
pub struct StudentRepository;

/// 列表查询公共的过滤条件，`?1` 为空时不过滤
const SEARCH_FILTER: &str = r#"
    (?1 IS NULL
        OR s.full_name LIKE ?1 ESCAPE '\'
        OR s.school_number LIKE ?1 ESCAPE '\'
        OR s.class_name LIKE ?1 ESCAPE '\')
"#;

impl StudentRepository {
    /// 创建新学生
    pub async fn create(tx: &mut Transaction<'_, Sqlite>, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, school_number, full_name, class_name, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.id)
        .bind(&student.school_number)
        .bind(&student.full_name)
        .bind(&student.class_name)
        .bind(student.status.as_str())
        .bind(student.created_at)
        .bind(student.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 通过ID查找学生
    pub async fn find_by_id(pool: &sqlx::Pool<Sqlite>, id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, school_number, full_name, class_name, status, created_at, updated_at
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(Self::row_to_student).transpose()
    }

    /// 通过学号查找学生
    pub async fn find_by_school_number(
        pool: &sqlx::Pool<Sqlite>,
        school_number: &str,
    ) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, school_number, full_name, class_name, status, created_at, updated_at
            FROM students
            WHERE school_number = ?
            "#,
        )
        .bind(school_number)
        .fetch_optional(pool)
        .await?;

        row.map(Self::row_to_student).transpose()
    }

    /// 分页查询学生，同时返回每个学生的缺勤记录数
    pub async fn list(
        pool: &sqlx::Pool<Sqlite>,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<(Student, i64)>> {
        let sql = format!(
            r#"
            SELECT s.id, s.school_number, s.full_name, s.class_name, s.status, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM absenteeism a WHERE a.student_id = s.id) AS absenteeism_count
            FROM students s
            WHERE {}
            ORDER BY s.class_name ASC, s.school_number ASC
            LIMIT ?2 OFFSET ?3
            "#,
            SEARCH_FILTER
        );

        let rows = sqlx::query(&sql)
            .bind(search.map(like_pattern))
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(pool)
            .await?;

        let mut students = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = row.get("absenteeism_count");
            students.push((Self::row_to_student(row)?, count));
        }

        Ok(students)
    }

    /// 统计符合搜索条件的学生数
    pub async fn count(pool: &sqlx::Pool<Sqlite>, search: Option<&str>) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM students s WHERE {}", SEARCH_FILTER);

        let row = sqlx::query(&sql)
            .bind(search.map(like_pattern))
            .fetch_one(pool)
            .await?;

        Ok(row.get("count"))
    }

    /// 更新学生信息（仅更新提供的字段）
    pub async fn update(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        update: &StudentUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET full_name = COALESCE(?, full_name),
                class_name = COALESCE(?, class_name),
                status = COALESCE(?, status),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.full_name.as_deref().map(str::trim))
        .bind(update.class_name.as_deref().map(str::trim))
        .bind(update.status.map(|s| s.as_str()))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除学生（缺勤记录、OTP和家长关联级联删除）
    pub async fn delete(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 批量删除学生，返回实际删除数量
    pub async fn delete_many(tx: &mut Transaction<'_, Sqlite>, ids: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM students WHERE id = ?")
                .bind(id)
                .execute(&mut **tx)
                .await?;
            deleted += result.rows_affected();
        }

        Ok(deleted)
    }

    /// 将数据库行转换为Student结构
    fn row_to_student(row: sqlx::sqlite::SqliteRow) -> Result<Student> {
        let status_str: String = row.get("status");
        let status = StudentStatus::from_str(&status_str)
            .ok_or_else(|| AppError::business("无效的学生状态"))?;

        Ok(Student {
            id: row.get("id"),
            school_number: row.get("school_number"),
            full_name: row.get("full_name"),
            class_name: row.get("class_name"),
            status,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// 将搜索词转换为LIKE模式，转义通配符
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_database;

    async fn seed(db: &crate::database::Database) -> Result<Vec<Student>> {
        let students = vec![
            Student::new("1002", "Ayşe Demir", "10-B"),
            Student::new("1001", "Ahmet Yılmaz", "9-A"),
            Student::new("1003", "Mehmet Kaya", "11-C"),
            Student::new("1000", "Zeynep Arslan", "10-B"),
        ];

        let mut tx = db.begin_transaction().await?;
        for student in &students {
            StudentRepository::create(&mut tx, student).await?;
        }
        tx.commit().await?;

        Ok(students)
    }

    #[tokio::test]
    async fn test_list_orders_by_class_then_number() -> Result<()> {
        let (db, _dir) = test_database().await?;
        seed(&db).await?;

        let page = PageRequest::new(Some(1), Some(10));
        let listed = StudentRepository::list(db.pool(), None, page).await?;
        let numbers: Vec<_> = listed.iter().map(|(s, _)| s.school_number.as_str()).collect();

        // 班级按字符串排序: "10-B" < "11-C" < "9-A"
        assert_eq!(numbers, vec!["1000", "1002", "1003", "1001"]);
        assert!(listed.iter().all(|(_, count)| *count == 0));
        assert_eq!(StudentRepository::count(db.pool(), None).await?, 4);

        db.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_search_and_paging() -> Result<()> {
        let (db, _dir) = test_database().await?;
        seed(&db).await?;

        let page = PageRequest::new(Some(1), Some(10));
        let found = StudentRepository::list(db.pool(), Some("10-b"), page).await?;
        assert_eq!(found.len(), 2);
        assert_eq!(StudentRepository::count(db.pool(), Some("10-b")).await?, 2);

        let found = StudentRepository::list(db.pool(), Some("kaya"), page).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.school_number, "1003");

        // 通配符按字面匹配
        assert_eq!(StudentRepository::count(db.pool(), Some("%")).await?, 0);

        let second = StudentRepository::list(db.pool(), None, PageRequest::new(Some(2), Some(3))).await?;
        assert_eq!(second.len(), 1);

        db.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete() -> Result<()> {
        let (db, _dir) = test_database().await?;
        let students = seed(&db).await?;
        let target = &students[0];

        let update = StudentUpdate {
            class_name: Some("11-B".to_string()),
            status: Some(StudentStatus::Inactive),
            ..Default::default()
        };
        let mut tx = db.begin_transaction().await?;
        assert!(StudentRepository::update(&mut tx, &target.id, &update).await?);
        tx.commit().await?;

        let updated = StudentRepository::find_by_id(db.pool(), &target.id).await?.unwrap();
        assert_eq!(updated.full_name, "Ayşe Demir");
        assert_eq!(updated.class_name, "11-B");
        assert_eq!(updated.status, StudentStatus::Inactive);

        let mut tx = db.begin_transaction().await?;
        let ids = vec![students[1].id.clone(), students[2].id.clone(), "missing".to_string()];
        assert_eq!(StudentRepository::delete_many(&mut tx, &ids).await?, 2);
        assert!(StudentRepository::delete(&mut tx, &target.id).await?);
        tx.commit().await?;

        assert_eq!(StudentRepository::count(db.pool(), None).await?, 1);
        assert!(StudentRepository::find_by_school_number(db.pool(), "1000").await?.is_some());

        db.close().await;
        Ok(())
    }
}
