//! 学生服务模块 - 学生和家长的登记管理

use crate::auth::PasswordService;
use crate::config::AppConfig;
use crate::database::{
    is_unique_violation, AbsenteeismRepository, Database, ParentRepository, StudentRepository,
    UserRepository,
};
use crate::error::{AppError, Result};
use crate::services::{validate_input, FileStore};
use crate::types::{
    BulkDeleteResult, MessageData, NewStudent, PageRequest, Pagination, Parent, ParentInput,
    ParentSummary, ParentUpdate, Student, StudentDetail, StudentListItem, StudentPage,
    StudentUpdate, User, UserRole,
};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

const STUDENT_NOT_FOUND: &str = "Öğrenci bulunamadı.";
const PARENT_NOT_FOUND: &str = "Veli bulunamadı.";
const DUPLICATE_SCHOOL_NUMBER: &str = "Bu okul numarası zaten kayıtlı.";

/// 学生服务
pub struct StudentService {
    database: Database,
    config: Arc<AppConfig>,
    files: FileStore,
}

impl StudentService {
    pub fn new(database: Database, config: Arc<AppConfig>, files: FileStore) -> Self {
        Self {
            database,
            config,
            files,
        }
    }

    /// 分页查询学生（可按姓名、学号、班级搜索）
    pub async fn list(&self, page: PageRequest, search: Option<&str>) -> Result<StudentPage> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let pool = self.database.pool();

        let rows = StudentRepository::list(pool, search, page).await?;
        let total = StudentRepository::count(pool, search).await?;

        let mut students = Vec::with_capacity(rows.len());
        for (student, absenteeism_count) in rows {
            let parents = ParentRepository::find_by_student(pool, &student.id).await?;
            students.push(StudentListItem {
                student,
                parents,
                absenteeism_count,
            });
        }

        Ok(StudentPage {
            students,
            pagination: Pagination::new(page.page, page.limit, total),
        })
    }

    /// 学生详情（家长和缺勤记录）
    pub async fn get(&self, id: &str) -> Result<StudentDetail> {
        let pool = self.database.pool();
        let student = self.require_student(id).await?;
        let parents = ParentRepository::find_by_student(pool, id).await?;
        let absenteeisms = AbsenteeismRepository::summaries_by_student(pool, id).await?;

        Ok(StudentDetail {
            student,
            parents,
            absenteeisms,
        })
    }

    /// 新建学生，同时登记附带的家长
    pub async fn create(&self, input: NewStudent) -> Result<StudentDetail> {
        validate_input(&input)?;

        let school_number = input.school_number.trim();
        if StudentRepository::find_by_school_number(self.database.pool(), school_number)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(DUPLICATE_SCHOOL_NUMBER));
        }

        let student = Student::new(school_number, &input.full_name, &input.class_name);

        let mut tx = self.database.begin_transaction().await?;
        if let Err(e) = StudentRepository::create(&mut tx, &student).await {
            return Err(match e {
                AppError::Database(ref db_err) if is_unique_violation(db_err) => {
                    AppError::conflict(DUPLICATE_SCHOOL_NUMBER)
                }
                other => other,
            });
        }

        let mut linked = 0;
        for parent_input in &input.parents {
            if parent_input.full_name.trim().is_empty() || parent_input.phone.trim().is_empty() {
                continue;
            }
            let parent = self.upsert_parent(&mut tx, parent_input).await?;
            ParentRepository::link(&mut tx, &student.id, &parent.id).await?;
            linked += 1;
        }
        tx.commit().await?;

        log::info!(
            "🎓 新建学生 {} {} ({})，关联家长 {} 位",
            student.school_number,
            student.full_name,
            student.class_name,
            linked
        );

        self.get(&student.id).await
    }

    /// 按家长手机号查找或创建登录账号和家长资料
    async fn upsert_parent(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        input: &ParentInput,
    ) -> Result<Parent> {
        let phone = input.phone.trim();
        let full_name = input.full_name.trim();

        let user = match UserRepository::find_by_username_tx(tx, phone).await? {
            Some(user) if user.role == UserRole::Parent => user,
            Some(_) => {
                return Err(AppError::conflict(format!(
                    "{} kullanıcı adı başka bir hesap tarafından kullanılıyor.",
                    phone
                )))
            }
            None => {
                let initial = PasswordService::initial_parent_password(phone);
                let hash = PasswordService::hash(&initial, self.config.security.password_cost).await?;
                let user = User::new(phone, hash, UserRole::Parent);
                UserRepository::create(tx, &user).await?;
                user
            }
        };

        match ParentRepository::find_by_user_id_tx(tx, &user.id).await? {
            Some(mut parent) => {
                let update = ParentUpdate {
                    full_name: Some(full_name.to_string()),
                    phone: Some(phone.to_string()),
                };
                ParentRepository::update(tx, &parent.id, &update).await?;
                parent.full_name = full_name.to_string();
                parent.phone = phone.to_string();
                Ok(parent)
            }
            None => {
                let parent = Parent::new(&user.id, full_name, phone);
                ParentRepository::create(tx, &parent).await?;
                Ok(parent)
            }
        }
    }

    /// 更新学生信息
    pub async fn update(&self, id: &str, update: StudentUpdate) -> Result<Student> {
        validate_input(&update)?;
        self.require_student(id).await?;

        let mut tx = self.database.begin_transaction().await?;
        StudentRepository::update(&mut tx, id, &update).await?;
        tx.commit().await?;

        self.require_student(id).await
    }

    /// 删除学生（缺勤记录和OTP级联删除）
    pub async fn delete(&self, id: &str) -> Result<MessageData> {
        let student = self.require_student(id).await?;

        let mut tx = self.database.begin_transaction().await?;
        let files = AbsenteeismRepository::file_paths_by_student(&mut tx, id).await?;
        StudentRepository::delete(&mut tx, id).await?;
        tx.commit().await?;

        self.remove_files(&files).await;
        log::info!("🗑️ 删除学生 {} {}", student.school_number, student.full_name);
        Ok(MessageData::new("Öğrenci başarıyla silindi."))
    }

    /// 批量删除学生，不存在的ID忽略
    pub async fn bulk_delete(&self, ids: &[String]) -> Result<BulkDeleteResult> {
        if ids.is_empty() {
            return Err(AppError::validation("Silinecek öğrenci seçilmedi."));
        }

        let mut tx = self.database.begin_transaction().await?;
        let mut files = Vec::new();
        for id in ids {
            files.extend(AbsenteeismRepository::file_paths_by_student(&mut tx, id).await?);
        }
        let deleted_count = StudentRepository::delete_many(&mut tx, ids).await?;
        tx.commit().await?;

        self.remove_files(&files).await;

        log::info!("🗑️ 批量删除学生 {} 个（请求 {} 个）", deleted_count, ids.len());
        Ok(BulkDeleteResult {
            message: format!("{} öğrenci başarıyla silindi.", deleted_count),
            deleted_count,
        })
    }

    /// 删除级联记录留下的通知信文件
    async fn remove_files(&self, paths: &[String]) {
        for path in paths {
            match self.files.remove(path).await {
                Ok(true) => {}
                Ok(false) => log::warn!("⚠️ 文件已不存在: {}", path),
                Err(e) => log::warn!("⚠️ 删除文件 {} 失败: {}", path, e),
            }
        }
    }

    /// 为学生关联已有家长
    pub async fn assign_parent(&self, student_id: &str, parent_id: &str) -> Result<StudentDetail> {
        self.require_student(student_id).await?;
        self.require_parent(parent_id).await?;

        let mut tx = self.database.begin_transaction().await?;
        ParentRepository::link(&mut tx, student_id, parent_id).await?;
        tx.commit().await?;

        self.get(student_id).await
    }

    /// 更新家长姓名或手机号
    pub async fn update_parent(&self, parent_id: &str, update: ParentUpdate) -> Result<ParentSummary> {
        validate_input(&update)?;
        self.require_parent(parent_id).await?;

        let mut tx = self.database.begin_transaction().await?;
        ParentRepository::update(&mut tx, parent_id, &update).await?;
        tx.commit().await?;

        Ok(self.require_parent(parent_id).await?.summary())
    }

    /// 解除学生与家长的关联
    pub async fn remove_parent(&self, student_id: &str, parent_id: &str) -> Result<StudentDetail> {
        self.require_student(student_id).await?;

        if !ParentRepository::is_linked(self.database.pool(), student_id, parent_id).await? {
            return Err(AppError::validation("Bu veli öğrenciye bağlı değil."));
        }

        let mut tx = self.database.begin_transaction().await?;
        ParentRepository::unlink(&mut tx, student_id, parent_id).await?;
        tx.commit().await?;

        self.get(student_id).await
    }

    async fn require_student(&self, id: &str) -> Result<Student> {
        StudentRepository::find_by_id(self.database.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found(STUDENT_NOT_FOUND))
    }

    async fn require_parent(&self, id: &str) -> Result<Parent> {
        ParentRepository::find_by_id(self.database.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found(PARENT_NOT_FOUND))
    }
}
