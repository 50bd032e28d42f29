//! 缺勤记录服务模块 - 通知信上传、OTP链接生成和文件访问

use crate::auth::OtpService;
use crate::config::AppConfig;
use crate::database::{AbsenteeismRepository, Database, OtpRepository, ParentRepository, StudentRepository};
use crate::error::{AppError, Result};
use crate::services::file_store::{FileStore, ServedFile, UploadedFile};
use crate::services::{notification, validate_input};
use crate::types::{
    Absenteeism, AbsenteeismDetail, AbsenteeismListItem, AbsenteeismPage, AbsenteeismStats,
    GenerateOtpRequest, MessageData, NotificationLink, OtpCodeView, PageRequest, Pagination,
    StudentRef, StudentWithParents, WarningCount,
};
use std::sync::Arc;
use uuid::Uuid;

/// 警告次数范围
pub const MIN_WARNING_NUMBER: i64 = 1;
pub const MAX_WARNING_NUMBER: i64 = 10;

const RECORD_NOT_FOUND: &str = "Devamsızlık kaydı bulunamadı.";

/// 解析表单中的警告次数，缺失或无法解析时为1
pub fn parse_warning_number(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(MIN_WARNING_NUMBER)
}

/// 缺勤记录服务
pub struct AbsenteeismService {
    database: Database,
    config: Arc<AppConfig>,
    otp: Arc<OtpService>,
    files: FileStore,
}

impl AbsenteeismService {
    pub fn new(database: Database, config: Arc<AppConfig>, otp: Arc<OtpService>, files: FileStore) -> Self {
        Self {
            database,
            config,
            otp,
            files,
        }
    }

    /// 分页查询记录（可按学生过滤）
    pub async fn list(&self, page: PageRequest, student_id: Option<&str>) -> Result<AbsenteeismPage> {
        let student_id = student_id.map(str::trim).filter(|s| !s.is_empty());
        let pool = self.database.pool();

        let rows = AbsenteeismRepository::list(pool, student_id, page).await?;
        let total = AbsenteeismRepository::count(pool, student_id).await?;

        let records = rows
            .into_iter()
            .map(|(record, student, otp_count)| AbsenteeismListItem {
                record,
                student,
                otp_count,
            })
            .collect();

        Ok(AbsenteeismPage {
            records,
            pagination: Pagination::new(page.page, page.limit, total),
        })
    }

    /// 记录详情，包括学生家长和OTP历史
    pub async fn get(&self, id: &str) -> Result<AbsenteeismDetail> {
        let pool = self.database.pool();
        let (record, student) = self.require_with_student(id).await?;
        let parents = ParentRepository::find_by_student(pool, &record.student_id).await?;
        let otp_codes = OtpRepository::find_by_absenteeism(pool, id)
            .await?
            .iter()
            .map(|otp| otp.summary())
            .collect();

        Ok(AbsenteeismDetail {
            record,
            student: StudentWithParents { student, parents },
            otp_codes,
        })
    }

    /// 学生已有的警告次数和下一次的编号
    pub async fn warning_count(&self, student_id: &str) -> Result<WarningCount> {
        let count = AbsenteeismRepository::count(self.database.pool(), Some(student_id)).await?;
        Ok(WarningCount {
            count,
            next_warning: count + 1,
        })
    }

    /// 上传通知信并创建记录
    pub async fn create(
        &self,
        student_id: &str,
        warning_number: i64,
        upload: Option<UploadedFile>,
    ) -> Result<AbsenteeismListItem> {
        let upload = upload.ok_or_else(|| AppError::validation("Dosya yüklenmelidir (PDF, JPG veya PNG)."))?;
        self.files.check(&upload)?;

        let student_id = student_id.trim();
        if Uuid::parse_str(student_id).is_err() {
            return Err(AppError::validation("Geçersiz öğrenci ID."));
        }
        if warning_number < MIN_WARNING_NUMBER {
            return Err(AppError::validation("Uyarı numarası en az 1 olmalıdır."));
        }
        if warning_number > MAX_WARNING_NUMBER {
            return Err(AppError::validation("Uyarı numarası en fazla 10 olabilir."));
        }

        let student = StudentRepository::find_by_id(self.database.pool(), student_id)
            .await?
            .ok_or_else(|| AppError::not_found("Öğrenci bulunamadı."))?;

        let file_path = self.files.save(&upload).await?;
        let record = Absenteeism::new(&student.id, warning_number, &file_path);

        if let Err(e) = self.insert(&record).await {
            // 记录写入失败时不保留孤立文件
            if let Err(remove_err) = self.files.remove(&file_path).await {
                log::warn!("⚠️ 清理上传文件失败 {}: {}", file_path, remove_err);
            }
            return Err(e);
        }

        log::info!(
            "📨 学生 {} 的第 {} 次缺勤通知已上传",
            student.school_number,
            warning_number
        );

        Ok(AbsenteeismListItem {
            record,
            student: StudentRef {
                full_name: student.full_name,
                class_name: student.class_name,
                school_number: student.school_number,
            },
            otp_count: 0,
        })
    }

    async fn insert(&self, record: &Absenteeism) -> Result<()> {
        let mut tx = self.database.begin_transaction().await?;
        AbsenteeismRepository::create(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 为家长签发OTP并生成WhatsApp链接
    pub async fn generate_otp_and_link(&self, id: &str, request: GenerateOtpRequest) -> Result<NotificationLink> {
        validate_input(&request)?;
        let (_, student) = self.require_with_student(id).await?;

        let issue = self.otp.create_otp(id, &request.parent_phone).await?;
        let whatsapp_link = notification::whatsapp_link(
            &request.parent_phone,
            &self.config.server.frontend_domain,
            &issue.code,
            request.parent_name.as_deref(),
            Some(&issue.token),
        );

        Ok(NotificationLink {
            otp: OtpCodeView {
                code: issue.code,
                expires_at: issue.expires_at,
            },
            token: issue.token,
            whatsapp_link,
            student_name: student.full_name,
        })
    }

    /// 仪表盘统计
    pub async fn stats(&self) -> Result<AbsenteeismStats> {
        AbsenteeismRepository::get_statistics(self.database.pool()).await
    }

    /// 删除记录，先删数据库再删文件
    pub async fn delete(&self, id: &str) -> Result<MessageData> {
        let record = self.require(id).await?;

        let mut tx = self.database.begin_transaction().await?;
        AbsenteeismRepository::delete(&mut tx, id).await?;
        tx.commit().await?;

        match self.files.remove(&record.file_path).await {
            Ok(true) => {}
            Ok(false) => log::warn!("⚠️ 记录 {} 的文件已不存在: {}", id, record.file_path),
            Err(e) => log::warn!("⚠️ 删除文件 {} 失败: {}", record.file_path, e),
        }

        log::info!("🗑️ 删除缺勤记录 {}", id);
        Ok(MessageData::new("Devamsızlık kaydı başarıyla silindi."))
    }

    /// 定位记录对应的文件
    pub async fn resolve_file(&self, id: &str) -> Result<ServedFile> {
        let record = self.require(id).await?;
        self.files.open(&record.file_path).await
    }

    async fn require(&self, id: &str) -> Result<Absenteeism> {
        AbsenteeismRepository::find_by_id(self.database.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))
    }

    async fn require_with_student(&self, id: &str) -> Result<(Absenteeism, StudentRef)> {
        AbsenteeismRepository::find_with_student(self.database.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_database;
    use crate::services::StudentService;
    use crate::types::{NewStudent, ParentInput};
    use tempfile::TempDir;

    struct Fixture {
        service: AbsenteeismService,
        students: StudentService,
        otp: Arc<OtpService>,
        student_id: String,
        _dir: TempDir,
    }

    async fn setup() -> Result<Fixture> {
        let (database, dir) = test_database().await?;

        let mut config = AppConfig::default();
        config.otp.hash_cost = 4;
        config.security.password_cost = 4;
        config.upload.dir = dir.path().join("uploads").to_string_lossy().into_owned();
        config.upload.max_size = 1024;
        config.server.frontend_domain = "https://okul.example".to_string();
        let config = Arc::new(config);

        let files = FileStore::new(&config.upload);
        let students = StudentService::new(database.clone(), config.clone(), files.clone());
        let student = students
            .create(NewStudent {
                school_number: "1001".to_string(),
                full_name: "Ahmet Yılmaz".to_string(),
                class_name: "9-A".to_string(),
                parents: vec![ParentInput {
                    full_name: "Ali Yılmaz".to_string(),
                    phone: "905551234567".to_string(),
                }],
            })
            .await?;

        let otp = Arc::new(OtpService::new(database.clone(), config.clone()));

        Ok(Fixture {
            service: AbsenteeismService::new(database, config, otp.clone(), files),
            students,
            otp,
            student_id: student.student.id,
            _dir: dir,
        })
    }

    fn pdf() -> Option<UploadedFile> {
        Some(UploadedFile {
            file_name: Some("mektup.pdf".to_string()),
            content_type: "application/pdf".to_string(),
            data: b"%PDF-1.4 test".to_vec(),
        })
    }

    #[test]
    fn test_parse_warning_number() {
        assert_eq!(parse_warning_number(None), 1);
        assert_eq!(parse_warning_number(Some("abc")), 1);
        assert_eq!(parse_warning_number(Some("0")), 1);
        assert_eq!(parse_warning_number(Some(" 3 ")), 3);
        assert_eq!(parse_warning_number(Some("11")), 11);
    }

    #[tokio::test]
    async fn test_create_and_query() -> Result<()> {
        let f = setup().await?;

        let created = f.service.create(&f.student_id, 1, pdf()).await?;
        assert_eq!(created.student.full_name, "Ahmet Yılmaz");
        f.service.create(&f.student_id, 2, pdf()).await?;

        let count = f.service.warning_count(&f.student_id).await?;
        assert_eq!(count, WarningCount { count: 2, next_warning: 3 });

        let page = f.service.list(PageRequest::new(None, None), Some(&f.student_id)).await?;
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.pagination.total, 2);

        let detail = f.service.get(&created.record.id).await?;
        assert_eq!(detail.student.parents.len(), 1);
        assert!(detail.otp_codes.is_empty());

        let served = f.service.resolve_file(&created.record.id).await?;
        assert_eq!(served.content_type, "application/pdf");
        assert_eq!(served.download_name, "devamsizlik-mektubu.pdf");

        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejections() -> Result<()> {
        let f = setup().await?;

        let err = f.service.create(&f.student_id, 1, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Dosya yüklenmelidir (PDF, JPG veya PNG).");

        let text = UploadedFile {
            file_name: Some("a.txt".to_string()),
            content_type: "text/plain".to_string(),
            data: b"x".to_vec(),
        };
        let err = f.service.create(&f.student_id, 1, Some(text)).await.unwrap_err();
        assert_eq!(err.to_string(), "Sadece PDF, JPG ve PNG dosyaları yüklenebilir.");

        let err = f.service.create("not-a-uuid", 1, pdf()).await.unwrap_err();
        assert_eq!(err.to_string(), "Geçersiz öğrenci ID.");

        let err = f.service.create(&f.student_id, 11, pdf()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let missing = Uuid::new_v4().to_string();
        let err = f.service.create(&missing, 1, pdf()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // 被拒绝的上传不会留下文件
        let mut entries = tokio::fs::read_dir(f.service.files.dir()).await.ok();
        if let Some(entries) = entries.as_mut() {
            assert!(entries.next_entry().await?.is_none());
        }

        Ok(())
    }

    async fn upload_dir_is_empty(files: &FileStore) -> Result<bool> {
        let mut entries = tokio::fs::read_dir(files.dir()).await?;
        Ok(entries.next_entry().await?.is_none())
    }

    #[tokio::test]
    async fn test_student_delete_removes_letters() -> Result<()> {
        let f = setup().await?;
        let first = f.service.create(&f.student_id, 1, pdf()).await?;
        f.service.create(&f.student_id, 2, pdf()).await?;
        assert!(!upload_dir_is_empty(&f.service.files).await?);

        f.students.delete(&f.student_id).await?;

        assert!(upload_dir_is_empty(&f.service.files).await?);
        let err = f.service.get(&first.record.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_delete_removes_letters() -> Result<()> {
        let f = setup().await?;
        let other = f
            .students
            .create(NewStudent {
                school_number: "1002".to_string(),
                full_name: "Ayşe Demir".to_string(),
                class_name: "9-B".to_string(),
                parents: vec![],
            })
            .await?;

        f.service.create(&f.student_id, 1, pdf()).await?;
        f.service.create(&other.student.id, 1, pdf()).await?;

        let result = f
            .students
            .bulk_delete(&[f.student_id.clone(), other.student.id.clone()])
            .await?;
        assert_eq!(result.deleted_count, 2);
        assert!(upload_dir_is_empty(&f.service.files).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_generate_link_and_verify() -> Result<()> {
        let f = setup().await?;
        let created = f.service.create(&f.student_id, 1, pdf()).await?;

        let request = GenerateOtpRequest {
            parent_phone: "123".to_string(),
            parent_name: None,
        };
        let err = f.service.generate_otp_and_link(&created.record.id, request).await.unwrap_err();
        assert_eq!(err.to_string(), "Geçerli bir telefon numarası giriniz.");

        let request = GenerateOtpRequest {
            parent_phone: "+90 555 123 45 67".to_string(),
            parent_name: Some("Ali Yılmaz".to_string()),
        };
        let link = f.service.generate_otp_and_link(&created.record.id, request).await?;
        assert_eq!(link.student_name, "Ahmet Yılmaz");
        assert!(link.whatsapp_link.starts_with("https://wa.me/905551234567?text="));
        assert!(link
            .whatsapp_link
            .contains(&*urlencoding::encode(&format!("https://okul.example/veli/{}", link.token))));

        f.otp.verify_by_token(&link.token, &link.otp.code).await?;

        let stats = f.service.stats().await?;
        assert_eq!(stats, AbsenteeismStats { total: 1, viewed_count: 1, pending_count: 0 });

        let detail = f.service.get(&created.record.id).await?;
        assert_eq!(detail.otp_codes.len(), 1);
        assert!(detail.otp_codes[0].verified_at.is_some());

        let request = GenerateOtpRequest {
            parent_phone: "905551234567".to_string(),
            parent_name: None,
        };
        let err = f.service.generate_otp_and_link("missing", request).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_file() -> Result<()> {
        let f = setup().await?;
        let created = f.service.create(&f.student_id, 1, pdf()).await?;
        let path = created.record.file_path.clone();
        assert!(tokio::fs::try_exists(&path).await?);

        let result = f.service.delete(&created.record.id).await?;
        assert_eq!(result.message, "Devamsızlık kaydı başarıyla silindi.");
        assert!(!tokio::fs::try_exists(&path).await?);

        let err = f.service.resolve_file(&created.record.id).await.unwrap_err();
        assert_eq!(err.to_string(), RECORD_NOT_FOUND);

        // 文件已丢失时删除记录仍然成功
        let created = f.service.create(&f.student_id, 2, pdf()).await?;
        tokio::fs::remove_file(&created.record.file_path).await?;
        let err = f.service.resolve_file(&created.record.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Dosya bulunamadı.");
        f.service.delete(&created.record.id).await?;

        Ok(())
    }
}
