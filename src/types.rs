//! 系统类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 生成新的实体ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// 用户角色枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    /// 学校管理员
    Admin,
    /// 家长
    Parent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Parent => "PARENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(UserRole::Admin),
            "PARENT" => Some(UserRole::Parent),
            _ => None,
        }
    }
}

/// 学生状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudentStatus {
    Active,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "ACTIVE",
            StudentStatus::Inactive => "INACTIVE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(StudentStatus::Active),
            "INACTIVE" => Some(StudentStatus::Inactive),
            _ => None,
        }
    }
}

/// 用户表实体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// bcrypt哈希，不对外输出
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 学生表实体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    /// 学号（唯一）
    pub school_number: String,
    pub full_name: String,
    /// 班级，例如 "9-A"
    pub class_name: String,
    pub status: StudentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn new(school_number: &str, full_name: &str, class_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            school_number: school_number.trim().to_string(),
            full_name: full_name.trim().to_string(),
            class_name: class_name.trim().to_string(),
            status: StudentStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 家长表实体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: String,
    /// 关联的登录账号
    pub user_id: String,
    pub full_name: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Parent {
    pub fn new(user_id: &str, full_name: &str, phone: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            full_name: full_name.to_string(),
            phone: phone.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> ParentSummary {
        ParentSummary {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// 家长简要信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSummary {
    pub id: String,
    pub full_name: String,
    pub phone: String,
}

/// 缺勤记录（通知信）实体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Absenteeism {
    pub id: String,
    pub student_id: String,
    /// 第几次警告（1-10）
    pub warning_number: i64,
    /// 上传文件在磁盘上的路径
    #[serde(rename = "pdfPath")]
    pub file_path: String,
    /// 家长是否已通过OTP查看
    pub viewed_by_parent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Absenteeism {
    pub fn new(student_id: &str, warning_number: i64, file_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            student_id: student_id.to_string(),
            warning_number,
            file_path: file_path.to_string(),
            viewed_by_parent: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 缺勤记录摘要（学生详情中使用）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenteeismSummary {
    pub id: String,
    pub warning_number: i64,
    pub created_at: DateTime<Utc>,
    pub viewed_by_parent: bool,
}

/// OTP表实体
#[derive(Debug, Clone)]
pub struct OtpCode {
    pub id: String,
    pub absenteeism_id: String,
    pub parent_phone: String,
    /// 验证码的bcrypt哈希，明文只在签发时返回一次
    pub code_hash: String,
    /// 链接令牌（8位十六进制）
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// 被同一记录+手机号的新OTP取代后置为true
    pub is_used: bool,
    pub attempt_count: i64,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpCode {
    pub fn new(
        absenteeism_id: &str,
        parent_phone: &str,
        code_hash: String,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            absenteeism_id: absenteeism_id.to_string(),
            parent_phone: parent_phone.to_string(),
            code_hash,
            token,
            expires_at,
            is_used: false,
            attempt_count: 0,
            verified_at: None,
            created_at: Utc::now(),
        }
    }

    /// 是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// 链接是否仍可用于验证（未过期且未被取代）
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired(now)
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// 该令牌能否访问指定缺勤记录的文件
    pub fn grants_file_access(&self, absenteeism_id: &str, now: DateTime<Utc>) -> bool {
        self.absenteeism_id == absenteeism_id && self.is_open(now) && self.is_verified()
    }

    pub fn summary(&self) -> OtpSummary {
        OtpSummary {
            id: self.id.clone(),
            parent_phone: self.parent_phone.clone(),
            is_used: self.is_used,
            expires_at: self.expires_at,
            attempt_count: self.attempt_count,
            verified_at: self.verified_at,
            created_at: self.created_at,
        }
    }
}

/// OTP历史（不含哈希和令牌）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSummary {
    pub id: String,
    pub parent_phone: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: i64,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 会话令牌载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub sub: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// 分页信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// 分页参数（page从1开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 2000;
    /// 保证 (page - 1) * limit 不溢出
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_LIMIT;

    /// 非法或缺失的参数回退到默认值
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1).min(Self::MAX_PAGE);
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// 统一的成功响应包装
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// 仅含提示信息的响应数据
#[derive(Debug, Clone, Serialize)]
pub struct MessageData {
    pub message: String,
}

impl MessageData {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// 学生/家长登记输入
// ---------------------------------------------------------------------------

/// 新建学生时附带的家长
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInput {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
}

/// 新建学生
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    #[validate(length(min = 1, message = "Okul numarası gereklidir."))]
    pub school_number: String,
    #[validate(length(min = 1, message = "Ad soyad gereklidir."))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Sınıf gereklidir."))]
    pub class_name: String,
    #[serde(default)]
    pub parents: Vec<ParentInput>,
}

/// 更新学生
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    #[validate(length(min = 1, message = "Ad soyad boş olamaz."))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, message = "Sınıf boş olamaz."))]
    pub class_name: Option<String>,
    pub status: Option<StudentStatus>,
}

/// 更新家长
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ParentUpdate {
    #[validate(length(min = 1, message = "Veli adı boş olamaz."))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, message = "Telefon boş olamaz."))]
    pub phone: Option<String>,
}

/// 批量删除学生
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// 批量删除结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResult {
    pub message: String,
    pub deleted_count: u64,
}

/// 为学生关联已有家长
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignParentRequest {
    #[validate(length(min = 1, message = "Veli ID gereklidir."))]
    pub parent_id: String,
}

/// 生成OTP和通知链接
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOtpRequest {
    #[validate(length(min = 10, message = "Geçerli bir telefon numarası giriniz."))]
    pub parent_phone: String,
    #[serde(default)]
    pub parent_name: Option<String>,
}

/// 家长提交的OTP验证
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, message = "Geçersiz bağlantı."))]
    pub token: String,
    #[validate(length(equal = 4, message = "OTP 4 haneli olmalıdır."))]
    pub code: String,
}

/// 登录请求
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Kullanıcı adı gereklidir."))]
    pub username: String,
    #[validate(length(min = 1, message = "Şifre gereklidir."))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Mevcut şifre gereklidir."))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Yeni şifre en az 6 karakter olmalıdır."))]
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// 组合视图
// ---------------------------------------------------------------------------

/// 学生列表项
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListItem {
    #[serde(flatten)]
    pub student: Student,
    pub parents: Vec<ParentSummary>,
    pub absenteeism_count: i64,
}

/// 学生详情
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    #[serde(flatten)]
    pub student: Student,
    pub parents: Vec<ParentSummary>,
    pub absenteeisms: Vec<AbsenteeismSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPage {
    pub students: Vec<StudentListItem>,
    pub pagination: Pagination,
}

/// 缺勤记录中附带的学生信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub full_name: String,
    pub class_name: String,
    pub school_number: String,
}

/// 缺勤记录列表项
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenteeismListItem {
    #[serde(flatten)]
    pub record: Absenteeism,
    pub student: StudentRef,
    pub otp_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenteeismPage {
    pub records: Vec<AbsenteeismListItem>,
    pub pagination: Pagination,
}

/// 缺勤记录详情中的学生信息（含家长）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithParents {
    #[serde(flatten)]
    pub student: StudentRef,
    pub parents: Vec<ParentSummary>,
}

/// 缺勤记录详情
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenteeismDetail {
    #[serde(flatten)]
    pub record: Absenteeism,
    pub student: StudentWithParents,
    pub otp_codes: Vec<OtpSummary>,
}

/// 仪表盘统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenteeismStats {
    pub total: i64,
    pub viewed_count: i64,
    pub pending_count: i64,
}

/// 学生警告次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningCount {
    pub count: i64,
    pub next_warning: i64,
}

// ---------------------------------------------------------------------------
// OTP相关视图
// ---------------------------------------------------------------------------

/// 签发OTP的结果，明文验证码只出现在这里
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssue {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub parent_phone: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpCodeView {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// 生成OTP和WhatsApp链接的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLink {
    pub otp: OtpCodeView,
    pub token: String,
    pub whatsapp_link: String,
    pub student_name: String,
}

/// 令牌状态（家长页面展示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub is_expired: bool,
    pub is_used: bool,
    pub is_verified: bool,
    pub student_name: String,
    pub class_name: String,
}

/// OTP验证成功后返回给家长的记录
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRecord {
    #[serde(flatten)]
    pub record: Absenteeism,
    pub student: StudentRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAccess {
    pub absenteeism: VerifiedRecord,
}

// ---------------------------------------------------------------------------
// 认证相关视图
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub role: UserRole,
}

/// 登录结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn otp(expires_in: Duration) -> OtpCode {
        OtpCode::new(
            "record-1",
            "905551234567",
            "hash".to_string(),
            "a1b2c3d4".to_string(),
            Utc::now() + expires_in,
        )
    }

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Admin, UserRole::Parent] {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::from_str("admin"), None);
        assert_eq!(StudentStatus::from_str("INACTIVE"), Some(StudentStatus::Inactive));
    }

    #[test]
    fn test_otp_file_access_requires_verification() {
        let now = Utc::now();
        let mut code = otp(Duration::hours(1));

        assert!(code.is_open(now));
        assert!(!code.grants_file_access("record-1", now));

        code.verified_at = Some(now);
        assert!(code.grants_file_access("record-1", now));
        assert!(!code.grants_file_access("record-2", now));

        code.is_used = true;
        assert!(!code.grants_file_access("record-1", now));
    }

    #[test]
    fn test_otp_expiry_boundary() {
        let code = otp(Duration::minutes(5));
        assert!(!code.is_expired(Utc::now()));
        assert!(code.is_expired(code.expires_at));
        assert!(code.is_expired(code.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_pagination() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(2, 20, 41).total_pages, 3);
    }

    #[test]
    fn test_page_request_defaults() {
        let req = PageRequest::new(None, None);
        assert_eq!(req, PageRequest { page: 1, limit: 20 });

        let req = PageRequest::new(Some(0), Some(-5));
        assert_eq!(req, PageRequest { page: 1, limit: 20 });

        let req = PageRequest::new(Some(3), Some(50));
        assert_eq!(req.offset(), 100);

        assert_eq!(PageRequest::new(None, Some(100_000)).limit, PageRequest::MAX_LIMIT);

        let req = PageRequest::new(Some(i64::MAX), Some(i64::MAX));
        assert_eq!(req.page, PageRequest::MAX_PAGE);
        assert!(req.offset() >= 0);
    }

    #[test]
    fn test_user_hash_is_not_serialized() {
        let user = User::new("admin", "$2b$04$secret".to_string(), UserRole::Admin);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "ADMIN");
    }
}
