//! 上传文件存储模块
//!
//! 通知信保存在上传目录下，文件名为 `absenteeism-{毫秒时间戳}-{32位十六进制}{扩展名}`，
//! 数据库中只记录路径。

use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::{Path, PathBuf};

/// 允许上传的MIME类型
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["application/pdf", "image/jpeg", "image/jpg", "image/png"];

const DOWNLOAD_BASE_NAME: &str = "devamsizlik-mektubu";

/// 从请求中读取到的上传文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// 准备发送给客户端的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub download_name: String,
}

pub fn is_allowed_mime(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    ALLOWED_MIME_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(essence))
}

/// 文件扩展名（小写，不含点）
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// 按扩展名推断Content-Type
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// 下载时使用的文件名
pub fn download_name_for(path: &Path) -> String {
    let ext = extension_of(path).unwrap_or_else(|| "pdf".to_string());
    format!("{}.{}", DOWNLOAD_BASE_NAME, ext)
}

/// 保存文件使用的扩展名：优先取原文件名，其次按MIME类型
fn stored_extension(upload: &UploadedFile) -> String {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|name| extension_of(Path::new(name)))
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    if let Some(ext) = from_name {
        return format!(".{}", ext);
    }

    let essence = upload.content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "application/pdf" => ".pdf".to_string(),
        "image/png" => ".png".to_string(),
        "image/jpeg" | "image/jpg" => ".jpg".to_string(),
        _ => String::new(),
    }
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 上传文件存储
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_size: usize,
}

impl FileStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            max_size: config.max_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 确保上传目录存在
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// 检查类型和大小
    pub fn check(&self, upload: &UploadedFile) -> Result<()> {
        if !is_allowed_mime(&upload.content_type) {
            return Err(AppError::validation("Sadece PDF, JPG ve PNG dosyaları yüklenebilir."));
        }

        if upload.data.is_empty() {
            return Err(AppError::validation("Dosya yüklenmelidir (PDF, JPG veya PNG)."));
        }

        if upload.data.len() > self.max_size {
            return Err(AppError::validation(format!(
                "Dosya boyutu en fazla {} MB olabilir.",
                self.max_size / (1024 * 1024)
            )));
        }

        Ok(())
    }

    /// 检查并写入磁盘，返回保存路径
    pub async fn save(&self, upload: &UploadedFile) -> Result<String> {
        self.check(upload)?;
        self.ensure_dir().await?;

        let file_name = format!(
            "absenteeism-{}-{}{}",
            Utc::now().timestamp_millis(),
            random_suffix(),
            stored_extension(upload)
        );
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &upload.data).await?;

        log::info!("📄 已保存上传文件 {} ({} 字节)", path.display(), upload.data.len());
        Ok(path.to_string_lossy().into_owned())
    }

    /// 删除文件，文件已不存在时返回false
    pub async fn remove(&self, path: &str) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 定位磁盘上的文件
    pub async fn open(&self, path: &str) -> Result<ServedFile> {
        let path = PathBuf::from(path);
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if !exists {
            log::warn!("⚠️ 记录中的文件不存在: {}", path.display());
            return Err(AppError::not_found("Dosya bulunamadı."));
        }

        Ok(ServedFile {
            content_type: content_type_for(&path),
            download_name: download_name_for(&path),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, max_size: usize) -> FileStore {
        FileStore::new(&UploadConfig {
            dir: dir.path().join("uploads").to_string_lossy().into_owned(),
            max_size,
        })
    }

    fn upload(name: Option<&str>, content_type: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.map(str::to_string),
            content_type: content_type.to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_mime_and_names() {
        assert!(is_allowed_mime("application/pdf"));
        assert!(is_allowed_mime("image/JPEG"));
        assert!(is_allowed_mime("image/png; charset=binary"));
        assert!(!is_allowed_mime("text/plain"));

        assert_eq!(content_type_for(Path::new("a/b.PDF")), "application/pdf");
        assert_eq!(content_type_for(Path::new("b.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("b")), "application/octet-stream");
        assert_eq!(download_name_for(Path::new("x/absenteeism-1-ab.png")), "devamsizlik-mektubu.png");
        assert_eq!(download_name_for(Path::new("x/noext")), "devamsizlik-mektubu.pdf");
    }

    #[test]
    fn test_check_rejects_bad_uploads() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 8);

        let err = store.check(&upload(Some("a.txt"), "text/plain", b"abc")).unwrap_err();
        assert_eq!(err.to_string(), "Sadece PDF, JPG ve PNG dosyaları yüklenebilir.");

        assert!(store.check(&upload(Some("a.pdf"), "application/pdf", b"")).is_err());
        assert!(store.check(&upload(Some("a.pdf"), "application/pdf", b"123456789")).is_err());
        assert!(store.check(&upload(Some("a.pdf"), "application/pdf", b"12345678")).is_ok());
    }

    #[tokio::test]
    async fn test_save_open_remove() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store(&dir, 1024);

        let path = store.save(&upload(Some("Mektup.PDF"), "application/pdf", b"%PDF-1.4")).await?;
        let name = Path::new(&path).file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("absenteeism-"));
        assert!(name.ends_with(".pdf"));
        // absenteeism-{millis}-{32 hex}.pdf
        let suffix = name.trim_end_matches(".pdf").rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 32);

        let served = store.open(&path).await?;
        assert_eq!(served.content_type, "application/pdf");
        assert_eq!(served.download_name, "devamsizlik-mektubu.pdf");
        assert_eq!(tokio::fs::read(&served.path).await?, b"%PDF-1.4");

        // 没有扩展名时按MIME类型补全
        let png = store.save(&upload(None, "image/png", b"png")).await?;
        assert!(png.ends_with(".png"));

        assert!(store.remove(&path).await?);
        assert!(!store.remove(&path).await?);
        let err = store.open(&path).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        Ok(())
    }
}
