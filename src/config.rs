//! 配置管理模块
//!
//! 配置来源按优先级从低到高：内置默认值 → JSON配置文件 → `PORTAL__` 前缀的环境变量
//! （例如 `PORTAL__JWT__SECRET`、`PORTAL__SERVER__PORT`）。

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "PORTAL";

/// 默认会话令牌密钥，部署时必须修改
pub const DEFAULT_JWT_SECRET: &str = "default-secret-change-me";

/// bcrypt cost 允许范围
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// 会话有效期上限（一年）
const MAX_SESSION_HOURS: i64 = 8_760;

/// OTP有效期上限（一年）
const MAX_OTP_MINUTES: i64 = 525_600;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 会话令牌配置
    pub jwt: JwtConfig,
    /// 一次性密码配置
    pub otp: OtpConfig,
    /// 文件上传配置
    pub upload: UploadConfig,
    /// 安全相关配置
    pub security: SecurityConfig,
    /// 首次启动时创建的管理员账号
    pub bootstrap_admin: BootstrapAdminConfig,
}

/// HTTP服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许的CORS来源，逗号分隔
    pub cors_origin: String,
    /// 家长访问的前端域名，用于拼接通知链接
    pub frontend_domain: String,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

/// 一次性密码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// 有效期（分钟）
    pub expiry_minutes: i64,
    /// 最大错误尝试次数
    pub max_attempts: i64,
    /// 验证码哈希的bcrypt cost
    pub hash_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    /// 单个文件最大字节数
    pub max_size: usize,
}

/// 安全相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 用户密码的bcrypt cost
    pub password_cost: u32,
    /// 登录接口每个窗口内允许的请求数
    pub login_rate_limit: u32,
    /// OTP验证接口每个窗口内允许的请求数
    pub otp_rate_limit: u32,
    /// 限流窗口（秒）
    pub rate_limit_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub password: String,
}

impl AppConfig {
    /// 从文件加载配置（文件之上叠加环境变量）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| AppError::validation("配置文件路径不是有效的UTF-8"))?;

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::new(path_str, config::FileFormat::Json).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.is_empty() {
            return Err(AppError::validation("JWT密钥不能为空"));
        }

        if !(1..=MAX_SESSION_HOURS).contains(&self.jwt.expires_in_hours) {
            return Err(AppError::validation(format!(
                "会话有效期必须在1-{}小时之间",
                MAX_SESSION_HOURS
            )));
        }

        if self.database.path.is_empty() {
            return Err(AppError::validation("数据库路径不能为空"));
        }

        if self.server.port == 0 {
            return Err(AppError::validation("端口不能为0"));
        }

        if !(1..=MAX_OTP_MINUTES).contains(&self.otp.expiry_minutes) {
            return Err(AppError::validation(format!(
                "OTP有效期必须在1-{}分钟之间",
                MAX_OTP_MINUTES
            )));
        }

        if self.otp.max_attempts <= 0 {
            return Err(AppError::validation("OTP最大尝试次数必须大于0"));
        }

        for cost in [self.otp.hash_cost, self.security.password_cost] {
            if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
                return Err(AppError::validation(format!(
                    "bcrypt cost必须在{}-{}之间",
                    MIN_BCRYPT_COST, MAX_BCRYPT_COST
                )));
            }
        }

        if self.upload.dir.is_empty() || self.upload.max_size == 0 {
            return Err(AppError::validation("上传目录和大小限制必须配置"));
        }

        Ok(())
    }

    /// 获取数据库URL
    pub fn get_database_url(&self) -> String {
        format!("sqlite:{}", self.database.path)
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 解析CORS来源列表
    pub fn cors_origins(&self) -> Vec<String> {
        self.server
            .cors_origin
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
                cors_origin: "http://localhost:5173".to_string(),
                frontend_domain: "http://localhost:5173".to_string(),
            },
            database: DatabaseConfig {
                path: "./data/portal.db".to_string(),
            },
            jwt: JwtConfig {
                secret: DEFAULT_JWT_SECRET.to_string(),
                expires_in_hours: 8,
            },
            otp: OtpConfig {
                expiry_minutes: 1440,
                max_attempts: 3,
                hash_cost: 10,
            },
            upload: UploadConfig {
                dir: "./uploads".to_string(),
                max_size: 10 * 1024 * 1024,
            },
            security: SecurityConfig {
                password_cost: 12,
                login_rate_limit: 10,
                otp_rate_limit: 10,
                rate_limit_window_secs: 15 * 60,
            },
            bootstrap_admin: BootstrapAdminConfig {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            },
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    config_path: String,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            log::warn!("配置文件 {} 不存在，创建默认配置", config_path);

            // 创建配置文件目录
            if let Some(parent) = Path::new(config_path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            AppConfig::default().save_to_file(config_path)?;
        }

        let config = AppConfig::from_file(config_path)?;

        Ok(Self {
            config,
            config_path: config_path.to_string(),
        })
    }

    /// 获取配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 更新配置
    pub fn update_config<F>(&mut self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        updater(&mut self.config);
        self.config.validate()?;
        self.config.save_to_file(&self.config_path)?;
        Ok(())
    }

    /// 重新加载配置
    pub fn reload(&mut self) -> Result<()> {
        self.config = AppConfig::from_file(&self.config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.jwt.secret.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.otp.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.security.password_cost = 2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.otp.hash_cost = 32;
        assert!(config.validate().is_err());
        config.otp.hash_cost = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lifetime_bounds() {
        let mut config = AppConfig::default();
        config.otp.expiry_minutes = 525_600;
        config.jwt.expires_in_hours = 8_760;
        assert!(config.validate().is_ok());

        config.otp.expiry_minutes = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jwt.expires_in_hours = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.otp.expiry_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cors_origins() {
        let mut config = AppConfig::default();
        config.server.cors_origin = "https://okul.example, http://localhost:5173 ,".to_string();

        assert_eq!(
            config.cors_origins(),
            vec![
                "https://okul.example".to_string(),
                "http://localhost:5173".to_string()
            ]
        );
    }

    #[test]
    fn test_config_file_operations() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.jwt.secret = "file-secret".to_string();
        config.otp.max_attempts = 5;
        config.save_to_file(&path)?;

        let loaded = AppConfig::from_file(&path)?;
        assert_eq!(loaded.jwt.secret, "file-secret");
        assert_eq!(loaded.otp.max_attempts, 5);
        assert_eq!(loaded.upload.max_size, 10 * 1024 * 1024);

        Ok(())
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "server": { "port": 8080 } }"#)?;

        let loaded = AppConfig::from_file(&path)?;
        assert_eq!(loaded.server.port, 8080);
        assert_eq!(loaded.server.host, "0.0.0.0");
        assert_eq!(loaded.otp.expiry_minutes, 1440);

        Ok(())
    }

    #[test]
    fn test_config_manager() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("config.json");
        let path = path.to_str().unwrap();

        let mut manager = ConfigManager::new(path)?;
        assert!(Path::new(path).exists());

        manager.update_config(|config| {
            config.server.frontend_domain = "https://veli.okul.example".to_string();
        })?;
        manager.reload()?;

        assert_eq!(
            manager.get_config().server.frontend_domain,
            "https://veli.okul.example"
        );

        Ok(())
    }
}
