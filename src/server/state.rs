//! 服务共享状态

use crate::auth::{OtpService, TokenService, UserService};
use crate::config::AppConfig;
use crate::database::Database;
use crate::server::rate_limit::RateLimiter;
use crate::services::{AbsenteeismService, FileStore, StudentService};
use std::sync::Arc;
use std::time::Duration;

/// 各处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub tokens: Arc<TokenService>,
    pub users: Arc<UserService>,
    pub students: Arc<StudentService>,
    pub absenteeism: Arc<AbsenteeismService>,
    pub otp: Arc<OtpService>,
    pub login_limiter: Arc<RateLimiter>,
    pub otp_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(database: Database, config: AppConfig) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenService::new(&config.jwt));
        let otp = Arc::new(OtpService::new(database.clone(), config.clone()));
        let files = FileStore::new(&config.upload);

        let users = Arc::new(UserService::new(database.clone(), config.clone(), tokens.clone()));
        let students = Arc::new(StudentService::new(
            database.clone(),
            config.clone(),
            files.clone(),
        ));
        let absenteeism = Arc::new(AbsenteeismService::new(
            database.clone(),
            config.clone(),
            otp.clone(),
            files,
        ));

        let window = Duration::from_secs(config.security.rate_limit_window_secs);
        let login_limiter = Arc::new(RateLimiter::new(
            config.security.login_rate_limit,
            window,
            "Çok fazla giriş denemesi. Lütfen 15 dakika sonra tekrar deneyin.",
        ));
        let otp_limiter = Arc::new(RateLimiter::new(
            config.security.otp_rate_limit,
            window,
            "Çok fazla OTP denemesi. Lütfen 15 dakika sonra tekrar deneyin.",
        ));

        Self {
            config,
            database,
            tokens,
            users,
            students,
            absenteeism,
            otp,
            login_limiter,
            otp_limiter,
        }
    }
}
