//! 认证和授权模块

pub mod otp_service;
pub mod password_service;
pub mod token_service;
pub mod user_service;

// 重新导出主要组件
pub use otp_service::OtpService;
pub use password_service::PasswordService;
pub use token_service::TokenService;
pub use user_service::UserService;
