//! Devamsızlık bildirim portalı（缺勤通知门户）
//!
//! 学校向家长分发缺勤通知信的HTTP服务，支持：
//! - 管理员登录（会话令牌）和学生/家长登记
//! - 上传通知信（PDF/JPG/PNG）
//! - 生成4位OTP和家长专属链接，通过WhatsApp发送
//! - 家长凭链接令牌和OTP查看或下载通知信
//! - SQLite数据库存储

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod server;
pub mod services;
pub mod types;

// 重新导出常用类型
pub use config::{AppConfig, ConfigManager};
pub use database::Database;
pub use error::{AppError, Result};
pub use server::{AppState, PortalServer};
pub use types::{Claims, StudentStatus, UserRole};
