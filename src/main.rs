//! 缺勤通知门户 - 主程序入口

use absence_notice_portal::{config::ConfigManager, server::PortalServer};
use anyhow::Context;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    init_logger();

    log::info!("🚀 Devamsızlık bildirim portalı启动中...");

    // 获取配置文件路径，文件不存在时写入默认配置
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    log::info!("📖 加载配置文件: {}", config_path);

    let config_manager = ConfigManager::new(&config_path)
        .with_context(|| format!("加载配置文件 {} 失败", config_path))?;
    let config = config_manager.get_config().clone();

    log::info!("✅ 配置验证通过");
    log::info!("🗄️  数据库路径: {}", config.database.path);
    log::info!("🔐 OTP有效期: {} 分钟，最多尝试 {} 次", config.otp.expiry_minutes, config.otp.max_attempts);
    log::info!("🌍 家长访问域名: {}", config.server.frontend_domain);

    if config.jwt.secret == absence_notice_portal::config::DEFAULT_JWT_SECRET {
        log::warn!("⚠️ 正在使用默认的会话令牌密钥，请在配置文件或 PORTAL__JWT__SECRET 中修改");
    }

    let server = PortalServer::new(config).await.context("初始化服务失败")?;

    log::info!("🎯 系统准备就绪");

    // 运行服务 (这会阻塞直到收到停止信号)
    server.run().await.context("HTTP服务异常退出")?;

    log::info!("👋 Devamsızlık bildirim portalı已停止");
    Ok(())
}

/// 初始化日志记录器
fn init_logger() {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level))
        .format_timestamp_secs()
        .init();

    log::info!("📝 日志级别: {}", log_level);
}
