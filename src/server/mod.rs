//! HTTP服务主体

pub mod extract;
pub mod rate_limit;
pub mod state;

pub use state::AppState;

use crate::auth::UserService;
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::{AppError, Result};
use crate::handlers::{absenteeism, auth, health, otp, students};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// 上传请求中除文件外其他字段的余量
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// 组装所有路由
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route(
            "/login",
            post(auth::login).route_layer(middleware::from_fn_with_state(
                state.login_limiter.clone(),
                rate_limit::rate_limit,
            )),
        )
        .route("/profile", get(auth::profile))
        .route("/change-password", put(auth::change_password));

    let student_routes = Router::new()
        .route("/", get(students::list).post(students::create))
        .route("/bulk-delete", post(students::bulk_delete))
        .route("/parents/{parent_id}", put(students::update_parent))
        .route(
            "/{id}",
            get(students::get).put(students::update).delete(students::delete),
        )
        .route("/{id}/assign-parent", post(students::assign_parent))
        .route("/{id}/parents/{parent_id}", axum::routing::delete(students::remove_parent));

    let absenteeism_routes = Router::new()
        .route("/stats", get(absenteeism::stats))
        .route("/", get(absenteeism::list).post(absenteeism::create))
        .route("/warning-count/{student_id}", get(absenteeism::warning_count))
        .route("/{id}", get(absenteeism::get).delete(absenteeism::delete))
        .route("/{id}/generate-otp", post(absenteeism::generate_otp))
        .route("/{id}/pdf", get(absenteeism::view_file))
        .route("/{id}/pdf/download", get(absenteeism::download_file))
        .layer(DefaultBodyLimit::max(
            state.config.upload.max_size + MULTIPART_OVERHEAD,
        ));

    let otp_routes = Router::new()
        .route(
            "/verify",
            post(otp::verify).route_layer(middleware::from_fn_with_state(
                state.otp_limiter.clone(),
                rate_limit::rate_limit,
            )),
        )
        .route("/info/{token}", get(otp::info));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/students", student_routes)
        .nest("/api/absenteeism", absenteeism_routes)
        .nest("/api/otp", otp_routes)
        .layer(cors_layer(&state.config))
        .with_state(state)
}

/// 按配置的来源列表构建CORS
///
/// 允许携带凭据时不能返回 `*`，配置为 `*` 时改为回显请求的来源。
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let configured = config.cors_origins();
    let allow_origin = if configured.iter().any(|origin| origin == "*") {
        log::warn!("⚠️ CORS来源配置为 *，将接受任意来源");
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(parse_origins(&configured))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

/// 解析来源列表，跳过无效的值
fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("⚠️ 忽略无效的CORS来源: {}", origin);
                None
            }
        })
        .collect()
}

/// 缺勤通知门户服务
pub struct PortalServer {
    state: AppState,
}

impl PortalServer {
    /// 连接数据库、准备上传目录并创建初始管理员
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = Database::new(&config.get_database_url()).await?;
        log::info!("🗄️ 数据库连接成功: {}", config.database.path);

        tokio::fs::create_dir_all(&config.upload.dir).await?;
        log::info!("📁 上传目录: {}", config.upload.dir);

        let state = AppState::new(database, config);
        bootstrap_admin(&state.users).await?;

        Ok(Self { state })
    }

    /// 运行服务，直到收到停止信号
    pub async fn run(self) -> Result<()> {
        let address = self.state.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| AppError::business(format!("无法监听地址 {}: {}", address, e)))?;
        log::info!("🌐 HTTP服务已启动: http://{}", address);

        let database = self.state.database.clone();
        let app = router(self.state);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        database.close().await;
        log::info!("HTTP服务已停止");
        Ok(())
    }
}

async fn bootstrap_admin(users: &UserService) -> Result<()> {
    if let Some(admin) = users.ensure_bootstrap_admin().await? {
        log::info!("👤 初始管理员账号: {}", admin.username);
    }
    Ok(())
}

/// 等待SIGINT/SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("无法监听Ctrl+C信号: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("无法监听SIGTERM信号: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("收到SIGINT信号，开始优雅关闭..."),
        _ = terminate => log::info!("收到SIGTERM信号，开始优雅关闭..."),
    }
}
