//! 用户服务模块 - 处理登录、个人信息和密码修改

use crate::auth::{PasswordService, TokenService};
use crate::config::AppConfig;
use crate::database::{Database, UserRepository};
use crate::error::{AppError, Result};
use crate::types::{LoginResult, MessageData, Profile, User, UserRole, UserView};
use std::sync::Arc;

/// 登录失败时统一返回的提示，不区分用户名和密码
const INVALID_CREDENTIALS: &str = "Geçersiz kullanıcı adı veya şifre.";

/// 新密码最小长度
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// 用户服务
pub struct UserService {
    database: Database,
    config: Arc<AppConfig>,
    tokens: Arc<TokenService>,
}

impl UserService {
    /// 创建新的用户服务实例
    pub fn new(database: Database, config: Arc<AppConfig>, tokens: Arc<TokenService>) -> Self {
        Self {
            database,
            config,
            tokens,
        }
    }

    /// 用户名密码登录，成功后签发会话令牌
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let user = match UserRepository::find_by_username(self.database.pool(), username.trim()).await? {
            Some(user) => user,
            None => {
                log::warn!("🔒 登录失败，用户不存在: {}", username);
                return Err(AppError::authentication(INVALID_CREDENTIALS));
            }
        };

        if !PasswordService::verify(password, &user.password_hash).await? {
            log::warn!("🔒 登录失败，密码错误: {}", user.username);
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        }

        let token = self.tokens.issue(&user)?;
        log::info!("✅ 用户 {} ({}) 登录成功", user.username, user.role.as_str());

        Ok(LoginResult {
            token,
            user: UserView {
                id: user.id,
                username: user.username,
                role: user.role,
            },
        })
    }

    /// 获取个人信息
    pub async fn get_profile(&self, user_id: &str) -> Result<Profile> {
        let user = self.require_user(user_id).await?;

        Ok(Profile {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        })
    }

    /// 修改密码，需要提供当前密码
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<MessageData> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation("Yeni şifre en az 6 karakter olmalıdır."));
        }

        let user = self.require_user(user_id).await?;

        if !PasswordService::verify(current_password, &user.password_hash).await? {
            return Err(AppError::validation("Mevcut şifre yanlış."));
        }

        let password_hash =
            PasswordService::hash(new_password, self.config.security.password_cost).await?;

        let mut tx = self.database.begin_transaction().await?;
        UserRepository::update_password(&mut tx, &user.id, &password_hash).await?;
        tx.commit().await?;

        log::info!("🔑 用户 {} 修改了密码", user.username);
        Ok(MessageData::new("Şifre başarıyla güncellendi."))
    }

    /// 没有任何管理员时，按配置创建初始管理员
    pub async fn ensure_bootstrap_admin(&self) -> Result<Option<User>> {
        let admin_count = UserRepository::count_by_role(self.database.pool(), UserRole::Admin).await?;
        if admin_count > 0 {
            return Ok(None);
        }

        let bootstrap = &self.config.bootstrap_admin;
        if bootstrap.username.trim().is_empty() || bootstrap.password.is_empty() {
            log::warn!("⚠️ 数据库中没有管理员，且未配置初始管理员账号");
            return Ok(None);
        }

        if UserRepository::find_by_username(self.database.pool(), bootstrap.username.trim())
            .await?
            .is_some()
        {
            return Err(AppError::conflict(format!(
                "初始管理员用户名 {} 已被非管理员账号占用",
                bootstrap.username
            )));
        }

        let password_hash =
            PasswordService::hash(&bootstrap.password, self.config.security.password_cost).await?;
        let admin = User::new(bootstrap.username.trim(), password_hash, UserRole::Admin);

        let mut tx = self.database.begin_transaction().await?;
        UserRepository::create(&mut tx, &admin).await?;
        tx.commit().await?;

        log::warn!(
            "👤 已创建初始管理员 {}，请尽快登录并修改默认密码",
            admin.username
        );
        Ok(Some(admin))
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        UserRepository::find_by_id(self.database.pool(), user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Kullanıcı bulunamadı."))
    }
}
