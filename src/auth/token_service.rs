//! 会话令牌服务 - 签发和校验HS256 JWT

use crate::config::JwtConfig;
use crate::error::{AppError, Result};
use crate::types::{Claims, User};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

/// 会话令牌服务
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::hours(config.expires_in_hours),
        }
    }

    /// 为用户签发会话令牌
    pub fn issue(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// 校验令牌并返回载荷，签名错误或过期统一返回认证错误
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("会话令牌校验失败: {}", e);
                AppError::authentication("Geçersiz veya süresi dolmuş token.")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    fn jwt_config(secret: &str, hours: i64) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            expires_in_hours: hours,
        }
    }

    #[test]
    fn test_issue_and_verify() -> Result<()> {
        let service = TokenService::new(&jwt_config("secret", 8));
        let user = User::new("admin", "hash".to_string(), UserRole::Admin);

        let token = service.issue(&user)?;
        let claims = service.verify(&token)?;

        assert_eq!(claims.sub, user.id);
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 8 * 3600);
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> Result<()> {
        let issuer = TokenService::new(&jwt_config("secret-a", 8));
        let verifier = TokenService::new(&jwt_config("secret-b", 8));
        let user = User::new("veli", "hash".to_string(), UserRole::Parent);

        let token = issuer.issue(&user)?;
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected() -> Result<()> {
        // 过期时间早于默认leeway(60秒)
        let service = TokenService::new(&jwt_config("secret", -1));
        let user = User::new("admin", "hash".to_string(), UserRole::Admin);

        let token = service.issue(&user)?;
        assert!(service.verify(&token).is_err());
        assert!(service.verify("garbage").is_err());
        Ok(())
    }
}
