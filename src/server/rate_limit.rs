//! 按客户端IP的固定窗口限流

use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 超过该数量的客户端时清理已过期的窗口
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// 固定窗口限流器
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    message: &'static str,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, message: &'static str) -> Self {
        Self {
            limit,
            window,
            message,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 记录一次请求，超过限额时返回false
    pub async fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now()).await
    }

    async fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().await;

        if clients.len() > PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client).or_insert(Window { started: now, hits: 0 });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, hits: 0 };
        }

        if entry.hits >= self.limit {
            return false;
        }

        entry.hits += 1;
        true
    }
}

/// 请求的客户端IP，测试中没有连接信息时使用占位地址
fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// 限流中间件
pub async fn rate_limit(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req);

    if !limiter.check(ip).await {
        log::warn!("🚦 {} 请求 {} 过于频繁", ip, req.uri().path());
        return AppError::too_many_requests(limiter.message).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60), "yavaş");
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let start = Instant::now();

        assert!(limiter.check_at(a, start).await);
        assert!(limiter.check_at(a, start).await);
        assert!(!limiter.check_at(a, start + Duration::from_secs(30)).await);
        // 其他客户端不受影响
        assert!(limiter.check_at(b, start).await);

        // 窗口结束后重新计数
        assert!(limiter.check_at(a, start + Duration::from_secs(60)).await);
    }
}
