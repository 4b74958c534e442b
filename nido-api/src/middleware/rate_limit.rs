/// Rate limiting middleware for the auth endpoints
///
/// Fixed-window counter keyed by client IP, held in process memory. The
/// window and request budget come from configuration. Credential endpoints
/// are the only routes behind this limiter; everything else relies on the
/// identity provider's per-account code cooldowns.
///
/// A single API instance is assumed; a multi-instance deployment would move
/// the counters into a shared store behind the same interface.
///
/// # Headers
///
/// 429 responses carry `Retry-After` with the seconds until the window
/// resets (added by [`crate::error::ApiError::RateLimitExceeded`]).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::{app::AppState, error::ApiError};

/// One client's counter within the current window
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client IP
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Counts a request from `ip`
    ///
    /// Returns `Ok(())` when the request fits the current window, or
    /// `Err(retry_after_secs)` when the budget is spent.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Opportunistic cleanup keeps the map from growing unbounded
        if clients.len() > 10_000 {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(())
    }
}

/// Resolves the client IP for rate limiting
///
/// Prefers the first `X-Forwarded-For` entry (set by the edge proxy) and
/// falls back to the socket peer address. Unresolvable clients share one
/// bucket rather than bypassing the limiter.
fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return ip;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

/// Rate limiting middleware layer
///
/// Rejects with 429 once a client exhausts the window budget.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&req);

    if let Err(retry_after) = state.rate_limiter.check(ip) {
        tracing::warn!(%ip, retry_after, "rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!("Rate limit exceeded. Try again in {} seconds", retry_after),
        });
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_allows_up_to_budget() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);

        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn test_clients_counted_independently() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);

        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
        assert!(limiter.check(ip(2)).is_err());
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1);

        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check(ip(1)).is_ok());
    }

    #[test]
    fn test_retry_after_at_least_one_second() {
        let limiter = RateLimiter::new(Duration::from_secs(2), 1);

        limiter.check(ip(1)).unwrap();
        let retry_after = limiter.check(ip(1)).unwrap_err();
        assert!(retry_after >= 1);
        assert!(retry_after <= 2);
    }

    #[test]
    fn test_forwarded_header_wins() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(client_ip(&req), "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_missing_client_info_falls_back() {
        let req = Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(client_ip(&req), IpAddr::from([0, 0, 0, 0]));
    }
}
