//! services/api/src/web/rate_limit.rs
//!
//! Per-client token buckets guarding the `/auth/*` routes. Idle buckets are swept by a
//! background task tied to the shutdown token.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::web::state::AppState;

/// Buckets untouched for this long are dropped by the sweeper.
pub const IDLE_TTL: Duration = Duration::from_secs(5 * 60);
pub const SWEEP_EVERY: Duration = Duration::from_secs(60);

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
    last_seen: Instant,
}

pub struct RateLimiter {
    rate: f64,
    burst: f64,
    idle_ttl: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("rate limiter mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

impl RateLimiter {
    /// `rate` tokens per second, at most `burst` stored.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            idle_ttl: IDLE_TTL,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes one token for `key`; false when its bucket is empty.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = lock_or_recover(&self.buckets);
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            refilled_at: now,
            last_seen: now,
        });
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.refilled_at = now;
        bucket.last_seen = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops buckets idle for longer than the TTL; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = lock_or_recover(&self.buckets);
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= self.idle_ttl);
        before - buckets.len()
    }

    pub fn tracked(&self) -> usize {
        lock_or_recover(&self.buckets).len()
    }

    /// Sweeps every `every` until `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = limiter.tracked(), "rate limiter swept");
                        }
                    }
                }
            }
        })
    }
}

/// Client key: the connection address, else the first `X-Forwarded-For` hop, else `unknown`.
fn client_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&req);
    if !state.limiter.allow(&key) {
        warn!(client = %key, path = %req.uri().path(), "rate limited");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn burst_then_refill() {
        let limiter = RateLimiter::new(2.0, 3);
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));
        // Other clients have their own bucket.
        assert!(limiter.allow_at("b", t0));
        // Half a second at 2 tokens/s buys one more request.
        assert!(limiter.allow_at("a", t0 + Duration::from_millis(500)));
        assert!(!limiter.allow_at("a", t0 + Duration::from_millis(500)));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(100.0, 2);
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        let later = t0 + Duration::from_secs(60);
        assert!(limiter.allow_at("a", later));
        assert!(limiter.allow_at("a", later));
        assert!(!limiter.allow_at("a", later));
    }

    #[test]
    fn sweep_drops_idle_buckets() {
        let limiter = RateLimiter::new(1.0, 1);
        let t0 = Instant::now();
        limiter.allow_at("old", t0);
        limiter.allow_at("fresh", t0 + IDLE_TTL);
        assert_eq!(limiter.sweep_at(t0 + IDLE_TTL + Duration::from_secs(1)), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn client_key_prefers_connection_then_forwarded_header() {
        let mut req = Request::builder()
            .header("x-forwarded-for", " 10.0.0.7 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "10.0.0.7");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));
        assert_eq!(client_key(&req), "192.168.1.2");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&bare), "unknown");
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(1.0, 1));
        let token = CancellationToken::new();
        let handle = limiter.spawn_sweeper(Duration::from_millis(10), token.clone());
        token.cancel();
        assert!(handle.await.is_ok());
    }
}
