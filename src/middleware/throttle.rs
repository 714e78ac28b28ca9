//! Token-bucket request throttling keyed by client address or credential.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tower_cookies::Cookies;

use super::AUTH_COOKIE;
use crate::error::AppError;

/// Buckets idle this long are full again and can be forgotten.
const IDLE_EVICTION: Duration = Duration::from_secs(120);
const EVICTION_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct Throttle {
    scope: &'static str,
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Throttle {
    /// Allows `requests` per minute per key, with bursts up to the same number.
    pub fn per_minute(scope: &'static str, requests: u32) -> Self {
        let capacity = f64::from(requests.max(1));
        Self {
            scope,
            capacity,
            refill_per_sec: capacity / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now()).await
    }

    async fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= EVICTION_THRESHOLD {
            buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) < IDLE_EVICTION);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer address.
fn client_addr(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Bearer token or session cookie, so each signed-in caller has its own bucket.
fn caller_key(req: &Request) -> String {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    let cookie = || {
        req.extensions()
            .get::<Cookies>()
            .and_then(|cookies| cookies.get(AUTH_COOKIE))
            .map(|c| c.value().to_string())
    };
    match bearer.or_else(cookie) {
        Some(token) if !token.is_empty() => format!("token:{token}"),
        _ => format!("addr:{}", client_addr(req)),
    }
}

async fn admit(throttle: &Throttle, key: String, req: Request, next: Next) -> Response {
    if throttle.allow(&key).await {
        return next.run(req).await;
    }
    log::warn!("{} throttle rejected a request from {}", throttle.scope, client_addr(&req));
    AppError::Throttled.into_response()
}

/// Throttles unauthenticated endpoints per client address.
pub async fn throttle_anonymous(
    State(throttle): State<Arc<Throttle>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_addr(&req);
    admit(&throttle, key, req, next).await
}

/// Throttles API calls per credential, falling back to the client address.
pub async fn throttle_callers(
    State(throttle): State<Arc<Throttle>>,
    req: Request,
    next: Next,
) -> Response {
    let key = caller_key(&req);
    admit(&throttle, key, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http;

    #[tokio::test]
    async fn bucket_empties_then_refills_over_the_minute() {
        let throttle = Throttle::per_minute("auth", 5);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(throttle.allow_at("10.0.0.1", start).await);
        }
        assert!(!throttle.allow_at("10.0.0.1", start).await);
        assert!(throttle.allow_at("10.0.0.2", start).await);

        // One token every 12 seconds at 5 per minute.
        let later = start + Duration::from_secs(12);
        assert!(throttle.allow_at("10.0.0.1", later).await);
        assert!(!throttle.allow_at("10.0.0.1", later).await);

        let much_later = start + Duration::from_secs(600);
        for _ in 0..5 {
            assert!(throttle.allow_at("10.0.0.1", much_later).await);
        }
        assert!(!throttle.allow_at("10.0.0.1", much_later).await);
    }

    #[test]
    fn forwarded_address_wins_over_the_peer() {
        let mut req = http::Request::get("/login")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 4], 5000))));
        assert_eq!(client_addr(&req), "203.0.113.7");

        req.headers_mut().remove("x-forwarded-for");
        assert_eq!(client_addr(&req), "192.168.1.4");
    }

    #[test]
    fn callers_are_keyed_by_bearer_token() {
        let req = http::Request::get("/bookings")
            .header(AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(caller_key(&req), "token:abc");

        let anonymous = http::Request::get("/bookings").body(Body::empty()).unwrap();
        assert_eq!(caller_key(&anonymous), "addr:unknown");
    }
}
