use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::warn;

/// Global token bucket rate limiter.
///
/// One bucket for the whole server; per-client limiting would need
/// `ConnectInfo` and is out of scope here.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    /// (last refill, tokens available)
    state: Mutex<(Instant, f32)>,
    rate_per_sec: f32,
    burst_size: f32,
}

impl SimpleRateLimiter {
    pub fn new(rate_per_sec: f32, burst_size: f32) -> Self {
        let burst_size = burst_size.max(1.0);
        Self {
            state: Mutex::new((Instant::now(), burst_size)),
            rate_per_sec: rate_per_sec.max(0.0),
            burst_size,
        }
    }

    /// Take one token if available.
    pub fn check(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (last_update, tokens) = *guard;
        let now = Instant::now();
        let elapsed = now.duration_since(last_update).as_secs_f32();

        let available = (tokens + elapsed * self.rate_per_sec).min(self.burst_size);
        if available >= 1.0 {
            *guard = (now, available - 1.0);
            true
        } else {
            // time still advances on a denied request
            *guard = (now, available);
            false
        }
    }
}

/// Reject requests with 429 once the bucket is empty.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.resilience.rate_limit_enabled && !state.rate_limiter.check() {
        warn!(path = %req.uri().path(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(req).await)
}
