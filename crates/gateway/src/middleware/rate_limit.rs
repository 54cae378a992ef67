//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use switchyard_common::errors::AppError;

/// Process-wide limiter shared by every route
pub struct GlobalRateLimiter {
    limiter: DefaultDirectRateLimiter,
    per_second: u32,
}

impl GlobalRateLimiter {
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Create a new rate limiter; zero values are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<GlobalRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);

    Arc::new(GlobalRateLimiter {
        limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        per_second: rate.get(),
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<GlobalRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check() {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
    AppError::RateLimited {
        limit: limiter.per_second,
    }
    .into_response()
}
