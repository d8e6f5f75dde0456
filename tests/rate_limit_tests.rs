use std::time::Duration;

use cohost::decision::rate_limit::RateLimiter;
use tokio::time::{advance, Instant};

#[tokio::test(start_paused = true)]
async fn test_budget_exhausts_and_reports_wait() {
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    assert!(limiter.try_acquire().is_ok());
    advance(Duration::from_secs(10)).await;
    assert!(limiter.try_acquire().is_ok());
    assert_eq!(limiter.remaining(), 0);

    let limited = limiter.try_acquire().unwrap_err();
    // Oldest call frees its slot 60s after it was made.
    assert_eq!(limited.wait, Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn test_window_slides() {
    let limiter = RateLimiter::per_minute(1);
    assert!(limiter.try_acquire().is_ok());
    advance(Duration::from_secs(59)).await;
    assert!(limiter.try_acquire().is_err());
    advance(Duration::from_secs(1)).await;
    assert!(limiter.try_acquire().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_acquire_waits_within_bound() {
    let limiter = RateLimiter::per_minute(1);
    limiter.try_acquire().unwrap();
    advance(Duration::from_secs(1)).await;

    let start = Instant::now();
    limiter.acquire(Duration::from_secs(60)).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(59));
}

#[tokio::test(start_paused = true)]
async fn test_acquire_fails_fast_beyond_bound() {
    let limiter = RateLimiter::per_minute(1);
    limiter.try_acquire().unwrap();
    advance(Duration::from_secs(1)).await;

    let start = Instant::now();
    let limited = limiter.acquire(Duration::from_secs(5)).await.unwrap_err();

    // VERIFY: no sleeping when the slot is out of reach
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(limited.wait, Duration::from_secs(59));
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_is_clamped() {
    let limiter = RateLimiter::per_minute(0);
    assert_eq!(limiter.limit(), 1);
    assert!(limiter.try_acquire().is_ok());
    assert!(limiter.try_acquire().is_err());
}
