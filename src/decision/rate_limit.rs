use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::RateLimited;

/// Sliding-window log: at most `limit` calls in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = (limit as usize).max(1);
        info!("Rate limiter initialized: {} calls per {:?}", limit, window);
        Self {
            limit,
            window,
            calls: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take a slot now, or report how long until the next one frees up.
    pub fn try_acquire(&self) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut calls = self.lock();
        self.prune(&mut calls, now);

        if calls.len() < self.limit {
            calls.push_back(now);
            return Ok(());
        }

        let wait = calls
            .front()
            .map_or(self.window, |&oldest| (oldest + self.window).saturating_duration_since(now));
        Err(RateLimited { wait })
    }

    /// Wait for a slot, but never longer than `max_wait`. A slot that is
    /// further away than that fails immediately instead of sleeping first.
    pub async fn acquire(&self, max_wait: Duration) -> Result<(), RateLimited> {
        let deadline = Instant::now() + max_wait;
        loop {
            let limited = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(limited) => limited,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if limited.wait > remaining {
                warn!("Rate limit reached, next slot in {:.1}s", limited.wait.as_secs_f64());
                return Err(limited);
            }
            debug!("Rate limit reached, waiting {:.1}s", limited.wait.as_secs_f64());
            sleep(limited.wait).await;
        }
    }

    /// Free slots in the current window.
    pub fn remaining(&self) -> usize {
        let mut calls = self.lock();
        self.prune(&mut calls, Instant::now());
        self.limit - calls.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
