// ChapterSleuth - oracle/limiter.rs
//
// Shared oracle rate limiting: a fixed-window requests-per-minute bound
// plus an in-flight concurrency cap. One limiter instance is shared by all
// components of a run, and by all runs of a batch, so the process as a
// whole stays inside the configured budget.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Requests-per-minute window plus concurrency cap.
#[derive(Debug)]
pub struct RateLimiter {
    rpm: u32,
    window: Mutex<Window>,
    inflight: Semaphore,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    issued: u32,
}

/// Held for the duration of one oracle call; releases the concurrency slot
/// on drop.
pub struct RatePermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub fn new(rpm: u32, concurrency: usize) -> Arc<Self> {
        Arc::new(Self {
            rpm: rpm.max(1),
            window: Mutex::new(Window {
                started: Instant::now(),
                issued: 0,
            }),
            inflight: Semaphore::new(concurrency.max(1)),
        })
    }

    /// Wait until both a request slot in the current minute window and an
    /// in-flight slot are available.
    pub async fn acquire(&self) -> RatePermit<'_> {
        loop {
            let sleep_until = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.started) >= Duration::from_secs(60) {
                    window.started = now;
                    window.issued = 0;
                }
                if window.issued < self.rpm {
                    window.issued += 1;
                    None
                } else {
                    Some(window.started + Duration::from_secs(60))
                }
            };

            match sleep_until {
                None => break,
                Some(deadline) => {
                    tracing::debug!(rpm = self.rpm, "Rate limiter window full; waiting");
                    tokio::time::sleep_until(deadline).await;
                }
            }
        }

        // The semaphore is never closed, so acquire cannot fail.
        let permit = self
            .inflight
            .acquire()
            .await
            .expect("rate limiter semaphore closed");
        RatePermit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rpm_window_blocks_then_releases() {
        let limiter = RateLimiter::new(2, 8);

        // Two calls pass immediately.
        drop(limiter.acquire().await);
        drop(limiter.acquire().await);

        // The third must wait for the window to roll over.
        let acquired = tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(acquired.is_err(), "third call should block inside the window");

        tokio::time::advance(Duration::from_secs(61)).await;
        let acquired = tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(acquired.is_ok(), "window rollover should release the call");
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let limiter = RateLimiter::new(1000, 1);
        let first = limiter.acquire().await;

        let second = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(second.is_err(), "second call should wait for the in-flight slot");

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_ok());
    }
}
