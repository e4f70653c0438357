//! Sliding-window rate limiting for job starts.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Allows at most `max_per_window` starts in any window of length `window`.
#[derive(Debug)]
pub struct WindowLimiter {
    max_per_window: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl WindowLimiter {
    /// Create a limiter. A `max_per_window` of zero is treated as one.
    #[must_use]
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        let max_per_window = (max_per_window as usize).max(1);
        Self {
            max_per_window,
            window,
            starts: Mutex::new(VecDeque::with_capacity(max_per_window)),
        }
    }

    /// Wait until a start is allowed, then record it. Returns the start instant.
    pub async fn acquire(&self) -> Instant {
        loop {
            let wait = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();
                self.expire(&mut starts, now);

                if starts.len() < self.max_per_window {
                    starts.push_back(now);
                    return now;
                }

                let oldest = starts.front().copied().unwrap_or(now);
                self.window.saturating_sub(now.duration_since(oldest))
            };

            tokio::time::sleep(wait).await;
        }
    }

    fn expire(&self, starts: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = starts.front() {
            if now.duration_since(front) >= self.window {
                starts.pop_front();
            } else {
                break;
            }
        }
    }
}
