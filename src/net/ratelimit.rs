//! per-host request rate limiting
use {
    hashbrown::HashMap,
    std::{
        collections::VecDeque,
        time::Duration,
    },
    tokio::{sync::Mutex, time::Instant},
    tracing::debug,
};

/// a sliding-window limiter: at most `max_per_window` acquisitions per host
/// in any window of `window` length
///
/// acquisition suspends until a slot frees up, which gives callers implicit
/// backpressure
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    hosts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// make a limiter allowing `max_per_window` requests per 60 seconds
    pub fn per_minute(max_per_window: u32) -> Self {
        Self::new(max_per_window, Duration::from_secs(60))
    }

    /// make a limiter with an explicit window
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// take a slot for the host, waiting as long as the window requires
    pub async fn acquire(&self, host: &str) {
        loop {
            let wait = {
                let mut hosts = self.hosts.lock().await;
                let stamps = hosts.entry(host.to_owned()).or_default();
                let now = Instant::now();

                while stamps
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
                {
                    stamps.pop_front();
                }

                if (stamps.len() as u32) < self.max_per_window {
                    stamps.push_back(now);
                    return;
                }

                // the window frees a slot when its oldest stamp expires
                match stamps.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!(host, wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_more_than_the_cap_inside_one_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire("e621.net").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // the fourth acquisition has to wait for the window to roll over
        limiter.acquire("e621.net").await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire("a.example").await;
        limiter.acquire("b.example").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
