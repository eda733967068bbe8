//! Fixed-window request limiting for login and registration.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Error, Result};

/// Map size past which stale windows are dropped on the next request.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Counts requests per `(endpoint, client)` key inside a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    period: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Allow `limit` requests per `period` for each key.
    #[must_use]
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            limit,
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request now.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimited` with the seconds left in the window when
    /// the key is over its limit.
    pub fn check(&self, endpoint: &str, client: &str) -> Result<()> {
        self.check_at(endpoint, client, Instant::now())
    }

    /// Count a request at a given instant.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimited` when the key is over its limit.
    pub fn check_at(&self, endpoint: &str, client: &str, now: Instant) -> Result<()> {
        let key = format!("{endpoint}_{client}");
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| Error::internal("rate limiter lock poisoned"))?;
        if windows.len() >= PRUNE_THRESHOLD {
            retain_live(&mut windows, self.period, now);
        }

        let window = windows.entry(key).or_insert(Window {
            count: 0,
            started: now,
        });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed > self.period {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.limit {
            let remaining = self
                .period
                .saturating_sub(now.saturating_duration_since(window.started));
            warn!(
                "Rate limit exceeded for {} from {} - {} seconds remaining",
                endpoint,
                client,
                remaining.as_secs()
            );
            return Err(Error::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Drop windows that have run out.
    pub fn prune(&self, now: Instant) {
        if let Ok(mut windows) = self.windows.lock() {
            retain_live(&mut windows, self.period, now);
        }
    }
}

fn retain_live(windows: &mut HashMap<String, Window>, period: Duration, now: Instant) {
    windows.retain(|_, w| now.saturating_duration_since(w.started) <= period);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_until_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("login", "1.2.3.4", now).is_ok());
        }
        let err = limiter.check_at("login", "1.2.3.4", now).unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited {
                retry_after_secs: 60
            }
        ));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("login", "a", now).is_ok());
        assert!(limiter.check_at("login", "b", now).is_ok());
        assert!(limiter.check_at("register", "a", now).is_ok());
        assert!(limiter.check_at("login", "a", now).is_err());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("login", "a", start).is_ok());

        let err = limiter
            .check_at("login", "a", start + Duration::from_secs(4))
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited { retry_after_secs: 6 }));

        assert!(limiter
            .check_at("login", "a", start + Duration::from_secs(11))
            .is_ok());
    }

    #[test]
    fn test_prune_drops_stale_windows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("login", "a", start).unwrap();
        limiter.prune(start + Duration::from_secs(30));
        assert!(limiter.windows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_windows_are_dropped_when_map_grows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            let client = format!("10.0.{}.{}", i / 256, i % 256);
            limiter.check_at("login", &client, start).unwrap();
        }

        let later = start + Duration::from_secs(30);
        limiter.check_at("login", "192.0.2.1", later).unwrap();
        assert_eq!(limiter.windows.lock().unwrap().len(), 1);
    }
}
