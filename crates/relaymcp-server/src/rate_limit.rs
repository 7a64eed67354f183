//! Fixed-window request limiting keyed by client id

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relaymcp_core::StringMap;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u64,
}

/// Per-client fixed-window counters
///
/// The first request of a window opens it with a count of one; later
/// requests are allowed while the count stays below the maximum.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u64,
    capacity: usize,
    windows: Option<Mutex<StringMap<Window>>>,
}

impl RateLimiter {
    /// Build from configuration; a zero window or maximum disables limiting
    pub fn new(config: &RateLimitConfig) -> Self {
        let windows = config.is_enabled().then(|| {
            let table = StringMap::with_capacity(config.capacity).unwrap_or_else(|e| {
                warn!("Rate limiter capacity {} rejected ({}), using default", config.capacity, e);
                StringMap::new()
            });
            Mutex::new(table)
        });
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            capacity: config.capacity.max(1),
            windows,
        }
    }

    /// Whether requests are counted
    pub fn is_enabled(&self) -> bool {
        self.windows.is_some()
    }

    /// Count a request from `client_id`; `false` means it must be rejected
    pub fn check(&self, client_id: &str) -> bool {
        self.check_at(client_id, Instant::now())
    }

    /// [`RateLimiter::check`] at an explicit time
    pub fn check_at(&self, client_id: &str, now: Instant) -> bool {
        let Some(windows) = &self.windows else {
            return true;
        };
        let mut windows = windows.lock();

        if let Some(window) = windows.get_mut(client_id) {
            if now.saturating_duration_since(window.start) >= self.window {
                *window = Window { start: now, count: 1 };
                return true;
            }
            if window.count < self.max_requests {
                window.count += 1;
                return true;
            }
            debug!("Rate limit exceeded for client {}", client_id);
            return false;
        }

        if windows.len() >= self.capacity {
            let removed = retain_open(&mut windows, self.window, now);
            debug!("Pruned {} finished rate limit windows", removed);
        }
        match windows.put(client_id.to_string(), Window { start: now, count: 1 }) {
            Ok(_) => true,
            Err(e) => {
                // Untracked clients would bypass the limit
                warn!("Rate limiter failed to track client {}: {}", client_id, e);
                false
            }
        }
    }

    /// Drop counters whose window has ended; returns how many were removed
    pub fn prune(&self, now: Instant) -> usize {
        let Some(windows) = &self.windows else {
            return 0;
        };
        retain_open(&mut windows.lock(), self.window, now)
    }

    /// Number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.windows.as_ref().map_or(0, |w| w.lock().len())
    }
}

fn retain_open(windows: &mut StringMap<Window>, length: Duration, now: Instant) -> usize {
    let before = windows.len();
    windows.retain(|_, window| now.saturating_duration_since(window.start) < length);
    before - windows.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_secs: u64, max_requests: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs,
            max_requests,
            capacity: 16,
        })
    }

    #[test]
    fn test_allows_up_to_max_then_denies() {
        let limiter = limiter(60, 3);
        let now = Instant::now();
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(!limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.2", now));
    }

    #[test]
    fn test_new_window_resets_count() {
        let limiter = limiter(1, 1);
        let start = Instant::now();
        assert!(limiter.check_at("c", start));
        assert!(!limiter.check_at("c", start + Duration::from_millis(500)));
        assert!(limiter.check_at("c", start + Duration::from_secs(1)));
        assert!(!limiter.check_at("c", start + Duration::from_millis(1500)));
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        for limiter in [limiter(0, 10), limiter(10, 0)] {
            assert!(!limiter.is_enabled());
            for _ in 0..1000 {
                assert!(limiter.check("c"));
            }
            assert_eq!(limiter.tracked_clients(), 0);
        }
    }

    #[test]
    fn test_prune_removes_finished_windows() {
        let limiter = limiter(10, 5);
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(8));
        assert_eq!(limiter.tracked_clients(), 2);

        assert_eq!(limiter.prune(start + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.prune(start + Duration::from_secs(30)), 1);
    }

    #[test]
    fn test_full_table_drops_finished_windows() {
        let limiter = limiter(10, 5);
        let start = Instant::now();
        for i in 0..16 {
            assert!(limiter.check_at(&format!("client-{i}"), start));
        }
        assert_eq!(limiter.tracked_clients(), 16);

        let later = start + Duration::from_secs(11);
        assert!(limiter.check_at("late", later));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_many_clients_grow_table() {
        let limiter = limiter(60, 1);
        let now = Instant::now();
        for i in 0..200 {
            assert!(limiter.check_at(&format!("client-{i}"), now));
        }
        assert_eq!(limiter.tracked_clients(), 200);
        assert!(!limiter.check_at("client-7", now));
    }
}
