//! Request performance counters
//!
//! Lock-free atomics updated from dispatcher threads, exported as the JSON
//! object returned by `get_performance_metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};

/// How a measured request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Answered with a result
    Success,
    /// Answered with an error
    Failure,
    /// Gave up waiting
    Timeout,
}

/// Server-wide performance counters
#[derive(Debug)]
pub struct PerformanceMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    timeout_requests: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    active_connections: AtomicU64,
    peak_connections: AtomicU64,
    min_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    total_latency_us: AtomicU64,
    started: Mutex<Instant>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    /// Zeroed counters, uptime starting now
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            timeout_requests: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            peak_connections: AtomicU64::new(0),
            min_latency_us: AtomicU64::new(u64::MAX),
            max_latency_us: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }

    /// Record one finished request
    pub fn record_request(&self, outcome: RequestOutcome, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RequestOutcome::Success => &self.successful_requests,
            RequestOutcome::Failure => &self.failed_requests,
            RequestOutcome::Timeout => &self.timeout_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.min_latency_us.fetch_min(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Count inbound bytes
    pub fn record_bytes_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count outbound bytes
    pub fn record_bytes_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A connection opened
    pub fn connection_opened(&self) {
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connections.fetch_max(active, Ordering::Relaxed);
    }

    /// A connection closed
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Requests recorded so far
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Zero every counter and restart the uptime clock
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.successful_requests,
            &self.failed_requests,
            &self.timeout_requests,
            &self.bytes_sent,
            &self.bytes_received,
            &self.max_latency_us,
            &self.total_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.min_latency_us.store(u64::MAX, Ordering::Relaxed);
        self.peak_connections
            .store(self.active_connections.load(Ordering::Relaxed), Ordering::Relaxed);
        *self.started.lock() = Instant::now();
    }

    /// Export as the `get_performance_metrics` result object
    pub fn to_json(&self) -> Value {
        let uptime = self.started.lock().elapsed().as_secs_f64();
        let total = self.total_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let timeout = self.timeout_requests.load(Ordering::Relaxed);
        let bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);
        let min = match self.min_latency_us.load(Ordering::Relaxed) {
            u64::MAX => 0,
            min => min,
        };
        let avg = self
            .total_latency_us
            .load(Ordering::Relaxed)
            .checked_div(total)
            .unwrap_or(0);
        let per_second = |n: u64| if uptime > 0.0 { round2(n as f64 / uptime) } else { 0.0 };
        let error_rate = if total > 0 {
            round2((failed + timeout) as f64 * 100.0 / total as f64)
        } else {
            0.0
        };

        json!({
            "timestamp": chrono::Utc::now().timestamp(),
            "uptime_seconds": round2(uptime),
            "requests": {
                "total": total,
                "successful": self.successful_requests.load(Ordering::Relaxed),
                "failed": failed,
                "timeout": timeout,
                "per_second": per_second(total),
                "error_rate_percent": error_rate,
            },
            "latency_us": {
                "min": min,
                "max": self.max_latency_us.load(Ordering::Relaxed),
                "avg": avg,
            },
            "throughput": {
                "bytes_sent": bytes_sent,
                "bytes_received": bytes_received,
                "bytes_per_second": per_second(bytes_sent + bytes_received),
            },
            "connections": {
                "active": self.active_connections.load(Ordering::Relaxed),
                "peak": self.peak_connections.load(Ordering::Relaxed),
            },
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Measures one request from arrival to response
#[derive(Debug)]
pub struct PerformanceTimer {
    started: Instant,
}

impl PerformanceTimer {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop timing and record the request
    pub fn stop(self, metrics: &PerformanceMetrics, outcome: RequestOutcome) -> Duration {
        let elapsed = self.elapsed();
        metrics.record_request(outcome, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_outcomes_and_latency() {
        let metrics = PerformanceMetrics::new();
        metrics.record_request(RequestOutcome::Success, Duration::from_micros(100));
        metrics.record_request(RequestOutcome::Success, Duration::from_micros(300));
        metrics.record_request(RequestOutcome::Failure, Duration::from_micros(200));
        metrics.record_request(RequestOutcome::Timeout, Duration::from_micros(400));

        let json = metrics.to_json();
        assert_eq!(json["requests"]["total"], 4);
        assert_eq!(json["requests"]["successful"], 2);
        assert_eq!(json["requests"]["failed"], 1);
        assert_eq!(json["requests"]["timeout"], 1);
        assert_eq!(json["requests"]["error_rate_percent"], 50.0);
        assert_eq!(json["latency_us"]["min"], 100);
        assert_eq!(json["latency_us"]["max"], 400);
        assert_eq!(json["latency_us"]["avg"], 250);
    }

    #[test]
    fn test_empty_export_has_zero_latency() {
        let json = PerformanceMetrics::new().to_json();
        assert_eq!(json["latency_us"]["min"], 0);
        assert_eq!(json["latency_us"]["avg"], 0);
        assert_eq!(json["requests"]["error_rate_percent"], 0.0);
        assert!(json["timestamp"].as_i64().unwrap() > 0);
        assert!(json["uptime_seconds"].is_number());
    }

    #[test]
    fn test_connections_track_peak() {
        let metrics = PerformanceMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        metrics.connection_closed();
        metrics.connection_closed();

        let json = metrics.to_json();
        assert_eq!(json["connections"]["active"], 0);
        assert_eq!(json["connections"]["peak"], 2);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let metrics = PerformanceMetrics::new();
        metrics.record_request(RequestOutcome::Failure, Duration::from_millis(1));
        metrics.record_bytes_received(64);
        metrics.record_bytes_sent(32);
        metrics.reset();

        let json = metrics.to_json();
        assert_eq!(json["requests"]["total"], 0);
        assert_eq!(json["throughput"]["bytes_sent"], 0);
        assert_eq!(json["throughput"]["bytes_received"], 0);
        assert_eq!(json["latency_us"]["max"], 0);
    }

    #[test]
    fn test_timer_records() {
        let metrics = PerformanceMetrics::new();
        let timer = PerformanceTimer::start();
        let elapsed = timer.stop(&metrics, RequestOutcome::Success);
        assert_eq!(metrics.total_requests(), 1);
        assert!(elapsed < Duration::from_secs(1));
    }
}
