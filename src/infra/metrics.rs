//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; `report()` swaps the per-interval
//! counters to zero, `snapshot()` only reads.
//!
//! NOTE: All atomics use Relaxed ordering intentionally: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Per-bucket counts added since `previous`
#[inline]
fn bucket_delta(
    current: &[u64; NUM_BUCKETS],
    previous: &[u64; NUM_BUCKETS],
) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| current[i].saturating_sub(previous[i]))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Total API requests served (monotonic)
    requests_total: AtomicU64,
    /// Requests since last report (reset on report)
    requests_since_report: AtomicU64,
    /// Sum of request latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Sum of request latencies in microseconds (monotonic, histogram `_sum`)
    latency_sum_total_us: AtomicU64,
    /// Max request latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Request latency histogram buckets (monotonic, Prometheus scrapes them)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Successful guest lookups (monotonic)
    lookups_total: AtomicU64,
    /// Lookups for well-formed codes nobody holds (monotonic)
    lookups_not_found: AtomicU64,
    /// Drinks registered (monotonic)
    drinks_registered: AtomicU64,
    /// Drinks registered since last report (reset on report)
    drinks_since_report: AtomicU64,
    /// Registrations rejected at the allowance limit (monotonic)
    drinks_limit_reached: AtomicU64,
    /// Empty or malformed codes rejected by the validator (monotonic)
    invalid_codes: AtomicU64,
    /// Successful logins (monotonic)
    logins_total: AtomicU64,
    /// Rejected logins (monotonic)
    logins_failed: AtomicU64,
    /// API calls without a valid session (monotonic)
    unauthorized_total: AtomicU64,
    /// Currently open staff sessions
    active_sessions: AtomicU64,
    /// Guests loaded into the ledger at startup
    guests_seeded: AtomicU64,
    /// Drink log entries dropped due to channel full (monotonic)
    drink_log_dropped: AtomicU64,
    /// Bucket values at the last report, for interval percentiles
    reported_buckets: parking_lot::Mutex<[u64; NUM_BUCKETS]>,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_sum_total_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            lookups_total: AtomicU64::new(0),
            lookups_not_found: AtomicU64::new(0),
            drinks_registered: AtomicU64::new(0),
            drinks_since_report: AtomicU64::new(0),
            drinks_limit_reached: AtomicU64::new(0),
            invalid_codes: AtomicU64::new(0),
            logins_total: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            unauthorized_total: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            guests_seeded: AtomicU64::new(0),
            drink_log_dropped: AtomicU64::new(0),
            reported_buckets: parking_lot::Mutex::new([0; NUM_BUCKETS]),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an API request was served with given latency (lock-free)
    #[inline]
    pub fn record_request(&self, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Record a lookup outcome: `found == false` means a valid code with no guest
    #[inline]
    pub fn record_lookup(&self, found: bool) {
        if found {
            self.lookups_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.lookups_not_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_drink_registered(&self) {
        self.drinks_registered.fetch_add(1, Ordering::Relaxed);
        self.drinks_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_limit_reached(&self) {
        self.drinks_limit_reached.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_code(&self) {
        self.invalid_codes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_login(&self, ok: bool) {
        if ok {
            self.logins_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_unauthorized(&self) {
        self.unauthorized_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_sessions(&self, count: u64) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_guests_seeded(&self, count: u64) {
        self.guests_seeded.store(count, Ordering::Relaxed);
    }

    /// Record a drink log entry dropped due to channel full (lock-free)
    #[inline]
    pub fn record_drink_log_dropped(&self) {
        self.drink_log_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn drinks_registered(&self) -> u64 {
        self.drinks_registered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn drink_log_dropped(&self) -> u64 {
        self.drink_log_dropped.load(Ordering::Relaxed)
    }

    /// Read every counter without resetting anything
    pub fn snapshot(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_buckets);
        let interval_buckets = bucket_delta(&lat_buckets, &self.reported_buckets.lock());
        let requests = self.requests_since_report.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.load(Ordering::Relaxed);
        let elapsed = self.last_report_time.lock().elapsed().as_secs_f64();

        self.summarize(
            lat_buckets,
            interval_buckets,
            requests,
            latency_sum,
            self.latency_max_us.load(Ordering::Relaxed),
            self.drinks_since_report.load(Ordering::Relaxed),
            elapsed,
        )
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. Histogram buckets are
    /// monotonic and survive the reset.
    pub fn report(&self) -> MetricsSummary {
        let requests = self.requests_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let drinks = self.drinks_since_report.swap(0, Ordering::Relaxed);
        let lat_buckets = load_buckets(&self.latency_buckets);
        let interval_buckets = {
            let mut reported = self.reported_buckets.lock();
            let delta = bucket_delta(&lat_buckets, &reported);
            *reported = lat_buckets;
            delta
        };

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        self.summarize(
            lat_buckets,
            interval_buckets,
            requests,
            latency_sum,
            max_latency,
            drinks,
            elapsed,
        )
    }

    fn summarize(
        &self,
        lat_buckets: [u64; NUM_BUCKETS],
        interval_buckets: [u64; NUM_BUCKETS],
        requests: u64,
        latency_sum: u64,
        max_latency: u64,
        drinks: u64,
        elapsed_secs: f64,
    ) -> MetricsSummary {
        let avg_request_latency_us = if requests > 0 { latency_sum / requests } else { 0 };
        let drinks_per_min =
            if elapsed_secs > 0.0 { drinks as f64 * 60.0 / elapsed_secs } else { 0.0 };

        MetricsSummary {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            avg_request_latency_us,
            max_request_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&interval_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&interval_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&interval_buckets, 0.99),
            lat_buckets,
            lat_sum_total_us: self.latency_sum_total_us.load(Ordering::Relaxed),
            lookups_total: self.lookups_total.load(Ordering::Relaxed),
            lookups_not_found: self.lookups_not_found.load(Ordering::Relaxed),
            drinks_registered: self.drinks_registered.load(Ordering::Relaxed),
            drinks_per_min,
            drinks_limit_reached: self.drinks_limit_reached.load(Ordering::Relaxed),
            invalid_codes: self.invalid_codes.load(Ordering::Relaxed),
            logins_total: self.logins_total.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            unauthorized_total: self.unauthorized_total.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            guests_seeded: self.guests_seeded.load(Ordering::Relaxed),
            drink_log_dropped: self.drink_log_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
///
/// Average, max and percentiles cover the interval since the last
/// `report()`. `lat_buckets` and `lat_sum_total_us` are lifetime values.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub requests_total: u64,
    pub avg_request_latency_us: u64,
    pub max_request_latency_us: u64,
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_sum_total_us: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub lookups_total: u64,
    pub lookups_not_found: u64,
    pub drinks_registered: u64,
    pub drinks_per_min: f64,
    pub drinks_limit_reached: u64,
    pub invalid_codes: u64,
    pub logins_total: u64,
    pub logins_failed: u64,
    pub unauthorized_total: u64,
    pub active_sessions: u64,
    pub guests_seeded: u64,
    pub drink_log_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            requests_total = %self.requests_total,
            avg_latency_us = %self.avg_request_latency_us,
            max_latency_us = %self.max_request_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            lookups = %self.lookups_total,
            not_found = %self.lookups_not_found,
            drinks = %self.drinks_registered,
            drinks_per_min = format!("{:.1}", self.drinks_per_min),
            limit_reached = %self.drinks_limit_reached,
            invalid_codes = %self.invalid_codes,
            sessions = %self.active_sessions,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.drinks_registered(), 0);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();

        metrics.record_request(100);
        metrics.record_request(300);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 400);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(1_000_000), 10);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();

        metrics.record_request(100);
        metrics.record_request(200);
        metrics.record_request(300);
        metrics.record_drink_registered();
        metrics.record_limit_reached();
        metrics.record_lookup(true);
        metrics.record_lookup(false);

        let summary = metrics.report();
        assert_eq!(summary.requests_total, 3);
        assert_eq!(summary.avg_request_latency_us, 200);
        assert_eq!(summary.max_request_latency_us, 300);
        assert_eq!(summary.drinks_registered, 1);
        assert_eq!(summary.drinks_limit_reached, 1);
        assert_eq!(summary.lookups_total, 1);
        assert_eq!(summary.lookups_not_found, 1);

        assert_eq!(metrics.requests_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 0);

        // Monotonic counters and buckets survive
        let again = metrics.report();
        assert_eq!(again.requests_total, 3);
        assert_eq!(again.drinks_registered, 1);
        assert_eq!(again.lat_buckets.iter().sum::<u64>(), 3);
    }

    #[test]
    fn test_percentiles_cover_the_interval() {
        let metrics = Metrics::new();
        for _ in 0..10 {
            metrics.record_request(50_000);
        }
        let first = metrics.report();
        assert_eq!(first.lat_p50_us, 51200);

        metrics.record_request(50);
        metrics.record_request(60);
        let second = metrics.report();
        assert_eq!(second.lat_p50_us, 100);
        assert_eq!(second.lat_p99_us, 100);

        // Lifetime values keep growing across reports
        assert_eq!(second.lat_buckets.iter().sum::<u64>(), 12);
        assert_eq!(second.lat_sum_total_us, 500_110);

        // Nothing new since the last report
        assert_eq!(metrics.snapshot().lat_p99_us, 0);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_request(150);

        let first = metrics.snapshot();
        let second = metrics.snapshot();
        assert_eq!(first.avg_request_latency_us, 150);
        assert_eq!(second.avg_request_latency_us, 150);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report();
        assert_eq!(summary.requests_total, 0);
        assert_eq!(summary.avg_request_latency_us, 0);
        assert_eq!(summary.lat_p99_us, 0);
    }

    #[test]
    fn test_percentiles() {
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 90;
        buckets[5] = 9;
        buckets[10] = 1;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.95), 3200);
        assert_eq!(percentile_from_buckets(&buckets, 1.0), 102400);
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new();
        metrics.set_active_sessions(2);
        metrics.set_guests_seeded(3);
        metrics.record_drink_log_dropped();

        let summary = metrics.snapshot();
        assert_eq!(summary.active_sessions, 2);
        assert_eq!(summary.guests_seeded, 3);
        assert_eq!(summary.drink_log_dropped, 1);
        assert_eq!(metrics.drink_log_dropped(), 1);
    }
}
