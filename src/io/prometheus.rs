//! Prometheus text exposition for the drinks gateway
//!
//! Served by the API at /metrics.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_request_metrics(&mut output, site_id, &summary);
    write_ledger_metrics(&mut output, site_id, &summary);
    write_session_metrics(&mut output, site_id, &summary);

    output
}

fn write_request_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "drinks_requests_total",
        "Total API requests served",
        MetricType::Counter,
        site,
        summary.requests_total,
    );
    write_histogram(
        output,
        "drinks_request_latency_us",
        "API request latency in microseconds",
        site,
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.lat_sum_total_us,
    );
    write_metric(
        output,
        "drinks_request_latency_p99_us",
        "99th percentile request latency since the last report",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
}

fn write_ledger_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "drinks_guests_seeded",
        "Guests loaded into the ledger",
        MetricType::Gauge,
        site,
        summary.guests_seeded,
    );
    write_metric(
        output,
        "drinks_lookups_total",
        "Successful guest lookups",
        MetricType::Counter,
        site,
        summary.lookups_total,
    );
    write_metric(
        output,
        "drinks_lookups_not_found_total",
        "Lookups for codes with no guest",
        MetricType::Counter,
        site,
        summary.lookups_not_found,
    );
    write_metric(
        output,
        "drinks_registered_total",
        "Drinks registered",
        MetricType::Counter,
        site,
        summary.drinks_registered,
    );
    write_metric(
        output,
        "drinks_limit_reached_total",
        "Registrations rejected at the allowance limit",
        MetricType::Counter,
        site,
        summary.drinks_limit_reached,
    );
    write_metric(
        output,
        "drinks_invalid_codes_total",
        "Empty or malformed codes rejected",
        MetricType::Counter,
        site,
        summary.invalid_codes,
    );
    write_metric(
        output,
        "drinks_log_dropped_total",
        "Drink log entries dropped due to channel full",
        MetricType::Counter,
        site,
        summary.drink_log_dropped,
    );
}

fn write_session_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "drinks_logins_total",
        "Successful staff logins",
        MetricType::Counter,
        site,
        summary.logins_total,
    );
    write_metric(
        output,
        "drinks_logins_failed_total",
        "Rejected staff logins",
        MetricType::Counter,
        site,
        summary.logins_failed,
    );
    write_metric(
        output,
        "drinks_unauthorized_total",
        "API calls without a valid session",
        MetricType::Counter,
        site,
        summary.unauthorized_total,
    );
    write_metric(
        output,
        "drinks_active_sessions",
        "Open staff sessions",
        MetricType::Gauge,
        site,
        summary.active_sessions,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_request(150);
        metrics.record_request(250);
        metrics.record_drink_registered();
        metrics.record_limit_reached();
        metrics.set_active_sessions(1);

        let output = format_prometheus_metrics(&metrics, "gala");

        assert!(output.contains("drinks_requests_total{site=\"gala\"} 2"));
        assert!(output.contains("drinks_request_latency_us_bucket{site=\"gala\",le=\"200\"} 1"));
        assert!(output.contains("drinks_request_latency_us_bucket{site=\"gala\",le=\"+Inf\"} 2"));
        assert!(output.contains("drinks_registered_total{site=\"gala\"} 1"));
        assert!(output.contains("drinks_limit_reached_total{site=\"gala\"} 1"));
        assert!(output.contains("drinks_active_sessions{site=\"gala\"} 1"));
        assert!(output.contains("# TYPE drinks_registered_total counter"));
        assert!(output.contains("drinks_request_latency_us_sum{site=\"gala\"} 400"));
    }

    #[test]
    fn test_histogram_survives_report() {
        let metrics = Metrics::new();
        metrics.record_request(1000);
        metrics.record_request(3000);

        let before = format_prometheus_metrics(&metrics, "p");
        assert!(before.contains("drinks_request_latency_us_sum{site=\"p\"} 4000"));
        assert!(before.contains("drinks_request_latency_us_count{site=\"p\"} 2"));

        metrics.report();
        let after = format_prometheus_metrics(&metrics, "p");
        assert!(after.contains("drinks_request_latency_us_sum{site=\"p\"} 4000"));
        assert!(after.contains("drinks_request_latency_us_count{site=\"p\"} 2"));

        metrics.record_request(500);
        let later = format_prometheus_metrics(&metrics, "p");
        assert!(later.contains("drinks_request_latency_us_sum{site=\"p\"} 4500"));
        assert!(later.contains("drinks_request_latency_us_count{site=\"p\"} 3"));
    }
}
