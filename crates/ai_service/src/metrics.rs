//! Request metrics for the prediction service

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Endpoint families counted separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Predict,
    Batch,
    Model,
    Retrain,
    Cache,
}

/// Lock-free counters shared by every handler
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    // Request metrics
    pub total_requests: Arc<AtomicU64>,
    pub successful_requests: Arc<AtomicU64>,
    pub failed_requests: Arc<AtomicU64>,
    pub request_duration_ms: Arc<AtomicU64>,

    // Endpoint metrics
    pub predictions: Arc<AtomicU64>,
    pub batch_predictions: Arc<AtomicU64>,
    pub model_requests: Arc<AtomicU64>,
    pub cache_requests: Arc<AtomicU64>,
    pub health_checks: Arc<AtomicU64>,

    // Prediction outcomes
    pub demo_predictions: Arc<AtomicU64>,
    pub retrains_started: Arc<AtomicU64>,
    pub retrains_failed: Arc<AtomicU64>,

    pub error_count: Arc<AtomicU64>,

    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: Arc::new(AtomicU64::new(0)),
            successful_requests: Arc::new(AtomicU64::new(0)),
            failed_requests: Arc::new(AtomicU64::new(0)),
            request_duration_ms: Arc::new(AtomicU64::new(0)),
            predictions: Arc::new(AtomicU64::new(0)),
            batch_predictions: Arc::new(AtomicU64::new(0)),
            model_requests: Arc::new(AtomicU64::new(0)),
            cache_requests: Arc::new(AtomicU64::new(0)),
            health_checks: Arc::new(AtomicU64::new(0)),
            demo_predictions: Arc::new(AtomicU64::new(0)),
            retrains_started: Arc::new(AtomicU64::new(0)),
            retrains_failed: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record a finished request
    pub fn record_request(&self, endpoint: Endpoint, success: bool, started: Instant) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.request_duration_ms
            .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);

        let counter = match endpoint {
            Endpoint::Health => &self.health_checks,
            Endpoint::Predict => &self.predictions,
            Endpoint::Batch => &self.batch_predictions,
            Endpoint::Model | Endpoint::Retrain => &self.model_requests,
            Endpoint::Cache => &self.cache_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_demo_predictions(&self, count: u64) {
        self.demo_predictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_retrain_started(&self) {
        self.retrains_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retrain_failed(&self) {
        self.retrains_failed.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful_requests = self.successful_requests.load(Ordering::Relaxed);
        let request_duration_ms = self.request_duration_ms.load(Ordering::Relaxed);

        let (success_rate, avg_duration_ms) = if total_requests > 0 {
            (
                successful_requests as f64 / total_requests as f64,
                request_duration_ms as f64 / total_requests as f64,
            )
        } else {
            (0.0, 0.0)
        };

        MetricsSnapshot {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            total_requests,
            successful_requests,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            success_rate,
            avg_duration_ms,
            predictions: self.predictions.load(Ordering::Relaxed),
            batch_predictions: self.batch_predictions.load(Ordering::Relaxed),
            model_requests: self.model_requests.load(Ordering::Relaxed),
            cache_requests: self.cache_requests.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            demo_predictions: self.demo_predictions.load(Ordering::Relaxed),
            retrains_started: self.retrains_started.load(Ordering::Relaxed),
            retrains_failed: self.retrains_failed.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub predictions: u64,
    pub batch_predictions: u64,
    pub model_requests: u64,
    pub cache_requests: u64,
    pub health_checks: u64,
    pub demo_predictions: u64,
    pub retrains_started: u64,
    pub retrains_failed: u64,
    pub error_count: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let series: [(&str, &str, &str, String); 11] = [
            ("uptime_seconds", "gauge", "Uptime of the prediction service in seconds", self.uptime_seconds.to_string()),
            ("requests_total", "counter", "Requests handled", self.total_requests.to_string()),
            ("requests_successful_total", "counter", "Requests answered without error", self.successful_requests.to_string()),
            ("requests_failed_total", "counter", "Requests answered with an error", self.failed_requests.to_string()),
            ("request_duration_avg_ms", "gauge", "Mean request duration", format!("{:.3}", self.avg_duration_ms)),
            ("predictions_total", "counter", "Single-game prediction requests", self.predictions.to_string()),
            ("batch_predictions_total", "counter", "Batch prediction requests", self.batch_predictions.to_string()),
            ("demo_predictions_total", "counter", "Predictions answered in demo mode", self.demo_predictions.to_string()),
            ("retrains_started_total", "counter", "Background retrains started", self.retrains_started.to_string()),
            ("retrains_failed_total", "counter", "Background retrains that failed", self.retrains_failed.to_string()),
            ("errors_total", "counter", "Errors recorded", self.error_count.to_string()),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            let _ = writeln!(output, "# HELP matchday_{name} {help}");
            let _ = writeln!(output, "# TYPE matchday_{name} {kind}");
            let _ = writeln!(output, "matchday_{name} {value}");
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_counts_requests() {
        let metrics = MetricsCollector::new();
        let started = Instant::now();
        metrics.record_request(Endpoint::Predict, true, started);
        metrics.record_request(Endpoint::Predict, false, started);
        metrics.record_request(Endpoint::Cache, true, started);
        metrics.record_demo_predictions(2);

        let snapshot = metrics.get_snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.predictions, 2);
        assert_eq!(snapshot.cache_requests, 1);
        assert_eq!(snapshot.demo_predictions, 2);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn prometheus_output_has_help_and_type() {
        let text = MetricsCollector::new().get_snapshot().render_prometheus();
        assert!(text.contains("# TYPE matchday_requests_total counter"));
        assert!(text.contains("matchday_predictions_total 0"));
    }
}
