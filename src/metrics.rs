//! Prometheus metrics for remote calls and job waits
//!
//! Each client owns its own registry; nothing is registered globally.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

pub struct ClientMetrics {
    registry: Registry,
    calls: IntCounterVec,
    job_waits: HistogramVec,
}

impl ClientMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let calls = IntCounterVec::new(
            Opts::new("trueform_rpc_calls_total", "Remote calls by method and outcome"),
            &["method", "outcome"],
        )
        .expect("valid metric definition");
        let job_waits = HistogramVec::new(
            HistogramOpts::new("trueform_job_wait_seconds", "Time spent waiting for jobs")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["outcome"],
        )
        .expect("valid metric definition");

        // Registration only fails on duplicate names in the same registry
        let _ = registry.register(Box::new(calls.clone()));
        let _ = registry.register(Box::new(job_waits.clone()));

        Self {
            registry,
            calls,
            job_waits,
        }
    }

    pub fn record_call(&self, method: &str, outcome: &str) {
        self.calls.with_label_values(&[method, outcome]).inc();
    }

    pub fn record_job_wait(&self, elapsed: Duration, outcome: &str) {
        self.job_waits
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    pub fn call_count(&self, method: &str, outcome: &str) -> u64 {
        self.calls.with_label_values(&[method, outcome]).get()
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counts() {
        let metrics = ClientMetrics::new();
        metrics.record_call("nfs.config", "ok");
        metrics.record_call("nfs.config", "ok");
        metrics.record_job_wait(Duration::from_secs(3), "success");

        assert_eq!(metrics.call_count("nfs.config", "ok"), 2);
        let text = metrics.render();
        assert!(text.contains("trueform_rpc_calls_total"));
        assert!(text.contains("trueform_job_wait_seconds"));
    }
}
