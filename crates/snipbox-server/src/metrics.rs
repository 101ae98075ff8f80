//! In-memory metrics rendered in Prometheus text exposition format.
//!
//! Observation points:
//!
//! - `sandbox_runs_total{language,result}` - completed executions
//! - `sandbox_run_duration_seconds{language,result}` - duration histogram
//! - `sandbox_runs_inflight{language}` - executions currently running
//! - `sandbox_requests_inflight` - requests past the admission gate
//! - `sandbox_requests_rejected_total` - admission rejections
//! - `sandbox_workers_in_use` - worker semaphore holders

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0];

type LabelPair = (&'static str, &'static str);

#[derive(Default)]
struct HistogramData {
    bucket_counts: Vec<u64>,
    sum_seconds: f64,
    count: u64,
}

#[derive(Default)]
pub struct Metrics {
    runs_total: Mutex<HashMap<LabelPair, u64>>,
    run_durations: Mutex<HashMap<LabelPair, HistogramData>>,
    runs_inflight: Mutex<HashMap<&'static str, i64>>,
    requests_inflight: AtomicI64,
    requests_rejected_total: AtomicU64,
    workers_in_use: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_run(&self, language: &'static str, result: &'static str, duration: Duration) {
        let key = (language, result);
        *self.runs_total.lock().unwrap_or_else(|e| e.into_inner()).entry(key).or_default() += 1;

        let seconds = duration.as_secs_f64();
        let mut durations = self.run_durations.lock().unwrap_or_else(|e| e.into_inner());
        let data = durations.entry(key).or_insert_with(|| HistogramData {
            bucket_counts: vec![0; DURATION_BUCKETS.len()],
            sum_seconds: 0.0,
            count: 0,
        });
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            if seconds <= *bound {
                data.bucket_counts[i] += 1;
            }
        }
        data.sum_seconds += seconds;
        data.count += 1;
    }

    pub fn run_started(&self, language: &'static str) {
        *self
            .runs_inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(language)
            .or_default() += 1;
    }

    pub fn run_finished(&self, language: &'static str) {
        *self
            .runs_inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(language)
            .or_default() -= 1;
    }

    pub fn request_admitted(&self) {
        self.requests_inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_rejected(&self) {
        self.requests_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_acquired(&self) {
        self.workers_in_use.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_released(&self) {
        self.workers_in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP sandbox_runs_total Total number of sandbox code executions.\n");
        out.push_str("# TYPE sandbox_runs_total counter\n");
        let runs = self.runs_total.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = runs.keys().copied().collect();
        keys.sort_unstable();
        for (language, result) in keys {
            let _ = writeln!(
                out,
                "sandbox_runs_total{{language=\"{language}\",result=\"{result}\"}} {}",
                runs[&(language, result)]
            );
        }
        drop(runs);

        out.push_str(
            "# HELP sandbox_run_duration_seconds Duration of sandbox code executions in seconds.\n",
        );
        out.push_str("# TYPE sandbox_run_duration_seconds histogram\n");
        let durations = self.run_durations.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = durations.keys().copied().collect();
        keys.sort_unstable();
        for (language, result) in keys {
            let data = &durations[&(language, result)];
            let labels = format!("language=\"{language}\",result=\"{result}\"");
            for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "sandbox_run_duration_seconds_bucket{{{labels},le=\"{bound}\"}} {}",
                    data.bucket_counts[i]
                );
            }
            let _ = writeln!(
                out,
                "sandbox_run_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {}",
                data.count
            );
            let _ = writeln!(
                out,
                "sandbox_run_duration_seconds_sum{{{labels}}} {}",
                data.sum_seconds
            );
            let _ = writeln!(
                out,
                "sandbox_run_duration_seconds_count{{{labels}}} {}",
                data.count
            );
        }
        drop(durations);

        out.push_str(
            "# HELP sandbox_runs_inflight Current number of in-flight sandbox code executions.\n",
        );
        out.push_str("# TYPE sandbox_runs_inflight gauge\n");
        let inflight = self.runs_inflight.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = inflight.keys().copied().collect();
        keys.sort_unstable();
        for language in keys {
            let _ = writeln!(
                out,
                "sandbox_runs_inflight{{language=\"{language}\"}} {}",
                inflight[language]
            );
        }
        drop(inflight);

        out.push_str("# HELP sandbox_requests_inflight In-flight requests to the sandbox run API.\n");
        out.push_str("# TYPE sandbox_requests_inflight gauge\n");
        let _ = writeln!(
            out,
            "sandbox_requests_inflight {}",
            self.requests_inflight.load(Ordering::Relaxed)
        );

        out.push_str(
            "# HELP sandbox_requests_rejected_total Total number of requests rejected due to max request limits.\n",
        );
        out.push_str("# TYPE sandbox_requests_rejected_total counter\n");
        let _ = writeln!(
            out,
            "sandbox_requests_rejected_total {}",
            self.requests_rejected_total.load(Ordering::Relaxed)
        );

        out.push_str(
            "# HELP sandbox_workers_in_use Current number of workers acquired by the worker semaphore.\n",
        );
        out.push_str("# TYPE sandbox_workers_in_use gauge\n");
        let _ = writeln!(
            out,
            "sandbox_workers_in_use {}",
            self.workers_in_use.load(Ordering::Relaxed)
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_gauges_render() {
        let metrics = Metrics::new();
        metrics.request_admitted();
        metrics.worker_acquired();
        metrics.request_rejected();
        metrics.run_started("python3");
        metrics.observe_run("python3", "success", Duration::from_millis(120));
        metrics.run_finished("python3");

        let text = metrics.render();
        assert!(text.contains("sandbox_runs_total{language=\"python3\",result=\"success\"} 1"));
        assert!(text.contains("sandbox_requests_inflight 1"));
        assert!(text.contains("sandbox_requests_rejected_total 1"));
        assert!(text.contains("sandbox_workers_in_use 1"));
        assert!(text.contains("sandbox_runs_inflight{language=\"python3\"} 0"));
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let metrics = Metrics::new();
        metrics.observe_run("nodejs", "error", Duration::from_millis(80));
        metrics.observe_run("nodejs", "error", Duration::from_secs(4));

        let text = metrics.render();
        // 0.08s lands in every bucket from 0.1 up; 4s only from 5 up.
        assert!(text.contains("le=\"0.05\"} 0"));
        assert!(text.contains("le=\"0.1\"} 1"));
        assert!(text.contains("le=\"5\"} 2"));
        assert!(text.contains("le=\"+Inf\"} 2"));
        assert!(text.contains("sandbox_run_duration_seconds_count{language=\"nodejs\",result=\"error\"} 2"));
    }
}
