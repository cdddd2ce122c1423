use std::time::Duration;

use chrono::{DateTime, Utc};
use duet_protocol::EndpointKind;
use serde::Serialize;
use uuid::Uuid;

/// One successful call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallSample {
    pub worker: usize,
    pub call: usize,
    pub latency: Duration,
    pub slow: bool,
}

/// One call that produced no usable response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallFailure {
    pub worker: usize,
    pub call: usize,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

impl LatencyStats {
    /// Nearest-rank percentiles over `latencies`. `None` when empty.
    pub fn from_latencies(latencies: &[Duration]) -> Option<Self> {
        if latencies.is_empty() {
            return None;
        }
        let mut sorted = latencies.to_vec();
        sorted.sort_unstable();
        let total: Duration = sorted.iter().sum();
        let count = u32::try_from(sorted.len()).unwrap_or(u32::MAX);
        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: total / count,
            p50: nearest_rank(&sorted, 50),
            p90: nearest_rank(&sorted, 90),
            p99: nearest_rank(&sorted, 99),
        })
    }
}

fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub endpoint: String,
    pub workers: usize,
    pub calls_per_worker: usize,
    pub slow_threshold: Duration,
    pub samples: Vec<CallSample>,
    pub failures: Vec<CallFailure>,
    /// Wall clock from the first worker start to the last worker finish.
    pub elapsed: Duration,
}

impl LoadReport {
    pub(crate) fn new(
        endpoint: EndpointKind,
        workers: usize,
        calls_per_worker: usize,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            endpoint: endpoint.to_string(),
            workers,
            calls_per_worker,
            slow_threshold,
            samples: Vec::new(),
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn attempted(&self) -> usize {
        self.samples.len() + self.failures.len()
    }

    /// Successful calls per second of wall clock. Failed calls are excluded.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / secs
    }

    pub fn slow_calls(&self) -> usize {
        self.samples.iter().filter(|s| s.slow).count()
    }

    pub fn stats(&self) -> Option<LatencyStats> {
        let latencies: Vec<Duration> = self.samples.iter().map(|s| s.latency).collect();
        LatencyStats::from_latencies(&latencies)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} calls ({} failed) in {:.3}s, {:.1} calls/s, {} slow (> {} ms)",
            self.attempted(),
            self.failures.len(),
            self.elapsed.as_secs_f64(),
            self.throughput(),
            self.slow_calls(),
            self.slow_threshold.as_millis(),
        )
    }
}
