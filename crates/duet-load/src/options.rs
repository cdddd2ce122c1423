use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub workers: usize,
    pub calls_per_worker: usize,
    /// Calls slower than this are flagged.
    pub slow_threshold_ms: u64,
    /// Base seed; worker `i` samples with `seed + i`. Entropy when unset.
    pub seed: Option<u64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            calls_per_worker: 10_000,
            slow_threshold_ms: 100,
            seed: None,
        }
    }
}

impl LoadOptions {
    pub fn new(workers: usize, calls_per_worker: usize) -> Self {
        Self {
            workers,
            calls_per_worker,
            ..Self::default()
        }
    }

    pub fn slow_threshold_ms(mut self, ms: u64) -> Self {
        self.slow_threshold_ms = ms;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    pub fn total_calls(&self) -> usize {
        self.workers.saturating_mul(self.calls_per_worker)
    }

    pub fn validate(&self) -> LoadResult<()> {
        if self.workers == 0 {
            return Err(LoadError::InvalidOptions("workers must be at least 1".into()));
        }
        if self.calls_per_worker == 0 {
            return Err(LoadError::InvalidOptions("calls_per_worker must be at least 1".into()));
        }
        Ok(())
    }
}
