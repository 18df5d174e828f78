use std::collections::BTreeMap;
use std::time::Duration;

use mcurl_transport::{Exchange, RequestFailure};
use serde::Serialize;

/// Timing of a single request attempt, failed or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub seq: usize,
    pub elapsed: Duration,
    pub status: Option<u16>,
    pub bytes: u64,
    pub failure: Option<RequestFailure>,
}

impl RequestOutcome {
    pub fn succeeded(seq: usize, elapsed: Duration, exchange: Exchange) -> Self {
        Self { seq, elapsed, status: Some(exchange.status), bytes: exchange.bytes, failure: None }
    }

    pub fn failed(seq: usize, elapsed: Duration, failure: RequestFailure) -> Self {
        Self { seq, elapsed, status: failure.status(), bytes: 0, failure: Some(failure) }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Aggregate of one batch. Failed requests count like any other: their
/// latency is part of the average and the maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub index: usize,
    pub requests: usize,
    pub failures: usize,
    pub average: Duration,
    pub max: Duration,
    /// Wall time of the batch, from first launch to barrier.
    pub elapsed: Duration,
    pub bytes: u64,
    pub status_counts: BTreeMap<u16, usize>,
}

impl BatchStats {
    pub fn from_outcomes(index: usize, outcomes: &[RequestOutcome], elapsed: Duration) -> Self {
        let mut status_counts = BTreeMap::new();
        for status in outcomes.iter().filter_map(|o| o.status) {
            *status_counts.entry(status).or_insert(0) += 1;
        }
        Self {
            index,
            requests: outcomes.len(),
            failures: outcomes.iter().filter(|o| o.is_failure()).count(),
            average: mean(outcomes.iter().map(|o| o.elapsed)),
            max: outcomes.iter().map(|o| o.elapsed).max().unwrap_or_default(),
            elapsed,
            bytes: outcomes.iter().map(|o| o.bytes).sum(),
            status_counts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every scheduled batch ran.
    Completed,
    /// The run duration cap was reached at a batch boundary.
    DeadlineReached,
    /// Stopped by the operator.
    Interrupted,
}

/// Aggregate of a whole run: the mean of batch averages and the largest
/// batch maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub batches: Vec<BatchStats>,
    pub average: Duration,
    pub max: Duration,
    pub elapsed: Duration,
    pub requests: usize,
    pub failures: usize,
    pub stop: StopReason,
}

impl RunStats {
    pub fn from_batches(batches: Vec<BatchStats>, elapsed: Duration, stop: StopReason) -> Self {
        Self {
            average: mean(batches.iter().map(|b| b.average)),
            max: batches.iter().map(|b| b.max).max().unwrap_or_default(),
            requests: batches.iter().map(|b| b.requests).sum(),
            failures: batches.iter().map(|b| b.failures).sum(),
            elapsed,
            stop,
            batches,
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}

/// Arithmetic mean with floating point division. Zero for an empty input.
pub fn mean(durations: impl Iterator<Item = Duration>) -> Duration {
    let (total, count) = durations.fold((Duration::ZERO, 0u32), |(total, count), d| (total + d, count + 1));
    if count == 0 {
        return Duration::ZERO;
    }
    total.div_f64(f64::from(count))
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub requests: usize,
    pub failures: usize,
    pub average_ms: f64,
    pub max_ms: f64,
    pub elapsed_ms: f64,
    pub bytes: u64,
    pub status_counts: BTreeMap<u16, usize>,
}

impl From<&BatchStats> for BatchReport {
    fn from(stats: &BatchStats) -> Self {
        Self {
            index: stats.index,
            requests: stats.requests,
            failures: stats.failures,
            average_ms: millis(stats.average),
            max_ms: millis(stats.max),
            elapsed_ms: millis(stats.elapsed),
            bytes: stats.bytes,
            status_counts: stats.status_counts.clone(),
        }
    }
}

/// Serializable view of [`RunStats`], durations in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub batches: usize,
    pub requests: usize,
    pub failures: usize,
    pub average_ms: f64,
    pub max_ms: f64,
    pub elapsed_ms: f64,
    pub stop: StopReason,
    pub per_batch: Vec<BatchReport>,
}

impl From<&RunStats> for RunReport {
    fn from(stats: &RunStats) -> Self {
        Self {
            batches: stats.batch_count(),
            requests: stats.requests,
            failures: stats.failures,
            average_ms: millis(stats.average),
            max_ms: millis(stats.max),
            elapsed_ms: millis(stats.elapsed),
            stop: stats.stop,
            per_batch: stats.batches.iter().map(BatchReport::from).collect(),
        }
    }
}
