use std::collections::HashMap;
use std::sync::Arc;

use mcurl_common::{McurlError, Result};
use mcurl_transport::{RequestFailure, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::executor::RequestExecutor;
use crate::stats::{BatchStats, RequestOutcome};

/// Fires `concurrency` requests at once and waits for all of them.
pub struct BatchRunner<T: Transport> {
    executor: Arc<RequestExecutor<T>>,
}

impl<T: Transport> BatchRunner<T> {
    pub fn new(executor: RequestExecutor<T>) -> Self {
        Self { executor: Arc::new(executor) }
    }

    pub fn executor(&self) -> &RequestExecutor<T> {
        &self.executor
    }

    /// Runs batch `index` (1-based). Returns once every request finished;
    /// dropping the future aborts the requests still in flight.
    pub async fn run(&self, index: usize) -> Result<BatchStats> {
        tracing::info!(batch = index, requests = self.executor.config().concurrency, "starting batch");
        let started = Instant::now();
        let outcomes = self.collect_outcomes(index).await?;
        let stats = BatchStats::from_outcomes(index, &outcomes, started.elapsed());
        tracing::info!(
            batch = index,
            elapsed = ?stats.elapsed,
            average = ?stats.average,
            max = ?stats.max,
            failures = stats.failures,
            "--> batch done"
        );
        Ok(stats)
    }

    /// Launches every request of batch `index` and gathers one outcome per
    /// request, in completion order.
    pub async fn collect_outcomes(&self, index: usize) -> Result<Vec<RequestOutcome>> {
        let n = self.executor.config().concurrency;
        let started = Instant::now();
        // room for every result, so no worker waits on the collector
        let (tx, mut rx) = mpsc::channel::<Result<RequestOutcome>>(n.max(1));
        let mut workers = JoinSet::new();
        let mut seq_by_task = HashMap::with_capacity(n);
        for seq in 1..=n {
            let tx = tx.clone();
            let executor = Arc::clone(&self.executor);
            let handle = workers.spawn(async move {
                let result = executor.execute(seq).await;
                let _ = tx.send(result).await;
            });
            seq_by_task.insert(handle.id(), seq);
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(n);
        let mut fatal: Option<McurlError> = None;
        while let Some(result) = rx.recv().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    fatal.get_or_insert(err);
                }
            }
        }

        // a worker that died without reporting still counts as a request
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                let seq = seq_by_task.get(&err.id()).copied().unwrap_or_default();
                tracing::warn!(batch = index, request = seq, "request task died: {err}");
                outcomes.push(RequestOutcome::failed(
                    seq,
                    started.elapsed(),
                    RequestFailure::Aborted(err.to_string()),
                ));
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }
}
