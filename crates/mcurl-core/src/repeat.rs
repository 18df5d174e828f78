use std::future::Future;
use std::sync::Arc;

use mcurl_common::config::Config;
use mcurl_common::Result;
use mcurl_transport::Transport;
use tokio::time::{sleep, Instant};

use crate::batch::BatchRunner;
use crate::executor::RequestExecutor;
use crate::stats::{RunStats, StopReason};

/// Runs batches one after another, with a cooldown in between, until the
/// repeat count is exhausted, the duration cap is reached or shutdown fires.
pub struct RepeatController<T: Transport> {
    runner: BatchRunner<T>,
    config: Arc<Config>,
}

impl<T: Transport> RepeatController<T> {
    pub fn new(transport: Arc<T>, config: Arc<Config>) -> Self {
        let executor = RequestExecutor::new(transport, Arc::clone(&config));
        Self { runner: BatchRunner::new(executor), config }
    }

    pub async fn run(&self) -> Result<RunStats> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops early once `shutdown` resolves. A
    /// batch cut short that way is dropped from the statistics.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let config = &self.config;
        tracing::info!(
            method = %config.method,
            url = %config.url,
            requests = config.concurrency,
            repeat = config.repeat,
            "starting run"
        );
        if config.verbose {
            tracing::info!("{config}");
        }

        tokio::pin!(shutdown);
        let started = Instant::now();
        let deadline_reached = || config.max_duration().is_some_and(|cap| started.elapsed() > cap);

        let mut batches = Vec::new();
        let mut stop = StopReason::Completed;
        let mut index = 0usize;
        loop {
            if config.repeat_limit().is_some_and(|limit| index >= limit as usize) {
                break;
            }
            if index > 0 {
                if deadline_reached() {
                    stop = StopReason::DeadlineReached;
                    break;
                }
                tokio::select! {
                    _ = &mut shutdown => {
                        stop = StopReason::Interrupted;
                        break;
                    }
                    _ = sleep(config.cooldown) => {}
                }
            }
            // the cap is only ever checked here, never inside a batch
            if deadline_reached() {
                stop = StopReason::DeadlineReached;
                break;
            }

            index += 1;
            let batch = tokio::select! {
                _ = &mut shutdown => {
                    stop = StopReason::Interrupted;
                    break;
                }
                result = self.runner.run(index) => result?,
            };
            batches.push(batch);
        }

        let stats = RunStats::from_batches(batches, started.elapsed(), stop);
        tracing::info!(batches = stats.batch_count(), stop = ?stats.stop, "run finished");
        Ok(stats)
    }
}
