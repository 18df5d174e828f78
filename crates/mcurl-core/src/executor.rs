use std::sync::Arc;

use mcurl_common::config::Config;
use mcurl_common::Result;
use mcurl_transport::Transport;
use tokio::time::Instant;

use crate::stats::RequestOutcome;

/// Runs one request/response cycle and times it.
pub struct RequestExecutor<T: Transport> {
    transport: Arc<T>,
    config: Arc<Config>,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: Arc<T>, config: Arc<Config>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Times the request from submission until its body is drained or an
    /// error shows up. Only a request that cannot be built is an `Err`; any
    /// other failure is folded into the returned outcome, latency included.
    pub async fn execute(&self, seq: usize) -> Result<RequestOutcome> {
        let request = self.transport.prepare(seq)?;
        tracing::debug!(request = seq, "starting request");

        let started = Instant::now();
        let result = self.transport.perform(request).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(exchange) => {
                tracing::debug!(request = seq, status = exchange.status, ?elapsed, "request done");
                RequestOutcome::succeeded(seq, elapsed, exchange)
            }
            Err(failure) => {
                if self.config.verbose {
                    tracing::warn!(request = seq, ?elapsed, "{failure}");
                }
                RequestOutcome::failed(seq, elapsed, failure)
            }
        };
        Ok(outcome)
    }
}
