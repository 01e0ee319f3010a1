use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::action::{ArgsOf, CallContext, CallFn, CallFuture, Model, OutputOf};

use super::abort::AbortSignal;

/// Store-scoped predicate deciding whether a call error is transient.
pub type RetryablePredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Retry strategy for asynchronous calls.
pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn max_retries(&self) -> u32;
    /// Delay before the retry following failed attempt number `attempt`.
    fn next_delay(&self, attempt: u32) -> Duration;
    fn should_retry(&self, attempt: u32, _error: &anyhow::Error) -> bool {
        attempt <= self.max_retries()
    }
}

/// Waits `seed × attempt` between attempts.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    retries: u32,
    seed: Duration,
}

impl LinearBackoff {
    pub fn new(retries: u32, seed: Duration) -> Self {
        Self { retries, seed }
    }
}

impl RetryStrategy for LinearBackoff {
    fn name(&self) -> &str {
        "linear"
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        self.seed.saturating_mul(attempt)
    }
}

pub(crate) struct RetryRun<'a, M: Model> {
    pub action: &'a str,
    pub call: &'a CallFn<M>,
    pub args: &'a ArgsOf<M>,
    pub signal: &'a AbortSignal,
    pub abortable: bool,
    pub strategy: Option<&'a dyn RetryStrategy>,
    pub retryable: &'a RetryablePredicate,
}

/// Awaits `first` and re-invokes the call while the strategy allows it.
///
/// Returns `Ok(None)` if a retry attempt declined to run. Aborted calls are
/// never retried.
pub(crate) async fn call_with_retry<M: Model>(
    run: RetryRun<'_, M>,
    first: CallFuture<M>,
) -> anyhow::Result<Option<OutputOf<M>>> {
    let mut attempt = 1;
    let mut current = first;

    loop {
        let err = match current.await {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };

        let Some(strategy) = run.strategy else {
            return Err(err);
        };
        if run.signal.is_aborted()
            || !(run.retryable)(&err)
            || !strategy.should_retry(attempt, &err)
        {
            return Err(err);
        }

        let delay = strategy.next_delay(attempt);
        debug!(
            action = run.action,
            attempt,
            delay_ms = delay.as_millis() as u64,
            strategy = strategy.name(),
            error = %err,
            "retrying call"
        );
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = run.signal.aborted() => return Err(err),
            }
        }

        attempt += 1;
        let ctx = CallContext {
            args: run.args.clone(),
            attempt,
            signal: run.abortable.then(|| run.signal.clone()),
        };
        match (run.call)(ctx) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
}
