//! The transaction retry driver.
//!
//! Runs a unit of work against fresh transactions until one commits. Every
//! error, whether raised by the unit of work or by commit, goes through
//! [`Txn::on_error`]; only errors it refuses to retry reach the caller.

use crate::client::Client;
use crate::txn::Txn;
use crate::util::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Caller-side bounds on one [`run`]. Both default to unbounded, leaving
/// the database's classification as the only stop.
#[derive(Clone, Debug, Default)]
pub struct RetryOptions {
    /// Attempts allowed before the last error is returned as is. That error
    /// still reports [`Error::is_retryable`]; the run is over regardless, so
    /// do not hand it to another retry loop.
    pub max_attempts: Option<u32>,
    /// Deadline for the whole run, retries included.
    pub timeout: Option<Duration>,
}

impl RetryOptions {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

enum State<T, R> {
    /// Holds the successor of a retried attempt, if any.
    Start(Option<T>),
    Executing(T),
    Committing(T, R),
    Resolving(T, Error),
    Done(R),
    Failed(Error),
}

async fn within<T>(deadline: Option<Instant>, f: impl Future<Output = Result<T>>) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, f)
            .await
            .unwrap_or(Err(Error::TransactionTimedOut)),
        None => f.await,
    }
}

/// Executes `work` until a transaction running it commits.
///
/// `work` may run more than once and must not commit itself. Its result from
/// the attempt that committed is returned.
pub async fn run<C, F, Fut, R>(client: &C, options: &RetryOptions, mut work: F) -> Result<R>
where
    C: Client + ?Sized,
    F: FnMut(C::Txn) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let mut attempts: u32 = 0;
    let mut state = State::Start(None);
    loop {
        state = match state {
            State::Start(next) => match next.map_or_else(|| client.create_transaction(), Ok) {
                Ok(txn) => State::Executing(txn),
                Err(e) => State::Failed(e),
            },
            State::Executing(txn) => {
                attempts += 1;
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    State::Resolving(txn, Error::TransactionTimedOut)
                } else {
                    match within(deadline, work(txn.clone())).await {
                        Ok(r) => State::Committing(txn, r),
                        Err(e) => State::Resolving(txn, e),
                    }
                }
            }
            State::Committing(txn, r) => match within(deadline, txn.commit()).await {
                Ok(()) => State::Done(r),
                Err(e) => State::Resolving(txn, e),
            },
            State::Resolving(txn, err) => {
                let exhausted = options.max_attempts.map_or(false, |max| attempts >= max);
                if exhausted && err.is_retryable() {
                    warn!(attempts, error = %err, "transaction retry limit reached");
                    txn.cancel();
                    State::Failed(err)
                } else {
                    match within(deadline, txn.on_error(err)).await {
                        Ok(next) => {
                            debug!(attempts, "retrying transaction");
                            State::Start(Some(next))
                        }
                        Err(e) => State::Failed(e),
                    }
                }
            }
            State::Done(r) => return Ok(r),
            State::Failed(e) => {
                debug!(attempts, code = e.code(), error = %e, "transaction failed");
                return Err(e);
            }
        }
    }
}
