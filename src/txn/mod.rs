use crate::util::{Error, Result};
use async_trait::async_trait;

/// One attempt at an atomic set of operations, as seen by the retry driver.
#[async_trait]
pub trait Txn: Clone + Send + Sync + Sized + 'static {
    /// Makes the attempt's writes visible, or reports why it could not.
    async fn commit(&self) -> Result<()>;
    /// Consumes the attempt. A retryable `err` yields the transaction for the
    /// next attempt once any backoff has elapsed; otherwise the (possibly
    /// escalated) error is returned.
    async fn on_error(self, err: Error) -> Result<Self>;
    /// Ends the attempt without a retry decision.
    fn cancel(&self);
}

pub mod kv_ops;
mod range;
pub mod retry;
mod transaction;

pub use range::{RangeOption, RangeResult, StreamingMode};
pub use retry::{run, RetryOptions};
pub use transaction::Transaction;
