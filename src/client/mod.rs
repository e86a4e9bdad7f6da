use crate::node::{StorageRequest, StorageResponse};
use crate::request::channel::ChannelSender;
use crate::txn::{retry, RetryOptions, Transaction, Txn};
use crate::util::Result;
use std::future::Future;
use std::time::Duration;

pub(crate) type StorageSender = ChannelSender<StorageRequest, StorageResponse>;

/// Anything that can start transactions.
pub trait Client: Send + Sync {
    type Txn: Txn;

    fn create_transaction(&self) -> Result<Self::Txn>;
}

#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    /// Backoff before the first retry; doubles on every further retry.
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Handle to an open database. Cheap to clone and safe to share between
/// concurrent transactions.
#[derive(Clone)]
pub struct Database {
    sender: StorageSender,
    options: DatabaseOptions,
}

impl Database {
    pub(crate) fn new(sender: StorageSender) -> Self {
        Self {
            sender,
            options: DatabaseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DatabaseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Runs `work` in a transaction, retrying until it commits or fails with
    /// a non-retryable error.
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry::run(self, &RetryOptions::default(), work).await
    }

    /// Like [`Database::run`], bounded by `options`.
    pub async fn run_with<F, Fut, T>(&self, options: &RetryOptions, work: F) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry::run(self, options, work).await
    }
}

impl Client for Database {
    type Txn = Transaction;

    fn create_transaction(&self) -> Result<Transaction> {
        Ok(Transaction::new(self.sender.clone(), self.options.clone()))
    }
}
