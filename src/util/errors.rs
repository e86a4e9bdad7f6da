use std::result::Result as stdResult;
use thiserror::Error;

pub type Result<T> = stdResult<T, Error>;

/// How the retry driver must treat an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Discard the attempt and run the unit of work again.
    Retryable,
    /// Propagate to the caller.
    Fatal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Transaction is too old to perform reads or be committed")]
    TransactionTooOld,
    #[error("Request for future version")]
    FutureVersion,
    #[error("Transaction not committed due to conflict with another transaction")]
    NotCommitted,
    #[error("Transaction may or may not have committed")]
    CommitUnknownResult,
    #[error("Operation aborted because the transaction was cancelled")]
    TransactionCancelled,
    #[error("Operation aborted because the transaction timed out")]
    TransactionTimedOut,
    #[error("Database is locked")]
    DatabaseLocked,
    #[error("No cluster file found in {0}")]
    NoClusterFileFound(String),
    #[error("Key outside legal range")]
    KeyOutsideLegalRange,
    #[error("Range begin key larger than end key")]
    InvertedRange,
    #[error("Option set with an invalid value: {0}")]
    InvalidOptionValue(String),
    #[error("Database name must be 'DB', got '{0}'")]
    InvalidDatabaseName(String),
    #[error("Operation issued while a commit was outstanding")]
    UsedDuringCommit,
    #[error("Transaction exceeds byte limit")]
    TransactionTooLarge,
    #[error("Key length exceeds limit")]
    KeyTooLarge,
    #[error("Value length exceeds limit")]
    ValueTooLarge,
    #[error("Connection string invalid: {0}")]
    ConnectionStringInvalid(String),
    #[error("Exact streaming mode requires limits, but none were given")]
    ExactModeWithoutLimits,
    #[error("request error {0}")]
    RequestError(RequestError),
    #[error("{0}")]
    User(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric code reported to users and used as the process exit status.
    pub fn code(&self) -> i32 {
        match self {
            Error::TransactionTooOld => 1007,
            Error::FutureVersion => 1009,
            Error::NotCommitted => 1020,
            Error::CommitUnknownResult => 1021,
            Error::TransactionCancelled => 1025,
            Error::TransactionTimedOut => 1031,
            Error::DatabaseLocked => 1038,
            Error::RequestError(_) => 1100,
            Error::NoClusterFileFound(_) => 1515,
            Error::KeyOutsideLegalRange => 2004,
            Error::InvertedRange => 2005,
            Error::InvalidOptionValue(_) => 2006,
            Error::InvalidDatabaseName(_) => 2013,
            Error::UsedDuringCommit => 2017,
            Error::TransactionTooLarge => 2101,
            Error::KeyTooLarge => 2102,
            Error::ValueTooLarge => 2103,
            Error::ConnectionStringInvalid(_) => 2104,
            Error::ExactModeWithoutLimits => 2210,
            Error::User(_) => 4000,
            Error::Internal(_) => 4100,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::TransactionTooOld
            | Error::FutureVersion
            | Error::NotCommitted
            | Error::CommitUnknownResult
            | Error::DatabaseLocked => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// The commit may have been applied even though it reported an error.
    #[inline]
    pub fn is_maybe_committed(&self) -> bool {
        matches!(self, Error::CommitUnknownResult)
    }

    pub fn internal(msg: impl Into<String>) -> Error {
        Error::Internal(msg.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("channel send error {0}")]
    SendError(String),
    #[error("response dropped by the network")]
    ResponseDropped,
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Error {
        Error::RequestError(e)
    }
}
