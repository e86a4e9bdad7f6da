use crate::codec::{Key, KeySelector, KeyValue, Value};
use crate::txn::kv_ops::{Mutation, WriteMap};
use crate::util::Result;

mod in_mem;
mod view;
pub use in_mem::InMemEngine;

pub type Version = u64;

/// A half-open key range `[begin, end)`.
pub type KeyRange = (Key, Key);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How many versions behind the latest commit a read version may lag
    /// before reads and commits fail with `transaction_too_old`.
    pub mvcc_window: Version,
    /// Version increment per commit.
    pub versions_per_commit: Version,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mvcc_window: 5_000_000,
            versions_per_commit: 1_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RangeRequest {
    pub begin: KeySelector,
    pub end: KeySelector,
    pub version: Version,
    /// Zero means no row limit.
    pub row_limit: usize,
    /// Zero means no byte budget.
    pub byte_limit: usize,
    pub reverse: bool,
    /// Buffered writes of the reading transaction, merged into the result.
    pub overlay: Option<WriteMap>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeScan {
    pub kvs: Vec<KeyValue>,
    pub more: bool,
    /// The part of the keyspace this read depended on.
    pub conflict: KeyRange,
}

#[derive(Clone, Debug, Default)]
pub struct CommitRequest {
    pub read_version: Version,
    pub read_conflicts: Vec<KeyRange>,
    pub write_conflicts: Vec<KeyRange>,
    pub mutations: Vec<Mutation>,
}

/// A multi-version ordered store with optimistic conflict checking.
pub trait Engine: Sync + Send {
    /// The latest committed version.
    fn read_version(&self) -> Result<Version>;
    fn get(&self, key: &[u8], version: Version) -> Result<Option<Value>>;
    fn get_range(&self, req: &RangeRequest) -> Result<RangeScan>;
    /// Applies the mutations atomically at a new version, or fails with
    /// `not_committed` if a read-conflict range was written after
    /// `read_version`.
    fn commit(&self, req: CommitRequest) -> Result<Version>;
}

#[inline]
pub(crate) fn intersects(a: &KeyRange, b: &KeyRange) -> bool {
    a.0 < b.1 && b.0 < a.1
}
