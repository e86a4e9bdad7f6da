use crate::codec::{Key, Value};
use crate::storage::view::{VersionChain, View};
use crate::storage::{
    intersects, CommitRequest, Engine, EngineConfig, KeyRange, RangeRequest, RangeScan, Version,
};
use crate::txn::kv_ops::Mutation;
use crate::util::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound::{Excluded, Included};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

pub struct InMemEngine {
    config: EngineConfig,
    inner: RwLock<Inner>,
}

struct Inner {
    data: BTreeMap<Key, VersionChain>,
    // Write-conflict ranges of every commit newer than `oldest`.
    history: VecDeque<(Version, Vec<KeyRange>)>,
    version: Version,
    oldest: Version,
}

impl InMemEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                data: BTreeMap::new(),
                history: VecDeque::new(),
                version: 0,
                oldest: 0,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::internal("storage engine lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::internal("storage engine lock poisoned"))
    }
}

impl Default for InMemEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Inner {
    fn check_version(&self, version: Version) -> Result<()> {
        if version < self.oldest {
            return Err(Error::TransactionTooOld);
        }
        if version > self.version {
            return Err(Error::FutureVersion);
        }
        Ok(())
    }

    fn write_at(&mut self, key: Key, value: Option<Value>, version: Version) {
        let chain = self.data.entry(key).or_default();
        chain.push((version, value));
        // Versions older than the window are unreachable except the newest.
        let keep_from = chain
            .iter()
            .rposition(|(v, _)| *v <= self.oldest)
            .unwrap_or(0);
        chain.drain(..keep_from);
    }

    fn apply(&mut self, m: Mutation, version: Version) {
        match m {
            Mutation::Set(k, v) => self.write_at(k, Some(v), version),
            Mutation::Clear(k) => {
                if self.data.contains_key(&k) {
                    self.write_at(k, None, version)
                }
            }
            Mutation::ClearRange(b, e) => {
                let keys: Vec<Key> = self
                    .data
                    .range::<[u8], _>((Included(b.as_slice()), Excluded(e.as_slice())))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in keys {
                    self.write_at(k, None, version);
                }
            }
        }
    }
}

impl Engine for InMemEngine {
    fn read_version(&self) -> Result<Version> {
        Ok(self.read()?.version)
    }

    fn get(&self, key: &[u8], version: Version) -> Result<Option<Value>> {
        let inner = self.read()?;
        inner.check_version(version)?;
        let view = View::new(&inner.data, version, None);
        Ok(view.get(key).cloned())
    }

    fn get_range(&self, req: &RangeRequest) -> Result<RangeScan> {
        let inner = self.read()?;
        inner.check_version(req.version)?;
        let view = View::new(&inner.data, req.version, req.overlay.as_ref());
        Ok(view.scan(
            &req.begin,
            &req.end,
            req.row_limit,
            req.byte_limit,
            req.reverse,
        ))
    }

    fn commit(&self, req: CommitRequest) -> Result<Version> {
        let mut inner = self.write()?;
        if req.read_version < inner.oldest {
            return Err(Error::TransactionTooOld);
        }
        if req.read_version > inner.version {
            return Err(Error::FutureVersion);
        }
        let conflicted = inner
            .history
            .iter()
            .filter(|(v, _)| *v > req.read_version)
            .flat_map(|(_, writes)| writes.iter())
            .any(|w| req.read_conflicts.iter().any(|r| intersects(r, w)));
        if conflicted {
            debug!(read_version = req.read_version, "commit conflict");
            return Err(Error::NotCommitted);
        }

        let version = inner.version + self.config.versions_per_commit;
        inner.version = version;
        inner.oldest = version.saturating_sub(self.config.mvcc_window);
        for m in req.mutations {
            inner.apply(m, version);
        }
        inner.history.push_back((version, req.write_conflicts));
        let oldest = inner.oldest;
        while matches!(inner.history.front(), Some((v, _)) if *v <= oldest) {
            inner.history.pop_front();
        }
        Ok(version)
    }
}
