use crate::client::{DatabaseOptions, StorageSender};
use crate::codec::{
    is_user_key, key_after, KeyValue, Value, KEYSPACE_END, KEY_SIZE_LIMIT,
    TRANSACTION_SIZE_LIMIT, VALUE_SIZE_LIMIT,
};
use crate::node::{StorageRequest, StorageResponse};
use crate::request::Sender;
use crate::storage::{CommitRequest, KeyRange, RangeRequest, Version};
use crate::txn::kv_ops::WriteMap;
use crate::txn::range::{RangeOption, RangeResult};
use crate::txn::Txn;
use crate::util::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Active,
    Committing,
    Committed,
    Cancelled,
}

struct State {
    status: Status,
    read_version: Option<Version>,
    writes: WriteMap,
    read_conflicts: Vec<KeyRange>,
    write_conflicts: Vec<KeyRange>,
    // First rejected mutation. Fails every later read and commit until the
    // attempt is reset or replaced.
    deferred: Option<Error>,
    committed_version: Option<Version>,
}

impl State {
    fn new() -> Self {
        Self {
            status: Status::Active,
            read_version: None,
            writes: WriteMap::new(),
            read_conflicts: vec![],
            write_conflicts: vec![],
            deferred: None,
            committed_version: None,
        }
    }

    fn check_usable(&self) -> Result<()> {
        match self.status {
            Status::Active => match &self.deferred {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            },
            Status::Cancelled => Err(Error::TransactionCancelled),
            Status::Committing | Status::Committed => Err(Error::UsedDuringCommit),
        }
    }

    fn mutate(&mut self, check: Result<()>, conflict: KeyRange, apply: impl FnOnce(&mut WriteMap)) {
        if let Err(e) = self.check_usable().and(check) {
            if self.deferred.is_none() {
                self.deferred = Some(e);
            }
            return;
        }
        apply(&mut self.writes);
        self.write_conflicts.push(conflict);
    }
}

struct Inner {
    sender: StorageSender,
    options: DatabaseOptions,
    // Delay applied by the next retryable `on_error`.
    backoff: Duration,
    state: Mutex<State>,
}

/// One attempt at an atomic set of reads and writes.
///
/// Clones share the attempt. Writes are buffered locally and become visible
/// to other transactions only when [`Transaction::commit`] succeeds; reads
/// observe a consistent snapshot plus this transaction's own writes.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() > KEY_SIZE_LIMIT {
        return Err(Error::KeyTooLarge);
    }
    if !is_user_key(key) {
        return Err(Error::KeyOutsideLegalRange);
    }
    Ok(())
}

fn unexpected(res: StorageResponse) -> Error {
    Error::internal(format!("unexpected response {:?}", res))
}

impl Transaction {
    pub(crate) fn new(sender: StorageSender, options: DatabaseOptions) -> Self {
        let backoff = options.initial_retry_delay;
        Self::with_backoff(sender, options, backoff)
    }

    fn with_backoff(sender: StorageSender, options: DatabaseOptions, backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sender,
                options,
                backoff,
                state: Mutex::new(State::new()),
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.inner
            .state
            .lock()
            .map_err(|_| Error::internal("transaction state lock poisoned"))
    }

    async fn request(&self, req: StorageRequest) -> Result<StorageResponse> {
        self.inner.sender.send(req).await
    }

    async fn fetch_read_version(&self) -> Result<Version> {
        let version = match self.request(StorageRequest::GetReadVersion).await? {
            StorageResponse::ReadVersion(v) => v,
            other => return Err(unexpected(other)),
        };
        let mut state = self.state()?;
        Ok(*state.read_version.get_or_insert(version))
    }

    /// The snapshot version reads are served at, obtained on first use.
    pub async fn get_read_version(&self) -> Result<Version> {
        {
            let state = self.state()?;
            state.check_usable()?;
            if let Some(v) = state.read_version {
                return Ok(v);
            }
        }
        self.fetch_read_version().await
    }

    /// Reads `key`. An absent key is `Ok(None)`. Snapshot reads do not make
    /// the commit depend on the key staying unchanged.
    pub async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Value>> {
        check_key(key)?;
        {
            let state = self.state()?;
            state.check_usable()?;
            if let Some(written) = state.writes.lookup(key) {
                return Ok(written.cloned());
            }
        }
        let version = self.get_read_version().await?;
        let req = StorageRequest::Get {
            key: key.to_vec(),
            version,
        };
        let value = match self.request(req).await? {
            StorageResponse::Value(v) => v,
            other => return Err(unexpected(other)),
        };
        let mut state = self.state()?;
        state.check_usable()?;
        if !snapshot {
            state.read_conflicts.push((key.to_vec(), key_after(key)));
        }
        Ok(value)
    }

    /// Reads one batch of the range. `iteration` starts at 1 and only matters
    /// for [`StreamingMode::Iterator`](crate::txn::StreamingMode::Iterator).
    pub async fn get_range(
        &self,
        opt: &RangeOption,
        iteration: usize,
        snapshot: bool,
    ) -> Result<RangeResult> {
        let (row_limit, byte_limit) = opt.batch_limits(iteration)?;
        let overlay = {
            let state = self.state()?;
            state.check_usable()?;
            if state.writes.is_empty() {
                None
            } else {
                Some(state.writes.clone())
            }
        };
        let version = self.get_read_version().await?;
        let req = RangeRequest {
            begin: opt.begin.clone(),
            end: opt.end.clone(),
            version,
            row_limit,
            byte_limit,
            reverse: opt.reverse,
            overlay,
        };
        let scan = match self.request(StorageRequest::GetRange(Box::new(req))).await? {
            StorageResponse::Range(scan) => scan,
            other => return Err(unexpected(other)),
        };
        let mut state = self.state()?;
        state.check_usable()?;
        if !snapshot && scan.conflict.0 < scan.conflict.1 {
            state.read_conflicts.push(scan.conflict);
        }
        Ok(RangeResult::new(scan.kvs, scan.more))
    }

    /// Streams the whole range batch by batch, continuing while the service
    /// reports more rows.
    pub fn get_ranges(
        &self,
        opt: RangeOption,
        snapshot: bool,
    ) -> impl Stream<Item = Result<RangeResult>> + Send + 'static {
        let txn = self.clone();
        stream::unfold(Some((opt, 1usize)), move |next| {
            let txn = txn.clone();
            async move {
                let (opt, iteration) = next?;
                match txn.get_range(&opt, iteration, snapshot).await {
                    Ok(batch) => {
                        let following = opt.next_range(&batch).map(|o| (o, iteration + 1));
                        Some((Ok(batch), following))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
    }

    pub async fn get_range_all(&self, opt: RangeOption, snapshot: bool) -> Result<Vec<KeyValue>> {
        self.get_ranges(opt, snapshot)
            .try_fold(Vec::new(), |mut acc, batch| async move {
                acc.extend(batch);
                Ok::<_, Error>(acc)
            })
            .await
    }

    pub fn set(&self, key: &[u8], value: &[u8]) {
        let check = check_key(key).and_then(|_| {
            if value.len() > VALUE_SIZE_LIMIT {
                Err(Error::ValueTooLarge)
            } else {
                Ok(())
            }
        });
        if let Ok(mut state) = self.state() {
            state.mutate(check, (key.to_vec(), key_after(key)), |w| {
                w.set(key.to_vec(), value.to_vec())
            });
        }
    }

    pub fn clear(&self, key: &[u8]) {
        if let Ok(mut state) = self.state() {
            state.mutate(check_key(key), (key.to_vec(), key_after(key)), |w| {
                w.clear(key.to_vec())
            });
        }
    }

    /// Clears every key in `[begin, end)`.
    pub fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let check = if begin > end {
            Err(Error::InvertedRange)
        } else if end > KEYSPACE_END {
            Err(Error::KeyOutsideLegalRange)
        } else if begin.len() > KEY_SIZE_LIMIT || end.len() > KEY_SIZE_LIMIT + 1 {
            Err(Error::KeyTooLarge)
        } else {
            Ok(())
        };
        if let Ok(mut state) = self.state() {
            state.mutate(check, (begin.to_vec(), end.to_vec()), |w| {
                w.clear_range(begin.to_vec(), end.to_vec())
            });
        }
    }

    /// Commits the buffered writes. A transaction without writes commits
    /// without contacting the service.
    pub async fn commit(&self) -> Result<()> {
        let read_version = {
            let mut state = self.state()?;
            state.check_usable()?;
            if state.writes.size() > TRANSACTION_SIZE_LIMIT {
                return Err(Error::TransactionTooLarge);
            }
            if state.writes.is_empty() {
                state.status = Status::Committed;
                return Ok(());
            }
            state.status = Status::Committing;
            state.read_version
        };
        let result = self.send_commit(read_version).await;
        let mut state = self.state()?;
        match result {
            Ok(version) => {
                state.status = Status::Committed;
                state.committed_version = Some(version);
                debug!(version, "transaction committed");
                Ok(())
            }
            Err(e) => {
                if state.status == Status::Committing {
                    state.status = Status::Active;
                }
                Err(e)
            }
        }
    }

    async fn send_commit(&self, read_version: Option<Version>) -> Result<Version> {
        let read_version = match read_version {
            Some(v) => v,
            None => self.fetch_read_version().await?,
        };
        let req = {
            let state = self.state()?;
            CommitRequest {
                read_version,
                read_conflicts: state.read_conflicts.clone(),
                write_conflicts: state.write_conflicts.clone(),
                mutations: state.writes.mutations().to_vec(),
            }
        };
        match self.request(StorageRequest::Commit(req)).await? {
            StorageResponse::Committed(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Classifies `err`. A retryable error waits out the backoff and yields a
    /// fresh transaction for the next attempt; anything else is returned.
    /// Either way this attempt is over.
    pub async fn on_error(self, err: Error) -> Result<Transaction> {
        self.cancel();
        if !err.is_retryable() {
            return Err(err);
        }
        let delay = self.inner.backoff;
        debug!(code = err.code(), delay_ms = delay.as_millis() as u64, "transaction will retry");
        tokio::time::sleep(delay).await;
        let next = (delay * 2).min(self.inner.options.max_retry_delay);
        Ok(Transaction::with_backoff(
            self.inner.sender.clone(),
            self.inner.options.clone(),
            next,
        ))
    }

    /// Ends the attempt; later operations fail with `transaction_cancelled`.
    pub fn cancel(&self) {
        if let Ok(mut state) = self.state() {
            if state.status != Status::Committed {
                state.status = Status::Cancelled;
            }
        }
    }

    /// Discards all reads, writes and the read version.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state() {
            *state = State::new();
        }
    }

    /// Version at which the writes became visible, once committed.
    pub fn committed_version(&self) -> Option<Version> {
        self.state().ok().and_then(|s| s.committed_version)
    }
}

#[async_trait]
impl Txn for Transaction {
    async fn commit(&self) -> Result<()> {
        Transaction::commit(self).await
    }

    async fn on_error(self, err: Error) -> Result<Self> {
        Transaction::on_error(self, err).await
    }

    fn cancel(&self) {
        Transaction::cancel(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::codec::KeySelector;
    use crate::txn::StreamingMode;
    use crate::util::test::{open_test_database, run_in_tokio};
    use futures::StreamExt;

    #[test]
    fn test_read_your_writes() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            assert_eq!(tr.get(b"k", false).await.unwrap(), None);
            tr.set(b"k", b"v");
            assert_eq!(tr.get(b"k", false).await.unwrap(), Some(b"v".to_vec()));
            tr.clear(b"k");
            assert_eq!(tr.get(b"k", false).await.unwrap(), None);
            tr.set(b"a", b"1");
            tr.set(b"b", b"2");
            let all = tr
                .get_range_all(RangeOption::from(&b""[..]..KEYSPACE_END), false)
                .await
                .unwrap();
            assert_eq!(all.len(), 2);
            tr.commit().await.unwrap();
            assert!(tr.committed_version().is_some());

            let tr = db.create_transaction().unwrap();
            assert_eq!(tr.get(b"a", false).await.unwrap(), Some(b"1".to_vec()));
            assert_eq!(tr.get(b"k", false).await.unwrap(), None);
        });
    }

    #[test]
    fn test_conflicting_commit() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let t1 = db.create_transaction().unwrap();
            let t2 = db.create_transaction().unwrap();
            assert_eq!(t1.get(b"counter", false).await.unwrap(), None);
            assert_eq!(t2.get(b"counter", true).await.unwrap(), None);

            let writer = db.create_transaction().unwrap();
            writer.set(b"counter", b"1");
            writer.commit().await.unwrap();

            t1.set(b"counter", b"from t1");
            assert_eq!(t1.commit().await, Err(Error::NotCommitted));
            // A snapshot read leaves no conflict behind.
            t2.set(b"counter", b"from t2");
            t2.commit().await.unwrap();
        });
    }

    #[test]
    fn test_range_conflict() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let reader = db.create_transaction().unwrap();
            let rows = reader
                .get_range(&RangeOption::from(&b"a"[..]..&b"m"[..]), 1, false)
                .await
                .unwrap();
            assert!(rows.is_empty());

            let writer = db.create_transaction().unwrap();
            writer.set(b"f", b"phantom");
            writer.commit().await.unwrap();

            reader.set(b"summary", b"0 rows");
            assert_eq!(reader.commit().await, Err(Error::NotCommitted));
        });
    }

    #[test]
    fn test_streamed_range() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            for i in 0..100u32 {
                tr.set(format!("row{:03}", i).as_bytes(), &[0u8; 50]);
            }
            tr.commit().await.unwrap();

            let tr = db.create_transaction().unwrap();
            let opt = RangeOption::from(&b"row"[..]..&b"rox"[..]).mode(StreamingMode::Small);
            let batches: Vec<RangeResult> = tr
                .get_ranges(opt.clone(), false)
                .map(|b| b.unwrap())
                .collect()
                .await;
            assert!(batches.len() > 1);
            assert!(batches.iter().all(|b| b.len() <= 5));
            assert!(!batches.last().unwrap().more());
            let rows: usize = batches.iter().map(|b| b.len()).sum();
            assert_eq!(rows, 100);

            let limited = tr.get_range_all(opt.clone().limit(42), false).await.unwrap();
            assert_eq!(limited.len(), 42);
            assert_eq!(limited[41].key, b"row041".to_vec());

            let reversed = tr.get_range_all(opt.reverse(true).limit(3), false).await.unwrap();
            let keys: Vec<_> = reversed.into_iter().map(|kv| kv.key).collect();
            assert_eq!(keys, vec![b"row099".to_vec(), b"row098".to_vec(), b"row097".to_vec()]);

            let exact = RangeOption::new(
                KeySelector::first_greater_or_equal(b"row".to_vec()),
                KeySelector::first_greater_or_equal(b"rox".to_vec()),
            )
            .mode(StreamingMode::Exact);
            assert_eq!(
                tr.get_range(&exact, 1, false).await,
                Err(Error::ExactModeWithoutLimits)
            );
            let batch = tr.get_range(&exact.limit(10), 1, false).await.unwrap();
            assert_eq!(batch.len(), 10);
            assert!(batch.more());
        });
    }

    #[test]
    fn test_invalid_mutations_fail_commit() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            tr.set(b"\xff/system", b"v");
            assert_eq!(tr.commit().await, Err(Error::KeyOutsideLegalRange));

            let tr = db.create_transaction().unwrap();
            tr.set(b"k", &vec![0u8; VALUE_SIZE_LIMIT + 1]);
            assert_eq!(tr.commit().await, Err(Error::ValueTooLarge));

            let tr = db.create_transaction().unwrap();
            tr.clear_range(b"z", b"a");
            assert_eq!(tr.commit().await, Err(Error::InvertedRange));

            let tr = db.create_transaction().unwrap();
            let big = vec![0u8; KEY_SIZE_LIMIT + 1];
            assert_eq!(tr.get(&big, false).await, Err(Error::KeyTooLarge));
        });
    }

    #[test]
    fn test_rejected_mutation_dooms_attempt() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            tr.set(b"good", b"1");
            tr.set(b"\xffbad", b"2");
            assert_eq!(tr.commit().await, Err(Error::KeyOutsideLegalRange));
            assert_eq!(tr.commit().await, Err(Error::KeyOutsideLegalRange));
            assert_eq!(tr.get(b"good", false).await, Err(Error::KeyOutsideLegalRange));
            let opt = RangeOption::from(&b"a"[..]..&b"z"[..]);
            assert_eq!(tr.get_range(&opt, 1, false).await, Err(Error::KeyOutsideLegalRange));

            let reader = db.create_transaction().unwrap();
            assert_eq!(reader.get(b"good", false).await.unwrap(), None);

            tr.reset();
            tr.set(b"good", b"3");
            tr.commit().await.unwrap();
        });
    }

    #[test]
    fn test_transaction_too_large() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            let value = vec![7u8; VALUE_SIZE_LIMIT];
            for i in 0..(TRANSACTION_SIZE_LIMIT / VALUE_SIZE_LIMIT + 1) {
                tr.set(format!("big{:04}", i).as_bytes(), &value);
            }
            assert_eq!(tr.commit().await, Err(Error::TransactionTooLarge));
            assert_eq!(Error::TransactionTooLarge.code(), 2101);

            let reader = db.create_transaction().unwrap();
            assert_eq!(reader.get(b"big0000", false).await.unwrap(), None);
        });
    }

    #[test]
    fn test_clear_range() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            for k in [b"a", b"b", b"c", b"d"] {
                tr.set(k, k);
            }
            tr.commit().await.unwrap();

            let tr = db.create_transaction().unwrap();
            tr.clear_range(b"b", b"d");
            assert_eq!(tr.get(b"b", false).await.unwrap(), None);
            assert_eq!(tr.get(b"d", false).await.unwrap(), Some(b"d".to_vec()));
            let keys: Vec<_> = tr
                .get_range_all(RangeOption::from(&b""[..]..KEYSPACE_END), false)
                .await
                .unwrap()
                .into_iter()
                .map(|kv| kv.key)
                .collect();
            assert_eq!(keys, vec![b"a".to_vec(), b"d".to_vec()]);

            // A reader of a cleared key started before the clear commits.
            let reader = db.create_transaction().unwrap();
            assert_eq!(reader.get(b"c", false).await.unwrap(), Some(b"c".to_vec()));
            tr.commit().await.unwrap();
            reader.set(b"seen", b"c");
            assert_eq!(reader.commit().await, Err(Error::NotCommitted));

            let after = db.create_transaction().unwrap();
            let rows = after
                .get_range_all(RangeOption::from(&b""[..]..KEYSPACE_END), false)
                .await
                .unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(after.get(b"c", false).await.unwrap(), None);
        });
    }

    #[test]
    fn test_attempt_ends_after_retry_decision() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            let leftover = tr.clone();
            let next = tr.on_error(Error::NotCommitted).await.unwrap();
            assert_eq!(leftover.get(b"k", false).await, Err(Error::TransactionCancelled));
            leftover.set(b"k", b"v");
            assert_eq!(leftover.commit().await, Err(Error::TransactionCancelled));
            assert_eq!(next.inner.backoff, Duration::from_millis(20));
            next.set(b"k", b"v");
            next.commit().await.unwrap();
            assert_eq!(next.get(b"k", false).await, Err(Error::UsedDuringCommit));

            let tr = db.create_transaction().unwrap();
            let err = tr.on_error(Error::KeyTooLarge).await.err();
            assert_eq!(err, Some(Error::KeyTooLarge));
        });
    }

    #[test]
    fn test_reset() {
        run_in_tokio(async move {
            let (_network, db) = open_test_database().await;
            let tr = db.create_transaction().unwrap();
            tr.set(b"k", b"v");
            tr.reset();
            tr.commit().await.unwrap();
            assert_eq!(tr.committed_version(), None);
            let tr = db.create_transaction().unwrap();
            assert_eq!(tr.get(b"k", false).await.unwrap(), None);
        });
    }
}
