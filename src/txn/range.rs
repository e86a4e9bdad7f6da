use crate::codec::{Key, KeySelector, KeyValue};
use crate::util::{Error, Result};
use std::ops::{Deref, Range};

/// Byte budgets of the fixed-size modes, smallest first.
const MODE_BYTES: [usize; 4] = [256, 1_000, 4_096, 80_000];

/// How eagerly a range read fetches rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamingMode {
    /// Batches start small and grow with each iteration.
    #[default]
    Iterator,
    /// Fetch everything in one go.
    WantAll,
    /// Fetch exactly `limit` rows; a limit is required.
    Exact,
    Small,
    Medium,
    Large,
    Serial,
}

impl StreamingMode {
    /// Byte budget for one batch; zero means unbounded.
    fn byte_limit(self, iteration: usize) -> Result<usize> {
        Ok(match self {
            StreamingMode::WantAll | StreamingMode::Exact => 0,
            StreamingMode::Small => MODE_BYTES[0],
            StreamingMode::Medium => MODE_BYTES[1],
            StreamingMode::Large => MODE_BYTES[2],
            StreamingMode::Serial => MODE_BYTES[3],
            StreamingMode::Iterator => {
                if iteration == 0 {
                    return Err(Error::InvalidOptionValue(
                        "iterator streaming mode starts at iteration 1".to_owned(),
                    ));
                }
                MODE_BYTES[iteration.min(MODE_BYTES.len()) - 1]
            }
        })
    }
}

#[derive(Clone, Debug)]
pub struct RangeOption {
    pub begin: KeySelector,
    pub end: KeySelector,
    /// Maximum rows; zero means unlimited.
    pub limit: usize,
    /// Byte budget per batch; zero leaves it to the streaming mode.
    pub target_bytes: usize,
    pub mode: StreamingMode,
    pub reverse: bool,
}

impl RangeOption {
    pub fn new(begin: KeySelector, end: KeySelector) -> Self {
        Self {
            begin,
            end,
            limit: 0,
            target_bytes: 0,
            mode: StreamingMode::default(),
            reverse: false,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn target_bytes(mut self, bytes: usize) -> Self {
        self.target_bytes = bytes;
        self
    }

    pub fn mode(mut self, mode: StreamingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Row and byte limits of batch `iteration`.
    pub(crate) fn batch_limits(&self, iteration: usize) -> Result<(usize, usize)> {
        if self.mode == StreamingMode::Exact && self.limit == 0 {
            return Err(Error::ExactModeWithoutLimits);
        }
        let mode_bytes = self.mode.byte_limit(iteration)?;
        let bytes = match (self.target_bytes, mode_bytes) {
            (0, m) => m,
            (t, 0) => t,
            (t, m) => t.min(m),
        };
        Ok((self.limit, bytes))
    }

    /// The range left to read after `batch`, or `None` when it is exhausted.
    pub(crate) fn next_range(mut self, batch: &RangeResult) -> Option<RangeOption> {
        if !batch.more() {
            return None;
        }
        let last = batch.last()?;
        if self.limit > 0 {
            self.limit = self.limit.saturating_sub(batch.len());
            if self.limit == 0 {
                return None;
            }
        }
        if self.reverse {
            self.end = KeySelector::first_greater_or_equal(last.key.clone());
        } else {
            self.begin = KeySelector::first_greater_than(last.key.clone());
        }
        Some(self)
    }
}

impl From<(KeySelector, KeySelector)> for RangeOption {
    fn from((begin, end): (KeySelector, KeySelector)) -> Self {
        Self::new(begin, end)
    }
}

impl From<Range<Key>> for RangeOption {
    fn from(range: Range<Key>) -> Self {
        Self::new(
            KeySelector::first_greater_or_equal(range.start),
            KeySelector::first_greater_or_equal(range.end),
        )
    }
}

impl From<Range<&[u8]>> for RangeOption {
    fn from(range: Range<&[u8]>) -> Self {
        (range.start.to_vec()..range.end.to_vec()).into()
    }
}

/// One batch of a range read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeResult {
    kvs: Vec<KeyValue>,
    more: bool,
}

impl RangeResult {
    pub fn new(kvs: Vec<KeyValue>, more: bool) -> Self {
        Self { kvs, more }
    }

    /// Whether rows remain past this batch.
    pub fn more(&self) -> bool {
        self.more
    }

    pub fn into_kvs(self) -> Vec<KeyValue> {
        self.kvs
    }
}

impl Deref for RangeResult {
    type Target = [KeyValue];

    fn deref(&self) -> &[KeyValue] {
        &self.kvs
    }
}

impl IntoIterator for RangeResult {
    type Item = KeyValue;
    type IntoIter = std::vec::IntoIter<KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.kvs.into_iter()
    }
}
