pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// First key outside the user keyspace.
pub const KEYSPACE_END: &[u8] = b"\xff";

pub const KEY_SIZE_LIMIT: usize = 10_000;
pub const VALUE_SIZE_LIMIT: usize = 100_000;
pub const TRANSACTION_SIZE_LIMIT: usize = 10_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bytes counted against range read budgets.
    #[inline]
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// The smallest key strictly greater than `key`.
pub fn key_after(key: &[u8]) -> Key {
    let mut k = Vec::with_capacity(key.len() + 1);
    k.extend_from_slice(key);
    k.push(0);
    k
}

#[inline]
pub fn is_user_key(key: &[u8]) -> bool {
    key < KEYSPACE_END
}

pub mod byte;
pub mod selector;

pub use byte::Printable;
pub use selector::KeySelector;
