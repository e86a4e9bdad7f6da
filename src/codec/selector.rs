use crate::codec::{Key, Printable};
use std::fmt;
use std::ops::{Add, Sub};

/// Identifies a key relative to a reference key.
///
/// The selector first picks the last key less than `key` (less than or equal
/// when `or_equal` is set) and then moves `offset` keys forward; an offset of
/// one therefore names the first key after that point.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySelector {
    key: Key,
    or_equal: bool,
    offset: i32,
}

impl KeySelector {
    pub fn new(key: impl Into<Key>, or_equal: bool, offset: i32) -> Self {
        Self {
            key: key.into(),
            or_equal,
            offset,
        }
    }

    pub fn first_greater_or_equal(key: impl Into<Key>) -> Self {
        Self::new(key, false, 1)
    }

    pub fn first_greater_than(key: impl Into<Key>) -> Self {
        Self::new(key, true, 1)
    }

    pub fn last_less_than(key: impl Into<Key>) -> Self {
        Self::new(key, false, 0)
    }

    pub fn last_less_or_equal(key: impl Into<Key>) -> Self {
        Self::new(key, true, 0)
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn or_equal(&self) -> bool {
        self.or_equal
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }
}

impl Add<i32> for KeySelector {
    type Output = KeySelector;

    fn add(mut self, rhs: i32) -> KeySelector {
        self.offset = self.offset.saturating_add(rhs);
        self
    }
}

impl Sub<i32> for KeySelector {
    type Output = KeySelector;

    fn sub(mut self, rhs: i32) -> KeySelector {
        self.offset = self.offset.saturating_sub(rhs);
        self
    }
}

impl fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match (self.or_equal, self.offset > 0) {
            (false, true) => "first_greater_or_equal",
            (true, true) => "first_greater_than",
            (false, false) => "last_less_than",
            (true, false) => "last_less_or_equal",
        };
        let extra = if self.offset > 0 {
            self.offset - 1
        } else {
            self.offset
        };
        write!(f, "{}({:?})", base, Printable(&self.key))?;
        if extra != 0 {
            write!(f, "{:+}", extra)?;
        }
        Ok(())
    }
}
