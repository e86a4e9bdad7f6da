use crate::codec::{Key, Value};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

/// A buffered write, replayed in order by the storage engine at commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Set(Key, Value),
    Clear(Key),
    ClearRange(Key, Key),
}

impl Mutation {
    fn size(&self) -> usize {
        match self {
            Mutation::Set(k, v) => k.len() + v.len(),
            Mutation::Clear(k) => k.len(),
            Mutation::ClearRange(b, e) => b.len() + e.len(),
        }
    }
}

/// The writes of one transaction attempt, indexed so reads can see them.
#[derive(Clone, Debug, Default)]
pub struct WriteMap {
    // `None` marks a point clear.
    entries: BTreeMap<Key, Option<Value>>,
    cleared: Vec<(Key, Key)>,
    mutations: Vec<Mutation>,
    size: usize,
}

impl WriteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Key, value: Value) {
        self.push(Mutation::Set(key.clone(), value.clone()));
        self.entries.insert(key, Some(value));
    }

    pub fn clear(&mut self, key: Key) {
        self.push(Mutation::Clear(key.clone()));
        self.entries.insert(key, None);
    }

    pub fn clear_range(&mut self, begin: Key, end: Key) {
        if begin >= end {
            return;
        }
        let covered: Vec<Key> = self
            .entries
            .range::<[u8], _>((Included(begin.as_slice()), Excluded(end.as_slice())))
            .map(|(k, _)| k.clone())
            .collect();
        for k in covered {
            self.entries.remove(&k);
        }
        self.push(Mutation::ClearRange(begin.clone(), end.clone()));
        self.cleared.push((begin, end));
    }

    fn push(&mut self, m: Mutation) {
        self.size += m.size();
        self.mutations.push(m);
    }

    /// `Some(None)` when the transaction cleared `key`, `Some(Some(v))` when it
    /// wrote `v`, `None` when the stored value shows through.
    pub fn lookup(&self, key: &[u8]) -> Option<Option<&Value>> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry.as_ref());
        }
        if self
            .cleared
            .iter()
            .any(|(b, e)| b.as_slice() <= key && key < e.as_slice())
        {
            return Some(None);
        }
        None
    }

    /// Keys with a buffered point write or point clear, in order.
    pub fn entries(&self) -> &BTreeMap<Key, Option<Value>> {
        &self.entries
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Bytes of buffered mutations, counted against the transaction size limit.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_map_lookup() {
        let mut w = WriteMap::new();
        assert!(w.is_empty());
        w.set(b"a".to_vec(), b"1".to_vec());
        w.set(b"c".to_vec(), b"3".to_vec());
        w.clear(b"b".to_vec());
        assert_eq!(w.lookup(b"a"), Some(Some(&b"1".to_vec())));
        assert_eq!(w.lookup(b"b"), Some(None));
        assert_eq!(w.lookup(b"z"), None);

        w.clear_range(b"a".to_vec(), b"c".to_vec());
        assert_eq!(w.lookup(b"a"), Some(None));
        assert_eq!(w.lookup(b"bb"), Some(None));
        assert_eq!(w.lookup(b"c"), Some(Some(&b"3".to_vec())));
        assert_eq!(w.entries().len(), 1);

        // A set after a range clear wins over it.
        w.set(b"b".to_vec(), b"2".to_vec());
        assert_eq!(w.lookup(b"b"), Some(Some(&b"2".to_vec())));
        assert_eq!(w.mutations().len(), 5);
        assert_eq!(w.size(), 2 + 2 + 1 + 2 + 2);
    }

    #[test]
    fn test_empty_clear_range_is_ignored() {
        let mut w = WriteMap::new();
        w.clear_range(b"b".to_vec(), b"a".to_vec());
        w.clear_range(b"b".to_vec(), b"b".to_vec());
        assert!(w.is_empty());
        assert_eq!(w.lookup(b"b"), None);
    }
}
