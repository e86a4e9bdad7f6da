use crate::codec::{key_after, Key, KeySelector, KeyValue, Value, KEYSPACE_END};
use crate::storage::{RangeScan, Version};
use crate::txn::kv_ops::WriteMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound::{self, Excluded, Included, Unbounded};

pub(crate) type VersionChain = Vec<(Version, Option<Value>)>;

/// The keyspace as one transaction sees it: stored data at `version` with the
/// transaction's own writes laid over it.
pub(crate) struct View<'a> {
    data: &'a BTreeMap<Key, VersionChain>,
    version: Version,
    overlay: Option<&'a WriteMap>,
}

impl<'a> View<'a> {
    pub fn new(
        data: &'a BTreeMap<Key, VersionChain>,
        version: Version,
        overlay: Option<&'a WriteMap>,
    ) -> Self {
        Self {
            data,
            version,
            overlay,
        }
    }

    fn stored(&self, key: &[u8]) -> Option<&'a Value> {
        let chain = self.data.get(key)?;
        chain
            .iter()
            .rev()
            .find(|(v, _)| *v <= self.version)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn get(&self, key: &[u8]) -> Option<&'a Value> {
        if let Some(written) = self.overlay.and_then(|o| o.lookup(key)) {
            return written;
        }
        self.stored(key)
    }

    /// Visible entries within the bounds, ascending or descending.
    fn entries<'s>(
        &'s self,
        lo: Bound<&'s [u8]>,
        hi: Bound<&'s [u8]>,
        reverse: bool,
    ) -> Box<dyn Iterator<Item = (&'a [u8], &'a Value)> + 's> {
        let stored = self.data.range::<[u8], _>((lo, hi)).map(|(k, _)| k);
        let written = self
            .overlay
            .into_iter()
            .flat_map(move |o| o.entries().range::<[u8], _>((lo, hi)))
            .map(|(k, _)| k);
        let keys: Box<dyn Iterator<Item = &'a Key> + 's> = if reverse {
            Box::new(MergeKeys::new(stored.rev(), written.rev(), true))
        } else {
            Box::new(MergeKeys::new(stored, written, false))
        };
        Box::new(keys.filter_map(move |k| self.get(k).map(|v| (k.as_slice(), v))))
    }

    /// Resolves a selector to a key, clamped to `["", "\xff"]`.
    pub fn resolve(&self, sel: &KeySelector) -> Key {
        let key = sel.key();
        let offset = sel.offset();
        if offset >= 1 {
            if key >= KEYSPACE_END {
                return KEYSPACE_END.to_vec();
            }
            let lo = if sel.or_equal() {
                Excluded(key)
            } else {
                Included(key)
            };
            self.entries(lo, Excluded(KEYSPACE_END), false)
                .nth((offset - 1) as usize)
                .map(|(k, _)| k.to_vec())
                .unwrap_or_else(|| KEYSPACE_END.to_vec())
        } else {
            let hi = if sel.or_equal() {
                Included(key)
            } else {
                Excluded(key)
            };
            self.entries(Unbounded, hi, true)
                .nth(offset.unsigned_abs() as usize)
                .map(|(k, _)| k.to_vec())
                .unwrap_or_default()
        }
    }

    pub fn scan(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        row_limit: usize,
        byte_limit: usize,
        reverse: bool,
    ) -> RangeScan {
        // Any key between a selector's reference and what it resolved to
        // could change the result if inserted.
        let lo = begin.key().min(end.key()).to_vec();
        let hi = end.key().max(begin.key()).to_vec();
        let begin = self.resolve(begin);
        let end = self.resolve(end);
        let lo = lo.min(begin.clone());
        let hi = hi.max(end.clone());
        if begin >= end {
            return RangeScan {
                kvs: vec![],
                more: false,
                conflict: (lo, hi),
            };
        }
        let row_limit = if row_limit == 0 { usize::MAX } else { row_limit };
        let byte_limit = if byte_limit == 0 { usize::MAX } else { byte_limit };

        let mut iter = self
            .entries(Included(begin.as_slice()), Excluded(end.as_slice()), reverse)
            .peekable();
        let mut kvs = vec![];
        let mut bytes = 0;
        let mut more = false;
        while let Some((k, v)) = iter.next() {
            let kv = KeyValue::new(k, v.clone());
            bytes += kv.size();
            kvs.push(kv);
            if kvs.len() >= row_limit || bytes >= byte_limit {
                more = iter.peek().is_some();
                break;
            }
        }
        drop(iter);

        let conflict = match (more, kvs.last(), reverse) {
            (true, Some(last), false) => (lo, key_after(&last.key)),
            (true, Some(last), true) => (last.key.clone(), hi),
            _ => (lo, hi),
        };
        RangeScan {
            kvs,
            more,
            conflict,
        }
    }
}

/// Merges two sorted key streams, yielding each key once.
struct MergeKeys<A, B>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
{
    a: Peekable<A>,
    b: Peekable<B>,
    reverse: bool,
}

impl<A, B> MergeKeys<A, B>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
{
    fn new(a: A, b: B, reverse: bool) -> Self {
        Self {
            a: a.peekable(),
            b: b.peekable(),
            reverse,
        }
    }
}

impl<A, B> Iterator for MergeKeys<A, B>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
    A::Item: Ord,
{
    type Item = A::Item;

    fn next(&mut self) -> Option<A::Item> {
        let ord = match (self.a.peek(), self.b.peek()) {
            (Some(x), Some(y)) => {
                let ord = x.cmp(y);
                if self.reverse {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => return None,
        };
        match ord {
            Ordering::Less => self.a.next(),
            Ordering::Greater => self.b.next(),
            Ordering::Equal => {
                self.a.next();
                self.b.next()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(keys: &[&[u8]]) -> BTreeMap<Key, VersionChain> {
        keys.iter()
            .map(|k| (k.to_vec(), vec![(1, Some(k.to_vec()))]))
            .collect()
    }

    fn keys(scan: &RangeScan) -> Vec<Vec<u8>> {
        scan.kvs.iter().map(|kv| kv.key.clone()).collect()
    }

    #[test]
    fn test_resolve_selectors() {
        let d = data(&[b"b", b"d", b"f"]);
        let view = View::new(&d, 1, None);
        let r = |s: KeySelector| view.resolve(&s);
        assert_eq!(r(KeySelector::first_greater_or_equal(b"d".to_vec())), b"d");
        assert_eq!(r(KeySelector::first_greater_than(b"d".to_vec())), b"f");
        assert_eq!(r(KeySelector::last_less_than(b"d".to_vec())), b"b");
        assert_eq!(r(KeySelector::last_less_or_equal(b"d".to_vec())), b"d");
        assert_eq!(r(KeySelector::first_greater_or_equal(b"c".to_vec()) + 1), b"f");
        assert_eq!(r(KeySelector::last_less_than(b"f".to_vec()) - 1), b"b");
        // Clamping at both ends of the keyspace.
        assert_eq!(r(KeySelector::last_less_than(b"b".to_vec())), b"");
        assert_eq!(r(KeySelector::first_greater_than(b"f".to_vec())), KEYSPACE_END);
        assert_eq!(r(KeySelector::last_less_than(b"".to_vec()) + 10), KEYSPACE_END);
        assert_eq!(r(KeySelector::first_greater_than(b"\xff\xff".to_vec())), KEYSPACE_END);
    }

    #[test]
    fn test_versions_and_overlay() {
        let mut d = data(&[b"a", b"c"]);
        d.insert(b"b".to_vec(), vec![(5, Some(b"new".to_vec()))]);
        d.get_mut(&b"c".to_vec()).unwrap().push((5, None));

        let old = View::new(&d, 1, None);
        assert_eq!(old.get(b"b"), None);
        assert_eq!(old.get(b"c"), Some(&b"c".to_vec()));
        let new = View::new(&d, 5, None);
        assert_eq!(new.get(b"b"), Some(&b"new".to_vec()));
        assert_eq!(new.get(b"c"), None);

        let mut w = WriteMap::new();
        w.clear(b"a".to_vec());
        w.set(b"bb".to_vec(), b"mine".to_vec());
        let view = View::new(&d, 5, Some(&w));
        let all = KeySelector::first_greater_or_equal(b"".to_vec());
        let end = KeySelector::first_greater_or_equal(KEYSPACE_END.to_vec());
        let scan = view.scan(&all, &end, 0, 0, false);
        assert_eq!(keys(&scan), vec![b"b".to_vec(), b"bb".to_vec()]);
        assert!(!scan.more);
        assert_eq!(scan.conflict, (b"".to_vec(), KEYSPACE_END.to_vec()));
    }

    #[test]
    fn test_scan_limits() {
        let d = data(&[b"a", b"b", b"c", b"d"]);
        let view = View::new(&d, 1, None);
        let begin = KeySelector::first_greater_or_equal(b"a".to_vec());
        let end = KeySelector::first_greater_or_equal(b"z".to_vec());

        let scan = view.scan(&begin, &end, 2, 0, false);
        assert_eq!(keys(&scan), vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(scan.more);
        assert_eq!(scan.conflict, (b"a".to_vec(), b"b\x00".to_vec()));

        let scan = view.scan(&begin, &end, 2, 0, true);
        assert_eq!(keys(&scan), vec![b"d".to_vec(), b"c".to_vec()]);
        assert!(scan.more);
        assert_eq!(scan.conflict, (b"c".to_vec(), KEYSPACE_END.to_vec()));

        // Byte budget stops after the row that crosses it, never before the first.
        let scan = view.scan(&begin, &end, 0, 1, false);
        assert_eq!(keys(&scan), vec![b"a".to_vec()]);
        assert!(scan.more);

        let scan = view.scan(&begin, &end, 4, 0, false);
        assert_eq!(scan.kvs.len(), 4);
        assert!(!scan.more);

        let scan = view.scan(&end, &begin, 0, 0, false);
        assert!(scan.kvs.is_empty());
        assert!(!scan.more);

        // An empty result still depends on the keys it could have seen.
        let empty = View::new(&d, 0, None);
        let scan = empty.scan(&begin, &end, 0, 0, false);
        assert!(scan.kvs.is_empty());
        assert_eq!(scan.conflict, (b"a".to_vec(), KEYSPACE_END.to_vec()));
    }
}
