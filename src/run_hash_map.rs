//! RunHashMap: buckets as contiguous runs of one shared entry list.

use crate::bucket_table::BucketTable;
use crate::entry_list::{self, EntryList, Position};
use crate::error::KeyNotFound;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;

impl Position {
    pub fn key<'a, K, V, S>(&self, map: &'a RunHashMap<K, V, S>) -> Option<&'a K> {
        map.entries.get(*self).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a RunHashMap<K, V, S>) -> Option<&'a V> {
        map.entries.get(*self).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S>(&self, map: &'a mut RunHashMap<K, V, S>) -> Option<&'a mut V> {
        map.entries.get_mut(*self).map(|e| &mut e.value)
    }
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
}

/// Hash map with unique keys. Every entry lives in one linked sequence;
/// bucket `b` owns the `count[b]` consecutive entries starting at `head[b]`.
///
/// The bucket table starts unallocated, is set to 4 buckets by the first
/// insertion and doubles whenever `2 * len >= bucket_count` after an
/// insertion.
pub struct RunHashMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    buckets: BucketTable,
    entries: EntryList<Entry<K, V>>,
}

impl<K, V> RunHashMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, V, S> Default for RunHashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> RunHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            buckets: BucketTable::new(),
            entries: EntryList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Current number of buckets; 0 until the first insertion and after `clear`.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The hash builder this map was configured with.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Removes the entry at `pos`, returning the owned pair. Stale positions
    /// return `None`.
    pub fn remove(&mut self, pos: Position) -> Option<(K, V)> {
        let hash = self.entries.get(pos)?.hash;
        // The head must move off `pos` before the entry is unlinked.
        let next = self.entries.next(pos);
        self.buckets.bucket_for_mut(hash).forget(pos, next);
        let entry = self.entries.remove(pos)?;
        Some((entry.key, entry.value))
    }

    /// Drops every entry and releases the bucket table.
    ///
    /// The entry arena keeps its slots (and their memory) so that positions
    /// handed out before the clear never resolve to later entries. Drop the
    /// map to return that memory.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.buckets.release();
        tracing::trace!(dropped, "cleared map");
    }

    /// Iterates over all entries, bucket run by bucket run.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.entries.iter(),
        }
    }

    /// Iterates with mutable access to values. Visits every entry once, in
    /// an order that may differ from `iter`.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.entries.iter_mut(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { it: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { it: self.iter() }
    }

    /// Mutable access to every value, in the same order as `iter_mut`,
    /// which may differ from `iter`.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            it: self.iter_mut(),
        }
    }

    /// Links a new entry at the front of its bucket's run, or at the back of
    /// the sequence when the bucket is empty.
    fn place(&mut self, entry: Entry<K, V>) -> Position {
        let bucket = self.buckets.bucket_for_mut(entry.hash);
        let pos = match bucket.head {
            Some(head) => self.entries.insert_before(head, entry),
            None => self.entries.push_back(entry),
        };
        bucket.push_head(pos);
        pos
    }

    fn grow_if_loaded(&mut self) {
        if 2 * self.len() >= self.buckets.len() {
            self.grow();
        }
    }

    /// Allocates the initial table or doubles it, then rebuilds every run.
    /// Entries are relinked in place using their cached hash, so positions
    /// stay valid and no user `Hash`/`Eq` code runs.
    fn grow(&mut self) {
        let from = self.buckets.len();
        let to = self.buckets.grown_len();
        self.buckets.reset(to);

        let buckets = &mut self.buckets;
        self.entries.relink_all(|pos, entry| {
            let bucket = buckets.bucket_for_mut(entry.hash);
            let anchor = bucket.head;
            bucket.push_head(pos);
            anchor
        });

        if from == 0 {
            tracing::trace!(buckets = to, "allocated bucket table");
        } else {
            tracing::debug!(from, to, len = self.len(), "grew bucket table");
        }
    }
}

impl<K, V, S> RunHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Builds a map by inserting each pair in turn; the first occurrence of a
    /// key wins.
    pub fn from_iter_with_hasher<I>(iter: I, hasher: S) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::with_hasher(hasher);
        map.extend(iter);
        map
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Position of the entry for `q`. An unallocated table answers without
    /// hashing.
    pub fn find<Q>(&self, q: &Q) -> Option<Position>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.buckets.is_empty() {
            return None;
        }
        self.find_hashed(self.make_hash(q), q)
    }

    fn find_hashed<Q>(&self, hash: u64, q: &Q) -> Option<Position>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let bucket = self.buckets.bucket_for(hash);
        let mut cur = bucket.head;
        for _ in 0..bucket.count {
            let pos = cur?;
            let entry = &self.entries[pos];
            if entry.hash == hash && entry.key.borrow() == q {
                return Some(pos);
            }
            cur = self.entries.next(pos);
        }
        None
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let pos = self.find(q)?;
        Some(&self.entries[pos].value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let pos = self.find(q)?;
        Some(&mut self.entries[pos].value)
    }

    /// Checked lookup: `Err(KeyNotFound)` when `q` is absent.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(KeyNotFound)
    }

    pub fn at_mut<Q>(&mut self, q: &Q) -> Result<&mut V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_mut(q).ok_or(KeyNotFound)
    }

    /// Inserts `(key, value)` if `key` is absent. An existing entry is never
    /// overwritten; returns whether the pair was stored.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.find_or_insert_with(key, || value).1
    }

    /// Value for `key`, inserting `default()` first if absent. `default`
    /// runs only when the key is missing.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let (pos, _) = self.find_or_insert_with(key, default);
        &mut self.entries[pos].value
    }

    /// Value for `key`, inserting `V::default()` first if absent.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Removes the entry for `q` if present.
    pub fn erase<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let pos = self.find(q)?;
        self.remove(pos)
    }

    fn find_or_insert_with<F>(&mut self, key: K, value: F) -> (Position, bool)
    where
        F: FnOnce() -> V,
    {
        if self.buckets.is_empty() {
            self.grow();
        }
        let hash = self.make_hash(&key);
        if let Some(pos) = self.find_hashed(hash, &key) {
            return (pos, false);
        }
        let pos = self.place(Entry {
            key,
            value: value(),
            hash,
        });
        self.grow_if_loaded();
        (pos, true)
    }

    /// Verifies every structural invariant, describing the first violation.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        use std::collections::HashSet;

        let bucket_count = self.buckets.len();
        if bucket_count == 0 {
            return match self.len() {
                0 => Ok(()),
                n => Err(format!("{n} entries but no buckets")),
            };
        }

        let mut covered = HashSet::new();
        let mut total = 0;
        for (b, bucket) in self.buckets.iter().enumerate() {
            if (bucket.count == 0) != bucket.head.is_none() {
                return Err(format!("bucket {b}: head {:?} with count {}", bucket.head, bucket.count));
            }
            total += bucket.count;
            let mut cur = bucket.head;
            for _ in 0..bucket.count {
                let pos = cur.ok_or_else(|| format!("bucket {b}: run shorter than count"))?;
                let entry = self
                    .entries
                    .get(pos)
                    .ok_or_else(|| format!("bucket {b}: dangling position {pos:?}"))?;
                if entry.hash != self.make_hash(&entry.key) {
                    return Err(format!("bucket {b}: cached hash is stale"));
                }
                if self.buckets.index_of(entry.hash) != b {
                    return Err(format!("bucket {b}: holds an entry of another bucket"));
                }
                if !covered.insert(pos) {
                    return Err(format!("bucket {b}: entry {pos:?} is in two runs"));
                }
                cur = self.entries.next(pos);
            }
        }
        if total != self.len() || covered.len() != self.len() {
            return Err(format!("counts sum to {total}, len is {}", self.len()));
        }
        if self.iter().count() != self.len() {
            return Err("sequence length differs from len".to_string());
        }

        let mut keys = HashSet::new();
        if !self.keys().all(|k| keys.insert(k)) {
            return Err("duplicate key".to_string());
        }
        if 2 * self.len() >= bucket_count {
            return Err(format!("load threshold exceeded: {} entries, {bucket_count} buckets", self.len()));
        }
        Ok(())
    }
}

impl<K, V, S> Clone for RunHashMap<K, V, S>
where
    K: Clone + Eq + Hash,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Re-inserts every entry in iteration order; bucket layout is derived
    /// afresh rather than copied.
    fn clone(&self) -> Self {
        Self::from_iter_with_hasher(
            self.iter().map(|(k, v)| (k.clone(), v.clone())),
            self.hasher.clone(),
        )
    }

    fn clone_from(&mut self, source: &Self) {
        self.clear();
        self.hasher = source.hasher.clone();
        self.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl<K, V, S> fmt::Debug for RunHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for RunHashMap<K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for RunHashMap<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for RunHashMap<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Eq + Hash,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if the key is absent; use `at` for a checked lookup.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in RunHashMap")
    }
}

impl<K, V, S> FromIterator<(K, V)> for RunHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_iter_with_hasher(iter, S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for RunHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// Iterator over `(&K, &V)` in sequence order.
pub struct Iter<'a, K, V> {
    it: entry_list::Iter<'a, Entry<K, V>>,
}

impl<'a, K, V> Clone for Iter<'a, K, V> {
    fn clone(&self) -> Self {
        Self {
            it: self.it.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}
impl<'a, K, V> FusedIterator for Iter<'a, K, V> {}

/// Iterator over `(&K, &mut V)`.
pub struct IterMut<'a, K, V> {
    it: entry_list::IterMut<'a, Entry<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for IterMut<'a, K, V> {}

pub struct Keys<'a, K, V> {
    it: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.it.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

pub struct Values<'a, K, V> {
    it: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.it.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

pub struct ValuesMut<'a, K, V> {
    it: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    #[inline]
    fn next(&mut self) -> Option<&'a mut V> {
        self.it.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

/// Owning iterator over `(K, V)` in sequence order.
pub struct IntoIter<K, V> {
    it: entry_list::IntoIter<Entry<K, V>>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.it.next().map(|e| (e.key, e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V, S> IntoIterator for RunHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            it: self.entries.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a RunHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// Same order as `iter_mut`, which may differ from `iter`.
impl<'a, K, V, S> IntoIterator for &'a mut RunHashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::BTreeSet;
    use std::hash::Hasher;
    use std::rc::Rc;

    /// Hash builder that counts how many hashes were computed.
    #[derive(Clone, Default)]
    struct CountingBuildHasher {
        calls: Rc<Cell<usize>>,
    }

    impl BuildHasher for CountingBuildHasher {
        type Hasher = DefaultHasher;
        fn build_hasher(&self) -> DefaultHasher {
            self.calls.set(self.calls.get() + 1);
            DefaultHasher::new()
        }
    }

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        } // every key lands in bucket 0
    }

    /// Invariant: a fresh table has no buckets and answers lookups without hashing.
    #[test]
    fn empty_table_lookup_skips_hashing() {
        let hasher = CountingBuildHasher::default();
        let calls = hasher.calls.clone();
        let m: RunHashMap<String, i32, _> = RunHashMap::with_hasher(hasher);
        assert_eq!(m.bucket_count(), 0);
        assert!(m.find("x").is_none());
        assert!(!m.contains_key("x"));
        assert_eq!(m.at("x"), Err(KeyNotFound));
        assert_eq!(calls.get(), 0);
        m.check_invariants().unwrap();
    }

    /// Invariant: bucket count starts at 4 and doubles once `2 * len >= buckets`.
    #[test]
    fn growth_schedule() {
        let mut m: RunHashMap<u32, u32> = RunHashMap::new();
        let mut seen = Vec::new();
        for k in 0..8 {
            assert!(m.insert(k, k * 10));
            seen.push(m.bucket_count());
            m.check_invariants().unwrap();
        }
        assert_eq!(seen, vec![4, 8, 8, 16, 16, 16, 16, 32]);
        for k in 0..8 {
            assert_eq!(m.get(&k), Some(&(k * 10)));
        }
    }

    /// Invariant: growth relinks entries using cached hashes; the hasher runs
    /// exactly once per insert call and never during a rehash.
    #[test]
    fn growth_does_not_rehash_keys() {
        let hasher = CountingBuildHasher::default();
        let calls = hasher.calls.clone();
        let mut m: RunHashMap<u64, u64, _> = RunHashMap::with_hasher(hasher);
        for k in 0..100 {
            m.insert(k, k);
        }
        assert_eq!(calls.get(), 100);
        m.insert(5, 0);
        assert_eq!(calls.get(), 101);
        assert_eq!(m.len(), 100);
    }

    /// Invariant: duplicate inserts keep the first value and do not grow the map.
    #[test]
    fn insert_is_first_wins() {
        let mut m: RunHashMap<i32, &str> = RunHashMap::new();
        assert!(m.insert(1, "a"));
        assert!(m.insert(2, "b"));
        assert!(!m.insert(1, "c"));
        assert_eq!(m.len(), 2);
        assert_eq!(m.at(&1), Ok(&"a"));
        assert_eq!(m.at(&2), Ok(&"b"));
        m.check_invariants().unwrap();
    }

    /// Invariant: positions survive any number of doublings.
    #[test]
    fn positions_survive_growth() {
        let mut m: RunHashMap<String, usize> = RunHashMap::new();
        m.insert("first".to_string(), 0);
        let p = m.find("first").unwrap();
        let before = m.bucket_count();
        for i in 1..200 {
            m.insert(format!("k{i}"), i);
        }
        assert!(m.bucket_count() > before);
        assert_eq!(p.key(&m).map(String::as_str), Some("first"));
        assert_eq!(p.value(&m), Some(&0));
        assert_eq!(m.find("first"), Some(p));
        *p.value_mut(&mut m).unwrap() = 7;
        assert_eq!(m["first"], 7);
    }

    /// Invariant: erasing the head, middle and tail of one run keeps the rest
    /// of the run reachable (all keys collide into bucket 0).
    #[test]
    fn erase_within_single_run() {
        let mut m: RunHashMap<i32, i32, ConstBuildHasher> = RunHashMap::with_hasher(ConstBuildHasher);
        for k in 0..6 {
            m.insert(k, -k);
        }
        let order: Vec<i32> = m.keys().copied().collect();
        for victim in [order[0], order[3], order[5]] {
            assert_eq!(m.erase(&victim), Some((victim, -victim)));
            m.check_invariants().unwrap();
            assert!(m.find(&victim).is_none());
        }
        let left: BTreeSet<i32> = m.keys().copied().collect();
        let expected: BTreeSet<i32> = [order[1], order[2], order[4]].into_iter().collect();
        assert_eq!(left, expected);
        for k in left {
            assert_eq!(m.get(&k), Some(&-k));
        }
    }

    /// Invariant: erasing an absent key is a no-op.
    #[test]
    fn erase_absent_is_noop() {
        let mut m: RunHashMap<i32, i32> = RunHashMap::new();
        assert!(m.erase(&1).is_none());
        m.insert(1, 1);
        assert!(m.erase(&2).is_none());
        assert_eq!(m.len(), 1);
        m.check_invariants().unwrap();
    }

    /// Invariant: a removed entry's position stays stale even when its slot is reused.
    #[test]
    fn stale_position_after_erase() {
        let mut m: RunHashMap<&str, i32> = RunHashMap::new();
        m.insert("old", 1);
        let p = m.find("old").unwrap();
        m.erase("old");
        m.insert("new", 2);
        assert!(p.value(&m).is_none());
        assert!(m.remove(p).is_none());
        assert_eq!(m.len(), 1);
    }

    /// Invariant: default insertion adds exactly one entry holding `V::default()`.
    #[test]
    fn get_or_insert_default_inserts_once() {
        let mut m: RunHashMap<i32, String> = RunHashMap::new();
        m.insert(5, "x".to_string());
        m.erase(&5);
        assert!(m.find(&5).is_none());
        assert_eq!(m.get_or_insert_default(5), "");
        assert_eq!(m.len(), 1);
        m.get_or_insert_default(5).push_str("y");
        assert_eq!(m.len(), 1);
        assert_eq!(m.at(&5).map(String::as_str), Ok("y"));
    }

    /// Invariant: `get_or_insert_with` only runs its closure for absent keys.
    #[test]
    fn get_or_insert_with_is_lazy() {
        let mut m: RunHashMap<&str, i32> = RunHashMap::new();
        let calls = Cell::new(0);
        *m.get_or_insert_with("k", || {
            calls.set(calls.get() + 1);
            1
        }) += 1;
        m.get_or_insert_with("k", || {
            calls.set(calls.get() + 1);
            100
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(m["k"], 2);
    }

    /// Invariant: `at_mut` reports absent keys and writes through it are seen
    /// by every other lookup, including after growth.
    #[test]
    fn at_mut_checked_write() {
        let mut m: RunHashMap<u32, u32> = RunHashMap::new();
        assert_eq!(m.at_mut(&1), Err(KeyNotFound));
        for k in 0..1_000 {
            m.insert(k, k);
        }
        *m.at_mut(&5).unwrap() = 99;
        assert_eq!(m.get(&5), Some(&99));
        assert_eq!(m.at(&5), Ok(&99));
        assert_eq!(m[&5], 99);
        assert_eq!(m.at_mut(&1_000), Err(KeyNotFound));
        m.erase(&5);
        assert_eq!(m.at_mut(&5), Err(KeyNotFound));
        assert_eq!(m.len(), 999);
    }

    /// Invariant: refilling a cleared map reuses arena slots, yet positions
    /// from before the clear stay stale.
    #[test]
    fn clear_keeps_old_positions_stale_across_refill() {
        let mut m: RunHashMap<i32, i32> = (0..64).map(|k| (k, k)).collect();
        let old: Vec<Position> = (0..64).map(|k| m.find(&k).unwrap()).collect();
        m.clear();
        for k in 0..64 {
            m.insert(k, -k);
        }
        assert_eq!(m.len(), 64);
        for p in old {
            assert!(p.value(&m).is_none());
            assert!(p.key(&m).is_none());
        }
        m.check_invariants().unwrap();
    }

    /// Invariant: `clear` empties the map and unallocates the bucket table;
    /// the next insert starts over at 4 buckets.
    #[test]
    fn clear_resets_to_fresh_state() {
        let mut m: RunHashMap<i32, i32> = (0..20).map(|k| (k, k)).collect();
        let p = m.find(&3).unwrap();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.bucket_count(), 0);
        assert!(p.value(&m).is_none());
        m.check_invariants().unwrap();
        m.insert(3, 3);
        assert_eq!(m.bucket_count(), 4);
        assert!(p.value(&m).is_none());
    }

    /// Invariant: clones are independent and compare equal until mutated.
    #[test]
    fn clone_is_deep_and_independent() {
        let original: RunHashMap<i32, String> = (0..10).map(|k| (k, k.to_string())).collect();
        let mut copy = original.clone();
        copy.check_invariants().unwrap();
        assert_eq!(copy, original);
        for (_, v) in copy.iter_mut() {
            v.push('!');
        }
        assert_ne!(copy, original);
        for k in 0..10 {
            assert_eq!(original[&k], k.to_string());
            assert_eq!(copy[&k], format!("{k}!"));
        }
    }

    #[test]
    fn clone_from_replaces_contents() {
        let source: RunHashMap<i32, i32> = (0..5).map(|k| (k, k)).collect();
        let mut target: RunHashMap<i32, i32> = (100..130).map(|k| (k, k)).collect();
        target.clone_from(&source);
        target.check_invariants().unwrap();
        assert_eq!(target, source);
        assert!(!target.contains_key(&100));
    }

    /// Invariant: construction from a sequence keeps the first value per key.
    #[test]
    fn from_iter_first_occurrence_wins() {
        let m: RunHashMap<&str, i32> = vec![("a", 1), ("b", 2), ("a", 3)].into_iter().collect();
        assert_eq!(m.len(), 2);
        assert_eq!(m["a"], 1);
    }

    #[test]
    fn iteration_covers_every_entry() {
        let mut m: RunHashMap<String, i32> = RunHashMap::new();
        for (i, k) in ["k1", "k2", "k3"].iter().enumerate() {
            m.insert((*k).to_string(), i as i32);
        }
        let seen: BTreeSet<&str> = m.keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = ["k1", "k2", "k3"].into_iter().collect();
        assert_eq!(seen, expected);
        assert_eq!(m.iter().len(), 3);

        for v in m.values_mut() {
            *v += 10;
        }
        let mut values: Vec<i32> = m.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![10, 11, 12]);

        let mut owned: Vec<(String, i32)> = m.into_iter().collect();
        owned.sort();
        assert_eq!(owned[0], ("k1".to_string(), 10));
        assert_eq!(owned.len(), 3);
    }

    #[test]
    fn debug_lists_entries() {
        let mut m: RunHashMap<i32, &str> = RunHashMap::new();
        m.insert(1, "one");
        assert_eq!(format!("{m:?}"), r#"{1: "one"}"#);
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn index_panics_on_missing_key() {
        let m: RunHashMap<i32, i32> = RunHashMap::new();
        let _v = m[&1];
    }

    #[test]
    fn hasher_is_exposed() {
        let hasher = CountingBuildHasher::default();
        let calls = hasher.calls.clone();
        let m: RunHashMap<i32, i32, _> = RunHashMap::with_hasher(hasher);
        assert!(Rc::ptr_eq(&m.hasher().calls, &calls));
    }
}
