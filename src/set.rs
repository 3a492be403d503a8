//! `CompactSet`: the keys-only flavour of the compact table.

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use hashbrown::DefaultHashBuilder;

use crate::equality::{Equality, NativeEq};
use crate::error::{Error, Result};
use crate::raw::{self, ProbeStats, RawCursor, RawTable};

/// A hash set of `K` stored in a compact open-addressing table.
///
/// ```
/// use compact_table::CompactSet;
///
/// let mut set = CompactSet::new();
/// assert!(set.insert(3));
/// assert!(!set.insert(3));
/// assert!(set.contains(&3));
/// assert!(set.remove(&3));
/// assert!(set.is_empty());
/// ```
pub struct CompactSet<K, S = DefaultHashBuilder, E = NativeEq> {
    table: RawTable<K>,
    hash_builder: S,
    marker: PhantomData<fn() -> E>,
}

#[inline(always)]
fn key_hasher<K: Hash, S: BuildHasher>(hash_builder: &S) -> impl Fn(&K) -> u64 + '_ {
    move |key: &K| hash_builder.hash_one(key)
}

impl<K> CompactSet<K, DefaultHashBuilder, NativeEq> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, S, E> CompactSet<K, S, E> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: RawTable::with_capacity(capacity),
            hash_builder,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            inner: self.table.iter(),
        }
    }

    pub fn drain(&mut self) -> IntoIter<K> {
        IntoIter {
            inner: self.table.drain(),
        }
    }

    /// See [`map::Cursor`](crate::map::Cursor).
    pub fn cursor(&self) -> Cursor {
        Cursor {
            inner: self.table.cursor(),
        }
    }
}

impl<K, S, E> CompactSet<K, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
    #[inline]
    fn find(&self, key: &K) -> Option<usize> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |k| E::equals(k, key))
    }

    /// Adds `key`, returning `false` (and dropping `key`) if an equal key is
    /// already present.
    pub fn insert(&mut self, key: K) -> bool {
        let hash = self.hash_builder.hash_one(&key);
        if self.table.find(hash, |k| E::equals(k, &key)).is_some() {
            return false;
        }
        self.table
            .insert_unique(hash, key, key_hasher::<K, S>(&self.hash_builder));
        true
    }

    /// Adds a key that must not be present yet.
    pub fn add(&mut self, key: K) -> Result<()>
    where
        K: fmt::Debug,
    {
        let hash = self.hash_builder.hash_one(&key);
        if self.table.find(hash, |k| E::equals(k, &key)).is_some() {
            return Err(Error::duplicate_key(&key));
        }
        self.table
            .insert_unique(hash, key, key_hasher::<K, S>(&self.hash_builder));
        Ok(())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// The stored key equal to `key`.
    pub fn get(&self, key: &K) -> Option<&K> {
        self.table.get(self.find(key)?)
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.take(key).is_some()
    }

    /// Removes and returns the stored key equal to `key`.
    pub fn take(&mut self, key: &K) -> Option<K> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .remove(hash, |k| E::equals(k, key), key_hasher::<K, S>(&self.hash_builder))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.table
            .retain(|k| keep(k), key_hasher::<K, S>(&self.hash_builder));
    }

    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, key_hasher::<K, S>(&self.hash_builder));
    }

    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(key_hasher::<K, S>(&self.hash_builder));
    }

    /// Whether every key of `self` is in `other`.
    pub fn is_subset<S2: BuildHasher>(&self, other: &CompactSet<K, S2, E>) -> bool {
        self.len() <= other.len() && self.iter().all(|k| other.contains(k))
    }

    pub fn probe_stats(&self) -> ProbeStats {
        self.table
            .probe_stats(key_hasher::<K, S>(&self.hash_builder))
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        self.table
            .check_invariants(key_hasher::<K, S>(&self.hash_builder))
    }
}

impl<K, S: Default, E> Default for CompactSet<K, S, E> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K: Clone, S: Clone, E> Clone for CompactSet<K, S, E> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
            marker: PhantomData,
        }
    }
}

impl<K: fmt::Debug, S, E> fmt::Debug for CompactSet<K, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, S, E> PartialEq for CompactSet<K, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }
}

impl<K, S, E> Eq for CompactSet<K, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
}

impl<K, S, E> FromIterator<K> for CompactSet<K, S, E>
where
    K: Hash,
    S: BuildHasher + Default,
    E: Equality<K>,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::default();
        set.extend(iter);
        set
    }
}

/// Keys already present are kept; the incoming duplicate is dropped.
impl<K, S, E> Extend<K> for CompactSet<K, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for key in iter {
            self.insert(key);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    inner: RawCursor,
}

impl Cursor {
    #[allow(clippy::should_implement_trait)]
    pub fn next<'a, K, S, E>(&mut self, set: &'a CompactSet<K, S, E>) -> Result<Option<&'a K>> {
        self.inner.next(&set.table)
    }

    pub fn reset<K, S, E>(&mut self, set: &CompactSet<K, S, E>) {
        self.inner.reset(&set.table);
    }
}

pub struct Iter<'a, K> {
    inner: raw::Iter<'a, K>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for Iter<'_, K> {}

impl<K> Clone for Iter<'_, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct IntoIter<K> {
    inner: raw::IntoIter<K>,
}

impl<K> Iterator for IntoIter<K> {
    type Item = K;

    #[inline]
    fn next(&mut self) -> Option<K> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for IntoIter<K> {}

impl<K, S, E> IntoIterator for CompactSet<K, S, E> {
    type Item = K;
    type IntoIter = IntoIter<K>;

    fn into_iter(self) -> IntoIter<K> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, S, E> IntoIterator for &'a CompactSet<K, S, E> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Iter<'a, K> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_insert_contains_remove() {
        let mut set = CompactSet::new();
        for i in 0..100u32 {
            assert!(set.insert(i));
        }
        for i in 0..100u32 {
            assert!(!set.insert(i));
            assert!(set.contains(&i));
        }
        assert_eq!(set.len(), 100);
        assert!(set.remove(&50));
        assert!(!set.remove(&50));
        assert!(!set.contains(&50));
        assert_eq!(set.take(&51), Some(51));
        assert_eq!(set.len(), 98);
        set.check_invariants().unwrap();
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut set = CompactSet::new();
        set.add("a".to_string()).unwrap();
        assert_eq!(
            set.add("a".to_string()),
            Err(Error::DuplicateKey("\"a\"".to_string()))
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_get_returns_stored_key() {
        #[derive(Debug)]
        struct Tagged {
            id: u32,
            tag: &'static str,
        }
        crate::fieldwise_eq!(Tagged { id });

        // Hash only what equality looks at.
        impl Hash for Tagged {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        let mut set: CompactSet<Tagged, DefaultHashBuilder, crate::equality::FieldwiseEq> =
            CompactSet::default();
        assert!(set.insert(Tagged { id: 1, tag: "first" }));
        assert!(!set.insert(Tagged { id: 1, tag: "second" }));
        let probe = Tagged { id: 1, tag: "probe" };
        assert_eq!(set.get(&probe).map(|t| t.tag), Some("first"));
        assert_eq!(set.take(&probe).map(|t| t.tag), Some("first"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_randomized_against_std_hashset() {
        let mut rng = fastrand::Rng::with_seed(2024);
        let mut set = CompactSet::new();
        let mut model = HashSet::new();
        for _ in 0..10_000 {
            let key = rng.u16(..512);
            if rng.bool() {
                assert_eq!(set.insert(key), model.insert(key));
            } else {
                assert_eq!(set.remove(&key), model.remove(&key));
            }
        }
        set.check_invariants().unwrap();
        let mut ours: Vec<_> = set.iter().copied().collect();
        let mut theirs: Vec<_> = model.into_iter().collect();
        ours.sort();
        theirs.sort();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_subset_and_equality() {
        let small: CompactSet<u8> = [1, 2].into_iter().collect();
        let big: CompactSet<u8> = [3, 2, 1].into_iter().collect();
        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));
        assert_ne!(small, big);
        let mut again = big.clone();
        again.remove(&3);
        assert_eq!(again, small);
    }

    #[test]
    fn test_retain_drain_and_debug() {
        let mut set: CompactSet<u32> = (0..40).collect();
        set.retain(|k| k % 10 == 0);
        assert_eq!(set.len(), 4);
        set.check_invariants().unwrap();

        let mut drained: Vec<_> = set.drain().collect();
        drained.sort();
        assert_eq!(drained, vec![0, 10, 20, 30]);
        assert!(set.is_empty());

        set.insert(7);
        assert_eq!(format!("{set:?}"), "{7}");
    }

    #[test]
    fn test_cursor() {
        let mut set: CompactSet<u32> = (0..5).collect();
        let mut cursor = set.cursor();
        let mut seen = Vec::new();
        while let Some(&k) = cursor.next(&set).unwrap() {
            seen.push(k);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        cursor.reset(&set);
        set.clear();
        assert!(cursor.next(&set).is_err());
    }
}
