//! `CompactMap`: the key-value flavour of the compact table.

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ops::Index;

use hashbrown::DefaultHashBuilder;

use crate::equality::{Equality, NativeEq};
use crate::error::{Error, Result};
use crate::raw::{self, ProbeStats, RawCursor, RawTable};
use crate::uunwrap::UUnwrap;

/// A hash map storing `(K, V)` pairs in a compact open-addressing table.
///
/// Keys are hashed with `S` and compared with the `E` strategy.
///
/// ```
/// use compact_table::CompactMap;
///
/// let mut map = CompactMap::new();
/// map.insert("a", 1);
/// map.add("b", 2).unwrap();
/// assert!(map.add("b", 3).is_err());
/// assert_eq!(map.get(&"b"), Some(&2));
/// assert_eq!(map.remove(&"a"), Some(1));
/// assert_eq!(map.len(), 1);
/// ```
pub struct CompactMap<K, V, S = DefaultHashBuilder, E = NativeEq> {
    table: RawTable<(K, V)>,
    hash_builder: S,
    marker: PhantomData<fn() -> E>,
}

#[inline(always)]
fn entry_hasher<K: Hash, V, S: BuildHasher>(hash_builder: &S) -> impl Fn(&(K, V)) -> u64 + '_ {
    move |(key, _): &(K, V)| hash_builder.hash_one(key)
}

impl<K, V> CompactMap<K, V, DefaultHashBuilder, NativeEq> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S, E> CompactMap<K, V, S, E> {
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

    /// Number of entries the map holds before it has to grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Length of the bucket array; always a power of two.
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

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes every entry, yielding them. Unyielded entries are dropped with
    /// the iterator.
    pub fn drain(&mut self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.drain(),
        }
    }

    /// A detached enumeration that fails once the map is structurally
    /// modified, see [`Cursor`].
    pub fn cursor(&self) -> Cursor {
        Cursor {
            inner: self.table.cursor(),
        }
    }
}

impl<K, V, S, E> CompactMap<K, V, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
    #[inline]
    fn find(&self, key: &K) -> Option<usize> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| E::equals(k, key))
    }

    /// Inserts a key-value pair, returning the previous value if the key was
    /// already present. The stored key is not replaced.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.find(hash, |(k, _)| E::equals(k, &key)) {
            Some(index) => {
                let (_, old) = self.table.get_mut(index).uunwrap();
                Some(std::mem::replace(old, value))
            }
            None => {
                let hasher = entry_hasher::<K, V, S>(&self.hash_builder);
                self.table.insert_unique(hash, (key, value), hasher);
                None
            }
        }
    }

    /// Inserts a key that must not be present yet.
    pub fn add(&mut self, key: K, value: V) -> Result<()>
    where
        K: fmt::Debug,
    {
        let hash = self.hash_builder.hash_one(&key);
        if self.table.find(hash, |(k, _)| E::equals(k, &key)).is_some() {
            return Err(Error::duplicate_key(&key));
        }
        let hasher = entry_hasher::<K, V, S>(&self.hash_builder);
        self.table.insert_unique(hash, (key, value), hasher);
        Ok(())
    }

    /// Returns the value for `key`, inserting `default()` first if absent.
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        let hash = self.hash_builder.hash_one(&key);
        let index = match self.table.find(hash, |(k, _)| E::equals(k, &key)) {
            Some(index) => index,
            None => self.table.insert_unique(
                hash,
                (key, default()),
                entry_hasher::<K, V, S>(&self.hash_builder),
            ),
        };
        &mut self.table.get_mut(index).uunwrap().1
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let index = self.find(key)?;
        self.table.get(index).map(|(k, v)| (k, v))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.find(key)?;
        self.table.get_mut(index).map(|(_, v)| v)
    }

    /// Like [`get`](Self::get), but reports a missing key as `KeyNotFound`.
    pub fn try_get(&self, key: &K) -> Result<&V>
    where
        K: fmt::Debug,
    {
        self.get(key).ok_or_else(|| Error::key_not_found(key))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(
            hash,
            |(k, _)| E::equals(k, key),
            entry_hasher::<K, V, S>(&self.hash_builder),
        )
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        self.table
            .retain(|(k, v)| keep(k, v), entry_hasher::<K, V, S>(&self.hash_builder));
    }

    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, entry_hasher::<K, V, S>(&self.hash_builder));
    }

    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit(entry_hasher::<K, V, S>(&self.hash_builder));
    }

    /// Chain length statistics for the current layout.
    pub fn probe_stats(&self) -> ProbeStats {
        self.table.probe_stats(entry_hasher::<K, V, S>(&self.hash_builder))
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        self.table
            .check_invariants(entry_hasher::<K, V, S>(&self.hash_builder))
    }
}

impl<K, V, S: Default, E> Default for CompactMap<K, V, S, E> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K: Clone, V: Clone, S: Clone, E> Clone for CompactMap<K, V, S, E> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
            marker: PhantomData,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S, E> fmt::Debug for CompactMap<K, V, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Maps are equal when they hold the same keys (under `E`) with equal values.
impl<K, V, S, E> PartialEq for CompactMap<K, V, S, E>
where
    K: Hash,
    V: PartialEq,
    S: BuildHasher,
    E: Equality<K>,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| v == ov))
    }
}

impl<K, V, S, E> Eq for CompactMap<K, V, S, E>
where
    K: Hash,
    V: Eq,
    S: BuildHasher,
    E: Equality<K>,
{
}

/// Panics with the `KeyNotFound` message if `key` is absent.
impl<K, V, S, E> Index<&K> for CompactMap<K, V, S, E>
where
    K: Hash + fmt::Debug,
    S: BuildHasher,
    E: Equality<K>,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<K, V, S, E> FromIterator<(K, V)> for CompactMap<K, V, S, E>
where
    K: Hash,
    S: BuildHasher + Default,
    E: Equality<K>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

/// Later pairs overwrite the values of earlier ones with the same key.
impl<K, V, S, E> Extend<(K, V)> for CompactMap<K, V, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: Equality<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// Enumeration that doesn't borrow the map between steps.
///
/// Each call to [`next`](Cursor::next) checks the map's structure version and
/// fails with [`Error::ConcurrentModification`] if an entry was added or
/// removed, or the map was cleared or resized, since the cursor was created.
/// Overwriting a value in place does not invalidate it.
///
/// ```
/// use compact_table::{CompactMap, Error};
///
/// let mut map = CompactMap::new();
/// map.insert(1, "one");
/// map.insert(2, "two");
///
/// let mut cursor = map.cursor();
/// assert!(cursor.next(&map).unwrap().is_some());
/// map.remove(&1);
/// assert!(matches!(cursor.next(&map), Err(Error::ConcurrentModification { .. })));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    inner: RawCursor,
}

impl Cursor {
    #[allow(clippy::should_implement_trait)]
    pub fn next<'a, K, V, S, E>(
        &mut self,
        map: &'a CompactMap<K, V, S, E>,
    ) -> Result<Option<(&'a K, &'a V)>> {
        Ok(self.inner.next(&map.table)?.map(|(k, v)| (k, v)))
    }

    /// Starts over from the beginning against the map's current state.
    pub fn reset<K, V, S, E>(&mut self, map: &CompactMap<K, V, S, E>) {
        self.inner.reset(&map.table);
    }
}

pub struct Iter<'a, K, V> {
    inner: raw::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct IterMut<'a, K, V> {
    inner: raw::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    #[inline]
    fn next(&mut self) -> Option<&'a mut V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// Owning iterator, also returned by [`CompactMap::drain`].
pub struct IntoIter<K, V> {
    inner: raw::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V, S, E> IntoIterator for CompactMap<K, V, S, E> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S, E> IntoIterator for &'a CompactMap<K, V, S, E> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S, E> IntoIterator for &'a mut CompactMap<K, V, S, E> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::FieldwiseEq;
    use crate::fieldwise_eq;
    use std::collections::HashMap;
    use std::hash::BuildHasherDefault;
    use std::hash::Hasher;

    /// Hashes every key to its value modulo 8, so small keys collide on
    /// purpose.
    #[derive(Default)]
    struct Mod8Hasher(u64);

    impl Hasher for Mod8Hasher {
        fn finish(&self) -> u64 {
            self.0 % 8
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = self.0.wrapping_mul(31).wrapping_add(b as u64);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    type Mod8 = BuildHasherDefault<Mod8Hasher>;

    #[test]
    fn test_basic_insert_and_get() {
        let mut map = CompactMap::with_capacity(16);

        assert_eq!(map.insert(42u64, 100u64), None);
        assert_eq!(map.len(), 1);

        assert_eq!(map.get(&42), Some(&100));
        assert_eq!(map.get(&999), None);
        assert!(map.contains_key(&42));
    }

    #[test]
    fn test_update_existing() {
        let mut map = CompactMap::with_capacity(16);
        assert_eq!(map.insert(123u64, 456u64), None);
        assert_eq!(map.insert(123, 789), Some(456));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&123), Some(&789));
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut map = CompactMap::new();
        map.add("x", 1).unwrap();
        assert_eq!(map.add("x", 2), Err(Error::DuplicateKey("\"x\"".to_string())));
        assert_eq!(map[&"x"], 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_try_get_and_index() {
        let mut map = CompactMap::new();
        map.insert(7u32, "seven");
        assert_eq!(map.try_get(&7), Ok(&"seven"));
        assert_eq!(map.try_get(&8), Err(Error::KeyNotFound("8".to_string())));
        assert_eq!(map[&7], "seven");
    }

    #[test]
    #[should_panic(expected = "key not found: 8")]
    fn test_index_missing_key_panics() {
        let mut map = CompactMap::new();
        map.insert(7u32, ());
        let _ = map[&8];
    }

    #[test]
    fn test_colliding_hasher_against_std_hashmap() {
        let mut rng = fastrand::Rng::with_seed(67890);
        let mut map: CompactMap<u64, u64, Mod8> = CompactMap::default();
        let mut model = HashMap::new();

        for _ in 0..3000 {
            let key = rng.u64(0..300);
            match rng.u32(0..4) {
                0 | 1 => assert_eq!(map.insert(key, key * 3), model.insert(key, key * 3)),
                2 => assert_eq!(map.remove(&key), model.remove(&key)),
                3 => assert_eq!(map.get(&key), model.get(&key)),
                _ => unreachable!(),
            }
        }
        map.check_invariants().unwrap();
        assert_eq!(map.len(), model.len());
        for (k, v) in &model {
            assert_eq!(map.get(k), Some(v));
        }
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut map = CompactMap::new();
        *map.get_or_insert_with("a", || 0) += 1;
        *map.get_or_insert_with("a", || 0) += 1;
        *map.get_or_insert_with("b", || 10) += 1;
        assert_eq!(map.get(&"a"), Some(&2));
        assert_eq!(map.get(&"b"), Some(&11));
    }

    #[test]
    fn test_get_or_insert_with_through_growth() {
        let mut map: CompactMap<u64, u64, Mod8> = CompactMap::default();
        for key in 0..100 {
            let bucket_count = map.bucket_count();
            assert_eq!(*map.get_or_insert_with(key, || key + 1), key + 1);
            if key > 0 {
                assert!(map.bucket_count() >= bucket_count);
            }
        }
        map.check_invariants().unwrap();
    }

    #[test]
    fn test_iterators() {
        let mut map: CompactMap<u32, u32> = (0..20).map(|i| (i, i * i)).collect();
        assert_eq!(map.iter().len(), 20);

        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());

        for v in map.values_mut() {
            *v += 1;
        }
        for (k, v) in &mut map {
            *v -= k * k;
        }
        assert!(map.values().all(|&v| v == 1));

        let mut owned: Vec<_> = map.clone().into_iter().collect();
        owned.sort();
        assert_eq!(owned.len(), 20);
        assert_eq!(owned[3], (3, 1));
    }

    #[test]
    fn test_retain_and_drain() {
        let mut map: CompactMap<u64, u64, Mod8> = (0..64).map(|i| (i, i)).collect();
        map.retain(|k, v| {
            *v *= 2;
            k % 4 == 0
        });
        assert_eq!(map.len(), 16);
        assert_eq!(map.get(&8), Some(&16));
        assert_eq!(map.get(&9), None);
        map.check_invariants().unwrap();

        let drained: HashMap<_, _> = map.drain().collect();
        assert_eq!(drained.len(), 16);
        assert!(map.is_empty());
        map.insert(1, 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_equality_and_debug() {
        let a: CompactMap<i32, &str> = [(1, "a"), (2, "b")].into_iter().collect();
        let mut b = CompactMap::with_capacity(100);
        b.insert(2, "b");
        b.insert(1, "a");
        assert_eq!(a, b);
        b.insert(1, "z");
        assert_ne!(a, b);

        let single: CompactMap<i32, i32> = [(5, 6)].into_iter().collect();
        assert_eq!(format!("{single:?}"), "{5: 6}");
    }

    #[test]
    fn test_cursor_survives_value_updates_only() {
        let mut map: CompactMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        let mut cursor = map.cursor();
        let mut seen = 0;
        loop {
            let Some((&k, _)) = cursor.next(&map).unwrap() else {
                break;
            };
            seen += 1;
            if seen == 3 {
                // Overwriting is not a structural change.
                map.insert(k, 100);
            }
        }
        assert_eq!(seen, 10);

        cursor.reset(&map);
        cursor.next(&map).unwrap();
        map.insert(99, 99);
        assert!(matches!(
            cursor.next(&map),
            Err(Error::ConcurrentModification { .. })
        ));
    }

    #[derive(Debug, Hash)]
    struct Coord {
        x: i32,
        y: i32,
    }
    fieldwise_eq!(Coord { x, y });

    #[test]
    fn test_fieldwise_keys() {
        let mut map: CompactMap<Coord, &str, DefaultHashBuilder, FieldwiseEq> = CompactMap::default();
        map.insert(Coord { x: 1, y: 2 }, "a");
        map.insert(Coord { x: 2, y: 1 }, "b");
        assert_eq!(map.insert(Coord { x: 1, y: 2 }, "c"), Some("a"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Coord { x: 2, y: 1 }), Some(&"b"));
        assert!(map.add(Coord { x: 2, y: 1 }, "d").is_err());
    }

    #[test]
    fn test_reserve_and_shrink() {
        let mut map: CompactMap<u64, ()> = CompactMap::new();
        map.reserve(1000);
        let buckets = map.bucket_count();
        assert!(map.capacity() >= 1000);
        for i in 0..1000 {
            map.insert(i, ());
        }
        assert_eq!(map.bucket_count(), buckets);
        map.retain(|&k, _| k < 3);
        map.shrink_to_fit();
        assert_eq!(map.bucket_count(), 4);
        assert!(map.contains_key(&2));
    }

    #[test]
    fn test_with_capacity_is_honoured_for_random_keys() {
        let mut rng = fastrand::Rng::with_seed(99);
        for n in [6, 768, 12_288, 49_152, 100_000] {
            let mut map: CompactMap<u64, u64> = CompactMap::with_capacity(n);
            let buckets = map.bucket_count();
            while map.len() < n {
                map.insert(rng.u64(..), 0);
            }
            assert_eq!(map.bucket_count(), buckets, "grew before {n} entries");
            assert!(map.len() <= map.capacity());
        }
    }
}
