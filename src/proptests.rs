use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};

use crate::raw::buckets_for;

/// Keeps only the low four bits of a `u64` key, so at most 16 distinct homes
/// exist and chains grow long, wrap and collide with each other.
#[derive(Default)]
struct LowBitsHasher(u64);

impl Hasher for LowBitsHasher {
    fn finish(&self) -> u64 {
        self.0 & 0xF
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | b as u64;
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

type Colliding = BuildHasherDefault<LowBitsHasher>;
type Map = CompactMap<u64, u64, Colliding>;

/// Hashes a `u64` key to `key / D`: `D` keys share each home and consecutive
/// homes sit side by side, so chains keep running into other keys' homes.
#[derive(Default)]
struct DividingHasher<const D: u64>(u64);

impl<const D: u64> Hasher for DividingHasher<D> {
    fn finish(&self) -> u64 {
        self.0 / D
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | b as u64;
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

/// Inserts `0..len` in shuffled order, checking that the table only ever
/// grows at its load limit, then removes every other key.
fn fill_dense_homes<S: BuildHasher + Default>(
    len: u64,
    seed: u64,
) -> std::result::Result<(), TestCaseError> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut keys: Vec<u64> = (0..len).collect();
    rng.shuffle(&mut keys);

    let mut t: CompactMap<u64, u64, S> = CompactMap::default();
    for &k in &keys {
        prop_assert_eq!(t.insert(k, !k), None);
        prop_assert_eq!(t.bucket_count(), buckets_for(t.len()));
    }
    t.check_invariants().map_err(TestCaseError::fail)?;
    for k in 0..len {
        prop_assert_eq!(t.get(&k), Some(&!k));
    }

    rng.shuffle(&mut keys);
    for &k in keys.iter().step_by(2) {
        prop_assert_eq!(t.remove(&k), Some(!k));
    }
    t.check_invariants().map_err(TestCaseError::fail)?;
    prop_assert_eq!(t.len() as u64, len / 2);
    for (i, k) in keys.iter().enumerate() {
        prop_assert_eq!(t.contains_key(k), i % 2 == 1);
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u64),
    Remove(u64),
    Get(u64),
    Retain(u64),
    Shrink,
    Clear,
}

fn key_strategy() -> impl Strategy<Value = u64> + Clone {
    // Small key space so removes and updates actually hit.
    0u64..512
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        20 => key.clone().prop_map(Op::Get),
        2 => (2u64..8).prop_map(Op::Retain),
        2 => Just(Op::Shrink),
        1 => Just(Op::Clear),
    ];
    prop::collection::vec(op, 0..=1000)
}

fn assert_same_contents(t: &Map, m: &BTreeMap<u64, u64>) {
    assert_eq!(t.len(), m.len());
    let mut got: Vec<(u64, u64)> = t.iter().map(|(&k, &v)| (k, v)).collect();
    got.sort_unstable();
    let expected: Vec<(u64, u64)> = m.iter().map(|(&k, &v)| (k, v)).collect();
    assert_eq!(got, expected);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 20_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_with_colliding_hashes(ops in ops_strategy()) {
        let mut t = Map::default();
        let mut m = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    prop_assert_eq!(t.insert(key, value), m.insert(key, value));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(t.remove(&key), m.remove(&key));
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(&key), m.get(&key));
                }
                Op::Retain(modulus) => {
                    t.retain(|k, _| k % modulus != 0);
                    m.retain(|k, _| k % modulus != 0);
                }
                Op::Shrink => t.shrink_to_fit(),
                Op::Clear => {
                    t.clear();
                    m.clear();
                }
            }
            if let Err(violation) = t.check_invariants() {
                return Err(TestCaseError::fail(violation));
            }
            prop_assert_eq!(t.len(), m.len());
            prop_assert!(t.len() <= t.capacity());
        }
        assert_same_contents(&t, &m);
    }

    #[test]
    fn prop_remove_then_reinsert_restores_membership(
        keys in prop::collection::btree_set(key_strategy(), 1..200),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut t: Map = keys.iter().map(|&k| (k, k + 1)).collect();
        let keys: Vec<u64> = keys.into_iter().collect();
        let victim = keys[pick.index(keys.len())];

        prop_assert_eq!(t.remove(&victim), Some(victim + 1));
        prop_assert!(!t.contains_key(&victim));
        for &k in &keys {
            prop_assert_eq!(t.contains_key(&k), k != victim);
        }

        prop_assert_eq!(t.insert(victim, victim + 1), None);
        for &k in &keys {
            prop_assert_eq!(t.get(&k), Some(&(k + 1)));
        }
        t.check_invariants().map_err(TestCaseError::fail)?;
    }

    #[test]
    fn prop_resize_preserves_contents(
        keys in prop::collection::btree_set(key_strategy(), 0..300),
        extra in 0usize..5000,
    ) {
        let mut t: Map = keys.iter().map(|&k| (k, !k)).collect();
        let m: BTreeMap<u64, u64> = keys.iter().map(|&k| (k, !k)).collect();

        t.reserve(extra);
        prop_assert!(t.capacity() >= t.len() + extra);
        t.check_invariants().map_err(TestCaseError::fail)?;
        assert_same_contents(&t, &m);

        t.shrink_to_fit();
        t.check_invariants().map_err(TestCaseError::fail)?;
        assert_same_contents(&t, &m);
    }

    #[test]
    fn prop_set_matches_btree_set(ops in prop::collection::vec((any::<bool>(), key_strategy()), 0..1000)) {
        let mut s: CompactSet<u64, Colliding> = CompactSet::default();
        let mut m = std::collections::BTreeSet::new();
        for (insert, key) in ops {
            if insert {
                prop_assert_eq!(s.insert(key), m.insert(key));
            } else {
                prop_assert_eq!(s.remove(&key), m.remove(&key));
            }
        }
        s.check_invariants().map_err(TestCaseError::fail)?;
        let mut got: Vec<u64> = s.iter().copied().collect();
        got.sort_unstable();
        prop_assert_eq!(got, m.into_iter().collect::<Vec<_>>());
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 12,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_halved_keys_grow_only_at_load_limit(len in 1000u64..3000, seed in any::<u64>()) {
        fill_dense_homes::<BuildHasherDefault<DividingHasher<2>>>(len, seed)?;
    }

    #[test]
    fn prop_thirded_keys_grow_only_at_load_limit(len in 1000u64..3000, seed in any::<u64>()) {
        fill_dense_homes::<BuildHasherDefault<DividingHasher<3>>>(len, seed)?;
    }
}

/// Every insertion order of a small colliding key set ends in the same
/// contents and a valid chain layout.
#[test]
fn exhaustive_insert_then_remove_orders() {
    let keys = [0u64, 16, 32, 1, 17, 48];
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..500 {
        let mut order = keys.to_vec();
        rng.shuffle(&mut order);

        let mut t = Map::default();
        for &k in &order {
            t.insert(k, k);
            t.check_invariants().unwrap();
        }
        for &k in &keys {
            assert_eq!(t.get(&k), Some(&k));
        }

        rng.shuffle(&mut order);
        for (i, &k) in order.iter().enumerate() {
            assert_eq!(t.remove(&k), Some(k));
            t.check_invariants().unwrap();
            for &rest in &order[i + 1..] {
                assert!(t.contains_key(&rest), "lost {rest} after removing {k}");
            }
        }
        assert!(t.is_empty());
    }
}
