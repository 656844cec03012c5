#![cfg(test)]

// Property tests for RunHashMap kept inside the crate so they can check the
// bucket-run invariants through `check_invariants`.

use crate::run_hash_map::RunHashMap;
use crate::{KeyNotFound, Position};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, Hasher};

// Owned label looked up by `&str`. `Box<str>` hashes exactly like `str`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Label(Box<str>);

impl Borrow<str> for Label {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations: indices shrink to earlier keys, pool length
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    GetOrDefault(usize),
    Erase(usize),
    RemoveAt(usize),
    Find(usize),
    At(usize),
    AtMut(usize, i32),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    CloneMap,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Label {
    Label(pool[i].as_str().into())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => idx.clone().prop_map(OpI::GetOrDefault),
            3 => idx.clone().prop_map(OpI::Erase),
            1 => idx.clone().prop_map(OpI::RemoveAt),
            2 => idx.clone().prop_map(OpI::Find),
            2 => idx.clone().prop_map(OpI::At),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::AtMut(i, v)),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::CloneMap),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap.
// Invariants exercised after every operation:
// - Bucket runs are contiguous, counts sum to len, entries sit in the bucket
//   their hash selects, keys are unique, load stays under the threshold.
// - Insert keeps the first value; erase/at/find/contains agree with the model.
// - Positions of live entries stay stable across growth; removed ones go stale.
// - Clones compare equal and carry their own invariants.
fn run_scenario<S>(pool: Vec<String>, ops: Vec<OpI>, hasher: S) -> Result<(), TestCaseError>
where
    S: BuildHasher + Clone,
{
    let mut sut: RunHashMap<Label, i32, S> = RunHashMap::with_hasher(hasher);
    let mut model: HashMap<Label, i32> = HashMap::new();
    let mut live: HashMap<Label, Position> = HashMap::new();
    let mut stale: Vec<Position> = Vec::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(&pool, i);
                let already = model.contains_key(&k);
                prop_assert_eq!(sut.insert(k.clone(), v), !already);
                if !already {
                    model.insert(k.clone(), v);
                    live.insert(k.clone(), sut.find(&k).expect("inserted key is findable"));
                }
            }
            OpI::GetOrDefault(i) => {
                let k = key_from(&pool, i);
                let expected = *model.entry(k.clone()).or_default();
                prop_assert_eq!(*sut.get_or_insert_default(k.clone()), expected);
                let pos = sut.find(&k).expect("present after default insert");
                let prev = *live.entry(k).or_insert(pos);
                prop_assert_eq!(prev, pos);
            }
            OpI::Erase(i) => {
                let k = key_from(&pool, i);
                let removed = sut.erase(&k);
                prop_assert_eq!(removed.map(|(_, v)| v), model.remove(&k));
                if let Some(h) = live.remove(&k) {
                    stale.push(h);
                }
                prop_assert!(sut.find(&k).is_none());
            }
            OpI::RemoveAt(i) => {
                let k = key_from(&pool, i);
                if let Some(h) = live.remove(&k) {
                    let (kk, vv) = sut.remove(h).expect("live position removable");
                    prop_assert!(kk == k);
                    prop_assert_eq!(Some(vv), model.remove(&kk));
                    stale.push(h);
                }
            }
            OpI::Find(i) => {
                let k = key_from(&pool, i);
                let found = sut.find(&k);
                prop_assert_eq!(found, live.get(&k).copied());
                if let Some(h) = found {
                    prop_assert_eq!(h.key(&sut), Some(&k));
                    prop_assert_eq!(h.value(&sut), model.get(&k));
                }
            }
            OpI::At(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.at(&k).copied(), model.get(&k).copied().ok_or(KeyNotFound));
            }
            OpI::AtMut(i, v) => {
                let k = key_from(&pool, i);
                match (sut.at_mut(&k), model.get_mut(&k)) {
                    (Ok(sv), Some(mv)) => {
                        prop_assert_eq!(*sv, *mv);
                        *sv = v;
                        *mv = v;
                    }
                    (Err(KeyNotFound), None) => {}
                    (s, m) => {
                        return Err(TestCaseError::fail(format!(
                            "at_mut disagrees with model: {:?} vs {:?}",
                            s, m
                        )));
                    }
                }
            }
            OpI::Contains(s) => {
                let has_model = model.keys().any(|k| *k.0 == *s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(&pool, i);
                if let Some(&h) = live.get(&k) {
                    let vr = h.value_mut(&mut sut).expect("live position resolves");
                    *vr = vr.saturating_add(d);
                    if let Some(mv) = model.get_mut(&k) {
                        *mv = mv.saturating_add(d);
                    }
                }
            }
            OpI::Iterate => {
                let s_keys: BTreeSet<_> = sut.keys().cloned().collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
                prop_assert_eq!(sut.iter().count(), model.len());
            }
            OpI::CloneMap => {
                let copy = sut.clone();
                copy.check_invariants().map_err(TestCaseError::fail)?;
                prop_assert!(copy == sut);
            }
            OpI::Clear => {
                sut.clear();
                model.clear();
                stale.extend(live.drain().map(|(_, h)| h));
                prop_assert_eq!(sut.bucket_count(), 0);
            }
        }

        sut.check_invariants().map_err(TestCaseError::fail)?;
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        for (k, &h) in &live {
            prop_assert_eq!(h.value(&sut), model.get(k));
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(pool, ops, std::collections::hash_map::RandomState::new())?;
    }
}

// Collision variant using a constant hasher: every key shares one run, which
// stresses head repair on removal and run rebuilding on growth.
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
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(pool, ops, ConstBuildHasher)?;
    }
}

// Few distinct hash values: several multi-entry runs side by side.
#[derive(Clone, Default)]
struct LowBitsBuildHasher;
struct LowBitsHasher(u64);
impl BuildHasher for LowBitsBuildHasher {
    type Hasher = LowBitsHasher;
    fn build_hasher(&self) -> Self::Hasher {
        LowBitsHasher(0)
    }
}
impl Hasher for LowBitsHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_add(b as u64);
        }
    }
    fn finish(&self) -> u64 {
        self.0 % 3
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_shared_runs((pool, ops) in arb_scenario()) {
        run_scenario(pool, ops, LowBitsBuildHasher)?;
    }
}

// Growth safety: inserting N distinct keys keeps every key with its first value.
proptest! {
    #[test]
    fn prop_growth_keeps_every_key(keys in proptest::collection::hash_set(any::<u32>(), 0..300)) {
        let mut m: RunHashMap<u32, u64> = RunHashMap::new();
        for &k in &keys {
            prop_assert!(m.insert(k, k as u64 * 3));
            prop_assert!(!m.insert(k, 0));
        }
        m.check_invariants().map_err(TestCaseError::fail)?;
        prop_assert_eq!(m.len(), keys.len());
        for &k in &keys {
            prop_assert_eq!(m.get(&k), Some(&(k as u64 * 3)));
        }
    }
}
