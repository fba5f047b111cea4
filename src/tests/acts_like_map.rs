//! The list is checked against a `BTreeMap` by running the same generated series of inserts,
//! lookups, removals, and full traversals on both.
//!
//! Small key universes mostly exercise duplicate rejection; large ones mostly exercise ordering.

use std::collections::BTreeMap;
use std::fmt::Debug;

use proptest::collection::vec;
use proptest::prelude::*;

use crate::{Hp, InsertError, OrderedList, Reclaim, SingleThreaded};

#[derive(Debug, Clone)]
enum Instruction<K, V> {
    Lookup(K),
    Remove(K),
    Extract(K),
    Insert(K, V),
    Traverse,
}

impl<K, V> Instruction<K, V>
where
    K: Arbitrary + Clone + Debug + Ord + 'static,
    V: Arbitrary + Clone + Debug + PartialEq + 'static,
{
    fn strategy() -> impl Strategy<Value = Self> {
        use Instruction::*;

        prop_oneof![
            1 => any::<K>().prop_map(Lookup),
            1 => any::<K>().prop_map(Remove),
            1 => any::<K>().prop_map(Extract),
            3 => any::<(K, V)>().prop_map(|(k, v)| Insert(k, v)),
            1 => Just(Traverse),
        ]
    }

    fn run<R: Reclaim>(instructions: Vec<Self>) -> Result<(), TestCaseError> {
        use Instruction::*;

        let mut list: OrderedList<K, V, R> = OrderedList::new();
        let mut map = BTreeMap::new();
        for ins in instructions {
            match ins {
                Lookup(key) => {
                    let expected = map.get(&key);
                    let found = list.get(&key);
                    prop_assert_eq!(expected, found.as_ref().map(|e| e.value()));
                    prop_assert_eq!(map.contains_key(&key), list.contains(&key));
                }
                Remove(key) => {
                    let expected = map.remove(&key);
                    prop_assert_eq!(expected.is_some(), list.remove(&key));
                    prop_assert_eq!(map.is_empty(), list.is_empty());
                }
                Extract(key) => {
                    let expected = map.remove(&key);
                    let found = list.extract(&key);
                    prop_assert_eq!(expected.as_ref(), found.as_ref().map(|e| e.value()));
                }
                Insert(key, value) => {
                    if map.contains_key(&key) {
                        match list.insert(key.clone(), value.clone()) {
                            Err(InsertError::Occupied { key: k, value: v }) => {
                                prop_assert_eq!(k, key);
                                prop_assert_eq!(v, value);
                            }
                            other => prop_assert!(false, "unexpected {:?}", other),
                        }
                    } else {
                        prop_assert!(list.insert(key.clone(), value.clone()).is_ok());
                        map.insert(key, value);
                    }
                    prop_assert_eq!(map.len(), list.len());
                }
                Traverse => {
                    let found: Vec<(K, V)> = list
                        .iter()
                        .map(|e| (e.key().clone(), e.value().clone()))
                        .collect();
                    let expected: Vec<(K, V)> =
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    prop_assert_eq!(expected, found);
                }
            }
        }
        prop_assert_eq!(list.validate(), Ok(map.len()));

        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(if cfg!(miri) { 4 } else { 64 }))]

    #[test]
    fn small_keys(instructions in vec(Instruction::<u8, usize>::strategy(), 1..2_000)) {
        Instruction::run::<Hp>(instructions)?;
    }

    #[test]
    fn mid_keys(instructions in vec(Instruction::<u16, usize>::strategy(), 1..1_000)) {
        Instruction::run::<Hp>(instructions)?;
    }

    #[test]
    fn string_keys(instructions in vec(Instruction::<String, u8>::strategy(), 1..256)) {
        Instruction::run::<Hp>(instructions)?;
    }

    #[test]
    fn single_threaded(instructions in vec(Instruction::<u8, usize>::strategy(), 1..2_000)) {
        Instruction::run::<SingleThreaded>(instructions)?;
    }
}
