#![no_main]

use std::collections::BTreeMap;

use densetree::{utils::EscapedBytes, Tree, TreeOptions};
use libfuzzer_sys::arbitrary::{self, Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

#[macro_use]
extern crate log;

/// A key made of a numeric base plus an offset, so that runs of
/// fixed length numeric keys (the dense leaf case) are common.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key(Vec<u8>);

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{:?}`", EscapedBytes(&self.0))
    }
}

impl<'a> Arbitrary<'a> for Key {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let base = u.int_in_range(0u32..=3)? << 20;
        let n = base + u32::from(u.arbitrary::<u16>()?);
        let mut key = match u.int_in_range(0u8..=9)? {
            0..=5 => n.to_be_bytes().to_vec(),
            6..=7 => u64::from(n).to_be_bytes().to_vec(),
            8 => {
                let mut key = n.to_be_bytes().to_vec();
                key.push(u.arbitrary()?);
                key
            }
            _ => {
                let len = u.int_in_range(1usize..=24)?;
                (0..len)
                    .map(|_| Ok(b"abc"[u.int_in_range(0usize..=2)?]))
                    .collect::<arbitrary::Result<_>>()?
            }
        };
        key.truncate(densetree::MAX_KEY_LEN);
        Ok(Key(key))
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Insert(Key, u8, u8),
    InsertMany(Key, u16, u8),
    Remove(Key),
    Get(Key),
    Scan(Key, u8),
}

#[derive(Debug, Arbitrary)]
struct Input {
    dense_leaves: bool,
    ops: Vec<Op>,
}

fn value(len: u8, seed: u8) -> Vec<u8> {
    vec![seed; len as usize % 16]
}

fuzz_target!(|input: Input| {
    let _ = env_logger::try_init();
    let mut options = TreeOptions::new();
    options.dense_leaves = input.dense_leaves;
    let mut subject = Tree::with_options(options).unwrap();
    let mut model = BTreeMap::<Vec<u8>, Vec<u8>>::new();
    for op in input.ops {
        trace!("{op:?}");
        match op {
            Op::Insert(key, len, seed) => {
                let value = value(len, seed);
                subject.insert(&key.0, &value).unwrap();
                model.insert(key.0, value);
            }
            Op::InsertMany(key, count, len) => {
                if key.0.len() != 4 {
                    continue;
                }
                let start = u32::from_be_bytes(key.0[..].try_into().unwrap());
                for n in start..start.saturating_add(u32::from(count % 2048)) {
                    let value = value(len, n as u8);
                    subject.insert(&n.to_be_bytes(), &value).unwrap();
                    model.insert(n.to_be_bytes().to_vec(), value);
                }
            }
            Op::Remove(key) => {
                assert_eq!(subject.remove(&key.0).unwrap(), model.remove(&key.0).is_some());
            }
            Op::Get(key) => {
                assert_eq!(subject.get(&key.0).unwrap().as_ref(), model.get(&key.0));
            }
            Op::Scan(start, limit) => {
                let mut subject_entries = Vec::new();
                subject
                    .scan(&start.0, |k, v| {
                        subject_entries.push((k.to_vec(), v.to_vec()));
                        subject_entries.len() < limit as usize
                    })
                    .unwrap();
                let model_entries = model
                    .range(start.0..)
                    .take((limit as usize).max(1))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>();
                assert_eq!(subject_entries, model_entries);
            }
        }
    }
    subject.validate().unwrap();
    let stats = subject.stats().unwrap();
    assert_eq!(stats.entries, model.len());
    if !input.dense_leaves {
        assert_eq!(stats.dense_leaves, 0);
    }
});
