//! The tracer-style workload: fill, delete a share at random, then run
//! one iteration-and-compaction pass over everything that survived.

use gcmap::{AddrMap, EntryMap, Keyed, BEGIN};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, PartialEq)]
struct Obj {
    key: u64,
    val: u64,
}

impl Keyed for Obj {
    type Key = u64;

    fn key(&self) -> &u64 {
        &self.key
    }
}

const TOTAL: u64 = 1500;

/// Filling 1500 entries resizes 8 -> 64 -> 512 -> 4096, comfortably past
/// the minimum table size at which compaction is considered.
#[test]
fn optimize_pass_reclaims_tombstone_debt() {
    let mut map = EntryMap::new();
    for key in 0..TOTAL {
        map.put(Obj { key, val: key });
    }
    assert_eq!(map.buckets(), 4096);
    assert!(!map.needs_optimize());

    // delete 30% at random
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut keys: Vec<u64> = (0..TOTAL).collect();
    keys.shuffle(&mut rng);
    let deleted = &keys[..(TOTAL as usize * 3 / 10)];
    for key in deleted {
        assert!(map.remove(key).is_some());
    }
    assert_eq!(map.tombstones(), deleted.len());
    assert!(map.needs_optimize());

    let mut optimized = 0;
    let mut i = BEGIN;
    while map.next(&mut i).is_some() {
        if map.optimize_item(i) {
            optimized += 1;
        }
    }
    map.finish_optimize(optimized);

    assert_eq!(map.tombstones(), 0);
    assert_eq!(map.len(), TOTAL as usize - deleted.len());
    for key in &keys[deleted.len()..] {
        assert_eq!(map.get(key).0.map(|e| e.val), Some(*key));
    }
    for key in deleted {
        assert_eq!(map.get(key).0, None);
    }
}

/// Removal and relocation interleave under one cursor: unreachable
/// entries are dropped by index, survivors are moved toward their probe
/// origin, and the pass ends with the debt cleared.
#[test]
fn sweep_removes_and_compacts_in_one_pass() {
    let mut map: AddrMap<u64> = AddrMap::new();
    for addr in 0..TOTAL as usize {
        map.put(addr * 8, addr as u64);
    }

    // earlier churn so the pass has tombstones to reclaim
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let mut addrs: Vec<usize> = (0..TOTAL as usize).map(|a| a * 8).collect();
    addrs.shuffle(&mut rng);
    for addr in &addrs[..500] {
        assert!(map.remove(*addr).is_some());
    }

    let reachable = |addr: usize| (addr / 8) % 3 != 0;
    let needs = map.needs_optimize();
    assert!(needs);

    let mut optimized = 0;
    let mut swept = 0;
    let mut i = BEGIN;
    loop {
        let keep = match map.next(&mut i) {
            Some((addr, _entry)) => reachable(addr),
            None => break,
        };
        if keep {
            if needs && map.optimize_item(i) {
                optimized += 1;
            }
        } else {
            assert!(map.remove_at(i).is_some());
            swept += 1;
        }
    }
    if needs {
        map.finish_optimize(optimized);
    }

    assert!(swept > 0);
    assert_eq!(map.tombstones(), 0);

    let survivors: Vec<usize> = addrs[500..]
        .iter()
        .cloned()
        .filter(|addr| reachable(*addr))
        .collect();
    assert_eq!(map.len(), survivors.len());
    for addr in &survivors {
        assert_eq!(map.get(*addr).0, Some(&((*addr / 8) as u64)));
    }
    for addr in &addrs[..500] {
        assert_eq!(map.get(*addr).0, None);
    }

    // the cursor still visits every survivor exactly once
    assert_eq!(map.iter().count(), map.len());
}
