// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) the gcmap developers
// SPDX-License-Identifier: MIT

//! Open-addressed hash maps for runtime bookkeeping.
//!
//! Both flavours share one quadratic probing core with tombstone deletion
//! and a live-item bitmap. [`EntryMap`] derives the key from the stored
//! entry through the [`Keyed`] trait; [`AddrMap`] keys each bucket by a
//! machine address stored next to the entry.
//!
//! Bucket indexes are part of the API: `get` reports where a hit lives or
//! where a miss would insert, `put_at` consumes such an index without a
//! second probe, and `remove_at` deletes under an iteration cursor. The
//! tracer's sweep uses all of it in one pass:
//!
//! ```
//! # use gcmap::{AddrMap, BEGIN};
//! # let mut map: AddrMap<u64> = AddrMap::new();
//! # for a in 0..64 { map.put(a, a as u64); }
//! # fn reachable(addr: usize) -> bool { addr % 2 == 0 }
//! let needs = map.needs_optimize();
//! let mut optimized = 0;
//! let mut i = BEGIN;
//! loop {
//!     let keep = match map.next(&mut i) {
//!         Some((addr, _entry)) => reachable(addr),
//!         None => break,
//!     };
//!     if keep {
//!         if needs && map.optimize_item(i) {
//!             optimized += 1;
//!         }
//!     } else {
//!         map.remove_at(i);
//!     }
//! }
//! if needs {
//!     map.finish_optimize(optimized);
//! }
//! ```
//!
//! Indexes stay valid only until the next operation that may resize the
//! table; the sweep above never holds one across a `put`.

use core::iter::FusedIterator;
use std::hash::{BuildHasher, Hash, Hasher};

mod bitmap;
mod raw;

use self::raw::RawMap;
use crate::error::MapAllocError;

/// Cursor sentinel that starts an iteration, the all-ones `(size_t)-1` of
/// the original runtime.
pub const BEGIN: usize = !0;

/// Index sentinel meaning "no known bucket"; `put_at` falls back to a
/// probing `put` when it sees this.
pub const UNKNOWN: usize = !0;

// Set FxHash to default as most keys tend to be small
pub type DefaultHashBuilder = fxhash::FxBuildHasher;

#[inline]
pub(crate) fn make_hash<K: Hash + ?Sized>(hash_builder: &impl BuildHasher, val: &K) -> u64 {
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

/// Key access for entries stored in an [`EntryMap`].
///
/// The map never stores keys separately; lookups read the key back out of
/// the stored entry, so it must be derivable from the entry alone.
pub trait Keyed {
    type Key: Hash + Eq + ?Sized;

    fn key(&self) -> &Self::Key;
}

/// A hash map whose entries carry their own key.
///
/// The runtime analogue of an intrusive map: callers insert whole entries
/// and the comparator bound through [`Keyed`] fetches the key component.
pub struct EntryMap<T, S = DefaultHashBuilder>
where
    T: Keyed,
{
    hash_builder: S,
    raw: RawMap<T>,
}

impl<T> EntryMap<T>
where
    T: Keyed,
{
    /// Creates an empty map without allocating.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a map with room for `capacity` entries before the first
    /// resize. A capacity of 0 allocates nothing.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hash_builder: DefaultHashBuilder::default(),
            raw: RawMap::with_capacity(capacity),
        }
    }

    /// Fallible variant of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, MapAllocError> {
        Ok(Self {
            hash_builder: DefaultHashBuilder::default(),
            raw: RawMap::try_with_capacity(capacity)?,
        })
    }
}

impl<T, S> EntryMap<T, S>
where
    T: Keyed,
    S: BuildHasher,
{
    /// Creates a map using the given hasher.
    #[inline]
    pub fn with_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            hash_builder,
            raw: RawMap::with_capacity(capacity),
        }
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets in the table.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.raw.buckets()
    }

    /// Returns the number of entries the map holds before resizing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the tombstone debt accrued since the last compaction.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.raw.tombstones()
    }

    /// Looks up the entry for `key`.
    ///
    /// On a hit the index is the bucket holding the entry; on a miss it is
    /// the bucket a subsequent [`put_at`](Self::put_at) of the same key
    /// must use, or [`UNKNOWN`] if the map is empty.
    pub fn get(&self, key: &T::Key) -> (Option<&T>, usize) {
        if self.raw.len() == 0 {
            return (None, UNKNOWN);
        }
        let hash = make_hash(&self.hash_builder, key);
        let search = self.raw.find_index(hash, |x| x.key() == key);
        match search.hit {
            Some(index) => (self.raw.at(index), index),
            None => (None, search.slot),
        }
    }

    /// Looks up the entry for `key` mutably.
    ///
    /// The key component must not be changed through the returned
    /// reference.
    pub fn get_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        if self.raw.len() == 0 {
            return None;
        }
        let hash = make_hash(&self.hash_builder, key);
        let index = self.raw.find_index(hash, |x| x.key() == key).hit?;
        self.raw.at_mut(index)
    }

    /// Inserts `entry`, replacing and returning any entry with the same
    /// key. Lazily sizes an unallocated map.
    pub fn put(&mut self, entry: T) -> Option<T> {
        let hash = make_hash(&self.hash_builder, entry.key());
        let hash_builder = &self.hash_builder;
        self.raw.put(
            hash,
            entry,
            |stored, new| stored.key() == new.key(),
            |x| make_hash(hash_builder, x.key()),
        )
    }

    /// Inserts `entry` at a bucket obtained from a prior [`get`](Self::get)
    /// of the same key, skipping the probe. An index of [`UNKNOWN`]
    /// behaves as [`put`](Self::put).
    pub fn put_at(&mut self, entry: T, index: usize) -> Option<T> {
        if index == UNKNOWN {
            return self.put(entry);
        }
        let hash_builder = &self.hash_builder;
        self.raw
            .put_at(index, entry, |x| make_hash(hash_builder, x.key()))
    }

    /// Returns the entry for `key`, inserting `default()` first on a miss.
    ///
    /// `default` must produce an entry whose key equals `key`.
    pub fn get_or_insert_with(&mut self, key: &T::Key, default: impl FnOnce() -> T) -> &T {
        let (hit, index) = {
            let (entry, index) = self.get(key);
            (entry.is_some(), index)
        };
        if !hit {
            let entry = default();
            debug_assert!(entry.key() == key);
            self.put_at(entry, index);
        }
        match self.get(key).0 {
            Some(entry) => entry,
            None => unreachable!(),
        }
    }

    /// Removes and returns the entry for `key`.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        if self.raw.len() == 0 {
            return None;
        }
        let hash = make_hash(&self.hash_builder, key);
        self.raw.remove(hash, |x| x.key() == key)
    }

    /// Removes and returns the entry at `index`, leaving a tombstone.
    /// Returns `None` if the bucket is not live. Safe during iteration.
    #[inline]
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        self.raw.remove_at(index)
    }

    /// Removes and returns the entry at `index`, leaving the bucket empty
    /// rather than tombstoned.
    ///
    /// This discards the probe-chain marker [`remove_at`](Self::remove_at)
    /// would leave, so it is only sound when no other key's probe sequence
    /// runs through this bucket.
    #[inline]
    pub fn clear_at(&mut self, index: usize) -> Option<T> {
        self.raw.clear_at(index)
    }

    /// Advances the cursor to the next live entry.
    ///
    /// Start with [`BEGIN`]; returns `None` and parks the cursor at the
    /// bucket count when the map is exhausted. The current entry may be
    /// removed through [`remove_at`](Self::remove_at) or relocated through
    /// [`optimize_item`](Self::optimize_item) between calls.
    #[inline]
    pub fn next(&self, i: &mut usize) -> Option<&T> {
        self.raw.next(i)
    }

    /// Returns a read-only iterator over the entries.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            raw: &self.raw,
            cursor: BEGIN,
        }
    }

    /// Whether enough tombstone debt has accrued for a compaction pass to
    /// pay for itself.
    #[inline]
    pub fn needs_optimize(&self) -> bool {
        self.raw.needs_optimize()
    }

    /// Moves the live entry at `old_index` to the earliest tombstone on
    /// its probe sequence. Returns whether it moved; the new bucket is
    /// always strictly earlier, so an iteration cursor past `old_index`
    /// will not see the entry again.
    pub fn optimize_item(&mut self, old_index: usize) -> bool {
        let hash = match self.raw.at(old_index) {
            Some(entry) => make_hash(&self.hash_builder, entry.key()),
            None => return false,
        };
        self.raw.optimize_item(hash, old_index)
    }

    /// Ends a compaction pass, clearing the tombstone debt and adapting
    /// the trigger threshold to how many entries the pass moved.
    #[inline]
    pub fn finish_optimize(&mut self, num_optimized: usize) {
        self.raw.finish_optimize(num_optimized)
    }
}

impl<T> Default for EntryMap<T>
where
    T: Keyed,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A hash map keyed by machine addresses.
///
/// Each bucket stores the `usize` key next to the entry, so lookups need
/// no comparator and entries need not know their own key.
pub struct AddrMap<T, S = DefaultHashBuilder> {
    hash_builder: S,
    raw: RawMap<(usize, T)>,
}

impl<T> AddrMap<T> {
    /// Creates an empty map without allocating.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a map with room for `capacity` entries before the first
    /// resize. A capacity of 0 allocates nothing.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hash_builder: DefaultHashBuilder::default(),
            raw: RawMap::with_capacity(capacity),
        }
    }

    /// Fallible variant of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, MapAllocError> {
        Ok(Self {
            hash_builder: DefaultHashBuilder::default(),
            raw: RawMap::try_with_capacity(capacity)?,
        })
    }
}

impl<T, S> AddrMap<T, S>
where
    S: BuildHasher,
{
    /// Creates a map using the given hasher.
    #[inline]
    pub fn with_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            hash_builder,
            raw: RawMap::with_capacity(capacity),
        }
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets in the table.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.raw.buckets()
    }

    /// Returns the number of entries the map holds before resizing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the tombstone debt accrued since the last compaction.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.raw.tombstones()
    }

    /// Looks up the entry for `key`.
    ///
    /// On a hit the index is the bucket holding the entry; on a miss it is
    /// the bucket a subsequent [`put_at`](Self::put_at) of the same key
    /// must use, or [`UNKNOWN`] if the map is empty.
    pub fn get(&self, key: usize) -> (Option<&T>, usize) {
        if self.raw.len() == 0 {
            return (None, UNKNOWN);
        }
        let hash = make_hash(&self.hash_builder, &key);
        let search = self.raw.find_index(hash, |slot| slot.0 == key);
        match search.hit {
            Some(index) => (self.raw.at(index).map(|slot| &slot.1), index),
            None => (None, search.slot),
        }
    }

    /// Looks up the entry for `key` mutably.
    pub fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        if self.raw.len() == 0 {
            return None;
        }
        let hash = make_hash(&self.hash_builder, &key);
        let index = self.raw.find_index(hash, |slot| slot.0 == key).hit?;
        self.raw.at_mut(index).map(|slot| &mut slot.1)
    }

    /// Inserts `entry` under `key`, replacing and returning any entry
    /// already stored there. Lazily sizes an unallocated map.
    pub fn put(&mut self, key: usize, entry: T) -> Option<T> {
        let hash = make_hash(&self.hash_builder, &key);
        let hash_builder = &self.hash_builder;
        self.raw
            .put(
                hash,
                (key, entry),
                |stored, new| stored.0 == new.0,
                |slot| make_hash(hash_builder, &slot.0),
            )
            .map(|slot| slot.1)
    }

    /// Inserts `entry` under `key` at a bucket obtained from a prior
    /// [`get`](Self::get) of the same key, skipping the probe. An index of
    /// [`UNKNOWN`] behaves as [`put`](Self::put).
    pub fn put_at(&mut self, key: usize, entry: T, index: usize) -> Option<T> {
        if index == UNKNOWN {
            return self.put(key, entry);
        }
        let hash_builder = &self.hash_builder;
        self.raw
            .put_at(index, (key, entry), |slot| make_hash(hash_builder, &slot.0))
            .map(|slot| slot.1)
    }

    /// Returns the entry for `key`, inserting `default()` first on a miss.
    pub fn get_or_insert_with(&mut self, key: usize, default: impl FnOnce() -> T) -> &T {
        let (hit, index) = {
            let (entry, index) = self.get(key);
            (entry.is_some(), index)
        };
        if !hit {
            self.put_at(key, default(), index);
        }
        match self.get(key).0 {
            Some(entry) => entry,
            None => unreachable!(),
        }
    }

    /// Removes and returns the entry for `key`.
    pub fn remove(&mut self, key: usize) -> Option<T> {
        if self.raw.len() == 0 {
            return None;
        }
        let hash = make_hash(&self.hash_builder, &key);
        self.raw.remove(hash, |slot| slot.0 == key).map(|slot| slot.1)
    }

    /// Removes and returns the entry at `index`, leaving a tombstone.
    /// Returns `None` if the bucket is not live. Safe during iteration.
    #[inline]
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        self.raw.remove_at(index).map(|slot| slot.1)
    }

    /// Removes and returns the entry at `index`, leaving the bucket empty
    /// rather than tombstoned.
    ///
    /// This discards the probe-chain marker [`remove_at`](Self::remove_at)
    /// would leave, so it is only sound when no other key's probe sequence
    /// runs through this bucket.
    #[inline]
    pub fn clear_at(&mut self, index: usize) -> Option<T> {
        self.raw.clear_at(index).map(|slot| slot.1)
    }

    /// Advances the cursor to the next live bucket and returns its key and
    /// entry. Start with [`BEGIN`]; see [`EntryMap::next`].
    #[inline]
    pub fn next(&self, i: &mut usize) -> Option<(usize, &T)> {
        self.raw.next(i).map(|slot| (slot.0, &slot.1))
    }

    /// Returns a read-only iterator over `(key, entry)` pairs.
    #[inline]
    pub fn iter(&self) -> AddrIter<'_, T> {
        AddrIter {
            raw: &self.raw,
            cursor: BEGIN,
        }
    }

    /// Whether enough tombstone debt has accrued for a compaction pass to
    /// pay for itself.
    #[inline]
    pub fn needs_optimize(&self) -> bool {
        self.raw.needs_optimize()
    }

    /// Moves the live entry at `old_index` to the earliest tombstone on
    /// its probe sequence. Returns whether it moved.
    pub fn optimize_item(&mut self, old_index: usize) -> bool {
        let hash = match self.raw.at(old_index) {
            Some(slot) => make_hash(&self.hash_builder, &slot.0),
            None => return false,
        };
        self.raw.optimize_item(hash, old_index)
    }

    /// Ends a compaction pass, clearing the tombstone debt and adapting
    /// the trigger threshold to how many entries the pass moved.
    #[inline]
    pub fn finish_optimize(&mut self, num_optimized: usize) {
        self.raw.finish_optimize(num_optimized)
    }
}

impl<T> Default for AddrMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only iterator over an [`EntryMap`].
pub struct Iter<'a, T> {
    raw: &'a RawMap<T>,
    cursor: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        self.raw.next(&mut self.cursor)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.raw.len()))
    }
}

impl<'a, T> FusedIterator for Iter<'a, T> {}

/// Read-only iterator over the `(key, entry)` pairs of an [`AddrMap`].
pub struct AddrIter<'a, T> {
    raw: &'a RawMap<(usize, T)>,
    cursor: usize,
}

impl<'a, T> Iterator for AddrIter<'a, T> {
    type Item = (usize, &'a T);

    #[inline]
    fn next(&mut self) -> Option<(usize, &'a T)> {
        self.raw.next(&mut self.cursor).map(|slot| (slot.0, &slot.1))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.raw.len()))
    }
}

impl<'a, T> FusedIterator for AddrIter<'a, T> {}
