//! Hash maps for the bookkeeping side of a garbage collected actor
//! runtime.
//!
//! Two open-addressed, quadratic probing flavours share one core: an
//! [`EntryMap`] reads the key back out of the stored entry through the
//! [`Keyed`] trait, an [`AddrMap`] keys buckets by a machine address kept
//! next to the entry. Both track live buckets in an item bitmap for fast
//! iteration, delete through tombstones, and compact tombstones in place
//! while a tracer sweeps the map. See the [`map`] module for the
//! iteration-and-compaction protocol.

/// Map error types
pub mod error;
/// The two hash map flavours and their shared probing core
pub mod map;

/// Set of compiler hints
mod hint;

pub use crate::error::MapAllocError;
pub use crate::map::{
    AddrIter, AddrMap, DefaultHashBuilder, EntryMap, Iter, Keyed, BEGIN, UNKNOWN,
};
