use std::alloc::Layout;
use thiserror::Error;

/// Errors surfaced by the fallible map constructors.
///
/// The maps have no recoverable runtime errors of their own; the infallible
/// entry points abort through `handle_alloc_error` like any other Rust
/// collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapAllocError {
    /// The requested capacity exceeds the maximum table layout
    /// (usually `isize::MAX` bytes).
    #[error("map capacity overflow")]
    CapacityOverflow,
    /// The allocator refused the joint bitmap + bucket block.
    #[error("allocation of {} bytes failed", .layout.size())]
    Alloc {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}
