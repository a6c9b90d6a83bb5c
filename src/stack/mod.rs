//! Details about the memory regions that coroutines run on.
//!
//! Every coroutine owns exactly one stack region. The coroutine's control
//! record lives at the base of that region (the end away from stack growth)
//! and the coroutine's call stack grows down from just below it, so a single
//! mapping backs both.

use core::num::NonZeroUsize;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::page_size;
        pub(crate) use self::unix::StackRegion;
    } else {
        compile_error!("Stack regions are only implemented for unix targets");
    }
}

/// Type to represent a stack address.
pub type StackPointer = NonZeroUsize;

/// Required stack alignment at function call boundaries.
pub const STACK_ALIGNMENT: usize = crate::arch::STACK_ALIGNMENT;

/// Minimum size of a stack region, excluding the guard page.
pub const MIN_STACK_SIZE: usize = 4096;

/// Size of the stack region used by [`Coroutine::new`], excluding the guard
/// page.
///
/// [`Coroutine::new`]: crate::Coroutine::new
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;
