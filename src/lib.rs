//! ## Overview
//!
//! This crate provides a minimal stackful coroutine primitive. A coroutine runs a body on its own dynamically allocated stack, can suspend itself from any point in its call stack, and exchanges one value with its caller in each direction at every switch. A coroutine body can also *delegate* to another coroutine, which makes it transparent until the inner coroutine finishes.
//!
//! Values flowing in and out of a coroutine share a single type `T`. `T::default()` is used as the "no value" sentinel, which is what resuming a coroutine that has already finished returns.
//!
//! ## Example
//!
//! ```rust
//! use handoff::Coroutine;
//!
//! fn main() {
//!     println!("[main] creating coroutine");
//!
//!     let mut coroutine = Coroutine::new(|yielder| {
//!         println!("[coroutine] coroutine started");
//!         let mut input = 0;
//!         for i in 5..10 {
//!             println!("[coroutine] yielding {}", i);
//!             input = yielder.suspend(i);
//!             println!("[coroutine] got {} from parent", input)
//!         }
//!         println!("[coroutine] exiting coroutine");
//!         input
//!     })
//!     .unwrap();
//!
//!     let mut counter = 100;
//!     while !coroutine.finished() {
//!         println!("[main] resuming coroutine with argument {}", counter);
//!         let val = coroutine.resume(counter);
//!         println!("[main] got {} from coroutine", val);
//!         counter += 1;
//!     }
//!
//!     assert_eq!(coroutine.return_value(), Some(&105));
//!     coroutine.close().unwrap();
//!     println!("[main] exiting");
//! }
//! ```
//!
//! The value passed to the first `resume` is discarded: there is no suspension point yet to deliver it to.
//!
//! ## Delegation
//!
//! ```rust
//! use handoff::Coroutine;
//!
//! let mut outer = Coroutine::new(|yielder| {
//!     let mut inner = Coroutine::new(|yielder| {
//!         yielder.suspend(1);
//!         yielder.suspend(2);
//!         10
//!     })
//!     .unwrap();
//!
//!     // Resuming `outer` now resumes `inner` until it returns.
//!     let ret = yielder.delegate(&mut inner);
//!     inner.close().unwrap();
//!     ret + 1
//! })
//! .unwrap();
//!
//! assert_eq!(outer.resume(0), 1);
//! assert_eq!(outer.resume(0), 2);
//! assert_eq!(outer.resume(0), 11);
//! assert!(outer.finished());
//! outer.close().unwrap();
//! ```
//!
//! ## Supported targets
//!
//! |         | ELF (Linux, BSD, etc) | Darwin (macOS, iOS, etc) | Windows |
//! |---------|-----------------------|--------------------------|---------|
//! | x86_64  | ✅                     | ✅                        | ❌       |
//! | AArch64 | ✅                     | ✅                        | ❌       |
//!
//! ## Stacks
//!
//! Each coroutine gets one `mmap`ed region with a guard page at its low end. The coroutine's bookkeeping lives at the top of that region, so creating a coroutine is a single allocation. Regions are never released implicitly: call [`Coroutine::close`] once a coroutine is no longer needed.
//!
//! ## Cargo features
//!
//! #### `unwind` (Enabled by default)
//!
//! A panic in a coroutine body finishes the coroutine and continues to unwind out of whichever context receives control from it: the caller of `resume`, or the `delegate` call of the coroutine delegating to it.
//!
//! Without this feature, a panic that reaches the root of a coroutine stack aborts the process.

#![warn(missing_docs)]

// Must come first because it defines macros used by other modules.
mod unwind;

mod arch;
mod coroutine;
mod delegate;
mod record;
pub mod stack;
mod util;

pub use coroutine::*;

#[cfg(test)]
mod tests;
