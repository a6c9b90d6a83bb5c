//! Panic handling at the boundary between a coroutine stack and the context
//! that resumed it.
//!
//! A panic can never unwind through the context switch itself: the entry
//! trampoline at the root of every coroutine stack has no caller to unwind
//! into. Instead the panic is caught at the root, the coroutine is marked as
//! finished, and the payload is handed to whichever context receives control
//! next. That is the caller of `resume` for a coroutine that is not being
//! delegated to, or the outer body's `delegate` call otherwise.
//!
//! Without the `unwind` feature there is no way to hand the payload over, so
//! a panic that reaches the root of a coroutine aborts the process.

#![allow(unused_macros)]

cfg_if::cfg_if! {
    if #[cfg(feature = "unwind")] {
        use std::any::Any;
        use std::panic::{self, AssertUnwindSafe};
    }
}

// The entry function of a coroutine is called from the trampoline in
// inline assembly, so it needs a fixed ABI.
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        // Always use the SysV64 ABI so that the trampoline only has to deal
        // with one register assignment.
        pub type InitialFunc<T> = unsafe extern "sysv64" fn(
            arg: crate::util::EncodedValue,
            obj: *mut T,
        ) -> !;
        macro_rules! initial_func_abi {
            (unsafe fn $($tt:tt)*) => {
                unsafe extern "sysv64" fn $($tt)*
            }
        }
    } else {
        pub type InitialFunc<T> = unsafe extern "C" fn(
            arg: crate::util::EncodedValue,
            obj: *mut T,
        ) -> !;
        macro_rules! initial_func_abi {
            (unsafe fn $($tt:tt)*) => {
                unsafe extern "C" fn $($tt)*
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "unwind")] {
        /// Payload of a panic that escaped a coroutine body.
        pub type CaughtPanic = Box<dyn Any + Send>;

        #[inline]
        pub fn catch_unwind_at_root<T, F: FnOnce() -> T>(f: F) -> Result<T, CaughtPanic> {
            panic::catch_unwind(AssertUnwindSafe(f))
        }

        #[inline]
        pub fn resume_unwind(payload: CaughtPanic) -> ! {
            panic::resume_unwind(payload)
        }
    } else {
        pub type CaughtPanic = core::convert::Infallible;

        #[inline]
        pub fn catch_unwind_at_root<T, F: FnOnce() -> T>(f: F) -> Result<T, CaughtPanic> {
            let guard = scopeguard::guard((), |()| {
                // Nothing can receive the panic, force an abort using a
                // double-panic.
                panic!("cannot propagate coroutine panic without the \"unwind\" feature");
            });
            let result = f();
            core::mem::forget(guard);
            Ok(result)
        }

        #[inline]
        pub fn resume_unwind(payload: CaughtPanic) -> ! {
            match payload {}
        }
    }
}

pub(crate) use initial_func_abi;
