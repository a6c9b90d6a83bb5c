//! The context switch engine.
//!
//! This is the only part of the crate that knows about registers. Each target
//! module provides the same four items:
//!
//! - `STACK_ALIGNMENT`: required stack alignment at call boundaries.
//! - `init_stack`: lay out a fresh stack so that the first switch into it
//!   calls an entry function with the transferred value and an object placed
//!   on the stack.
//! - `switch`: save the running context into a slot, restore another one and
//!   hand it a value. Returns the value passed by whoever switches back into
//!   the saved slot.
//! - `switch_final`: restore a context without saving the current one, for a
//!   context that will never run again.
//!
//! A saved context is just a stack pointer: the callee-saved registers that
//! the compiler cannot be told about, and the address to resume at, are
//! pushed onto the suspended stack itself. Every other callee-saved register
//! is declared as clobbered so the compiler spills it around the switch.

use core::mem;

// Helper macros to deal with platform-specific differences in assembly code
// between ELF and Mach-O.
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        macro_rules! asm_mangle {
            ($name:literal) => { concat!("_", $name) };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".private_extern ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                ""
            };
        }
    } else {
        macro_rules! asm_mangle {
            ($name:literal) => { $name };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".hidden ", asm_mangle!($name), "\n",
                    ".type ", asm_mangle!($name), ", @function\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                concat!(".size ", asm_mangle!($name), ", . - ", asm_mangle!($name), "\n")
            };
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", not(windows)))] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(all(target_arch = "aarch64", not(windows)))] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("Unsupported target");
    }
}

/// Largest object that `allocate_obj_on_stack` accepts.
pub const MAX_STACK_OBJ_SIZE: usize = 1024;

/// Helper function to allocate an object on the stack with proper alignment.
///
/// `sp` must be aligned to `STACK_ALIGNMENT` on entry and is left aligned to
/// `STACK_ALIGNMENT` (or the object's own alignment if larger), pointing at
/// the object.
#[inline]
pub unsafe fn allocate_obj_on_stack<T>(sp: &mut usize, obj: T) {
    // Sanity check to avoid overflowing a small stack before the coroutine
    // even starts.
    assert!(mem::size_of::<T>() <= MAX_STACK_OBJ_SIZE, "type is too big to transfer");
    debug_assert_eq!(*sp % STACK_ALIGNMENT, 0);

    *sp -= mem::size_of::<T>();
    *sp &= !(mem::align_of::<T>().max(STACK_ALIGNMENT) - 1);
    (*sp as *mut T).write(obj);
}

/// Helper function to push a value onto a stack.
#[inline]
unsafe fn push(sp: &mut usize, val: Option<StackWord>) {
    *sp -= mem::size_of::<StackWord>();
    if let Some(val) = val {
        *(*sp as *mut StackWord) = val;
    }
}
