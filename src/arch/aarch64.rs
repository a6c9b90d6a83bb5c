//! Low-level AArch64 support (AAPCS64).
//!
//! This mirrors the x86_64 implementation; refer to x86_64.rs for the general
//! design. Differences:
//!
//! - X19 and X29 are reserved by LLVM and are saved on the suspended stack.
//!   X20-X28 are declared as clobbered. D8-D15 are covered by
//!   `clobber_abi("C")`, which clobbers all of V0-V31.
//! - FPCR is not part of a saved context, for the same reason that MXCSR is
//!   not on x86_64.
//! - The resume address is stored in the saved frame and entered with BR
//!   rather than popped with RET, since there is no return address stack to
//!   keep balanced.
//! - The frame is padded to 32 bytes to keep SP 16-byte aligned at all times.
//!
//! ## Stack layout
//!
//! Suspended context:
//!
//! ```text
//! |              |
//! ~     ...      ~
//! |              |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Resume PC    |
//! +--------------+
//! | Saved X19    |
//! +--------------+
//! | Saved X29    |  <- Saved context
//! +--------------+
//! ```
//!
//! Fresh stack:
//!
//! ```text
//! +--------------+  <- Stack base
//! ~    Record    ~
//! +--------------+
//! ~ Initial obj  ~
//! +--------------+
//! | Entry func   |
//! +--------------+
//! | Trampoline   |
//! +--------------+
//! | (X19)        |
//! +--------------+
//! | 0 (X29)      |  <- Initial context
//! +--------------+
//! ```

use core::arch::{asm, global_asm};

use super::{allocate_obj_on_stack, push};
use crate::stack::StackPointer;
use crate::unwind::InitialFunc;
use crate::util::EncodedValue;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

// Entered with BR from switch() on the first switch into a fresh stack. At
// this point SP is the initial context and X0 holds the transferred value.
global_asm!(
    ".balign 4",
    asm_function_begin!("handoff_stack_init_trampoline"),
    ".cfi_startproc",
    ".cfi_undefined x30",
    "ldr x9, [sp, #24]",
    // Drop the initial frame. SP now points at the initial object.
    "add sp, sp, #32",
    "mov x1, sp",
    // Terminate the frame record chain.
    "mov x29, xzr",
    "mov x30, xzr",
    "blr x9",
    "brk #0",
    ".cfi_endproc",
    asm_function_end!("handoff_stack_init_trampoline"),
);

extern "C" {
    fn handoff_stack_init_trampoline();
}

#[inline]
pub unsafe fn init_stack<T>(sp: usize, func: InitialFunc<T>, obj: T) -> StackPointer {
    let mut sp = sp;
    allocate_obj_on_stack(&mut sp, obj);
    push(&mut sp, Some(func as StackWord));
    push(&mut sp, Some(handoff_stack_init_trampoline as StackWord));
    push(&mut sp, None);
    push(&mut sp, Some(0));
    StackPointer::new_unchecked(sp)
}

#[inline]
pub unsafe fn initial_obj(initial_sp: StackPointer) -> *mut u8 {
    (initial_sp.get() + 32) as *mut u8
}

#[inline(always)]
pub unsafe fn switch(
    arg: EncodedValue,
    save: *mut Option<StackPointer>,
    target: StackPointer,
) -> EncodedValue {
    let ret;

    asm!(
        "sub sp, sp, #32",
        "stp x29, x19, [sp]",
        "adr x9, 2f",
        "str x9, [sp, #16]",
        "mov x9, sp",
        "str x9, [x1]",

        "ldr x9, [x2, #16]",
        "mov sp, x2",
        "br x9",

        "2:",
        "ldp x29, x19, [sp]",
        "add sp, sp, #32",

        inlateout("x0") arg => ret,
        in("x1") save,
        in("x2") target.get(),

        // clobber_abi() also marks X18 as clobbered if the platform does not
        // reserve it.
        lateout("x20") _, lateout("x21") _, lateout("x22") _, lateout("x23") _,
        lateout("x24") _, lateout("x25") _, lateout("x26") _, lateout("x27") _,
        lateout("x28") _,
        clobber_abi("C"),
    );

    ret
}

#[inline(always)]
pub unsafe fn switch_final(arg: EncodedValue, target: StackPointer) -> ! {
    asm!(
        "ldr x9, [x2, #16]",
        "mov sp, x2",
        "br x9",
        in("x0") arg,
        in("x2") target.get(),
        options(noreturn),
    );
}
