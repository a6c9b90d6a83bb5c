//! Low-level x86_64 support (System V ABI).
//!
//! ## Calling convention
//!
//! RBX, RBP, R12-R15 and RSP are callee-saved. RBX and RBP are reserved by
//! LLVM and cannot be named as clobbers, so they are pushed onto the stack
//! being suspended. R12-R15 are declared as clobbered, which lets the
//! compiler spill only what is live around the switch. Everything else is
//! caller-saved and covered by `clobber_abi("sysv64")`.
//!
//! The control bits of MXCSR and the x87 control word are callee-saved as
//! well, but they are not part of a saved context: all contexts share the
//! rounding mode and exception masks of the thread. Code that changes them
//! must restore them before it suspends.
//!
//! The value being transferred travels in RDI in both directions. RDI is also
//! the first argument register, so on the first switch into a fresh stack the
//! value arrives as the first argument of the entry function without any
//! shuffling.
//!
//! ## Stack layout
//!
//! Here is what the top of a stack looks like while its context is
//! suspended. The saved context is the address of the resume RIP.
//!
//! ```text
//! |              |
//! ~     ...      ~
//! |              |
//! +--------------+
//! | Saved RBP    |
//! +--------------+
//! | Saved RBX    |
//! +--------------+
//! | Resume RIP   |  <- Saved context
//! +--------------+
//! ```
//!
//! And this is the layout of a coroutine stack that has just been
//! initialized:
//!
//! ```text
//! +--------------+  <- Stack base
//! |              |
//! ~    Record    ~  <- Written by the caller before init_stack().
//! |              |
//! +--------------+
//! |              |
//! ~ Initial obj  ~  <- Unknown size, aligned to at least 16 bytes.
//! |              |
//! +--------------+
//! | Entry func   |
//! +--------------+
//! | Trampoline   |  <- Initial context. The first switch "returns" here.
//! +--------------+
//! ```

use core::arch::{asm, global_asm};

use super::{allocate_obj_on_stack, push};
use crate::stack::StackPointer;
use crate::unwind::InitialFunc;
use crate::util::EncodedValue;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

// Root frame of every coroutine stack. The first switch into a fresh stack
// pops the address of this trampoline with RET, at which point:
// - RSP points at the entry function address pushed by init_stack().
// - RDI contains the value passed to switch().
//
// The trampoline passes the address of the initial object as the second
// argument and calls the entry function, which never returns.
//
// RIP is marked as undefined so that unwinders and debuggers treat this frame
// as the outermost one instead of walking into garbage.
global_asm!(
    ".balign 16",
    asm_function_begin!("handoff_stack_init_trampoline"),
    ".cfi_startproc",
    ".cfi_undefined rip",
    "pop rax",
    // RSP now points at the initial object and is 16-byte aligned, as
    // required before a CALL.
    "mov rsi, rsp",
    // Terminate the frame pointer chain.
    "xor ebp, ebp",
    "call rax",
    "ud2",
    ".cfi_endproc",
    asm_function_end!("handoff_stack_init_trampoline"),
);

extern "C" {
    // Custom calling convention, only ever entered through switch().
    fn handoff_stack_init_trampoline();
}

/// Sets up a fresh stack below `sp` so that the first switch to the returned
/// context calls `func(arg, obj)`, where `obj` points at a copy of `obj` on
/// the new stack.
#[inline]
pub unsafe fn init_stack<T>(sp: usize, func: InitialFunc<T>, obj: T) -> StackPointer {
    let mut sp = sp;
    allocate_obj_on_stack(&mut sp, obj);
    push(&mut sp, Some(func as StackWord));
    push(&mut sp, Some(handoff_stack_init_trampoline as StackWord));
    StackPointer::new_unchecked(sp)
}

/// Returns the address of the initial object of a stack that has been set up
/// by `init_stack` and never switched to.
#[inline]
pub unsafe fn initial_obj(initial_sp: StackPointer) -> *mut u8 {
    (initial_sp.get() + 16) as *mut u8
}

/// Saves the running context into `save` and resumes `target`, which
/// receives `arg`.
///
/// Returns the value passed by the context that eventually resumes the
/// context saved in `save`.
#[inline(always)]
pub unsafe fn switch(
    arg: EncodedValue,
    save: *mut Option<StackPointer>,
    target: StackPointer,
) -> EncodedValue {
    let ret;

    asm!(
        // Save the registers that can't be listed as clobbers, followed by
        // the address to resume at.
        "push rbp",
        "push rbx",
        "lea rax, [rip + 2f]",
        "push rax",

        // The stack pointer is now the complete saved context.
        "mov [rsi], rsp",

        // Load the target context and jump to its resume address. For a
        // fresh stack this is the trampoline.
        "mov rsp, rdx",
        "ret",

        // Someone switched back into the saved context. RSP points just past
        // our resume address and RDI holds the transferred value.
        "2:",
        "pop rbx",
        "pop rbp",

        inlateout("rdi") arg => ret,
        in("rsi") save,
        in("rdx") target.get(),

        // RBX and RBP are handled above, the rest of the callee-saved
        // registers are spilled by the compiler.
        lateout("r12") _, lateout("r13") _, lateout("r14") _, lateout("r15") _,
        clobber_abi("sysv64"),
    );

    ret
}

/// Resumes `target` with `arg` without saving the running context.
///
/// Used when a coroutine body has returned. The abandoned stack stays mapped,
/// so `arg` may still point into it.
#[inline(always)]
pub unsafe fn switch_final(arg: EncodedValue, target: StackPointer) -> ! {
    asm!(
        "mov rsp, rdx",
        "ret",
        in("rdi") arg,
        in("rdx") target.get(),
        options(noreturn),
    );
}
