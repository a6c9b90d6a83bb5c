//! Encoding of the value that crosses a context switch.
//!
//! The switch engine moves exactly one machine word between contexts. Values
//! that fit are stored in the word directly; anything larger is sent as a
//! pointer to the value on the sender's stack. That pointer stays valid
//! because the sender is suspended until the receiver has read it.

use core::mem::{self, ManuallyDrop};
use core::ptr;

/// A value that has been packed into a single machine word.
pub type EncodedValue = usize;

/// Packs `val` into a word, taking ownership of it. The caller must not drop
/// `val` afterwards, and exactly one `decode_val` must consume the result.
#[inline]
pub unsafe fn encode_val<T>(val: &mut ManuallyDrop<T>) -> EncodedValue {
    if mem::size_of::<T>() <= mem::size_of::<EncodedValue>() {
        let mut out = 0;
        ptr::write_unaligned(
            &mut out as *mut EncodedValue as *mut T,
            ManuallyDrop::take(val),
        );
        out
    } else {
        val as *const ManuallyDrop<T> as EncodedValue
    }
}

/// Unpacks a word produced by `encode_val`, moving the value out of it.
#[inline]
pub unsafe fn decode_val<T>(val: EncodedValue) -> T {
    if mem::size_of::<T>() <= mem::size_of::<EncodedValue>() {
        ptr::read_unaligned(&val as *const EncodedValue as *const T)
    } else {
        ptr::read(val as *const T)
    }
}

/// Current value of the stack pointer, approximated by the address of a
/// local.
#[inline(always)]
pub fn current_stack_ptr() -> usize {
    let marker = 0u8;
    &marker as *const u8 as usize
}
