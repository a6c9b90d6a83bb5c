//! Delegation between coroutines.
//!
//! While an outer coroutine delegates to an inner one, the two records are
//! linked in both directions:
//!
//! ```text
//!   outer.delegate_target ---> inner
//!   outer <--- inner.delegate_source
//! ```
//!
//! `resume` on the outer handle follows `delegate_target` links down to the
//! innermost record and switches straight into it, so values reach the inner
//! body unchanged and its yields come straight back to the resumer. The inner
//! record's `caller` slot is what the resumer's context is saved into, which
//! is also where the inner body suspends to.
//!
//! When the inner body returns, the links are removed and control goes to the
//! outer body's `delegate` call instead of the resumer. The outer record
//! inherits the inner record's `caller`, since that is the context that is
//! waiting for the next yield.
//!
//! The links never own anything: both records are owned by their handles, and
//! the inner handle is mutably borrowed by `delegate` for as long as the link
//! exists.

use core::mem::ManuallyDrop;

use crate::arch;
use crate::coroutine::{Coroutine, Yielder};
use crate::record::Record;
use crate::stack::StackPointer;
use crate::unwind;
use crate::util;

impl<T: Clone + Default + 'static> Yielder<T> {
    /// Runs `inner` to completion on behalf of this coroutine.
    ///
    /// Until `inner` returns, this coroutine is transparent: values passed to
    /// its [`Coroutine::resume`] go to `inner`, and whatever `inner` yields is
    /// returned from that `resume` call. This body observes none of that
    /// traffic. Once `inner` returns, its return value becomes the return
    /// value of `delegate` and this body carries on.
    ///
    /// `inner` may itself delegate further; the chain unwinds in reverse
    /// order.
    ///
    /// `inner` must not have been resumed before. If it has already finished,
    /// this returns `T::default()` without switching.
    ///
    /// # Panics
    ///
    /// A panic in `inner` is propagated out of this call, into this body.
    pub fn delegate(&self, inner: &mut Coroutine<T>) -> T {
        let outer = self.record();
        let inner_ptr = inner.record_ptr();
        let inner = inner.record();

        if inner.finished() {
            return T::default();
        }
        debug_assert!(!inner.started(), "delegating to a coroutine that was already resumed");
        debug_assert!(inner.delegate_source.get().is_none());
        debug_assert!(outer.delegate_target.get().is_none());

        log::trace!(
            "delegating from {:#x} to {:#x}",
            outer.region().base().get(),
            inner.region().base().get()
        );

        outer.delegate_target.set(Some(inner_ptr));
        inner.delegate_source.set(Some(self.record));

        // The inner body suspends to whoever is waiting on the outer one.
        inner.caller.set(outer.caller.get());
        inner.mark_started();

        unsafe {
            let context = match inner.context.get() {
                Some(context) => context,
                None => core::hint::unreachable_unchecked(),
            };

            // Same as the first resume of `inner`: the value is ignored.
            let mut val = ManuallyDrop::new(T::default());
            let ret = arch::switch(util::encode_val(&mut val), outer.context.as_ptr(), context);
            let ret = util::decode_val::<T>(ret);

            // The only way back here is through return_target() below.
            debug_assert!(inner.finished());
            debug_assert!(outer.delegate_target.get().is_none());

            if let Some(payload) = inner.take_panic() {
                drop(ret);
                unwind::resume_unwind(payload);
            }

            log::trace!("delegation to {:#x} finished", inner.region().base().get());
            ret
        }
    }
}

/// Follows the delegation chain starting at `record` and returns the record
/// that resume traffic should be sent to.
#[inline]
pub(crate) fn innermost<T>(record: &Record<T>) -> &Record<T> {
    let mut current = record;
    while let Some(target) = current.delegate_target.get() {
        current = unsafe { target.as_ref() };
    }
    current
}

/// Picks the context that a finishing coroutine switches to, unlinking it
/// from the coroutine delegating to it, if any.
///
/// # Safety
///
/// Must only be called by `record`'s own body once it has stored its
/// outcome.
pub(crate) unsafe fn return_target<T>(record: &Record<T>) -> StackPointer {
    let target = match record.delegate_source.take() {
        Some(outer) => {
            let outer = outer.as_ref();
            outer.delegate_target.set(None);
            outer.caller.set(record.caller.get());
            outer.context.get()
        }
        None => record.caller.get(),
    };
    match target {
        Some(target) => target,
        None => core::hint::unreachable_unchecked(),
    }
}
