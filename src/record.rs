//! The per-coroutine control record.
//!
//! A record is written at the base of the coroutine's own stack region, so a
//! coroutine costs exactly one mapping. The handle given to the user and the
//! `Yielder` given to the body are both plain pointers to it.
//!
//! All fields are interior-mutable: the record is reached from the handle,
//! from the running body and from the delegation links of other records, and
//! only one of those is ever active at a time.

use core::cell::{Cell, UnsafeCell};
use core::ptr::{self, NonNull};
use std::io;

use crate::arch;
use crate::stack::{StackPointer, StackRegion};
use crate::unwind::CaughtPanic;

/// Observable state of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    /// Created but never resumed. No user code has run.
    Fresh,
    /// Suspended inside its body, or currently running.
    Suspended,
    /// The body has returned. The record holds the return value.
    Finished,
}

pub(crate) struct Record<T> {
    // Region this record lives in.
    region: StackRegion,

    // Saved context of the coroutine. None once the body has returned, at
    // which point `retval` holds the value it returned.
    pub(crate) context: Cell<Option<StackPointer>>,

    // Context that control goes back to when the coroutine suspends or
    // finishes. Written by every switch into the coroutine.
    pub(crate) caller: Cell<Option<StackPointer>>,

    started: Cell<bool>,

    // Boxed so that the size of the record doesn't depend on `T`.
    retval: UnsafeCell<Option<Box<T>>>,

    // Panic that escaped the body, waiting to be picked up by the context
    // that received control from it.
    panic: Cell<Option<CaughtPanic>>,

    // Inner coroutine this one currently forwards its traffic to.
    pub(crate) delegate_target: Cell<Option<NonNull<Record<T>>>>,

    // Outer coroutine currently forwarding its traffic to this one.
    pub(crate) delegate_source: Cell<Option<NonNull<Record<T>>>>,

    // Drops the body object of a coroutine that was never started.
    drop_body: unsafe fn(*mut u8),
}

impl<T> Record<T> {
    /// Writes a record for a fresh coroutine at the base of `region`.
    ///
    /// Returns the record and the highest address available for the
    /// coroutine's stack.
    pub(crate) unsafe fn place(
        region: StackRegion,
        drop_body: unsafe fn(*mut u8),
    ) -> (NonNull<Self>, usize) {
        let mut sp = region.base().get();
        let record = Self {
            region,
            context: Cell::new(None),
            caller: Cell::new(None),
            started: Cell::new(false),
            retval: UnsafeCell::new(None),
            panic: Cell::new(None),
            delegate_target: Cell::new(None),
            delegate_source: Cell::new(None),
            drop_body,
        };
        arch::allocate_obj_on_stack(&mut sp, record);
        (NonNull::new_unchecked(sp as *mut Self), sp)
    }

    #[inline]
    pub(crate) fn state(&self) -> State {
        if self.context.get().is_none() {
            State::Finished
        } else if self.started.get() {
            State::Suspended
        } else {
            State::Fresh
        }
    }

    #[inline]
    pub(crate) fn started(&self) -> bool {
        self.started.get()
    }

    #[inline]
    pub(crate) fn finished(&self) -> bool {
        self.context.get().is_none()
    }

    #[inline]
    pub(crate) fn mark_started(&self) {
        self.started.set(true);
    }

    #[inline]
    pub(crate) fn region(&self) -> &StackRegion {
        &self.region
    }

    /// The value the body returned, once it has.
    #[inline]
    pub(crate) fn return_value(&self) -> Option<&T> {
        if self.finished() {
            unsafe { (*self.retval.get()).as_deref() }
        } else {
            None
        }
    }

    /// Marks the coroutine as finished with the outcome of its body.
    ///
    /// Must only be called on the coroutine's own stack, right before it
    /// switches away for the last time.
    pub(crate) unsafe fn store_outcome(&self, outcome: Result<T, CaughtPanic>) {
        match outcome {
            Ok(val) => *self.retval.get() = Some(Box::new(val)),
            Err(payload) => self.panic.set(Some(payload)),
        }
        self.context.set(None);
    }

    /// Takes the panic that escaped the body, if any.
    #[inline]
    pub(crate) fn take_panic(&self) -> Option<CaughtPanic> {
        self.panic.take()
    }

    /// Drops the record and unmaps the region it lives in.
    ///
    /// The body object of a fresh coroutine is dropped first. A suspended
    /// coroutine is abandoned: nothing on its stack is dropped.
    ///
    /// # Safety
    ///
    /// `this` must point to a live record, and nothing may run on or refer
    /// into its region afterwards.
    pub(crate) unsafe fn destroy(this: NonNull<Self>) -> io::Result<()> {
        let this = this.as_ptr();
        let region = ptr::read(&(*this).region);

        // Still unmap the region if one of the destructors below panics.
        let region = scopeguard::guard(region, |region| {
            let _ = region.release();
        });

        if let (State::Fresh, Some(initial_sp)) = ((*this).state(), (*this).context.get()) {
            ((*this).drop_body)(arch::initial_obj(initial_sp));
        }

        // Every other field owns at most a return value or a panic payload.
        ptr::drop_in_place(ptr::addr_of_mut!((*this).retval));
        ptr::drop_in_place(ptr::addr_of_mut!((*this).panic));

        scopeguard::ScopeGuard::into_inner(region).release()
    }
}
