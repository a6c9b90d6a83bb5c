use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::NonNull;
use std::io;

use crate::arch;
use crate::delegate;
use crate::record::{Record, State};
use crate::stack::{StackPointer, StackRegion, DEFAULT_STACK_SIZE};
use crate::unwind::{self, initial_func_abi};
use crate::util::{self, EncodedValue};

/// Value returned from resuming a coroutine with [`Coroutine::try_resume`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoroutineResult<Yield, Return> {
    /// Value passed to [`Yielder::suspend`] by the coroutine.
    Yield(Yield),

    /// Value returned by the coroutine body. The coroutine is now finished.
    Return(Return),
}

impl<Yield, Return> CoroutineResult<Yield, Return> {
    /// Returns the `Yield` value as an `Option<Yield>`.
    pub fn as_yield(self) -> Option<Yield> {
        match self {
            CoroutineResult::Yield(val) => Some(val),
            CoroutineResult::Return(_) => None,
        }
    }

    /// Returns the `Return` value as an `Option<Return>`.
    pub fn as_return(self) -> Option<Return> {
        match self {
            CoroutineResult::Yield(_) => None,
            CoroutineResult::Return(val) => Some(val),
        }
    }
}

/// A stackful coroutine exchanging values of type `T` with its caller.
///
/// The same type flows in both directions: [`resume`](Self::resume) sends a
/// `T` in and gets back the `T` the body yielded or returned. `T::default()`
/// doubles as the "no value" sentinel that resuming a finished coroutine
/// produces.
///
/// # Closing
///
/// A coroutine owns a stack region which is only ever released by
/// [`close`](Self::close). Dropping a `Coroutine` without closing it leaks
/// the region.
///
/// # Threads
///
/// A coroutine and everything it delegates to run on the thread that resumes
/// them. `Coroutine` is neither `Send` nor `Sync`.
pub struct Coroutine<T> {
    record: NonNull<Record<T>>,
    marker: PhantomData<fn(T) -> T>,
}

// Object written to a fresh stack and consumed by the entry function on the
// first switch.
struct Body<T, F> {
    func: F,
    record: NonNull<Record<T>>,
}

impl<T: Clone + Default + 'static> Coroutine<T> {
    /// Creates a coroutine running `f` on a stack of
    /// [`DEFAULT_STACK_SIZE`](crate::stack::DEFAULT_STACK_SIZE) bytes.
    ///
    /// `f` does not run until the first call to [`resume`](Self::resume),
    /// and the value passed to that first call is discarded.
    ///
    /// Returns an error if the stack region could not be mapped.
    pub fn new<F>(f: F) -> io::Result<Self>
    where
        F: FnOnce(&Yielder<T>) -> T + 'static,
    {
        Self::with_stack_size(DEFAULT_STACK_SIZE, f)
    }

    /// Creates a coroutine running `f` on a stack of `size` bytes.
    ///
    /// `size` must be a whole multiple of [`page_size`] and at least
    /// [`MIN_STACK_SIZE`], otherwise an `InvalidInput` error is returned.
    ///
    /// The body closure is moved onto the new stack before the coroutine
    /// starts. A closure that captures more than about 1 KiB is moved to the
    /// heap instead and only a pointer to it goes on the stack. The return
    /// value is always kept on the heap, so `T` has no size limit either.
    ///
    /// [`page_size`]: crate::stack::page_size
    /// [`MIN_STACK_SIZE`]: crate::stack::MIN_STACK_SIZE
    pub fn with_stack_size<F>(size: usize, f: F) -> io::Result<Self>
    where
        F: FnOnce(&Yielder<T>) -> T + 'static,
    {
        if mem::size_of::<Body<T, F>>() > arch::MAX_STACK_OBJ_SIZE {
            Self::with_body(size, Box::new(f))
        } else {
            Self::with_body(size, f)
        }
    }

    fn with_body<F>(size: usize, f: F) -> io::Result<Self>
    where
        F: FnOnce(&Yielder<T>) -> T + 'static,
    {
        initial_func_abi! {
            unsafe fn coroutine_entry<T, F>(arg: EncodedValue, obj: *mut Body<T, F>) -> !
            where
                T: Clone + Default,
                F: FnOnce(&Yielder<T>) -> T,
            {
                let Body { func, record } = obj.read();
                debug_assert!({
                    let region = record.as_ref().region();
                    let sp = util::current_stack_ptr();
                    sp > region.limit().get() && sp < region.base().get()
                });

                let yielder = Yielder {
                    record,
                    marker: PhantomData,
                };

                // Run the body, catching any panics. The value sent by the
                // first resume has nothing to be delivered to and is dropped.
                let outcome = unwind::catch_unwind_at_root(|| {
                    drop(util::decode_val::<T>(arg));
                    let val = func(&yielder);
                    let out = val.clone();
                    (val, out)
                });

                // Nothing past this point may unwind: there is no frame left
                // to catch it.
                let _guard = scopeguard::guard((), |()| {
                    panic!("coroutine panicked while finishing, aborting...");
                });

                let (outcome, out) = match outcome {
                    Ok((val, out)) => (Ok(val), out),
                    Err(payload) => (Err(payload), T::default()),
                };
                let record = record.as_ref();
                record.store_outcome(outcome);

                let target = delegate::return_target(record);
                let mut out = ManuallyDrop::new(out);
                arch::switch_final(util::encode_val(&mut out), target);
            }
        }

        // Drops the body object of a coroutine that is closed before it was
        // ever resumed.
        unsafe fn drop_body<T, F>(ptr: *mut u8) {
            core::ptr::drop_in_place(ptr as *mut Body<T, F>);
        }

        let region = StackRegion::new(size)?;
        unsafe {
            let (record, sp) = Record::place(region, drop_body::<T, F>);
            let initial_sp = arch::init_stack(
                sp,
                coroutine_entry::<T, F>,
                Body { func: f, record },
            );
            record.as_ref().context.set(Some(initial_sp));

            Ok(Self {
                record,
                marker: PhantomData,
            })
        }
    }

    /// Resumes the coroutine, sending `val` into it.
    ///
    /// On the first call `val` is discarded and the body starts running.
    /// After that, `val` becomes the result of the [`Yielder::suspend`] call
    /// the body is waiting in.
    ///
    /// Returns the value the body yields next or, if it returns instead, its
    /// return value. If the coroutine had already finished this does nothing
    /// and returns `T::default()`, which is indistinguishable from a yielded
    /// default value without checking [`finished`](Self::finished) (or using
    /// [`try_resume`](Self::try_resume)).
    ///
    /// If the body is currently delegating to another coroutine, the value is
    /// forwarded to the innermost coroutine of the chain and whatever it
    /// yields comes back unchanged.
    ///
    /// # Panics
    ///
    /// If the body panics, the coroutine finishes and the panic is
    /// propagated to this caller.
    pub fn resume(&mut self, val: T) -> T {
        let record = self.record();
        if record.finished() {
            return T::default();
        }

        unsafe {
            // Forward to whichever coroutine is at the end of the delegation
            // chain. The record we were called on is that coroutine when no
            // delegation is active.
            let target = delegate::innermost(record);
            target.mark_started();

            let context = match target.context.get() {
                Some(context) => context,
                None => core::hint::unreachable_unchecked(),
            };
            let mut val = ManuallyDrop::new(val);
            let ret = arch::switch(util::encode_val(&mut val), target.caller.as_ptr(), context);
            let ret = util::decode_val::<T>(ret);

            // Control only comes back here from a yield anywhere along the
            // chain, or from the outermost body returning.
            if let Some(payload) = record.take_panic() {
                drop(ret);
                unwind::resume_unwind(payload);
            }
            ret
        }
    }

    /// Like [`resume`](Self::resume), but reports whether the value was
    /// yielded or returned.
    ///
    /// Returns `None`, without resuming anything, if the coroutine had
    /// already finished.
    pub fn try_resume(&mut self, val: T) -> Option<CoroutineResult<T, T>> {
        if self.finished() {
            return None;
        }
        let ret = self.resume(val);
        if self.finished() {
            Some(CoroutineResult::Return(ret))
        } else {
            Some(CoroutineResult::Yield(ret))
        }
    }

    /// Releases the coroutine's stack region.
    ///
    /// The result is the status of unmapping the region.
    ///
    /// Closing a coroutine that has finished, or has never been resumed, is
    /// always clean. Closing a coroutine that is suspended inside its body
    /// abandons it: objects that live on its stack are never dropped and
    /// whatever they own is leaked.
    pub fn close(self) -> io::Result<()> {
        log::trace!("closing {:?}", self);
        unsafe { Record::destroy(self.record) }
    }
}

impl<T> Coroutine<T> {
    #[inline]
    pub(crate) fn record(&self) -> &Record<T> {
        unsafe { self.record.as_ref() }
    }

    #[inline]
    pub(crate) fn record_ptr(&self) -> NonNull<Record<T>> {
        self.record
    }

    /// Returns whether this coroutine has been resumed at least once.
    pub fn started(&self) -> bool {
        self.record().started()
    }

    /// Returns whether the coroutine body has returned.
    ///
    /// A finished coroutine can no longer be resumed: [`resume`] returns the
    /// `T::default()` sentinel without doing anything.
    ///
    /// [`resume`]: Coroutine::resume
    pub fn finished(&self) -> bool {
        self.record().finished()
    }

    /// Returns the value the coroutine body returned, or `None` if it has not
    /// finished yet.
    ///
    /// This is also `None` for a coroutine whose body panicked.
    pub fn return_value(&self) -> Option<&T> {
        self.record().return_value()
    }

    /// Highest address of the coroutine's stack region.
    pub fn stack_base(&self) -> StackPointer {
        self.record().region().base()
    }

    /// Usable size of the coroutine's stack region in bytes, excluding the
    /// guard page.
    pub fn stack_size(&self) -> usize {
        self.record().region().size()
    }
}

impl<T> fmt::Debug for Coroutine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.record().state() {
            State::Fresh => "fresh",
            State::Suspended => "suspended",
            State::Finished => "finished",
        };
        f.debug_struct("Coroutine")
            .field("state", &state)
            .field("stack_base", &format_args!("{:#x}", self.stack_base().get()))
            .field("stack_size", &self.stack_size())
            .finish()
    }
}

/// `Yielder` is passed to a coroutine body and lets it suspend itself or
/// delegate to another coroutine.
///
/// A `Yielder` only exists for as long as the body runs and cannot be moved
/// to another thread.
#[repr(transparent)]
pub struct Yielder<T> {
    pub(crate) record: NonNull<Record<T>>,
    marker: PhantomData<fn(T) -> T>,
}

impl<T> Yielder<T> {
    #[inline]
    pub(crate) fn record(&self) -> &Record<T> {
        unsafe { self.record.as_ref() }
    }

    /// Suspends the coroutine, handing `val` to the caller of
    /// [`Coroutine::resume`].
    ///
    /// Returns the value passed to the next `resume` call, once there is
    /// one.
    pub fn suspend(&self, val: T) -> T {
        let record = self.record();
        unsafe {
            let caller = match record.caller.get() {
                Some(caller) => caller,
                None => core::hint::unreachable_unchecked(),
            };
            let mut val = ManuallyDrop::new(val);
            let ret = arch::switch(util::encode_val(&mut val), record.context.as_ptr(), caller);
            util::decode_val(ret)
        }
    }
}
