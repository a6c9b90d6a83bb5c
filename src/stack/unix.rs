use std::io::{Error, ErrorKind, Result};
use std::ptr;

use super::{StackPointer, MIN_STACK_SIZE};

/// Returns the granularity, in bytes, at which stack regions are mapped.
///
/// Sizes passed to [`Coroutine::with_stack_size`] must be a whole multiple of
/// this value.
///
/// [`Coroutine::with_stack_size`]: crate::Coroutine::with_stack_size
pub fn page_size() -> usize {
    let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(pagesize.is_power_of_two());
    pagesize
}

/// Stack memory obtained with `mmap`, with a guard page below the lowest
/// usable address.
///
/// A region is never released implicitly: it has no `Drop` implementation and
/// must be handed back with [`StackRegion::release`]. The region stores its
/// own description inside the memory it describes (as part of the coroutine
/// record), so releasing it on drop would pull the memory out from under the
/// value being dropped.
pub(crate) struct StackRegion {
    base: StackPointer,
    mmap_len: usize,
}

impl StackRegion {
    /// Maps a new region with exactly `size` usable bytes.
    ///
    /// `size` must be a whole multiple of [`page_size`] and at least
    /// [`MIN_STACK_SIZE`], otherwise an `InvalidInput` error is returned. The
    /// guard page comes on top of `size`.
    pub(crate) fn new(size: usize) -> Result<Self> {
        let page_size = page_size();
        if size < MIN_STACK_SIZE || size % page_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "stack size {size} must be a multiple of the page size ({page_size}) \
                     and at least {MIN_STACK_SIZE} bytes"
                ),
            ));
        }
        let mmap_len = size.checked_add(page_size).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                "integer overflow while calculating stack size",
            )
        })?;

        // OpenBSD requires MAP_STACK on anything that is used as a stack.
        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            // Reserve some address space for the stack.
            let mmap = libc::mmap(ptr::null_mut(), mmap_len, libc::PROT_NONE, map_flags, -1, 0);
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Give the reservation back if the mprotect call fails.
            let mapping = scopeguard::guard(mmap, |mmap| {
                libc::munmap(mmap, mmap_len);
            });

            // Make everything except the guard page writable.
            if libc::mprotect(
                mmap.cast::<u8>().add(page_size).cast(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::last_os_error());
            }

            let mmap = scopeguard::ScopeGuard::into_inner(mapping);
            log::trace!(
                "mapped {} byte stack region at {:#x}",
                mmap_len,
                mmap as usize
            );

            Ok(Self {
                base: StackPointer::new_unchecked(mmap as usize + mmap_len),
                mmap_len,
            })
        }
    }

    /// Highest address of the region. Stacks grow downwards from here.
    #[inline]
    pub(crate) fn base(&self) -> StackPointer {
        self.base
    }

    /// Lowest address of the region, including the guard page.
    #[inline]
    pub(crate) fn limit(&self) -> StackPointer {
        unsafe { StackPointer::new_unchecked(self.base.get() - self.mmap_len) }
    }

    /// Number of usable bytes, excluding the guard page.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.mmap_len - page_size()
    }

    /// Unmaps the region.
    ///
    /// The result carries the status of `munmap`.
    ///
    /// # Safety
    ///
    /// Nothing may execute on, or hold a reference into, the region once this
    /// is called.
    pub(crate) unsafe fn release(self) -> Result<()> {
        let mmap = self.limit().get();
        if libc::munmap(mmap as *mut libc::c_void, self.mmap_len) != 0 {
            let err = Error::last_os_error();
            log::warn!("munmap({:#x}, {}) failed: {:?}", mmap, self.mmap_len, err);
            return Err(err);
        }
        log::trace!("unmapped {} byte stack region at {:#x}", self.mmap_len, mmap);
        Ok(())
    }
}
