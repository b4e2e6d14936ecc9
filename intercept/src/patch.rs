//! Call-resolution slot patching with scoped protection changes.
//!
//! Import tables are mapped read-only once the loader has filled them in,
//! so writing a slot takes a protection change. `ProtectGuard` scopes that
//! change: the page is writable only between construction and drop, and the
//! previous protection comes back on every exit path. The slot write itself
//! goes through an atomic store so threads concurrently calling through the
//! slot observe either the old or the new target, never a torn value.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::types::PatchError;

/// Makes the page(s) containing `len` bytes at `addr` writable for its
/// lifetime and restores the previous protection on drop.
pub struct ProtectGuard {
    #[cfg(windows)]
    addr: *const u8,
    #[cfg(windows)]
    len: usize,
    #[cfg(windows)]
    old_protect: u32,
    #[cfg(unix)]
    page_start: usize,
    #[cfg(unix)]
    map_size: usize,
}

#[cfg(windows)]
impl ProtectGuard {
    /// # Safety
    /// `addr..addr+len` must be a mapped region of the current process.
    pub unsafe fn new(addr: *const u8, len: usize) -> Result<Self, PatchError> {
        use windows_sys::Win32::System::Memory::{VirtualProtect, PAGE_READWRITE};

        let mut old_protect: u32 = 0;
        let ok = VirtualProtect(addr as *const _, len, PAGE_READWRITE, &mut old_protect);
        if ok == 0 {
            return Err(PatchError::ProtectFailed);
        }
        Ok(Self {
            addr,
            len,
            old_protect,
        })
    }
}

#[cfg(windows)]
impl Drop for ProtectGuard {
    fn drop(&mut self) {
        use windows_sys::Win32::System::Memory::VirtualProtect;

        let mut scratch: u32 = 0;
        unsafe {
            VirtualProtect(self.addr as *const _, self.len, self.old_protect, &mut scratch);
        }
    }
}

#[cfg(unix)]
impl ProtectGuard {
    /// # Safety
    /// `addr..addr+len` must be a mapped region of the current process.
    pub unsafe fn new(addr: *const u8, len: usize) -> Result<Self, PatchError> {
        let page_sz = libc::sysconf(libc::_SC_PAGESIZE) as usize;
        let page_start = (addr as usize) & !(page_sz - 1);
        let page_end = ((addr as usize) + len + page_sz - 1) & !(page_sz - 1);
        let map_size = page_end - page_start;

        if libc::mprotect(
            page_start as *mut libc::c_void,
            map_size,
            libc::PROT_READ | libc::PROT_WRITE,
        ) != 0
        {
            return Err(PatchError::ProtectFailed);
        }
        Ok(Self {
            page_start,
            map_size,
        })
    }
}

#[cfg(unix)]
impl Drop for ProtectGuard {
    fn drop(&mut self) {
        // Resolved import tables live on read-only pages (the relro
        // analogue of the Windows IAT), so read-only is the prior mode.
        unsafe {
            libc::mprotect(
                self.page_start as *mut libc::c_void,
                self.map_size,
                libc::PROT_READ,
            );
        }
    }
}

#[cfg(not(any(windows, unix)))]
impl ProtectGuard {
    pub unsafe fn new(_addr: *const u8, _len: usize) -> Result<Self, PatchError> {
        Err(PatchError::Unsupported)
    }
}

/// One patched call-resolution slot.
///
/// Written exactly twice over its lifetime: once by [`PatchSite::install`]
/// and once (optionally) by [`PatchSite::restore`]. The saved `original`
/// value is the forwarding target; observers call it directly and never go
/// back through the patched slot, which would re-enter them.
pub struct PatchSite {
    slot: *mut usize,
    original: usize,
    installed: usize,
}

// Safety: the slot pointer refers to process-global loader data whose
// lifetime exceeds the patch site; mutation is confined to install/restore.
unsafe impl Send for PatchSite {}
unsafe impl Sync for PatchSite {}

impl PatchSite {
    /// Swap `slot` to point at `observer`, returning a site that remembers
    /// the original value for forwarding and restoration.
    ///
    /// # Safety
    /// `slot` must point at a live, pointer-aligned call-resolution slot.
    pub unsafe fn install(slot: *mut usize, observer: usize) -> Result<Self, PatchError> {
        Self::install_with(slot, observer, |_| {})
    }

    /// Like [`PatchSite::install`], but hands the pre-patch slot value to
    /// `publish` before the slot is swapped. An observer that can be
    /// entered the instant the swap lands must already be able to see its
    /// forwarding target, so the publish step has to come first. On a
    /// failed protection change the published value is harmless: the slot
    /// was never swapped and nothing routes to the observer.
    ///
    /// # Safety
    /// `slot` must point at a live, pointer-aligned call-resolution slot.
    pub unsafe fn install_with(
        slot: *mut usize,
        observer: usize,
        publish: impl FnOnce(usize),
    ) -> Result<Self, PatchError> {
        publish(slot.read());

        let guard = ProtectGuard::new(slot as *const u8, std::mem::size_of::<usize>())?;
        let atomic = AtomicUsize::from_ptr(slot);
        let original = atomic.swap(observer, Ordering::SeqCst);
        drop(guard);

        debug!(
            "patched slot {:p}: {:#x} -> {:#x}",
            slot, original, observer
        );
        Ok(Self {
            slot,
            original,
            installed: observer,
        })
    }

    /// The pre-patch slot value: the address of the real implementation.
    pub fn original(&self) -> usize {
        self.original
    }

    /// The observer address the slot currently holds.
    pub fn installed(&self) -> usize {
        self.installed
    }

    /// Write the original value back, ending the interception.
    ///
    /// # Safety
    /// The slot must still be mapped (the patched module still loaded).
    pub unsafe fn restore(&self) -> Result<(), PatchError> {
        let guard = ProtectGuard::new(self.slot as *const u8, std::mem::size_of::<usize>())
            .map_err(|_| PatchError::RestoreFailed)?;
        AtomicUsize::from_ptr(self.slot).store(self.original, Ordering::SeqCst);
        drop(guard);

        debug!("restored slot {:p} to {:#x}", self.slot, self.original);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// An anonymous page standing in for a loader-owned import table.
    /// Heap memory would share pages with allocator metadata, which the
    /// guard's read-only restore would then break.
    struct TestPage {
        base: *mut libc::c_void,
        size: usize,
    }

    impl TestPage {
        fn new() -> Self {
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            assert_ne!(base, libc::MAP_FAILED);
            Self { base, size }
        }

        fn slot(&self) -> *mut usize {
            self.base as *mut usize
        }
    }

    impl Drop for TestPage {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.base, self.size);
            }
        }
    }

    #[test]
    fn install_swaps_and_remembers_original() {
        let page = TestPage::new();
        unsafe {
            page.slot().write(0xAAAA);
            let site = PatchSite::install(page.slot(), 0xBBBB).unwrap();

            assert_eq!(site.original(), 0xAAAA);
            assert_eq!(site.installed(), 0xBBBB);
            assert_eq!(page.slot().read(), 0xBBBB);
        }
    }

    #[test]
    fn install_publishes_original_before_swapping() {
        let page = TestPage::new();
        unsafe {
            page.slot().write(0xAAAA);

            let seen = std::cell::Cell::new(None);
            let site = PatchSite::install_with(page.slot(), 0xBBBB, |original| {
                // At publish time the slot must still hold the original:
                // a caller routed through it right now forwards correctly.
                seen.set(Some((original, page.slot().read())));
            })
            .unwrap();

            assert_eq!(seen.get(), Some((0xAAAA, 0xAAAA)));
            assert_eq!(site.original(), 0xAAAA);
            assert_eq!(page.slot().read(), 0xBBBB);
        }
    }

    #[test]
    fn restore_writes_original_back() {
        let page = TestPage::new();
        unsafe {
            page.slot().write(0xAAAA);
            let site = PatchSite::install(page.slot(), 0xBBBB).unwrap();
            site.restore().unwrap();
            assert_eq!(page.slot().read(), 0xAAAA);
        }
    }

    #[test]
    fn guard_leaves_page_read_only_after_install() {
        let page = TestPage::new();
        unsafe {
            page.slot().write(1);
            let _site = PatchSite::install(page.slot(), 2).unwrap();

            // Reading still works; a fresh guard can reopen the page.
            assert_eq!(page.slot().read(), 2);
            let reopen = ProtectGuard::new(page.slot() as *const u8, 8);
            assert!(reopen.is_ok());
        }
    }
}
