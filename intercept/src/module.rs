//! Module loading and export resolution (Windows).
//!
//! `Library` owns the loaded handle for the real implementation DLL and
//! keeps it mapped for the layer's lifetime; exports are resolved by name.

#[cfg(windows)]
mod windows {
    use std::ffi::CString;
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};

    use log::debug;
    use windows_sys::Win32::Foundation::{FreeLibrary, HMODULE};
    use windows_sys::Win32::System::LibraryLoader::{
        GetModuleHandleW, GetProcAddress, LoadLibraryW,
    };
    use windows_sys::Win32::System::SystemInformation::GetSystemDirectoryW;

    /// A loaded DLL, freed on drop.
    pub struct Library {
        handle: HMODULE,
        path: PathBuf,
    }

    // Safety: module handles are process-global; FreeLibrary may run on any
    // thread.
    unsafe impl Send for Library {}
    unsafe impl Sync for Library {}

    impl Library {
        /// Map the DLL at `path` into the process.
        pub fn open(path: &Path) -> Option<Self> {
            let wide: Vec<u16> = path
                .as_os_str()
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();
            let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
            if handle.is_null() {
                return None;
            }
            debug!("loaded {} at {:p}", path.display(), handle);
            Some(Self {
                handle,
                path: path.to_path_buf(),
            })
        }

        /// Resolve an export by name. Returns the raw address, or `None`
        /// when the DLL does not export the symbol.
        pub fn symbol(&self, name: &str) -> Option<usize> {
            let c = CString::new(name).ok()?;
            let addr = unsafe { GetProcAddress(self.handle, c.as_ptr() as *const u8) };
            addr.map(|f| f as usize)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for Library {
        fn drop(&mut self) {
            unsafe {
                FreeLibrary(self.handle);
            }
        }
    }

    /// Absolute path of `name` under the system directory
    /// (e.g. `C:\Windows\System32\xinput1_3.dll`).
    pub fn system_library_path(name: &str) -> Option<PathBuf> {
        let mut buf = [0u16; 260];
        let len = unsafe { GetSystemDirectoryW(buf.as_mut_ptr(), buf.len() as u32) };
        if len == 0 || len as usize >= buf.len() {
            return None;
        }
        let dir = std::ffi::OsString::from_wide(&buf[..len as usize]);
        Some(PathBuf::from(dir).join(name))
    }

    /// Base address of the host executable, the module whose import table
    /// gets patched.
    pub fn main_module_base() -> Option<usize> {
        let handle = unsafe { GetModuleHandleW(std::ptr::null()) };
        if handle.is_null() {
            None
        } else {
            Some(handle as usize)
        }
    }

}

#[cfg(windows)]
pub use self::windows::{main_module_base, system_library_path, Library};
