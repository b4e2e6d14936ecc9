//! PE import table walking.
//!
//! A loaded module resolves calls to imported symbols through its import
//! address table: one pointer-sized slot per imported function, filled in by
//! the loader. `find_import_slot` walks the module's import descriptors and
//! returns the address of the slot for a given (dll, symbol) pair, which the
//! patcher can then swap to an observer function.
//!
//! Everything here is plain pointer arithmetic over the mapped image. All
//! reads are unaligned and sanity-checked so a malformed or truncated image
//! yields `None` instead of a fault, and the walker can be exercised against
//! a synthetic in-memory image on any platform.

use std::ptr;

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_MAGIC: u32 = 0x0000_4550; // "PE\0\0"
const OPT_MAGIC_PE32: u16 = 0x10B;
const OPT_MAGIC_PE32_PLUS: u16 = 0x20B;

/// sizeof(IMAGE_IMPORT_DESCRIPTOR)
const IMPORT_DESCRIPTOR_SIZE: usize = 20;

const ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;
const ORDINAL_FLAG32: u64 = 0x8000_0000;

/// Upper bound on thunk entries per descriptor; a well-formed table is
/// NUL-terminated long before this.
const MAX_THUNKS: usize = 4096;

/// Upper bound on descriptors; mirrors the size-derived limit with a floor
/// of one so a directory with an understated size still yields its entry.
const MAX_DESCRIPTORS: usize = 1024;

unsafe fn read<T: Copy>(addr: usize) -> T {
    ptr::read_unaligned(addr as *const T)
}

/// Read a NUL-terminated ASCII string of at most `max` bytes.
unsafe fn read_cstr(addr: usize, max: usize) -> Option<String> {
    let mut bytes = Vec::new();
    for i in 0..max {
        let b: u8 = read(addr + i);
        if b == 0 {
            return Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(b);
    }
    None
}

/// Locate the import directory of the image mapped at `module_base`.
///
/// Returns (descriptor table address, descriptor budget, thunk entry size).
unsafe fn import_directory(module_base: usize) -> Option<(usize, usize, usize)> {
    if read::<u16>(module_base) != DOS_MAGIC {
        return None;
    }
    let e_lfanew = read::<i32>(module_base + 0x3C);
    // e_lfanew beyond the first page means a corrupt header
    if !(0x40..=0x1000).contains(&e_lfanew) {
        return None;
    }
    let pe = module_base + e_lfanew as usize;
    if read::<u32>(pe) != PE_MAGIC {
        return None;
    }

    // Optional header follows the 4-byte signature and 20-byte COFF header.
    let optional = pe + 24;
    let (dir_rva, dir_size, thunk_size): (u32, u32, usize) = match read::<u16>(optional) {
        OPT_MAGIC_PE32_PLUS => (read(optional + 120), read(optional + 124), 8),
        OPT_MAGIC_PE32 => (read(optional + 104), read(optional + 108), 4),
        _ => return None,
    };
    if dir_rva == 0 || dir_size == 0 {
        return None;
    }

    let budget = (dir_size as usize / IMPORT_DESCRIPTOR_SIZE)
        .clamp(1, MAX_DESCRIPTORS);
    Some((module_base + dir_rva as usize, budget, thunk_size))
}

/// Find the IAT slot through which the module at `module_base` calls
/// `symbol` imported from `dll_name` (matched case-insensitively).
///
/// Ordinal-only imports carry no name and are skipped. Returns `None` when
/// the module does not import the symbol or the image is malformed.
///
/// # Safety
/// `module_base` must be the base address of an image that stays mapped for
/// the duration of the call.
pub unsafe fn find_import_slot(
    module_base: usize,
    dll_name: &str,
    symbol: &str,
) -> Option<*mut usize> {
    let (descriptors, budget, thunk_size) = import_directory(module_base)?;

    for i in 0..budget {
        let desc = descriptors + i * IMPORT_DESCRIPTOR_SIZE;
        let original_first_thunk: u32 = read(desc);
        let name_rva: u32 = read(desc + 12);
        let first_thunk: u32 = read(desc + 16);

        // All-zero descriptor terminates the table.
        if original_first_thunk == 0 && name_rva == 0 && first_thunk == 0 {
            break;
        }
        if name_rva == 0 || first_thunk == 0 {
            continue;
        }
        let Some(name) = read_cstr(module_base + name_rva as usize, 256) else {
            continue;
        };
        if !name.eq_ignore_ascii_case(dll_name) {
            continue;
        }

        // Match by name against the lookup table. Fall back to the IAT
        // itself when the linker emitted no separate lookup table; that
        // only works pre-bind, but is what older toolchains produce.
        let lookup = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let ordinal_flag = if thunk_size == 8 {
            ORDINAL_FLAG64
        } else {
            ORDINAL_FLAG32
        };

        for index in 0..MAX_THUNKS {
            let entry_addr = module_base + lookup as usize + index * thunk_size;
            let entry: u64 = if thunk_size == 8 {
                read(entry_addr)
            } else {
                read::<u32>(entry_addr) as u64
            };
            if entry == 0 {
                break;
            }
            if entry & ordinal_flag != 0 {
                continue;
            }
            // IMAGE_IMPORT_BY_NAME: u16 hint, then the NUL-terminated name.
            let hint_name = module_base + (entry as u32 as usize) + 2;
            match read_cstr(hint_name, 512) {
                Some(n) if n == symbol => {
                    let slot = module_base + first_thunk as usize + index * thunk_size;
                    return Some(slot as *mut usize);
                }
                _ => {}
            }
        }
        // The right descriptor was found but the symbol is absent; other
        // descriptors for the same DLL (delay-load aside) do not exist.
        return None;
    }

    None
}
