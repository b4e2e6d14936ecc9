//! Text normalization for observed payloads.
//!
//! The diagnostic entry points come in narrow and wide flavors; everything
//! downstream (filter, buffer, sink) works on UTF-8. Conversion is lossy
//! and total: a null pointer or undecodable input degrades to an empty or
//! replacement-character string, never an error, so capture stays a safe
//! no-op and forwarding is unaffected.

use std::ffi::{c_char, CStr};

/// Longest payload we will walk looking for a terminator. Debug output is
/// line-sized; anything beyond this is a missing NUL.
const MAX_PAYLOAD: usize = 64 * 1024;

/// Convert a NUL-terminated UTF-16 string to owned UTF-8.
///
/// The output length is not knowable up front; the scan finds the
/// terminator and the conversion allocates whatever the payload needs.
///
/// # Safety
/// `ptr` must be null or point to a readable, NUL-terminated u16 sequence.
pub unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while len < MAX_PAYLOAD && *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);
    String::from_utf16_lossy(units)
}

/// Convert a NUL-terminated byte string to owned UTF-8, lossily.
///
/// # Safety
/// `ptr` must be null or point to a readable, NUL-terminated byte sequence.
pub unsafe fn narrow_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    #[test]
    fn wide_round_trips_non_ascii_text() {
        let source = "HUD: héalth=100 · 日本語 λ";
        let wide = as_wide(source);
        let converted = unsafe { wide_to_string(wide.as_ptr()) };
        assert_eq!(converted, source);
    }

    #[test]
    fn wide_null_and_empty_become_empty() {
        assert_eq!(unsafe { wide_to_string(std::ptr::null()) }, "");
        let empty = [0u16];
        assert_eq!(unsafe { wide_to_string(empty.as_ptr()) }, "");
    }

    #[test]
    fn unpaired_surrogate_degrades_instead_of_failing() {
        let wide = [0x48, 0xD800, 0x49, 0];
        let converted = unsafe { wide_to_string(wide.as_ptr()) };
        assert_eq!(converted, "H\u{FFFD}I");
    }

    #[test]
    fn narrow_conversion_is_lossy_and_null_safe() {
        let bytes = b"physics tick\0";
        let converted = unsafe { narrow_to_string(bytes.as_ptr() as *const c_char) };
        assert_eq!(converted, "physics tick");

        assert_eq!(unsafe { narrow_to_string(std::ptr::null()) }, "");

        let invalid = [b'a', 0xFF, b'b', 0];
        let converted = unsafe { narrow_to_string(invalid.as_ptr() as *const c_char) };
        assert_eq!(converted, "a\u{FFFD}b");
    }
}
