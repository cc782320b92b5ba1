//! Text conversions at the native boundary
//!
//! Two wide flavors cross the DXC ABI and they are not the same thing:
//!
//! - API strings (`LPCWSTR` arguments, include paths) use the platform
//!   `wchar_t`: 16-bit UTF-16 on Windows, 32-bit on Unix builds of DXC.
//! - Blob payloads tagged with codepage 1200 are genuine UTF-16 code units
//!   (`u16`) regardless of platform.
//!
//! All decoding here is lossy: a malformed foreign buffer degrades to
//! replacement characters, never to a decoder fault.

/// Platform wide character as DXC's adapter headers define it.
#[cfg(windows)]
pub type WideChar = u16;
/// Platform wide character as DXC's adapter headers define it.
#[cfg(unix)]
pub type WideChar = libc::wchar_t;

/// Encode a string as a NUL-terminated wide string for API arguments.
pub fn to_wide(s: &str) -> Vec<WideChar> {
    #[cfg(windows)]
    {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }
    #[cfg(unix)]
    {
        s.chars()
            .map(|c| c as WideChar)
            .chain(std::iter::once(0))
            .collect()
    }
}

/// Decode a NUL-terminated wide string handed over by the native library.
///
/// # Safety
///
/// `ptr` must point to a NUL-terminated buffer of `WideChar` units that stays
/// valid for the duration of the call.
pub unsafe fn wide_to_string(ptr: *const WideChar) -> String {
    if ptr.is_null() {
        return String::new();
    }

    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);

    #[cfg(windows)]
    {
        String::from_utf16_lossy(units)
    }
    #[cfg(unix)]
    {
        units
            .iter()
            .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

/// Decode a UTF-16 blob payload (codepage 1200) to UTF-8.
///
/// The byte length is rounded down to whole code units; a trailing NUL
/// terminator, if present, is stripped.
pub fn utf16_bytes_to_string(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

/// Decode a UTF-8 blob payload, stripping a trailing NUL terminator.
pub fn utf8_bytes_to_string(bytes: &[u8]) -> String {
    let bytes = match bytes.split_last() {
        Some((0, rest)) => rest,
        _ => bytes,
    };
    String::from_utf8_lossy(bytes).into_owned()
}
