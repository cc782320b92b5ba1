//! Dynamic loading of the DXC shared library
//!
//! Cross-platform support for opening the native compiler library and
//! resolving its single factory entry point, `DxcCreateInstance2`.

use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use thiserror::Error;

use crate::com::{DxcCreateInstanceProc, Guid, Hresult};

/// Well-known name of the native compiler library.
#[cfg(unix)]
pub const LIBRARY_NAME: &str = "libdxcompiler.so";
/// Well-known name of the native compiler library.
#[cfg(windows)]
pub const LIBRARY_NAME: &str = "dxcompiler.dll";

/// Factory entry point resolved after the library opens.
const CREATE_INSTANCE_SYMBOL: &str = "DxcCreateInstance2";

/// Errors that can occur while opening the native library
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("compiler library not found: {path}")]
    LibraryNotFound {
        /// Path that was attempted, with the platform loader's own message
        path: String,
    },

    /// The factory symbol is absent from the library
    #[error("entry point not found: {symbol} in {library}")]
    EntryPointMissing {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
    },

    /// Invalid path encoding
    #[error("invalid library path: {0}")]
    InvalidPath(String),
}

/// An open handle to the native compiler library.
///
/// The library handle and the resolved entry point are read-only after a
/// successful open, so a `Loader` can be shared freely across threads.
/// Compiler handles keep a clone of the `Arc`, which guarantees the library
/// is never unloaded underneath a live native object.
pub struct Loader {
    handle: LibraryHandle,
    path: String,
    create_proc: DxcCreateInstanceProc,
}

impl Loader {
    /// Open the compiler library by its well-known name, leaving the search
    /// to the platform loader.
    pub fn open() -> Result<Arc<Self>, LoadError> {
        Self::open_at(LIBRARY_NAME)
    }

    /// Open the compiler library at an explicit path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, LoadError> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path_ref)))?;

        let handle = LibraryHandle::load(path_str)?;
        let create_proc: DxcCreateInstanceProc =
            unsafe { handle.symbol(CREATE_INSTANCE_SYMBOL, path_str)? };

        log::debug!("loaded {path_str}, resolved {CREATE_INSTANCE_SYMBOL}");

        Ok(Arc::new(Loader {
            handle,
            path: path_str.to_string(),
            create_proc,
        }))
    }

    /// Create a native component instance through the factory entry point.
    ///
    /// # Safety
    ///
    /// `object` must be valid for a pointer write; on success it receives one
    /// owned reference to an instance of the interface named by `iid`.
    pub(crate) unsafe fn create_instance(
        &self,
        clsid: &Guid,
        iid: &Guid,
        object: *mut *mut c_void,
    ) -> Hresult {
        (self.create_proc)(ptr::null_mut(), clsid, iid, object)
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        // LibraryHandle closes the library.
        log::debug!("unloading {}", self.path);
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        let c_path =
            CString::new(path).map_err(|e| LoadError::InvalidPath(format!("{path}: {e}")))?;

        let handle = unsafe {
            // RTLD_NOW: Resolve all symbols immediately
            // RTLD_LOCAL: Symbols not available for subsequently loaded libraries
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL)
        };

        if handle.is_null() {
            let error = unsafe {
                let err_ptr = libc::dlerror();
                if err_ptr.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                }
            };

            return Err(LoadError::LibraryNotFound {
                path: format!("{path}: {error}"),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name =
            CString::new(name).map_err(|e| LoadError::InvalidPath(format!("{name}: {e}")))?;

        // Clear any previous errors
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        let err_ptr = libc::dlerror();
        if !err_ptr.is_null() {
            let error = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
            return Err(LoadError::EntryPointMissing {
                symbol: name.to_string(),
                library: format!("{lib_path}: {error}"),
            });
        }

        if symbol.is_null() {
            return Err(LoadError::EntryPointMissing {
                symbol: name.to_string(),
                library: lib_path.to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::LibraryNotFound {
                path: format!("{path} (error code: {error})"),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name =
            CString::new(name).map_err(|e| LoadError::InvalidPath(format!("{name}: {e}")))?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            let error = GetLastError();
            return Err(LoadError::EntryPointMissing {
                symbol: name.to_string(),
                library: format!("{lib_path} (error code: {error})"),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, procname: *const i8) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}
