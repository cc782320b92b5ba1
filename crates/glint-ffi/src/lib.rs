//! C FFI bindings for the glint DXC bridge
//!
//! This crate republishes [`glint_dxc`] as a plain-data C API consumable from
//! any calling language. The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Opaque pointers for bridge objects
//! - Status codes and NULL returns instead of unwinding
//! - Manual memory management with one-to-one construction/destruction pairs
//! - NULL-tolerant: a NULL required pointer yields the documented failure
//!   value, never a crash
//!
//! Unlike the Rust core, which exposes the compilation configuration, this
//! surface is specialized to one pinned configuration: SPIR-V for Vulkan 1.3,
//! entry point `main`, profile `vs_6_5`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use once_cell::sync::Lazy;

use glint_dxc::{
    CompilationResult, CompileOptions, Compiler, CreateError, IncludeResolver, LoadError, Loader,
};

/// The single compilation configuration this C surface is specialized to.
static PINNED_OPTIONS: Lazy<CompileOptions> =
    Lazy::new(|| CompileOptions::new("main", "vs_6_5", "vulkan1.3"));

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to an open loader
#[repr(C)]
pub struct GlintLoader {
    _private: [u8; 0],
}

/// Opaque handle to a compiler
#[repr(C)]
pub struct GlintCompiler {
    _private: [u8; 0],
}

/// Opaque handle to a compilation result
#[repr(C)]
pub struct GlintResult {
    _private: [u8; 0],
}

/// Status codes returned by the lifecycle entry points
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlintStatus {
    /// The operation succeeded
    Ok = 0,
    /// The native compiler library could not be opened
    OpenLibraryError = 1,
    /// The factory entry point could not be resolved
    SymbolResolutionError = 2,
    /// The compiler engine object could not be created
    EngineCreateError = 3,
    /// The utility object could not be created
    UtilsCreateError = 4,
    /// Reserved for compile-time failure categories
    CompileRejectedError = 5,
    /// Reserved for compile-time failure categories
    CompileUnknownError = 6,
}

/// Include resolution callback.
///
/// Receives the include path as NUL-terminated UTF-8 plus the opaque context
/// passed to [`glint_compile`], and returns NUL-terminated UTF-8 source or
/// NULL for "not found". The returned buffer is borrowed: it stays owned by
/// the callback side and must remain valid until the compile call returns.
pub type GlintIncludeCallback =
    unsafe extern "C" fn(path: *const c_char, context: *mut c_void) -> *const c_char;

// Internal representation of a loader (not exposed to C)
struct LoaderHandle {
    loader: Arc<Loader>,
}

// Internal representation of a compiler (not exposed to C)
struct CompilerHandle {
    compiler: Compiler,
}

// Internal representation of a result (not exposed to C)
struct ResultHandle {
    result: CompilationResult,
    /// NUL-terminated copy of the diagnostic text, kept stable for the
    /// lifetime of the handle.
    message: Option<CString>,
}

impl ResultHandle {
    fn new(result: CompilationResult) -> Self {
        let message = result.error_message().map(|message| {
            // Interior NULs cannot survive a C string; scrub them.
            CString::new(message.replace('\0', "\u{fffd}"))
                .unwrap_or_else(|_| CString::new("shader compilation failed").unwrap())
        });
        ResultHandle { result, message }
    }
}

/// Adapts the C callback shape to the core resolver seam.
struct CallbackResolver {
    callback: GlintIncludeCallback,
    context: *mut c_void,
}

impl IncludeResolver for CallbackResolver {
    fn resolve_include(&self, path: &str) -> Option<Vec<u8>> {
        let path = CString::new(path).ok()?;
        let source = unsafe { (self.callback)(path.as_ptr(), self.context) };
        if source.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(source) }.to_bytes().to_vec())
    }
}

// ============================================================================
// Loader Functions
// ============================================================================

/// Open the native compiler library and resolve its factory entry point
///
/// # Arguments
/// * `out_loader` - Receives the loader handle on success, NULL otherwise
///
/// # Returns
/// * `Ok` on success
/// * `OpenLibraryError` if the library cannot be opened (also returned for a
///   NULL `out_loader`)
/// * `SymbolResolutionError` if the entry point is missing
///
/// # Safety
/// The returned loader must be closed with `glint_loader_close()`
///
/// # Example (C)
/// ```c
/// GlintLoader* loader = NULL;
/// if (glint_loader_open(&loader) != GLINT_OK) {
///     fprintf(stderr, "compiler library unavailable\n");
///     return 1;
/// }
/// ```
#[no_mangle]
pub unsafe extern "C" fn glint_loader_open(out_loader: *mut *mut GlintLoader) -> GlintStatus {
    if out_loader.is_null() {
        return GlintStatus::OpenLibraryError;
    }
    *out_loader = ptr::null_mut();

    match Loader::open() {
        Ok(loader) => {
            let handle = Box::new(LoaderHandle { loader });
            *out_loader = Box::into_raw(handle) as *mut GlintLoader;
            GlintStatus::Ok
        }
        Err(LoadError::EntryPointMissing { .. }) => GlintStatus::SymbolResolutionError,
        Err(LoadError::LibraryNotFound { .. }) | Err(LoadError::InvalidPath(_)) => {
            GlintStatus::OpenLibraryError
        }
    }
}

/// Close a loader
///
/// The library is actually unloaded once every compiler created from this
/// loader has been released as well.
///
/// # Arguments
/// * `loader` - Loader handle (may be NULL)
///
/// # Safety
/// - The handle must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn glint_loader_close(loader: *mut GlintLoader) {
    if loader.is_null() {
        return;
    }

    let handle = Box::from_raw(loader as *mut LoaderHandle);
    drop(handle);
}

// ============================================================================
// Compiler Functions
// ============================================================================

/// Create a compiler from an open loader
///
/// # Arguments
/// * `loader` - Loader handle (must not be NULL)
/// * `out_compiler` - Receives the compiler handle on success, NULL otherwise
///
/// # Returns
/// * `Ok` on success
/// * `EngineCreateError` if the engine object could not be created (also
///   returned for NULL arguments)
/// * `UtilsCreateError` if the utility object could not be created
///
/// # Safety
/// - The loader handle must be valid (created by `glint_loader_open()`)
/// - The returned compiler must be released with `glint_compiler_release()`
#[no_mangle]
pub unsafe extern "C" fn glint_compiler_create(
    loader: *mut GlintLoader,
    out_compiler: *mut *mut GlintCompiler,
) -> GlintStatus {
    if loader.is_null() || out_compiler.is_null() {
        if !out_compiler.is_null() {
            *out_compiler = ptr::null_mut();
        }
        return GlintStatus::EngineCreateError;
    }
    *out_compiler = ptr::null_mut();

    let loader = &*(loader as *mut LoaderHandle);

    match Compiler::new(Arc::clone(&loader.loader)) {
        Ok(compiler) => {
            let handle = Box::new(CompilerHandle { compiler });
            *out_compiler = Box::into_raw(handle) as *mut GlintCompiler;
            GlintStatus::Ok
        }
        Err(CreateError::Engine(_)) => GlintStatus::EngineCreateError,
        Err(CreateError::Utils(_)) => GlintStatus::UtilsCreateError,
    }
}

/// Release a compiler and both of its native component objects
///
/// # Arguments
/// * `compiler` - Compiler handle (may be NULL)
///
/// # Safety
/// - The handle must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn glint_compiler_release(compiler: *mut GlintCompiler) {
    if compiler.is_null() {
        return;
    }

    let handle = Box::from_raw(compiler as *mut CompilerHandle);
    drop(handle);
}

/// Compile NUL-terminated UTF-8 HLSL source to SPIR-V
///
/// The compilation configuration is pinned: SPIR-V for Vulkan 1.3, entry
/// point `main`, profile `vs_6_5`.
///
/// # Arguments
/// * `compiler` - Compiler handle (must not be NULL)
/// * `source` - NUL-terminated UTF-8 shader source (must not be NULL)
/// * `callback` - Optional include resolution callback; pass NULL to offer no
///   include resolution
/// * `context` - Opaque pointer handed back to the callback unchanged
///
/// # Returns
/// * Non-NULL result handle; query it with the `glint_result_*` functions.
///   A rejected shader is reported through the handle, not as NULL.
/// * NULL only if `compiler` or `source` is NULL
///
/// # Safety
/// - The callback, if supplied, may be invoked synchronously and recursively
///   from inside the native engine's call stack
/// - The returned handle must be freed with `glint_result_free()`, exactly
///   once
///
/// # Example (C)
/// ```c
/// GlintResult* result = glint_compile(compiler, source, NULL, NULL);
/// if (!glint_result_is_successful(result)) {
///     fprintf(stderr, "%s\n", glint_result_error_message(result));
/// }
/// glint_result_free(result);
/// ```
#[no_mangle]
pub unsafe extern "C" fn glint_compile(
    compiler: *mut GlintCompiler,
    source: *const c_char,
    callback: Option<GlintIncludeCallback>,
    context: *mut c_void,
) -> *mut GlintResult {
    if compiler.is_null() || source.is_null() {
        return ptr::null_mut();
    }

    let handle = &*(compiler as *mut CompilerHandle);

    let source = match CStr::from_ptr(source).to_str() {
        Ok(source) => source,
        Err(_) => {
            let result = CompilationResult::failure(
                "shader source is not valid UTF-8".to_string(),
            );
            return Box::into_raw(Box::new(ResultHandle::new(result))) as *mut GlintResult;
        }
    };

    let resolver = callback.map(|callback| CallbackResolver { callback, context });

    let outcome = handle.compiler.compile(
        source,
        &PINNED_OPTIONS,
        resolver.as_ref().map(|resolver| resolver as &dyn IncludeResolver),
    );

    let result = match outcome {
        Ok(result) => result,
        // The invocation itself broke down; surface it as a failed result so
        // the caller sees exactly one shape.
        Err(error) => CompilationResult::failure(error.to_string()),
    };

    Box::into_raw(Box::new(ResultHandle::new(result))) as *mut GlintResult
}

// ============================================================================
// Result Functions
// ============================================================================

/// Whether a compilation produced bytecode
///
/// # Arguments
/// * `result` - Result handle (NULL reads as unsuccessful)
#[no_mangle]
pub unsafe extern "C" fn glint_result_is_successful(result: *const GlintResult) -> bool {
    if result.is_null() {
        return false;
    }

    (*(result as *const ResultHandle)).result.is_successful()
}

/// Diagnostic text of a failed compilation
///
/// # Arguments
/// * `result` - Result handle (may be NULL)
///
/// # Returns
/// * NUL-terminated UTF-8 diagnostics if the compilation failed
/// * NULL if the compilation succeeded or `result` is NULL
///
/// # Safety
/// - The returned string is owned by the result handle and valid until
///   `glint_result_free()`; do not free it directly
#[no_mangle]
pub unsafe extern "C" fn glint_result_error_message(result: *const GlintResult) -> *const c_char {
    if result.is_null() {
        return ptr::null();
    }

    match &(*(result as *const ResultHandle)).message {
        Some(message) => message.as_ptr(),
        None => ptr::null(),
    }
}

/// Bytecode of a successful compilation
///
/// # Arguments
/// * `result` - Result handle (may be NULL)
/// * `out_ptr` - Receives the bytecode pointer, or NULL on failure
/// * `out_len` - Receives the bytecode length in bytes, or 0 on failure
///
/// # Safety
/// - The returned view is owned by the result handle and valid until
///   `glint_result_free()`
#[no_mangle]
pub unsafe extern "C" fn glint_result_bytecode(
    result: *const GlintResult,
    out_ptr: *mut *const u8,
    out_len: *mut usize,
) {
    if !out_ptr.is_null() {
        *out_ptr = ptr::null();
    }
    if !out_len.is_null() {
        *out_len = 0;
    }
    if result.is_null() || out_ptr.is_null() || out_len.is_null() {
        return;
    }

    let bytecode = (*(result as *const ResultHandle)).result.bytecode();
    if !bytecode.is_empty() {
        *out_ptr = bytecode.as_ptr();
        *out_len = bytecode.len();
    }
}

/// Free a result and the buffers it owns
///
/// # Arguments
/// * `result` - Result handle (may be NULL)
///
/// # Safety
/// - Must be called exactly once per non-NULL handle
/// - Pointers previously obtained from the handle are invalid afterwards
#[no_mangle]
pub unsafe extern "C" fn glint_result_free(result: *mut GlintResult) {
    if result.is_null() {
        return;
    }

    let handle = Box::from_raw(result as *mut ResultHandle);
    drop(handle);
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the bridge version string
///
/// # Safety
/// - The returned string is static and must not be freed
#[no_mangle]
pub unsafe extern "C" fn glint_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX_SHADER: &[u8] =
        b"float4 main(float3 p : POSITION) : SV_Position { return float4(p, 1.0); }\0";

    const INCLUDING_SHADER: &[u8] = b"#include \"common.hlsl\"\n\
        float4 main(float3 p : POSITION) : SV_Position { return transform(p); }\0";

    unsafe extern "C" fn missing_include(
        _path: *const c_char,
        _context: *mut c_void,
    ) -> *const c_char {
        ptr::null()
    }

    unsafe extern "C" fn static_include(
        path: *const c_char,
        _context: *mut c_void,
    ) -> *const c_char {
        let path = CStr::from_ptr(path).to_string_lossy();
        if path.ends_with("common.hlsl") {
            b"float4 transform(float3 p) { return float4(p, 1.0); }\0".as_ptr() as *const c_char
        } else {
            ptr::null()
        }
    }

    /// Opens the native library, or None when it is not installed.
    unsafe fn open_loader() -> Option<*mut GlintLoader> {
        let mut loader: *mut GlintLoader = ptr::null_mut();
        match glint_loader_open(&mut loader) {
            GlintStatus::Ok => {
                assert!(!loader.is_null());
                Some(loader)
            }
            status => {
                assert!(matches!(
                    status,
                    GlintStatus::OpenLibraryError | GlintStatus::SymbolResolutionError
                ));
                assert!(loader.is_null());
                None
            }
        }
    }

    #[test]
    fn null_arguments_are_tolerated() {
        unsafe {
            assert_eq!(
                glint_loader_open(ptr::null_mut()),
                GlintStatus::OpenLibraryError
            );
            glint_loader_close(ptr::null_mut());

            let mut compiler: *mut GlintCompiler = ptr::null_mut();
            assert_eq!(
                glint_compiler_create(ptr::null_mut(), &mut compiler),
                GlintStatus::EngineCreateError
            );
            assert!(compiler.is_null());
            glint_compiler_release(ptr::null_mut());

            assert!(glint_compile(ptr::null_mut(), ptr::null(), None, ptr::null_mut()).is_null());

            assert!(!glint_result_is_successful(ptr::null()));
            assert!(glint_result_error_message(ptr::null()).is_null());

            let mut bytecode: *const u8 = ptr::null();
            let mut len = 42usize;
            glint_result_bytecode(ptr::null(), &mut bytecode, &mut len);
            assert!(bytecode.is_null());
            assert_eq!(len, 0);

            glint_result_free(ptr::null_mut());
        }
    }

    #[test]
    fn failed_result_handle_shape() {
        unsafe {
            let handle = Box::into_raw(Box::new(ResultHandle::new(CompilationResult::failure(
                "error: testing".to_string(),
            )))) as *mut GlintResult;

            assert!(!glint_result_is_successful(handle));

            let message = glint_result_error_message(handle);
            assert!(!message.is_null());
            assert_eq!(CStr::from_ptr(message).to_str().unwrap(), "error: testing");

            let mut bytecode: *const u8 = ptr::null();
            let mut len = 0usize;
            glint_result_bytecode(handle, &mut bytecode, &mut len);
            assert!(bytecode.is_null());
            assert_eq!(len, 0);

            glint_result_free(handle);
        }
    }

    #[test]
    fn successful_result_handle_shape() {
        unsafe {
            let handle = Box::into_raw(Box::new(ResultHandle::new(CompilationResult::success(
                vec![3, 2, 35, 7],
            )))) as *mut GlintResult;

            assert!(glint_result_is_successful(handle));
            assert!(glint_result_error_message(handle).is_null());

            let mut bytecode: *const u8 = ptr::null();
            let mut len = 0usize;
            glint_result_bytecode(handle, &mut bytecode, &mut len);
            assert!(!bytecode.is_null());
            assert_eq!(len, 4);
            assert_eq!(std::slice::from_raw_parts(bytecode, len), &[3, 2, 35, 7]);

            glint_result_free(handle);
        }
    }

    #[test]
    fn nul_in_diagnostics_is_scrubbed() {
        let handle = ResultHandle::new(CompilationResult::failure("bad\0byte".to_string()));
        let message = handle.message.as_ref().unwrap().to_str().unwrap();
        assert!(!message.contains('\0'));
        assert!(message.starts_with("bad"));
    }

    #[test]
    fn version_is_populated() {
        unsafe {
            let version = glint_version();
            assert!(!version.is_null());
            assert!(!CStr::from_ptr(version).to_str().unwrap().is_empty());
        }
    }

    #[test]
    fn full_lifecycle_through_the_c_surface() {
        unsafe {
            let Some(loader) = open_loader() else { return };

            let mut compiler: *mut GlintCompiler = ptr::null_mut();
            assert_eq!(glint_compiler_create(loader, &mut compiler), GlintStatus::Ok);
            assert!(!compiler.is_null());

            let result = glint_compile(
                compiler,
                VERTEX_SHADER.as_ptr() as *const c_char,
                None,
                ptr::null_mut(),
            );
            assert!(!result.is_null());
            assert!(glint_result_is_successful(result));
            assert!(glint_result_error_message(result).is_null());

            let mut bytecode: *const u8 = ptr::null();
            let mut len = 0usize;
            glint_result_bytecode(result, &mut bytecode, &mut len);
            assert!(!bytecode.is_null());
            assert!(len > 0);

            glint_result_free(result);
            glint_compiler_release(compiler);
            glint_loader_close(loader);
        }
    }

    #[test]
    fn include_callback_miss_fails_the_compile() {
        unsafe {
            let Some(loader) = open_loader() else { return };

            let mut compiler: *mut GlintCompiler = ptr::null_mut();
            assert_eq!(glint_compiler_create(loader, &mut compiler), GlintStatus::Ok);

            let result = glint_compile(
                compiler,
                INCLUDING_SHADER.as_ptr() as *const c_char,
                Some(missing_include),
                ptr::null_mut(),
            );
            assert!(!result.is_null());
            assert!(!glint_result_is_successful(result));

            let message = glint_result_error_message(result);
            assert!(!message.is_null());
            assert!(!CStr::from_ptr(message).to_bytes().is_empty());

            glint_result_free(result);
            glint_compiler_release(compiler);
            glint_loader_close(loader);
        }
    }

    #[test]
    fn include_callback_supplies_source() {
        unsafe {
            let Some(loader) = open_loader() else { return };

            let mut compiler: *mut GlintCompiler = ptr::null_mut();
            assert_eq!(glint_compiler_create(loader, &mut compiler), GlintStatus::Ok);

            let result = glint_compile(
                compiler,
                INCLUDING_SHADER.as_ptr() as *const c_char,
                Some(static_include),
                ptr::null_mut(),
            );
            assert!(!result.is_null());
            assert!(glint_result_is_successful(result));

            glint_result_free(result);
            glint_compiler_release(compiler);
            glint_loader_close(loader);
        }
    }
}
