//! Compiler handle and the compile invocation
//!
//! A [`Compiler`] owns two native component objects created through the
//! loader's factory entry point: the compiler engine (`IDxcCompiler3`) and
//! the utility object (`IDxcUtils`). Both must construct or the handle is
//! never returned. [`Compiler::compile`] is the single hot operation.

use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;
use thiserror::Error;

use crate::com::{
    self, Bool, ComPtr, DxcBuffer, Hresult, IDxcBlob, IDxcBlobEncoding, IDxcCompiler3,
    IDxcResult, IDxcUtils, CLSID_DXC_COMPILER, CLSID_DXC_UTILS, CP_UTF8, E_FAIL,
    IID_IDXC_COMPILER3, IID_IDXC_RESULT, IID_IDXC_UTILS,
};
use crate::encoding::{self, WideChar};
use crate::include::{IncludeBridge, IncludeResolver};
use crate::loader::Loader;
use crate::result::CompilationResult;

/// Shown when the engine rejects a compile without readable diagnostics.
const NO_DIAGNOSTIC_MESSAGE: &str =
    "shader compilation failed, but the compiler produced no diagnostic output";

/// Errors that can occur while constructing a compiler handle
#[derive(Debug, Error)]
pub enum CreateError {
    /// The compiler engine object could not be created
    #[error("failed to create the compiler engine instance ({0:#010x})")]
    Engine(Hresult),

    /// The utility object could not be created
    #[error("failed to create the compiler utility instance ({0:#010x})")]
    Utils(Hresult),
}

/// Errors that can occur when the compile invocation itself breaks down.
///
/// A *rejected* shader is not an error at this level; it comes back as a
/// failed [`CompilationResult`] and the handle stays usable.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The native invocation failed without producing a result object
    #[error("the native compile invocation produced no result ({0:#010x})")]
    Engine(Hresult),
}

/// Per-call compilation configuration.
///
/// Every field is mandatory at construction; nothing is ever substituted
/// with an implicit default.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    entry_point: String,
    target_profile: String,
    target_env: String,
}

impl CompileOptions {
    /// Describe a compile: entry point name, target profile (for example
    /// `vs_6_5`), and SPIR-V target environment (for example `vulkan1.3`).
    pub fn new(
        entry_point: impl Into<String>,
        target_profile: impl Into<String>,
        target_env: impl Into<String>,
    ) -> Self {
        CompileOptions {
            entry_point: entry_point.into(),
            target_profile: target_profile.into(),
            target_env: target_env.into(),
        }
    }

    /// Entry point name passed with `-E`.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Target profile passed with `-T`.
    pub fn target_profile(&self) -> &str {
        &self.target_profile
    }

    /// SPIR-V target environment passed with `-fspv-target-env=`.
    pub fn target_env(&self) -> &str {
        &self.target_env
    }

    /// The full argument list handed to the engine.
    pub fn arguments(&self) -> Vec<String> {
        vec![
            "-spirv".to_string(),
            format!("-fspv-target-env={}", self.target_env),
            "-E".to_string(),
            self.entry_point.clone(),
            "-T".to_string(),
            self.target_profile.clone(),
        ]
    }
}

/// A handle to the native compiler, created from an open [`Loader`].
///
/// One loader may produce many handles; dropping a handle releases both
/// native component objects.
pub struct Compiler {
    // Keeps the library mapped for as long as the native objects live.
    loader: Arc<Loader>,
    engine: ComPtr<IDxcCompiler3>,
    utils: ComPtr<IDxcUtils>,
}

// SAFETY: the native objects are only reached through &self and carry no
// thread affinity. DXC does not document its instances as reentrant, so the
// handle is Send but deliberately not Sync; concurrent compiles should use
// one handle per thread.
unsafe impl Send for Compiler {}

impl Compiler {
    /// Create the engine and utility objects through the loader's factory
    /// entry point.
    ///
    /// On any failure no partially constructed handle escapes: a sub-object
    /// acquired before the error is released again before returning.
    pub fn new(loader: Arc<Loader>) -> Result<Self, CreateError> {
        let engine = unsafe {
            let mut raw: *mut c_void = ptr::null_mut();
            let hr = loader.create_instance(&CLSID_DXC_COMPILER, &IID_IDXC_COMPILER3, &mut raw);
            if com::failed(hr) {
                return Err(CreateError::Engine(hr));
            }
            ComPtr::from_raw(raw as *mut IDxcCompiler3).ok_or(CreateError::Engine(E_FAIL))?
        };

        let utils = unsafe {
            let mut raw: *mut c_void = ptr::null_mut();
            let hr = loader.create_instance(&CLSID_DXC_UTILS, &IID_IDXC_UTILS, &mut raw);
            if com::failed(hr) {
                // `engine` drops here and releases its reference.
                return Err(CreateError::Utils(hr));
            }
            ComPtr::from_raw(raw as *mut IDxcUtils).ok_or(CreateError::Utils(E_FAIL))?
        };

        log::debug!("compiler handle created from {}", loader.path());

        Ok(Compiler {
            loader,
            engine,
            utils,
        })
    }

    /// The loader this handle was created from.
    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Compile UTF-8 HLSL source to bytecode.
    ///
    /// If `resolver` is supplied, an include bridge is constructed for the
    /// duration of this call and the engine may invoke it synchronously and
    /// recursively from inside the native call stack. Without a resolver,
    /// unresolved include directives fail at the engine's discretion.
    ///
    /// A rejected shader is a *successful* return carrying a failed
    /// [`CompilationResult`]; `Err` means the invocation itself broke down.
    /// The handle remains usable either way.
    pub fn compile(
        &self,
        source: &str,
        options: &CompileOptions,
        resolver: Option<&dyn IncludeResolver>,
    ) -> Result<CompilationResult, CompileError> {
        let arguments: Vec<Vec<WideChar>> = options
            .arguments()
            .iter()
            .map(|arg| encoding::to_wide(arg))
            .collect();
        let argument_ptrs: Vec<*const WideChar> =
            arguments.iter().map(|arg| arg.as_ptr()).collect();

        let buffer = DxcBuffer {
            ptr: source.as_ptr() as *const c_void,
            size: source.len(),
            encoding: CP_UTF8,
        };

        let raw_result = unsafe {
            let bridge = match resolver {
                Some(resolver) => IncludeBridge::into_raw(self.utils.as_ptr(), resolver),
                None => ptr::null_mut(),
            };

            let mut raw: *mut c_void = ptr::null_mut();
            let engine = self.engine.as_ptr();
            let hr = ((*(*engine).vtbl).compile)(
                engine,
                &buffer,
                argument_ptrs.as_ptr(),
                argument_ptrs.len() as u32,
                bridge,
                &IID_IDXC_RESULT,
                &mut raw,
            );

            // Drop the construction reference; the engine has balanced its
            // own acquires by the time Compile returns.
            if !bridge.is_null() {
                IncludeBridge::release_raw(bridge);
            }

            if com::failed(hr) {
                return Err(CompileError::Engine(hr));
            }
            ComPtr::from_raw(raw as *mut IDxcResult).ok_or(CompileError::Engine(E_FAIL))?
        };

        let status = unsafe {
            let mut status: Hresult = E_FAIL;
            let hr = ((*(*raw_result.as_ptr()).vtbl).get_status)(raw_result.as_ptr(), &mut status);
            if com::failed(hr) {
                return Err(CompileError::Engine(hr));
            }
            status
        };

        if com::failed(status) {
            let message = unsafe { decode_diagnostics(&raw_result) };
            log::debug!("compile rejected ({status:#010x})");
            return Ok(CompilationResult::failure(message));
        }

        let bytecode = unsafe { copy_bytecode(&raw_result)? };
        log::debug!("compile succeeded, {} bytes of bytecode", bytecode.len());
        Ok(CompilationResult::success(bytecode))
    }
}

/// Copy the result blob into owned memory before it is released, so the
/// returned result has no lifetime tie to the engine call.
unsafe fn copy_bytecode(result: &ComPtr<IDxcResult>) -> Result<Vec<u8>, CompileError> {
    let mut raw: *mut IDxcBlob = ptr::null_mut();
    let hr = ((*(*result.as_ptr()).vtbl).get_result)(result.as_ptr(), &mut raw);
    if com::failed(hr) {
        return Err(CompileError::Engine(hr));
    }
    let blob = ComPtr::from_raw(raw).ok_or(CompileError::Engine(E_FAIL))?;

    let data = ((*(*blob.as_ptr()).vtbl).get_buffer_pointer)(blob.as_ptr());
    let size = ((*(*blob.as_ptr()).vtbl).get_buffer_size)(blob.as_ptr());
    if data.is_null() || size == 0 {
        return Ok(Vec::new());
    }
    Ok(std::slice::from_raw_parts(data as *const u8, size).to_vec())
}

/// Fetch and decode the diagnostic buffer of a rejected compile.
///
/// The buffer's own encoding tag decides the decode: the UTF-8 convention is
/// taken as-is, anything else is assumed to be UTF-16, the only two
/// encodings the engine emits. An unreadable or empty buffer degrades to a
/// generic message rather than a decoder fault.
unsafe fn decode_diagnostics(result: &ComPtr<IDxcResult>) -> String {
    let mut raw: *mut IDxcBlobEncoding = ptr::null_mut();
    let hr = ((*(*result.as_ptr()).vtbl).get_error_buffer)(result.as_ptr(), &mut raw);
    if com::failed(hr) || raw.is_null() {
        log::warn!("no diagnostic buffer on a rejected compile ({hr:#010x})");
        return NO_DIAGNOSTIC_MESSAGE.to_string();
    }
    let blob = match ComPtr::from_raw(raw) {
        Some(blob) => blob,
        None => return NO_DIAGNOSTIC_MESSAGE.to_string(),
    };

    let mut known: Bool = 0;
    let mut code_page: u32 = CP_UTF8;
    let hr = ((*(*blob.as_ptr()).vtbl).get_encoding)(blob.as_ptr(), &mut known, &mut code_page);
    if com::failed(hr) {
        code_page = CP_UTF8;
    }

    let as_blob = blob.as_ptr() as *mut IDxcBlob;
    let data = ((*(*blob.as_ptr()).vtbl).blob.get_buffer_pointer)(as_blob);
    let size = ((*(*blob.as_ptr()).vtbl).blob.get_buffer_size)(as_blob);
    if data.is_null() || size == 0 {
        return NO_DIAGNOSTIC_MESSAGE.to_string();
    }
    let bytes = std::slice::from_raw_parts(data as *const u8, size);

    let message = if code_page == CP_UTF8 {
        encoding::utf8_bytes_to_string(bytes)
    } else {
        encoding::utf16_bytes_to_string(bytes)
    };
    if message.trim().is_empty() {
        NO_DIAGNOSTIC_MESSAGE.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_build_full_argument_list() {
        let options = CompileOptions::new("main", "vs_6_5", "vulkan1.3");
        assert_eq!(
            options.arguments(),
            vec![
                "-spirv",
                "-fspv-target-env=vulkan1.3",
                "-E",
                "main",
                "-T",
                "vs_6_5",
            ]
        );
    }

    #[test]
    fn options_carry_no_defaults() {
        let options = CompileOptions::new("vs_entry", "cs_6_0", "vulkan1.1");
        assert_eq!(options.entry_point(), "vs_entry");
        assert_eq!(options.target_profile(), "cs_6_0");
        assert_eq!(options.target_env(), "vulkan1.1");
        assert!(options
            .arguments()
            .contains(&"-fspv-target-env=vulkan1.1".to_string()));
    }
}
