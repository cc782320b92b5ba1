//! Minimal COM interop for the DXC ABI
//!
//! DXC exposes its functionality through COM-style interfaces even on
//! non-Windows platforms. This module declares just enough of that ABI to
//! drive a compile: GUID/HRESULT plumbing, the vtables of the interfaces the
//! bridge actually calls, and an owned [`ComPtr`] that releases on drop.
//!
//! Vtable structs here may be shorter than the real interface tables: methods
//! past the last one we call are deliberately left undeclared. That is safe
//! for reading function pointers at the declared offsets, but it means these
//! types must never be used to *implement* those interfaces. The one
//! interface this crate implements (`IDxcIncludeHandler`) has its full table
//! declared.

use std::os::raw::{c_int, c_ulong, c_void};
use std::ptr::NonNull;

use crate::encoding::WideChar;

// ============================================================================
// Win32-flavored scalar types
// ============================================================================

/// 32-bit signed COM status code. Negative values are failures.
pub type Hresult = i32;

/// `ULONG` as DXC's platform adapter defines it: `unsigned long`, which is
/// 32-bit on Windows and 64-bit on LP64 Unix. Reference counts cross the ABI
/// with this type.
pub type Ulong = c_ulong;

/// Win32 `BOOL` (a plain `int`).
pub type Bool = c_int;

/// Success status.
pub const S_OK: Hresult = 0;
/// Unspecified failure.
pub const E_FAIL: Hresult = 0x8000_4005_u32 as Hresult;
/// Interface not supported by `QueryInterface`.
pub const E_NOINTERFACE: Hresult = 0x8000_4002_u32 as Hresult;

/// Returns true if the HRESULT signals success.
#[inline]
pub fn succeeded(hr: Hresult) -> bool {
    hr >= 0
}

/// Returns true if the HRESULT signals failure.
#[inline]
pub fn failed(hr: Hresult) -> bool {
    hr < 0
}

// ============================================================================
// GUIDs
// ============================================================================

/// A COM interface or class identifier.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

/// `IID_IUnknown`: {00000000-0000-0000-C000-000000000046}
pub const IID_IUNKNOWN: Guid = Guid::new(0, 0, 0, [0xc0, 0, 0, 0, 0, 0, 0, 0x46]);

/// `CLSID_DxcCompiler`: {73e22d93-e6ce-47f3-b5bf-f0664f39c1b0}
pub const CLSID_DXC_COMPILER: Guid = Guid::new(
    0x73e2_2d93,
    0xe6ce,
    0x47f3,
    [0xb5, 0xbf, 0xf0, 0x66, 0x4f, 0x39, 0xc1, 0xb0],
);

/// `CLSID_DxcUtils`: {6245d6af-66e0-48fd-80b4-4d271796748c}
pub const CLSID_DXC_UTILS: Guid = Guid::new(
    0x6245_d6af,
    0x66e0,
    0x48fd,
    [0x80, 0xb4, 0x4d, 0x27, 0x17, 0x96, 0x74, 0x8c],
);

/// `IID_IDxcCompiler3`: {228b4687-5a6a-4730-900c-9702b2203f54}
pub const IID_IDXC_COMPILER3: Guid = Guid::new(
    0x228b_4687,
    0x5a6a,
    0x4730,
    [0x90, 0x0c, 0x97, 0x02, 0xb2, 0x20, 0x3f, 0x54],
);

/// `IID_IDxcUtils`: {4605c4cb-2019-492a-ada4-65f20bb7d67f}
pub const IID_IDXC_UTILS: Guid = Guid::new(
    0x4605_c4cb,
    0x2019,
    0x492a,
    [0xad, 0xa4, 0x65, 0xf2, 0x0b, 0xb7, 0xd6, 0x7f],
);

/// `IID_IDxcResult`: {58346cda-dde7-4497-9461-6f87af5e0659}
pub const IID_IDXC_RESULT: Guid = Guid::new(
    0x5834_6cda,
    0xdde7,
    0x4497,
    [0x94, 0x61, 0x6f, 0x87, 0xaf, 0x5e, 0x06, 0x59],
);

/// `IID_IDxcIncludeHandler`: {7f61fc7d-950d-467f-b3e3-3c02fb49187c}
pub const IID_IDXC_INCLUDE_HANDLER: Guid = Guid::new(
    0x7f61_fc7d,
    0x950d,
    0x467f,
    [0xb3, 0xe3, 0x3c, 0x02, 0xfb, 0x49, 0x18, 0x7c],
);

// ============================================================================
// Buffer descriptor and codepages
// ============================================================================

/// Codepage tag for UTF-8 buffers.
pub const CP_UTF8: u32 = 65001;
/// Codepage tag for UTF-16 buffers.
pub const CP_UTF16: u32 = 1200;

/// Source buffer descriptor passed to `IDxcCompiler3::Compile`.
#[repr(C)]
pub struct DxcBuffer {
    pub ptr: *const c_void,
    pub size: usize,
    pub encoding: u32,
}

/// `DxcCreateInstance2`, the single factory entry point resolved from the
/// native library. The first parameter is an optional allocator and is always
/// passed as null here.
pub type DxcCreateInstanceProc = unsafe extern "system" fn(
    malloc: *mut c_void,
    clsid: *const Guid,
    iid: *const Guid,
    object: *mut *mut c_void,
) -> Hresult;

// ============================================================================
// Interface vtables
// ============================================================================

/// The three methods every COM interface starts with.
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: unsafe extern "system" fn(
        this: *mut c_void,
        iid: *const Guid,
        object: *mut *mut c_void,
    ) -> Hresult,
    pub add_ref: unsafe extern "system" fn(this: *mut c_void) -> Ulong,
    pub release: unsafe extern "system" fn(this: *mut c_void) -> Ulong,
}

/// Refcounted byte buffer.
#[repr(C)]
pub struct IDxcBlob {
    pub vtbl: *const IDxcBlobVtbl,
}

#[repr(C)]
pub struct IDxcBlobVtbl {
    pub unknown: IUnknownVtbl,
    pub get_buffer_pointer: unsafe extern "system" fn(this: *mut IDxcBlob) -> *mut c_void,
    pub get_buffer_size: unsafe extern "system" fn(this: *mut IDxcBlob) -> usize,
}

/// Byte buffer carrying a codepage tag.
#[repr(C)]
pub struct IDxcBlobEncoding {
    pub vtbl: *const IDxcBlobEncodingVtbl,
}

#[repr(C)]
pub struct IDxcBlobEncodingVtbl {
    pub blob: IDxcBlobVtbl,
    pub get_encoding: unsafe extern "system" fn(
        this: *mut IDxcBlobEncoding,
        known: *mut Bool,
        code_page: *mut u32,
    ) -> Hresult,
}

/// Utility object; only `CreateBlob` is called through this layer, but the
/// methods preceding it must be declared to keep the offsets right.
#[repr(C)]
pub struct IDxcUtils {
    pub vtbl: *const IDxcUtilsVtbl,
}

#[repr(C)]
pub struct IDxcUtilsVtbl {
    pub unknown: IUnknownVtbl,
    pub create_blob_from_blob: unsafe extern "system" fn(
        this: *mut IDxcUtils,
        blob: *mut IDxcBlob,
        offset: u32,
        length: u32,
        result: *mut *mut IDxcBlob,
    ) -> Hresult,
    pub create_blob_from_pinned: unsafe extern "system" fn(
        this: *mut IDxcUtils,
        data: *const c_void,
        size: u32,
        code_page: u32,
        result: *mut *mut IDxcBlobEncoding,
    ) -> Hresult,
    pub move_to_blob: unsafe extern "system" fn(
        this: *mut IDxcUtils,
        data: *const c_void,
        malloc: *mut c_void,
        size: u32,
        code_page: u32,
        result: *mut *mut IDxcBlobEncoding,
    ) -> Hresult,
    pub create_blob: unsafe extern "system" fn(
        this: *mut IDxcUtils,
        data: *const c_void,
        size: u32,
        code_page: u32,
        result: *mut *mut IDxcBlobEncoding,
    ) -> Hresult,
    // LoadFile and the stream/reflection helpers follow; never called here.
}

/// The compiler engine. `Disassemble` follows `Compile` and is not declared.
#[repr(C)]
pub struct IDxcCompiler3 {
    pub vtbl: *const IDxcCompiler3Vtbl,
}

#[repr(C)]
pub struct IDxcCompiler3Vtbl {
    pub unknown: IUnknownVtbl,
    pub compile: unsafe extern "system" fn(
        this: *mut IDxcCompiler3,
        source: *const DxcBuffer,
        arguments: *const *const WideChar,
        arg_count: u32,
        include_handler: *mut c_void,
        iid: *const Guid,
        result: *mut *mut c_void,
    ) -> Hresult,
}

/// Compile outcome object. Only the `IDxcOperationResult` prefix of
/// `IDxcResult` is declared; the output-kind accessors that follow are not
/// used by this bridge.
#[repr(C)]
pub struct IDxcResult {
    pub vtbl: *const IDxcResultVtbl,
}

#[repr(C)]
pub struct IDxcResultVtbl {
    pub unknown: IUnknownVtbl,
    pub get_status: unsafe extern "system" fn(this: *mut IDxcResult, status: *mut Hresult) -> Hresult,
    pub get_result:
        unsafe extern "system" fn(this: *mut IDxcResult, result: *mut *mut IDxcBlob) -> Hresult,
    pub get_error_buffer: unsafe extern "system" fn(
        this: *mut IDxcResult,
        errors: *mut *mut IDxcBlobEncoding,
    ) -> Hresult,
}

/// Include handler contract. This is the one interface the bridge implements
/// itself, so the table is complete.
#[repr(C)]
pub struct IDxcIncludeHandlerVtbl {
    pub unknown: IUnknownVtbl,
    pub load_source: unsafe extern "system" fn(
        this: *mut c_void,
        filename: *const WideChar,
        include_source: *mut *mut IDxcBlob,
    ) -> Hresult,
}

// ============================================================================
// Owned interface pointer
// ============================================================================

/// Owned COM interface pointer that releases its reference on drop.
///
/// `T` must be one of the interface structs above: `#[repr(C)]` with a vtable
/// pointer as its first field, and that vtable starting with [`IUnknownVtbl`].
pub struct ComPtr<T> {
    ptr: NonNull<T>,
}

impl<T> ComPtr<T> {
    /// Take ownership of one reference held by `ptr`. Returns `None` for a
    /// null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must either be null or point to a live COM object whose
    /// reference count accounts for the reference being transferred.
    pub unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| ComPtr { ptr })
    }

    /// Borrow the raw interface pointer without affecting the count.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Drop for ComPtr<T> {
    fn drop(&mut self) {
        unsafe {
            // Every interface starts with IUnknown, so the release slot can
            // be reached through a reinterpreted vtable pointer.
            let vtbl = *(self.ptr.as_ptr() as *mut *const IUnknownVtbl);
            ((*vtbl).release)(self.ptr.as_ptr() as *mut c_void);
        }
    }
}
