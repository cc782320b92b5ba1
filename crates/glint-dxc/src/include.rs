//! Include resolution bridge
//!
//! DXC asks the embedding application for the contents of `#include`d files
//! through the COM `IDxcIncludeHandler` contract. [`IncludeBridge`] is the
//! adapter: a heap-allocated, reference-counted COM object whose `LoadSource`
//! decodes the wide path, consults a caller-supplied [`IncludeResolver`], and
//! wraps the resolved bytes into a native blob.
//!
//! The reference count is the only mutable state: the engine acquires and
//! releases references from several internal code paths during one compile
//! call, so it is atomic. Everything else is immutable after construction.

use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, Ordering};

use crate::com::{
    self, Guid, Hresult, IDxcBlob, IDxcBlobEncoding, IDxcIncludeHandlerVtbl, IDxcUtils,
    IUnknownVtbl, Ulong, CP_UTF8, E_FAIL, E_NOINTERFACE, IID_IDXC_INCLUDE_HANDLER, IID_IUNKNOWN,
    S_OK,
};
use crate::encoding::{self, WideChar};

/// Caller-supplied include resolution.
///
/// `resolve_include` runs synchronously inside the native engine's call
/// stack, possibly recursively when include directives nest, so
/// implementations must be reentrant-safe. Returning `None` means "include
/// not found"; the engine folds that into its own diagnostics rather than
/// aborting the bridge.
pub trait IncludeResolver {
    /// Produce the contents of the included file, or `None` if it does not
    /// resolve.
    fn resolve_include(&self, path: &str) -> Option<Vec<u8>>;
}

/// The shared vtable for every bridge instance.
static VTBL: IDxcIncludeHandlerVtbl = IDxcIncludeHandlerVtbl {
    unknown: IUnknownVtbl {
        query_interface,
        add_ref,
        release,
    },
    load_source,
};

/// COM object implementing `IDxcIncludeHandler` over an [`IncludeResolver`].
#[repr(C)]
pub(crate) struct IncludeBridge {
    // The vtable pointer must stay the first field; the engine reads it
    // through the interface pointer.
    vtbl: *const IDxcIncludeHandlerVtbl,
    /// Utility object of the owning compiler handle, borrowed for blob
    /// creation only.
    utils: *mut IDxcUtils,
    /// Erased borrow of the caller's resolver; valid for the duration of the
    /// compile call the bridge is scoped to.
    resolver: *const dyn IncludeResolver,
    refs: AtomicU32,
}

impl IncludeBridge {
    /// Heap-allocate a bridge with a reference count of 1 and hand it out as
    /// a raw interface pointer.
    ///
    /// # Safety
    ///
    /// `utils` must outlive the bridge. The resolver borrow is erased to
    /// `'static`; the caller must release its construction reference once the
    /// compile call returns, and the engine must have balanced its own
    /// acquires by then, per the COM contract.
    pub(crate) unsafe fn into_raw(
        utils: *mut IDxcUtils,
        resolver: &dyn IncludeResolver,
    ) -> *mut c_void {
        let resolver: *const dyn IncludeResolver = std::mem::transmute::<
            &dyn IncludeResolver,
            &'static dyn IncludeResolver,
        >(resolver);

        Box::into_raw(Box::new(IncludeBridge {
            vtbl: &VTBL,
            utils,
            resolver,
            refs: AtomicU32::new(1),
        })) as *mut c_void
    }

    /// Release one reference on a raw bridge pointer, returning the new
    /// count. The bridge is destroyed when the count reaches zero.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`IncludeBridge::into_raw`] and the caller
    /// must own the reference being released.
    pub(crate) unsafe fn release_raw(ptr: *mut c_void) -> Ulong {
        release(ptr)
    }
}

unsafe extern "system" fn query_interface(
    this: *mut c_void,
    iid: *const Guid,
    object: *mut *mut c_void,
) -> Hresult {
    if object.is_null() {
        return E_FAIL;
    }
    if !iid.is_null() && (*iid == IID_IUNKNOWN || *iid == IID_IDXC_INCLUDE_HANDLER) {
        *object = this;
        add_ref(this);
        return S_OK;
    }
    *object = ptr::null_mut();
    E_NOINTERFACE
}

unsafe extern "system" fn add_ref(this: *mut c_void) -> Ulong {
    let bridge = &*(this as *const IncludeBridge);
    (bridge.refs.fetch_add(1, Ordering::Relaxed) + 1) as Ulong
}

unsafe extern "system" fn release(this: *mut c_void) -> Ulong {
    let bridge = &*(this as *const IncludeBridge);
    let remaining = bridge.refs.fetch_sub(1, Ordering::Release) - 1;
    if remaining == 0 {
        // Pair with the Release stores of other droppers before freeing.
        fence(Ordering::Acquire);
        drop(Box::from_raw(this as *mut IncludeBridge));
    }
    remaining as Ulong
}

unsafe extern "system" fn load_source(
    this: *mut c_void,
    filename: *const WideChar,
    include_source: *mut *mut IDxcBlob,
) -> Hresult {
    if include_source.is_null() {
        return E_FAIL;
    }
    *include_source = ptr::null_mut();

    let bridge = &*(this as *const IncludeBridge);
    let path = encoding::wide_to_string(filename);

    // A panicking resolver must not unwind into the native engine.
    let resolver = &*bridge.resolver;
    let resolved = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve_include(&path)));

    let source = match resolved {
        Ok(Some(source)) => source,
        Ok(None) => return E_FAIL,
        Err(_) => {
            log::warn!("include resolver panicked while resolving {path:?}");
            return E_FAIL;
        }
    };

    let mut blob: *mut IDxcBlobEncoding = ptr::null_mut();
    let utils = bridge.utils;
    let hr = ((*(*utils).vtbl).create_blob)(
        utils,
        source.as_ptr() as *const c_void,
        source.len() as u32,
        CP_UTF8,
        &mut blob,
    );
    if com::failed(hr) {
        return hr;
    }

    // CreateBlob copied the data; its one reference transfers to the engine.
    *include_source = blob as *mut IDxcBlob;
    S_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopResolver;

    impl IncludeResolver for NoopResolver {
        fn resolve_include(&self, _path: &str) -> Option<Vec<u8>> {
            None
        }
    }

    struct PanickyResolver;

    impl IncludeResolver for PanickyResolver {
        fn resolve_include(&self, _path: &str) -> Option<Vec<u8>> {
            panic!("resolver blew up");
        }
    }

    #[test]
    fn refcount_lifecycle() {
        let resolver = NoopResolver;
        unsafe {
            let bridge = IncludeBridge::into_raw(ptr::null_mut(), &resolver);
            assert_eq!(add_ref(bridge), 2);
            assert_eq!(add_ref(bridge), 3);
            assert_eq!(release(bridge), 2);
            assert_eq!(release(bridge), 1);
            // Final release destroys the object and reports zero.
            assert_eq!(release(bridge), 0);
        }
    }

    #[test]
    fn query_interface_identity() {
        let resolver = NoopResolver;
        unsafe {
            let bridge = IncludeBridge::into_raw(ptr::null_mut(), &resolver);

            let mut out: *mut c_void = ptr::null_mut();
            let hr = query_interface(bridge, &IID_IDXC_INCLUDE_HANDLER, &mut out);
            assert_eq!(hr, S_OK);
            assert_eq!(out, bridge);
            assert_eq!(release(bridge), 1);

            let hr = query_interface(bridge, &IID_IUNKNOWN, &mut out);
            assert_eq!(hr, S_OK);
            assert_eq!(release(bridge), 1);

            assert_eq!(IncludeBridge::release_raw(bridge), 0);
        }
    }

    #[test]
    fn query_interface_rejects_unknown_iid() {
        let resolver = NoopResolver;
        let foreign = Guid::new(0xdead_beef, 0, 0, [0; 8]);
        unsafe {
            let bridge = IncludeBridge::into_raw(ptr::null_mut(), &resolver);
            let mut out: *mut c_void = bridge;
            let hr = query_interface(bridge, &foreign, &mut out);
            assert_eq!(hr, E_NOINTERFACE);
            assert!(out.is_null());
            assert_eq!(release(bridge), 0);
        }
    }

    #[test]
    fn unresolved_include_reports_failure() {
        let resolver = NoopResolver;
        let path = encoding::to_wide("missing/common.hlsl");
        unsafe {
            // The resolver answers None before the utils pointer is ever
            // touched, so a null utils is fine here.
            let bridge = IncludeBridge::into_raw(ptr::null_mut(), &resolver);
            let mut blob: *mut IDxcBlob = ptr::null_mut();
            let hr = load_source(bridge, path.as_ptr(), &mut blob);
            assert_eq!(hr, E_FAIL);
            assert!(blob.is_null());
            assert_eq!(release(bridge), 0);
        }
    }

    #[test]
    fn panicking_resolver_reports_failure() {
        let resolver = PanickyResolver;
        let path = encoding::to_wide("boom.hlsl");
        unsafe {
            let bridge = IncludeBridge::into_raw(ptr::null_mut(), &resolver);
            let mut blob: *mut IDxcBlob = ptr::null_mut();
            let hr = load_source(bridge, path.as_ptr(), &mut blob);
            assert_eq!(hr, E_FAIL);
            assert!(blob.is_null());
            assert_eq!(release(bridge), 0);
        }
    }
}
