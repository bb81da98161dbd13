//! C boundary.
//!
//! Handle discipline, shared by every entry point:
//!
//! - Graph nodes cross as borrowed pointers (`ValueHandle`, `TypeHandle`)
//!   that stay valid until the owning module is disposed. They carry no
//!   ownership and are never freed by the caller.
//! - Iterators cross as owned, heap-allocated handles, one handle type per
//!   collection kind. Each `*_iter` constructor is paired with a `*_next` and
//!   an `irweave_dispose_*_iter`; disposing null is a no-op.
//! - Strings cross as caller-owned NUL-terminated copies, released with
//!   [`irweave_dispose_string`].
//! - A string accessor given a null owner returns null. A live owner that
//!   lacks the requested text (no name, no debug location, not an
//!   instruction) gets an owned empty string.
//!
//! Passing a handle of the wrong kind, or a handle that was already disposed,
//! is undefined behaviour. Null inputs are tolerated and answered with the
//! sentinel of the call.

use std::borrow::Cow;
use std::ffi::{c_char, CStr, CString};

use irweave_ir::{ModuleData, TypeNode, TypeRef, ValueNode, ValueRef};

pub mod iterators;
pub mod module;
pub mod types;
pub mod values;

/// Borrowed pointer to a value node.
pub type ValueHandle = *const ValueNode;
/// Borrowed pointer to a type node.
pub type TypeHandle = *const TypeNode;
/// Module pointer. Owned when returned by [`module::irweave_parse_wasm`],
/// borrowed when returned by [`values::irweave_get_global_parent`].
pub type ModuleHandle = *const ModuleData;

/// Borrowed view of a value handle; `None` for null.
///
/// # Safety
///
/// A non-null `handle` must point into a live module. The returned lifetime
/// is unbounded.
pub(crate) unsafe fn value<'a>(handle: ValueHandle) -> Option<ValueRef<'a>> {
    if handle.is_null() {
        return None;
    }
    Some(unsafe { ValueRef::from_raw(handle) })
}

/// Borrowed view of a type handle; `None` for null.
///
/// # Safety
///
/// Same contract as [`value`].
pub(crate) unsafe fn ty<'a>(handle: TypeHandle) -> Option<TypeRef<'a>> {
    if handle.is_null() {
        return None;
    }
    Some(unsafe { TypeRef::from_raw(handle) })
}

/// Borrowed view of a module handle; `None` for null.
///
/// # Safety
///
/// A non-null `handle` must name a live module.
pub(crate) unsafe fn module<'a>(handle: ModuleHandle) -> Option<&'a ModuleData> {
    unsafe { handle.as_ref() }
}

pub(crate) fn value_handle(value: Option<ValueRef<'_>>) -> ValueHandle {
    value.map_or(std::ptr::null(), |v| v.as_raw())
}

pub(crate) fn type_handle(ty: Option<TypeRef<'_>>) -> TypeHandle {
    ty.map_or(std::ptr::null(), |t| t.as_raw())
}

/// Caller-owned copy of `text`. Interior NULs are dropped.
pub(crate) fn create_string(text: &str) -> *const c_char {
    let bytes: Vec<u8> = text.bytes().filter(|&b| b != 0).collect();
    match CString::new(bytes) {
        Ok(owned) => owned.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

/// Caller-owned copy of an optional string; null for `None`.
pub(crate) fn string_handle(text: Option<String>) -> *const c_char {
    text.map_or(std::ptr::null(), |text| create_string(&text))
}

/// Text of a borrowed C string; `None` for null.
///
/// # Safety
///
/// A non-null `ptr` must be NUL-terminated and outlive the returned value.
pub(crate) unsafe fn borrowed_str<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
}

/// Releases a string returned by any `irweave_*` call.
///
/// # Safety
///
/// `text` must be null or a string returned by this library that was not
/// released yet.
#[no_mangle]
pub unsafe extern "C" fn irweave_dispose_string(text: *const c_char) {
    if text.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(text as *mut c_char) });
}

/// Takes back a string produced by this library and returns its text.
#[cfg(test)]
pub(crate) fn take_string(text: *const c_char) -> Option<String> {
    let owned = unsafe { borrowed_str(text) }.map(Cow::into_owned);
    unsafe { irweave_dispose_string(text) };
    owned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_and_drop_nuls() {
        assert_eq!(take_string(create_string("nounwind")).as_deref(), Some("nounwind"));
        assert_eq!(take_string(create_string("a\0b")).as_deref(), Some("ab"));
        assert_eq!(take_string(create_string("")).as_deref(), Some(""));
        assert_eq!(take_string(string_handle(None)), None);
    }

    #[test]
    fn null_handles_map_to_none() {
        unsafe {
            assert!(value(std::ptr::null()).is_none());
            assert!(ty(std::ptr::null()).is_none());
            assert!(module(std::ptr::null()).is_none());
        }
        assert!(value_handle(None).is_null());
        assert!(type_handle(None).is_null());
    }
}
