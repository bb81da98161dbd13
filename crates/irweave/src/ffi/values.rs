//! Value accessors: naming, linkage, attributes, debug info and constants.
//!
//! # Safety
//!
//! Every `value` argument must be null or a live value node. Null answers
//! with the sentinel of the call; setters ignore it.

use std::ffi::c_char;

use irweave_ir::{kind_for_name, write_cfg, AttrKind, DllStorageClass, Linkage, Visibility};
use log::warn;

use super::{
    borrowed_str, create_string, string_handle, type_handle, value_handle, ModuleHandle, TypeHandle,
    ValueHandle,
};

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_print_value_to_string(value: ValueHandle) -> *const c_char {
    match unsafe { super::value(value) } {
        Some(value) => create_string(&value.to_string()),
        None => std::ptr::null(),
    }
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_value_name(value: ValueHandle) -> *const c_char {
    string_handle(unsafe { super::value(value) }.map(|v| v.name()))
}

/// # Safety
///
/// See the module documentation. `name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn irweave_set_value_name(value: ValueHandle, name: *const c_char) {
    if let (Some(value), Some(name)) =
        (unsafe { super::value(value) }, unsafe { borrowed_str(name) })
    {
        value.set_name(&name);
    }
}

/// Module that owns a function or global variable; null for other values.
/// The returned module is borrowed and must not be disposed.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_global_parent(value: ValueHandle) -> ModuleHandle {
    match unsafe { super::value(value) } {
        Some(value) if value.is_global_value() => std::ptr::from_ref(value.module()),
        _ => std::ptr::null(),
    }
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_type_of(value: ValueHandle) -> TypeHandle {
    type_handle(unsafe { super::value(value) }.map(|v| v.ty()))
}

/// Type of a global variable's contents; null for other values.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_global_get_value_type(value: ValueHandle) -> TypeHandle {
    type_handle(unsafe { super::value(value) }.and_then(|v| v.value_type()))
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_linkage(value: ValueHandle) -> i32 {
    unsafe { super::value(value) }.map_or(Linkage::default(), |v| v.linkage()).as_raw()
}

/// Out-of-range `linkage` values are ignored.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_set_linkage(value: ValueHandle, linkage: i32) {
    let Some(value) = (unsafe { super::value(value) }) else {
        return;
    };
    match Linkage::from_raw(linkage) {
        Some(linkage) => value.set_linkage(linkage),
        None => warn!("ignoring unknown linkage {linkage}"),
    }
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_visibility(value: ValueHandle) -> i32 {
    unsafe { super::value(value) }
        .map_or(Visibility::default(), |v| v.visibility())
        .as_raw()
}

/// Out-of-range `visibility` values are ignored.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_set_visibility(value: ValueHandle, visibility: i32) {
    let Some(value) = (unsafe { super::value(value) }) else {
        return;
    };
    match Visibility::from_raw(visibility) {
        Some(visibility) => value.set_visibility(visibility),
        None => warn!("ignoring unknown visibility {visibility}"),
    }
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_dll_storage_class(value: ValueHandle) -> i32 {
    unsafe { super::value(value) }
        .map_or(DllStorageClass::default(), |v| v.dll_storage_class())
        .as_raw()
}

/// Out-of-range `storage` values are ignored.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_set_dll_storage_class(value: ValueHandle, storage: i32) {
    let Some(value) = (unsafe { super::value(value) }) else {
        return;
    };
    match DllStorageClass::from_raw(storage) {
        Some(storage) => value.set_dll_storage_class(storage),
        None => warn!("ignoring unknown DLL storage class {storage}"),
    }
}

/// Numeric kind of the enum attribute spelled `name[..len]`; 0 when no
/// attribute has that name.
///
/// # Safety
///
/// `name` must be null or point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_enum_attribute_kind_for_name(
    name: *const c_char,
    len: usize,
) -> u32 {
    if name.is_null() {
        return 0;
    }
    let bytes = unsafe { std::slice::from_raw_parts(name.cast::<u8>(), len) };
    std::str::from_utf8(bytes).map_or(0, kind_for_name)
}

/// Adds the enum attribute `kind` to a function's function slot. Unknown
/// kinds and non-function values are ignored.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_add_function_attr(function: ValueHandle, kind: u32) {
    let Some(function) = (unsafe { super::value(function) }) else {
        return;
    };
    let Some(kind) = AttrKind::from_raw(kind) else {
        warn!("ignoring unknown attribute kind {kind}");
        return;
    };
    if !function.is_function() || !function.add_function_attribute(kind) {
        warn!("'{}' is not a function, attribute {} dropped", function.name(), kind.name());
    }
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_is_declaration(value: ValueHandle) -> bool {
    unsafe { super::value(value) }.is_some_and(|v| v.is_declaration())
}

/// Graphviz DOT text of a function's control-flow graph.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_write_cfg(
    function: ValueHandle,
    show_inst: bool,
) -> *const c_char {
    match unsafe { super::value(function) } {
        Some(function) => create_string(&write_cfg(function, show_inst)),
        None => std::ptr::null(),
    }
}

/// Opcode mnemonic of an instruction; empty for other values, null for null.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_opcode_name(value: ValueHandle) -> *const c_char {
    string_handle(unsafe { super::value(value) }.map(|v| v.opcode_name().to_string()))
}

/// File of an instruction's debug location; empty when there is none, null
/// for null.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_debug_info_get_filename(value: ValueHandle) -> *const c_char {
    string_handle(unsafe { super::value(value) }.map(|v| v.debug_filename().to_string()))
}

/// Line of an instruction's debug location; -1 when there is none.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_debug_info_get_line_number(value: ValueHandle) -> i64 {
    unsafe { super::value(value) }.map_or(-1, |v| v.debug_line())
}

/// The same node when it is an instruction, otherwise null.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_operand_to_instruction(value: ValueHandle) -> ValueHandle {
    value_handle(unsafe { super::value(value) }.and_then(|v| v.as_instruction()))
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_is_constant(value: ValueHandle) -> bool {
    unsafe { super::value(value) }.is_some_and(|v| v.is_constant())
}

/// Zero-extended bits of an integer constant, reinterpreted as `i64`. Only
/// meaningful once [`irweave_is_constant`] holds; 0 for anything else.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_constant_int_value(value: ValueHandle) -> i64 {
    unsafe { super::value(value) }
        .and_then(|v| v.const_int_value())
        .map_or(0, |bits| bits as i64)
}
