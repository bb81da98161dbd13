//! Module lifetime and module-level lookups.

use std::ffi::c_char;

use irweave_ir::Module;
use log::{debug, warn};

use super::{borrowed_str, create_string, value_handle, ModuleHandle, ValueHandle};
use crate::{load_wasm, LoadOptions};

/// Imports a WebAssembly binary with the default [`LoadOptions`].
///
/// Returns an owned module, released with [`irweave_dispose_module`]. On
/// failure returns null and, when `out_error` is non-null, stores an owned
/// message there.
///
/// # Safety
///
/// `bytes` must point to `len` readable bytes. `out_error` must be null or
/// writable.
#[no_mangle]
pub unsafe extern "C" fn irweave_parse_wasm(
    bytes: *const u8,
    len: usize,
    out_error: *mut *const c_char,
) -> ModuleHandle {
    let input: &[u8] = if bytes.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(bytes, len) }
    };

    match load_wasm(input, &LoadOptions::default()) {
        Ok(module) => {
            debug!("imported module '{}' across the C boundary", module.name());
            module.into_raw()
        }
        Err(e) => {
            warn!("wasm import failed: {e:#}");
            if let Some(slot) = unsafe { out_error.as_mut() } {
                *slot = create_string(&format!("{e:#}"));
            }
            std::ptr::null()
        }
    }
}

/// Releases a module returned by [`irweave_parse_wasm`]. Every node and type
/// pointer obtained from it dangles afterwards. Null is a no-op.
///
/// # Safety
///
/// `module` must be null or an owned module that was not disposed yet.
#[no_mangle]
pub unsafe extern "C" fn irweave_dispose_module(module: ModuleHandle) {
    if module.is_null() {
        return;
    }
    debug!("disposing module");
    drop(unsafe { Module::from_raw(module) });
}

/// # Safety
///
/// `module` must be null or a live module.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_module_name(module: ModuleHandle) -> *const c_char {
    match unsafe { super::module(module) } {
        Some(module) => create_string(module.name()),
        None => std::ptr::null(),
    }
}

/// # Safety
///
/// `module` must be null or a live module.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_module_source_filename(module: ModuleHandle) -> *const c_char {
    match unsafe { super::module(module) } {
        Some(module) => create_string(module.source_filename()),
        None => std::ptr::null(),
    }
}

/// Textual form of the whole module.
///
/// # Safety
///
/// `module` must be null or a live module.
#[no_mangle]
pub unsafe extern "C" fn irweave_print_module_to_string(module: ModuleHandle) -> *const c_char {
    match unsafe { super::module(module) } {
        Some(module) => create_string(&module.to_string()),
        None => std::ptr::null(),
    }
}

/// Function named `name`, or null.
///
/// # Safety
///
/// `module` must be null or a live module; `name` must be null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_named_function(
    module: ModuleHandle,
    name: *const c_char,
) -> ValueHandle {
    let (Some(module), Some(name)) =
        (unsafe { super::module(module) }, unsafe { borrowed_str(name) })
    else {
        return std::ptr::null();
    };
    value_handle(module.get_function(&name))
}

/// Global variable named `name`, or null.
///
/// # Safety
///
/// Same contract as [`irweave_get_named_function`].
#[no_mangle]
pub unsafe extern "C" fn irweave_get_named_global(
    module: ModuleHandle,
    name: *const c_char,
) -> ValueHandle {
    let (Some(module), Some(name)) =
        (unsafe { super::module(module) }, unsafe { borrowed_str(name) })
    else {
        return std::ptr::null();
    };
    value_handle(module.get_global(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::take_string;

    fn parse(wat_text: &str) -> ModuleHandle {
        let wasm = wat::parse_str(wat_text).unwrap();
        let mut error = std::ptr::null();
        let module = unsafe { irweave_parse_wasm(wasm.as_ptr(), wasm.len(), &mut error) };
        assert!(error.is_null());
        assert!(!module.is_null());
        module
    }

    #[test]
    fn parse_lookup_and_dispose() {
        let module = parse(r#"(module (func (export "answer") (result i32) i32.const 42))"#);
        unsafe {
            let f = irweave_get_named_function(module, c"answer".as_ptr());
            assert!(!f.is_null());
            assert!(irweave_get_named_function(module, c"missing".as_ptr()).is_null());
            assert!(irweave_get_named_global(module, c"answer".as_ptr()).is_null());

            let text = take_string(irweave_print_module_to_string(module)).unwrap();
            assert!(text.contains("define i32 @answer()"));
            assert_eq!(take_string(irweave_get_module_name(module)).as_deref(), Some("wasm"));
            irweave_dispose_module(module);
        }
    }

    #[test]
    fn parse_failure_reports_an_owned_message() {
        let garbage = b"\0asm\x02\0\0\0";
        let mut error = std::ptr::null();
        let module = unsafe { irweave_parse_wasm(garbage.as_ptr(), garbage.len(), &mut error) };
        assert!(module.is_null());
        let message = take_string(error).unwrap();
        assert!(message.contains("failed to parse"), "{message}");

        // A null error slot is allowed.
        let module =
            unsafe { irweave_parse_wasm(garbage.as_ptr(), garbage.len(), std::ptr::null_mut()) };
        assert!(module.is_null());
    }

    #[test]
    fn null_module_is_tolerated() {
        unsafe {
            irweave_dispose_module(std::ptr::null());
            assert!(irweave_get_named_function(std::ptr::null(), c"f".as_ptr()).is_null());
            assert!(irweave_print_module_to_string(std::ptr::null()).is_null());
        }
    }
}
