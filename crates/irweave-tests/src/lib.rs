//! Fixtures and C-boundary helpers shared by the integration tests and
//! benchmarks. Everything here goes through the exported `irweave_*`
//! symbols, the way a foreign caller would.

use std::ffi::{c_char, CStr, CString};

use anyhow::{bail, Result};
use irweave::ffi::iterators::*;
use irweave::ffi::module::{
    irweave_dispose_module, irweave_get_named_function, irweave_get_named_global,
    irweave_parse_wasm,
};
use irweave::ffi::{irweave_dispose_string, ModuleHandle, TypeHandle, ValueHandle};

/// Wasm binaries assembled from `data/wat` by the build script.
pub mod fixtures {
    include!(concat!(env!("OUT_DIR"), "/fixtures.rs"));
}

/// A module imported through [`irweave_parse_wasm`], disposed on drop.
pub struct LoadedModule {
    handle: ModuleHandle,
}

impl LoadedModule {
    pub fn parse(wasm: &[u8]) -> Result<Self> {
        let mut error = std::ptr::null();
        let handle = unsafe { irweave_parse_wasm(wasm.as_ptr(), wasm.len(), &mut error) };
        if handle.is_null() {
            let message = take_string(error).unwrap_or_default();
            bail!("import failed: {message}");
        }
        Ok(Self { handle })
    }

    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    /// Named function, or null.
    pub fn function(&self, name: &str) -> ValueHandle {
        let Ok(name) = CString::new(name) else {
            return std::ptr::null();
        };
        unsafe { irweave_get_named_function(self.handle, name.as_ptr()) }
    }

    /// Named global, or null.
    pub fn global(&self, name: &str) -> ValueHandle {
        let Ok(name) = CString::new(name) else {
            return std::ptr::null();
        };
        unsafe { irweave_get_named_global(self.handle, name.as_ptr()) }
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        unsafe { irweave_dispose_module(self.handle) };
    }
}

/// Copies out and releases a string returned by the library.
pub fn take_string(text: *const c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    let owned = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    unsafe { irweave_dispose_string(text) };
    Some(owned)
}

/// Calls `next` until the null sentinel, checks that further calls keep
/// returning it, then disposes the handle.
///
/// # Safety
///
/// `it` must be a live handle accepted by `next` and `dispose`.
pub unsafe fn drain<H, T>(
    it: *mut H,
    next: unsafe extern "C" fn(*mut H) -> *const T,
    dispose: unsafe extern "C" fn(*mut H),
) -> Vec<*const T> {
    let mut items = Vec::new();
    loop {
        let item = unsafe { next(it) };
        if item.is_null() {
            break;
        }
        items.push(item);
    }
    for _ in 0..3 {
        assert!(unsafe { next(it) }.is_null(), "exhausted iterator yielded again");
    }
    unsafe { dispose(it) };
    items
}

/// [`drain`] for attribute iterators; every returned string is released.
///
/// # Safety
///
/// Same contract as [`drain`].
pub unsafe fn drain_strings<H>(
    it: *mut H,
    next: unsafe extern "C" fn(*mut H) -> *const c_char,
    dispose: unsafe extern "C" fn(*mut H),
) -> Vec<String> {
    unsafe { drain(it, next, dispose) }
        .into_iter()
        .filter_map(take_string)
        .collect()
}

pub fn functions(module: &LoadedModule) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_functions_iter(module.handle()),
            irweave_functions_iter_next,
            irweave_dispose_functions_iter,
        )
    }
}

pub fn globals(module: &LoadedModule) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_globals_iter(module.handle()),
            irweave_globals_iter_next,
            irweave_dispose_globals_iter,
        )
    }
}

/// # Safety
///
/// `function` must be a live function node.
pub unsafe fn blocks(function: ValueHandle) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_blocks_iter(function),
            irweave_blocks_iter_next,
            irweave_dispose_blocks_iter,
        )
    }
}

/// # Safety
///
/// `function` must be a live function node.
pub unsafe fn arguments(function: ValueHandle) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_arguments_iter(function),
            irweave_arguments_iter_next,
            irweave_dispose_arguments_iter,
        )
    }
}

/// # Safety
///
/// `block` must be a live block node.
pub unsafe fn instructions(block: ValueHandle) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_instructions_iter(block),
            irweave_instructions_iter_next,
            irweave_dispose_instructions_iter,
        )
    }
}

/// # Safety
///
/// `instruction` must be a live instruction node.
pub unsafe fn operands(instruction: ValueHandle) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_operands_iter(instruction),
            irweave_operands_iter_next,
            irweave_dispose_operands_iter,
        )
    }
}

/// # Safety
///
/// `value` must be a live value node.
pub unsafe fn uses(value: ValueHandle) -> Vec<ValueHandle> {
    unsafe {
        drain(
            irweave_uses_iter(value),
            irweave_uses_iter_next,
            irweave_dispose_uses_iter,
        )
    }
}

/// # Safety
///
/// `ty` must be null or a live type node.
pub unsafe fn elements(ty: TypeHandle) -> Vec<TypeHandle> {
    unsafe {
        drain(
            irweave_elements_iter(ty),
            irweave_elements_iter_next,
            irweave_dispose_elements_iter,
        )
    }
}

/// Every instruction of `function`, block by block.
///
/// # Safety
///
/// `function` must be a live function node.
pub unsafe fn all_instructions(function: ValueHandle) -> Vec<ValueHandle> {
    unsafe { blocks(function) }
        .into_iter()
        .flat_map(|block| unsafe { instructions(block) })
        .collect()
}
