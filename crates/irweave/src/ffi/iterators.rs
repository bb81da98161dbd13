//! Opaque iterator handles, one type per collection kind.
//!
//! Every handle owns one adapter from [`crate::iter`]. `*_next` returns the
//! element at the cursor and advances, or the null sentinel once exhausted.
//! Attribute iterators return caller-owned strings, released with
//! [`irweave_dispose_string`](super::irweave_dispose_string); all other
//! iterators return borrowed node pointers.
//!
//! # Safety
//!
//! Owners passed to a constructor must be null or live nodes of the kind the
//! constructor names, and the owning module must outlive the handle. A
//! handle is disposed exactly once and never used afterwards.

use std::ffi::c_char;

use log::debug;

use super::{string_handle, type_handle, value_handle, ModuleHandle, TypeHandle, ValueHandle};
use crate::iter::{
    self, AttributeListIter, AttributeSetIter, ElementsIter, InstructionsIter, UsesIter, ValuesIter,
};

/// Defines a handle type together with its `next` and `dispose` symbols.
macro_rules! iterator_handle {
    (
        $(#[$meta:meta])*
        $handle:ident($adapter:ident) -> $out:ty = $project:path;
        next: $next:ident;
        dispose: $dispose:ident;
    ) => {
        $(#[$meta])*
        pub struct $handle($adapter<'static>);

        /// Element at the cursor, then advances; null once exhausted.
        ///
        /// # Safety
        ///
        /// `it` must be null or a live handle of this kind.
        #[no_mangle]
        pub unsafe extern "C" fn $next(it: *mut $handle) -> $out {
            match unsafe { it.as_mut() } {
                Some(handle) => $project(handle.0.next()),
                None => $project(None),
            }
        }

        /// Releases the handle. Null is a no-op.
        ///
        /// # Safety
        ///
        /// `it` must be null or a live handle of this kind.
        #[no_mangle]
        pub unsafe extern "C" fn $dispose(it: *mut $handle) {
            if it.is_null() {
                return;
            }
            debug!("disposing {}", stringify!($handle));
            drop(unsafe { Box::from_raw(it) });
        }
    };
}

fn into_handle<H>(kind: &str, handle: H) -> *mut H {
    debug!("creating {kind} iterator");
    Box::into_raw(Box::new(handle))
}

iterator_handle! {
    /// Flattened attribute list of a function or call site.
    AttributeListIterator(AttributeListIter) -> *const c_char = string_handle;
    next: irweave_attribute_list_iter_next;
    dispose: irweave_dispose_attribute_list_iter;
}

iterator_handle! {
    /// Attribute set of one argument or one global variable.
    AttributeSetIterator(AttributeSetIter) -> *const c_char = string_handle;
    next: irweave_attribute_set_iter_next;
    dispose: irweave_dispose_attribute_set_iter;
}

iterator_handle! {
    BlocksIterator(ValuesIter) -> ValueHandle = value_handle;
    next: irweave_blocks_iter_next;
    dispose: irweave_dispose_blocks_iter;
}

iterator_handle! {
    ArgumentsIterator(ValuesIter) -> ValueHandle = value_handle;
    next: irweave_arguments_iter_next;
    dispose: irweave_dispose_arguments_iter;
}

iterator_handle! {
    InstructionsIterator(InstructionsIter) -> ValueHandle = value_handle;
    next: irweave_instructions_iter_next;
    dispose: irweave_dispose_instructions_iter;
}

iterator_handle! {
    /// Yields the referent of each operand.
    OperandsIterator(ValuesIter) -> ValueHandle = value_handle;
    next: irweave_operands_iter_next;
    dispose: irweave_dispose_operands_iter;
}

iterator_handle! {
    /// Yields the user of each use.
    UsesIterator(UsesIter) -> ValueHandle = value_handle;
    next: irweave_uses_iter_next;
    dispose: irweave_dispose_uses_iter;
}

iterator_handle! {
    ElementsIterator(ElementsIter) -> TypeHandle = type_handle;
    next: irweave_elements_iter_next;
    dispose: irweave_dispose_elements_iter;
}

iterator_handle! {
    FunctionsIterator(ValuesIter) -> ValueHandle = value_handle;
    next: irweave_functions_iter_next;
    dispose: irweave_dispose_functions_iter;
}

iterator_handle! {
    GlobalsIterator(ValuesIter) -> ValueHandle = value_handle;
    next: irweave_globals_iter_next;
    dispose: irweave_dispose_globals_iter;
}

/// # Safety
///
/// `function` must be null or a live function node.
#[no_mangle]
pub unsafe extern "C" fn irweave_function_attributes_iter(
    function: ValueHandle,
) -> *mut AttributeListIterator {
    let Some(function) = (unsafe { super::value(function) }) else {
        return std::ptr::null_mut();
    };
    into_handle(
        "function attribute",
        AttributeListIterator(iter::function_attributes(function)),
    )
}

/// # Safety
///
/// `call` must be null or a live `call` instruction.
#[no_mangle]
pub unsafe extern "C" fn irweave_call_attributes_iter(
    call: ValueHandle,
) -> *mut AttributeListIterator {
    let Some(call) = (unsafe { super::value(call) }) else {
        return std::ptr::null_mut();
    };
    into_handle(
        "call attribute",
        AttributeListIterator(iter::call_site_attributes(call)),
    )
}

/// # Safety
///
/// `invoke` must be null or a live `invoke` instruction.
#[no_mangle]
pub unsafe extern "C" fn irweave_invoke_attributes_iter(
    invoke: ValueHandle,
) -> *mut AttributeListIterator {
    let Some(invoke) = (unsafe { super::value(invoke) }) else {
        return std::ptr::null_mut();
    };
    into_handle(
        "invoke attribute",
        AttributeListIterator(iter::call_site_attributes(invoke)),
    )
}

/// # Safety
///
/// `argument` must be null or a live argument node.
#[no_mangle]
pub unsafe extern "C" fn irweave_argument_attributes_iter(
    argument: ValueHandle,
) -> *mut AttributeSetIterator {
    let Some(argument) = (unsafe { super::value(argument) }) else {
        return std::ptr::null_mut();
    };
    into_handle(
        "argument attribute",
        AttributeSetIterator(iter::argument_attributes(argument)),
    )
}

/// # Safety
///
/// `global` must be null or a live global variable.
#[no_mangle]
pub unsafe extern "C" fn irweave_global_attributes_iter(
    global: ValueHandle,
) -> *mut AttributeSetIterator {
    let Some(global) = (unsafe { super::value(global) }) else {
        return std::ptr::null_mut();
    };
    into_handle(
        "global attribute",
        AttributeSetIterator(iter::global_attributes(global)),
    )
}

/// # Safety
///
/// `function` must be null or a live function node.
#[no_mangle]
pub unsafe extern "C" fn irweave_blocks_iter(function: ValueHandle) -> *mut BlocksIterator {
    let Some(function) = (unsafe { super::value(function) }) else {
        return std::ptr::null_mut();
    };
    into_handle("blocks", BlocksIterator(iter::blocks(function)))
}

/// # Safety
///
/// `function` must be null or a live function node.
#[no_mangle]
pub unsafe extern "C" fn irweave_arguments_iter(function: ValueHandle) -> *mut ArgumentsIterator {
    let Some(function) = (unsafe { super::value(function) }) else {
        return std::ptr::null_mut();
    };
    into_handle("arguments", ArgumentsIterator(iter::arguments(function)))
}

/// # Safety
///
/// `block` must be null or a live basic block.
#[no_mangle]
pub unsafe extern "C" fn irweave_instructions_iter(
    block: ValueHandle,
) -> *mut InstructionsIterator {
    let Some(block) = (unsafe { super::value(block) }) else {
        return std::ptr::null_mut();
    };
    into_handle("instructions", InstructionsIterator(iter::instructions(block)))
}

/// # Safety
///
/// `instruction` must be null or a live instruction.
#[no_mangle]
pub unsafe extern "C" fn irweave_operands_iter(instruction: ValueHandle) -> *mut OperandsIterator {
    let Some(instruction) = (unsafe { super::value(instruction) }) else {
        return std::ptr::null_mut();
    };
    into_handle("operands", OperandsIterator(iter::operands(instruction)))
}

/// # Safety
///
/// `value` must be null or a live value node.
#[no_mangle]
pub unsafe extern "C" fn irweave_uses_iter(value: ValueHandle) -> *mut UsesIterator {
    let Some(value) = (unsafe { super::value(value) }) else {
        return std::ptr::null_mut();
    };
    into_handle("uses", UsesIterator(iter::uses(value)))
}

/// Member types of a struct. Null for every other type.
///
/// # Safety
///
/// `ty` must be null or a live type node.
#[no_mangle]
pub unsafe extern "C" fn irweave_elements_iter(ty: TypeHandle) -> *mut ElementsIterator {
    let Some(ty) = (unsafe { super::ty(ty) }) else {
        return std::ptr::null_mut();
    };
    match iter::elements(ty) {
        Some(elements) => into_handle("elements", ElementsIterator(elements)),
        None => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// `module` must be null or a live module.
#[no_mangle]
pub unsafe extern "C" fn irweave_functions_iter(module: ModuleHandle) -> *mut FunctionsIterator {
    let Some(module) = (unsafe { super::module(module) }) else {
        return std::ptr::null_mut();
    };
    into_handle("functions", FunctionsIterator(iter::functions(module)))
}

/// # Safety
///
/// `module` must be null or a live module.
#[no_mangle]
pub unsafe extern "C" fn irweave_globals_iter(module: ModuleHandle) -> *mut GlobalsIterator {
    let Some(module) = (unsafe { super::module(module) }) else {
        return std::ptr::null_mut();
    };
    into_handle("globals", GlobalsIterator(iter::globals(module)))
}
