//! Type introspection.
//!
//! # Safety
//!
//! Every `ty` argument must be null or a live type node. Null answers with
//! the sentinel of the call.

use std::ffi::c_char;

use super::{create_string, string_handle, type_handle, TypeHandle};

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_print_type_to_string(ty: TypeHandle) -> *const c_char {
    match unsafe { super::ty(ty) } {
        Some(ty) => create_string(&ty.to_string()),
        None => std::ptr::null(),
    }
}

/// Name of a named struct; empty for every other type, null for null.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_type_name(ty: TypeHandle) -> *const c_char {
    string_handle(unsafe { super::ty(ty) }.map(|ty| ty.name().to_string()))
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_type_is_pointer(ty: TypeHandle) -> bool {
    unsafe { super::ty(ty) }.is_some_and(|ty| ty.is_pointer())
}

/// Pointee of a pointer type; null for anything else.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_element_type(ty: TypeHandle) -> TypeHandle {
    type_handle(unsafe { super::ty(ty) }.and_then(|ty| ty.element_type()))
}

/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_type_is_struct(ty: TypeHandle) -> bool {
    unsafe { super::ty(ty) }.is_some_and(|ty| ty.is_struct())
}

/// Member count of a struct; 0 for anything else.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_num_elements(ty: TypeHandle) -> u32 {
    unsafe { super::ty(ty) }.map_or(0, |ty| ty.num_elements())
}

/// Struct member at `index`; null for non-struct types or out of range.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_type_at_index(ty: TypeHandle, index: u32) -> TypeHandle {
    type_handle(unsafe { super::ty(ty) }.and_then(|ty| ty.type_at_index(index)))
}

/// True for arrays and vectors.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_type_is_vector(ty: TypeHandle) -> bool {
    unsafe { super::ty(ty) }.is_some_and(|ty| ty.is_vector())
}

/// Element type of an array or vector, otherwise the type itself.
///
/// # Safety
///
/// See the module documentation.
#[no_mangle]
pub unsafe extern "C" fn irweave_get_scalar_type(ty: TypeHandle) -> TypeHandle {
    type_handle(unsafe { super::ty(ty) }.map(|ty| ty.scalar_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::take_string;
    use irweave_ir::Module;

    #[test]
    fn struct_and_pointer_queries() {
        let mut module = Module::new("types");
        let i8_ty = module.int_type(8);
        let f64_ty = module.double_type();
        let point = module.named_struct("Point");
        module.set_struct_body(point, &[f64_ty, f64_ty], false).unwrap();
        let ptr = module.pointer_type(point);
        let bytes = module.array_type(i8_ty, 4);

        let point = module.ty(point).as_raw();
        let ptr = module.ty(ptr).as_raw();
        let bytes = module.ty(bytes).as_raw();
        let i8_raw = module.ty(i8_ty).as_raw();
        unsafe {
            assert_eq!(take_string(irweave_get_type_name(point)).as_deref(), Some("Point"));
            assert_eq!(take_string(irweave_get_type_name(i8_raw)).as_deref(), Some(""));
            assert_eq!(take_string(irweave_print_type_to_string(ptr)).as_deref(), Some("%Point*"));

            assert!(irweave_type_is_pointer(ptr));
            assert_eq!(irweave_get_element_type(ptr), point);
            assert!(irweave_get_element_type(point).is_null());

            assert!(irweave_type_is_struct(point));
            assert_eq!(irweave_get_num_elements(point), 2);
            assert_eq!(irweave_get_num_elements(ptr), 0);
            assert!(!irweave_get_type_at_index(point, 1).is_null());
            assert!(irweave_get_type_at_index(point, 2).is_null());
            assert!(irweave_get_type_at_index(bytes, 0).is_null());

            assert!(irweave_type_is_vector(bytes));
            assert_eq!(irweave_get_scalar_type(bytes), i8_raw);
            assert_eq!(irweave_get_scalar_type(i8_raw), i8_raw);
        }
    }

    #[test]
    fn null_types_answer_sentinels() {
        unsafe {
            assert!(!irweave_type_is_pointer(std::ptr::null()));
            assert_eq!(irweave_get_num_elements(std::ptr::null()), 0);
            assert!(irweave_get_scalar_type(std::ptr::null()).is_null());
            assert!(irweave_print_type_to_string(std::ptr::null()).is_null());
        }
    }
}
