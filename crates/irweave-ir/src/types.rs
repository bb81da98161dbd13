//! Type table entries, typed indices and the borrowed [`TypeRef`] view.
//!
//! Types live in the module's type table and are referred to by [`TypeId`].
//! Literal types (everything except named structs) are uniqued, so two
//! `TypeId`s compare equal exactly when the types are structurally equal.

use std::fmt;
use std::ptr;

use crate::module::ModuleData;

/// Generic index type with a phantom tag to distinguish different index spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Idx<TAG> {
    idx: usize,
    _marker: std::marker::PhantomData<TAG>,
}

impl<TAG> Idx<TAG> {
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn as_usize(&self) -> usize {
        self.idx
    }
}

impl<TAG> From<Idx<TAG>> for usize {
    fn from(idx: Idx<TAG>) -> Self {
        idx.idx
    }
}

/// Marker type for type-table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag;

/// Index into the module's type table.
pub type TypeId = Idx<TypeTag>;

/// Structural description of one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Label,
    Integer(u32),
    Float,
    Double,
    /// Typed pointer; the payload is the pointee.
    Pointer(TypeId),
    Struct(StructBody),
    Array {
        element: TypeId,
        len: u64,
    },
    Vector {
        element: TypeId,
        len: u32,
    },
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        var_arg: bool,
    },
}

/// Body of a literal or named struct.
///
/// A named struct starts out opaque (no body) and receives its elements later,
/// which is how recursive types are expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructBody {
    pub name: Option<String>,
    pub elements: Vec<TypeId>,
    pub packed: bool,
    pub opaque: bool,
}

/// One entry of the type table.
///
/// Nodes are boxed so their address is stable; `owner` points back at the
/// module that holds the table.
#[derive(Debug)]
pub struct TypeNode {
    pub(crate) owner: *const ModuleData,
    pub(crate) id: TypeId,
    pub(crate) kind: TypeKind,
}

/// Borrowed view of a type, valid as long as the module is borrowed.
#[derive(Clone, Copy)]
pub struct TypeRef<'m> {
    module: &'m ModuleData,
    id: TypeId,
}

impl<'m> TypeRef<'m> {
    pub(crate) fn new(module: &'m ModuleData, id: TypeId) -> Self {
        Self { module, id }
    }

    /// Rebuilds a borrowed view from a node pointer produced by [`TypeRef::as_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`TypeRef::as_raw`] on a module that is still alive
    /// for `'m`, and that module must not be mutably borrowed during `'m`.
    pub unsafe fn from_raw(ptr: *const TypeNode) -> TypeRef<'m> {
        let node = &*ptr;
        TypeRef {
            module: &*node.owner,
            id: node.id,
        }
    }

    /// Stable address of the underlying node.
    pub fn as_raw(&self) -> *const TypeNode {
        self.module.type_node(self.id) as *const TypeNode
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn module(&self) -> &'m ModuleData {
        self.module
    }

    pub fn kind(&self) -> &'m TypeKind {
        &self.module.type_node(self.id).kind
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TypeKind::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind(), TypeKind::Pointer(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind(), TypeKind::Struct(_))
    }

    /// True for vectors and for arrays.
    pub fn is_vector(&self) -> bool {
        matches!(self.kind(), TypeKind::Vector { .. } | TypeKind::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind(), TypeKind::Function { .. })
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self.kind(), TypeKind::Float | TypeKind::Double)
    }

    /// Bit width of an integer type.
    pub fn int_width(&self) -> Option<u32> {
        match self.kind() {
            TypeKind::Integer(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Pointee of a pointer type, `None` for anything else.
    pub fn element_type(&self) -> Option<TypeRef<'m>> {
        match self.kind() {
            TypeKind::Pointer(pointee) => Some(self.module.ty(*pointee)),
            _ => None,
        }
    }

    /// Member types of a struct, `None` for anything else.
    pub fn struct_elements(&self) -> Option<&'m [TypeId]> {
        match self.kind() {
            TypeKind::Struct(body) => Some(&body.elements),
            _ => None,
        }
    }

    /// Number of struct members; 0 for non-struct types.
    pub fn num_elements(&self) -> u32 {
        self.struct_elements()
            .map_or(0, |elements| elements.len() as u32)
    }

    /// Struct member at `index`; `None` for non-struct types or out of range.
    pub fn type_at_index(&self, index: u32) -> Option<TypeRef<'m>> {
        let elements = self.struct_elements()?;
        elements
            .get(index as usize)
            .map(|&member| self.module.ty(member))
    }

    /// Element type of an array or vector, otherwise the type itself.
    pub fn scalar_type(&self) -> TypeRef<'m> {
        match self.kind() {
            TypeKind::Array { element, .. } | TypeKind::Vector { element, .. } => {
                self.module.ty(*element)
            }
            _ => *self,
        }
    }

    /// Name of a named struct, empty for every other type.
    pub fn name(&self) -> &'m str {
        match self.kind() {
            TypeKind::Struct(StructBody {
                name: Some(name), ..
            }) => name,
            _ => "",
        }
    }

    /// Return type of a function type.
    pub fn return_type(&self) -> Option<TypeRef<'m>> {
        match self.kind() {
            TypeKind::Function { ret, .. } => Some(self.module.ty(*ret)),
            _ => None,
        }
    }

    /// Parameter types of a function type.
    pub fn param_types(&self) -> &'m [TypeId] {
        match self.kind() {
            TypeKind::Function { params, .. } => params,
            _ => &[],
        }
    }
}

impl PartialEq for TypeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.module, other.module) && self.id == other.id
    }
}

impl Eq for TypeRef<'_> {}

impl fmt::Debug for TypeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({}: {})", self.id.as_usize(), self)
    }
}

impl fmt::Display for TypeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::printer::write_type(f, self.module, self.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::Module;

    #[test]
    fn pointer_queries() {
        let mut module = Module::new("types");
        let i32_ty = module.int_type(32);
        let ptr = module.pointer_type(i32_ty);

        let ptr_ref = module.ty(ptr);
        assert!(ptr_ref.is_pointer());
        assert_eq!(ptr_ref.element_type(), Some(module.ty(i32_ty)));
        assert_eq!(module.ty(i32_ty).element_type(), None);
    }

    #[test]
    fn literal_types_are_uniqued() {
        let mut module = Module::new("types");
        let a = module.int_type(64);
        let b = module.int_type(64);
        assert_eq!(a, b);

        let s1 = module.struct_type(&[a, a], false);
        let s2 = module.struct_type(&[b, b], false);
        let packed = module.struct_type(&[a, a], true);
        assert_eq!(s1, s2);
        assert_ne!(s1, packed);
    }

    #[test]
    fn struct_queries() {
        let mut module = Module::new("types");
        let i32_ty = module.int_type(32);
        let f64_ty = module.double_type();
        let pair = module.named_struct("Pair");
        module.set_struct_body(pair, &[i32_ty, f64_ty], false).unwrap();

        let pair_ref = module.ty(pair);
        assert!(pair_ref.is_struct());
        assert_eq!(pair_ref.name(), "Pair");
        assert_eq!(pair_ref.num_elements(), 2);
        assert_eq!(pair_ref.type_at_index(1), Some(module.ty(f64_ty)));
        assert_eq!(pair_ref.type_at_index(2), None);

        // Non-struct types answer with sentinels.
        let int_ref = module.ty(i32_ty);
        assert_eq!(int_ref.num_elements(), 0);
        assert_eq!(int_ref.type_at_index(0), None);
        assert_eq!(int_ref.name(), "");
    }

    #[test]
    fn scalar_type_of_aggregates() {
        let mut module = Module::new("types");
        let i8_ty = module.int_type(8);
        let f32_ty = module.float_type();
        let arr = module.array_type(i8_ty, 4);
        let vec = module.vector_type(f32_ty, 2);

        assert!(module.ty(arr).is_vector());
        assert!(module.ty(vec).is_vector());
        assert_eq!(module.ty(arr).scalar_type(), module.ty(i8_ty));
        assert_eq!(module.ty(vec).scalar_type(), module.ty(f32_ty));
        assert_eq!(module.ty(i8_ty).scalar_type(), module.ty(i8_ty));
    }

    #[test]
    fn raw_round_trip() {
        let mut module = Module::new("types");
        let i16_ty = module.int_type(16);
        let raw = module.ty(i16_ty).as_raw();
        let back = unsafe { crate::TypeRef::from_raw(raw) };
        assert_eq!(back, module.ty(i16_ty));
        assert_eq!(back.int_width(), Some(16));
    }
}
