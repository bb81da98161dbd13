//! The module: type table, value arena and the structural mutation API.
//!
//! [`Module`] owns a heap-allocated [`ModuleData`] whose address never
//! changes, so node back-pointers and node pointers handed out through
//! [`ValueRef::as_raw`](crate::ValueRef::as_raw) stay valid until the module
//! is dropped. Reading happens through `&ModuleData` (`Module` derefs to it);
//! structural edits need `&mut Module`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

use anyhow::{bail, ensure, Result};
use log::trace;

use crate::attributes::{AttributeList, AttributeSet};
use crate::types::{StructBody, TypeId, TypeKind, TypeNode, TypeRef};
use crate::value::{
    ArgumentData, BlockData, Constant, DebugLoc, FunctionData, GlobalData, GlobalProps,
    InstructionData, Use, ValueId, ValueKind, ValueNode, ValueRef,
};

/// Graph storage shared by every node of one module.
#[derive(Debug)]
pub struct ModuleData {
    pub(crate) name: String,
    pub(crate) source_filename: String,
    pub(crate) types: Vec<Box<TypeNode>>,
    pub(crate) literal_types: HashMap<TypeKind, TypeId>,
    pub(crate) named_structs: HashMap<String, TypeId>,
    pub(crate) values: Vec<Box<ValueNode>>,
    pub(crate) constants: HashMap<(TypeId, Constant), ValueId>,
    pub(crate) functions: Vec<ValueId>,
    pub(crate) globals: Vec<ValueId>,
}

impl ModuleData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn value(&self, id: ValueId) -> ValueRef<'_> {
        ValueRef::new(self, id)
    }

    pub fn ty(&self, id: TypeId) -> TypeRef<'_> {
        TypeRef::new(self, id)
    }

    pub(crate) fn node(&self, id: ValueId) -> &ValueNode {
        &self.values[id.as_usize()]
    }

    pub(crate) fn type_node(&self, id: TypeId) -> &TypeNode {
        &self.types[id.as_usize()]
    }

    /// Functions in definition order.
    pub fn functions(&self) -> &[ValueId] {
        &self.functions
    }

    /// Global variables in definition order.
    pub fn globals(&self) -> &[ValueId] {
        &self.globals
    }

    pub fn get_function(&self, name: &str) -> Option<ValueRef<'_>> {
        self.find_named(&self.functions, name)
    }

    pub fn get_global(&self, name: &str) -> Option<ValueRef<'_>> {
        self.find_named(&self.globals, name)
    }

    fn find_named(&self, ids: &[ValueId], name: &str) -> Option<ValueRef<'_>> {
        ids.iter()
            .map(|&id| self.value(id))
            .find(|v| *v.node().name.borrow() == name)
    }

    pub fn get_struct_type(&self, name: &str) -> Option<TypeRef<'_>> {
        self.named_structs.get(name).map(|&id| self.ty(id))
    }

    /// Named structs in creation order.
    pub fn named_struct_types(&self) -> Vec<TypeRef<'_>> {
        let mut ids: Vec<TypeId> = self.named_structs.values().copied().collect();
        ids.sort();
        ids.into_iter().map(|id| self.ty(id)).collect()
    }

    fn symbol_taken(&self, name: &str) -> bool {
        self.get_function(name).is_some() || self.get_global(name).is_some()
    }

    /// `name`, or `name.N` for the first free `N` when `name` is taken.
    fn unique_symbol(&self, name: &str) -> String {
        if name.is_empty() || !self.symbol_taken(name) {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{name}.{n}"))
            .find(|candidate| !self.symbol_taken(candidate))
            .unwrap_or_default()
    }
}

impl fmt::Display for ModuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::printer::write_module(f, self)
    }
}

/// Owner of one IR graph.
pub struct Module {
    data: NonNull<ModuleData>,
}

impl Deref for Module {
    type Target = ModuleData;

    fn deref(&self) -> &ModuleData {
        // SAFETY: `data` comes from `Box::leak` and is only freed in `drop`.
        unsafe { self.data.as_ref() }
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        // SAFETY: `data` comes from `Box::leak` and is freed exactly once.
        unsafe { drop(Box::from_raw(self.data.as_ptr())) }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let data = Box::new(ModuleData {
            name: name.into(),
            source_filename: String::new(),
            types: Vec::new(),
            literal_types: HashMap::new(),
            named_structs: HashMap::new(),
            values: Vec::new(),
            constants: HashMap::new(),
            functions: Vec::new(),
            globals: Vec::new(),
        });
        Module {
            data: NonNull::from(Box::leak(data)),
        }
    }

    /// Gives up ownership; the graph stays alive until [`Module::from_raw`]
    /// takes it back.
    pub fn into_raw(self) -> *const ModuleData {
        let ptr = self.data.as_ptr() as *const ModuleData;
        std::mem::forget(self);
        ptr
    }

    /// Takes back ownership of a graph released by [`Module::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Module::into_raw`] and must not have been
    /// reclaimed already.
    pub unsafe fn from_raw(ptr: *const ModuleData) -> Module {
        Module {
            data: NonNull::new_unchecked(ptr as *mut ModuleData),
        }
    }

    fn owner(&self) -> *const ModuleData {
        self.data.as_ptr() as *const ModuleData
    }

    pub(crate) fn data_mut(&mut self) -> &mut ModuleData {
        // SAFETY: `&mut self` guarantees exclusive access to the graph.
        unsafe { self.data.as_mut() }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.data_mut().name = name.into();
    }

    pub fn set_source_filename(&mut self, name: impl Into<String>) {
        self.data_mut().source_filename = name.into();
    }

    // ---- types ----

    fn push_type(&mut self, kind: TypeKind) -> TypeId {
        let owner = self.owner();
        let data = self.data_mut();
        let id = TypeId::new(data.types.len());
        data.types.push(Box::new(TypeNode { owner, id, kind }));
        id
    }

    fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.literal_types.get(&kind) {
            return id;
        }
        let id = self.push_type(kind.clone());
        self.data_mut().literal_types.insert(kind, id);
        id
    }

    pub fn void_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Void)
    }

    pub fn label_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Label)
    }

    pub fn int_type(&mut self, bits: u32) -> TypeId {
        self.intern_type(TypeKind::Integer(bits))
    }

    pub fn float_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Float)
    }

    pub fn double_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Double)
    }

    pub fn pointer_type(&mut self, pointee: TypeId) -> TypeId {
        self.intern_type(TypeKind::Pointer(pointee))
    }

    pub fn array_type(&mut self, element: TypeId, len: u64) -> TypeId {
        self.intern_type(TypeKind::Array { element, len })
    }

    pub fn vector_type(&mut self, element: TypeId, len: u32) -> TypeId {
        self.intern_type(TypeKind::Vector { element, len })
    }

    pub fn function_type(&mut self, ret: TypeId, params: &[TypeId], var_arg: bool) -> TypeId {
        self.intern_type(TypeKind::Function {
            ret,
            params: params.to_vec(),
            var_arg,
        })
    }

    /// Literal (unnamed) struct.
    pub fn struct_type(&mut self, elements: &[TypeId], packed: bool) -> TypeId {
        self.intern_type(TypeKind::Struct(StructBody {
            name: None,
            elements: elements.to_vec(),
            packed,
            opaque: false,
        }))
    }

    /// Opaque named struct; returns the existing type when the name is taken.
    pub fn named_struct(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.named_structs.get(name) {
            return id;
        }
        let id = self.push_type(TypeKind::Struct(StructBody {
            name: Some(name.to_string()),
            elements: Vec::new(),
            packed: false,
            opaque: true,
        }));
        self.data_mut().named_structs.insert(name.to_string(), id);
        id
    }

    pub fn set_struct_body(&mut self, ty: TypeId, elements: &[TypeId], packed: bool) -> Result<()> {
        let node = &mut self.data_mut().types[ty.as_usize()];
        match &mut node.kind {
            TypeKind::Struct(body) if body.name.is_some() => {
                body.elements = elements.to_vec();
                body.packed = packed;
                body.opaque = false;
                Ok(())
            }
            other => bail!("cannot set a struct body on {other:?}"),
        }
    }

    // ---- values ----

    pub(crate) fn push_value(&mut self, ty: TypeId, name: &str, kind: ValueKind) -> ValueId {
        let owner = self.owner();
        let data = self.data_mut();
        let id = ValueId::new(data.values.len());
        data.values.push(Box::new(ValueNode {
            owner,
            id,
            ty,
            name: RefCell::new(name.to_string()),
            uses: Vec::new(),
            kind,
        }));
        id
    }

    pub(crate) fn node_mut(&mut self, id: ValueId) -> &mut ValueNode {
        &mut self.data_mut().values[id.as_usize()]
    }

    pub(crate) fn instruction_mut(&mut self, id: ValueId) -> Option<&mut InstructionData> {
        match &mut self.node_mut(id).kind {
            ValueKind::Instruction(inst) => Some(inst),
            _ => None,
        }
    }

    pub(crate) fn block_mut(&mut self, id: ValueId) -> Option<&mut BlockData> {
        match &mut self.node_mut(id).kind {
            ValueKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Links a new use at the head of `value`'s use-list.
    pub(crate) fn add_use(&mut self, value: ValueId, user: ValueId, operand_no: u32) {
        self.node_mut(value)
            .uses
            .insert(0, Use { user, operand_no });
    }

    pub(crate) fn remove_use(&mut self, value: ValueId, user: ValueId, operand_no: u32) {
        let uses = &mut self.node_mut(value).uses;
        if let Some(at) = uses
            .iter()
            .position(|u| u.user == user && u.operand_no == operand_no)
        {
            uses.remove(at);
        }
    }

    fn constant(&mut self, ty: TypeId, constant: Constant) -> ValueId {
        if let Some(&id) = self.constants.get(&(ty, constant)) {
            return id;
        }
        let id = self.push_value(ty, "", ValueKind::Constant(constant));
        self.data_mut().constants.insert((ty, constant), id);
        id
    }

    /// Integer constant; `value` is truncated to the type's width.
    pub fn const_int(&mut self, ty: TypeId, value: u64) -> ValueId {
        let bits = match self.ty(ty).int_width() {
            Some(width) if width < 64 => value & ((1u64 << width) - 1),
            _ => value,
        };
        self.constant(ty, Constant::Int(bits))
    }

    pub fn const_float(&mut self, ty: TypeId, value: f64) -> ValueId {
        self.constant(ty, Constant::float(value))
    }

    /// `null` for pointers, `zeroinitializer` for aggregates.
    pub fn const_null(&mut self, ty: TypeId) -> ValueId {
        self.constant(ty, Constant::Null)
    }

    pub fn undef(&mut self, ty: TypeId) -> ValueId {
        self.constant(ty, Constant::Undef)
    }

    /// Adds a function with one argument per parameter of `fn_type`. The
    /// function's own type is a pointer to `fn_type`.
    pub fn add_function(&mut self, name: &str, fn_type: TypeId) -> Result<ValueId> {
        let params = match self.ty(fn_type).kind() {
            TypeKind::Function { params, .. } => params.clone(),
            other => bail!("function '{name}' needs a function type, got {other:?}"),
        };
        let name = self.unique_symbol(name);
        let ptr_ty = self.pointer_type(fn_type);
        let func = self.push_value(
            ptr_ty,
            &name,
            ValueKind::Function(FunctionData {
                fn_type,
                args: Vec::new(),
                blocks: Vec::new(),
                attributes: RefCell::new(AttributeList::new()),
                props: GlobalProps::default(),
            }),
        );

        let args: Vec<ValueId> = params
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                self.push_value(
                    ty,
                    "",
                    ValueKind::Argument(ArgumentData {
                        parent: func,
                        arg_no: i as u32,
                    }),
                )
            })
            .collect();
        if let ValueKind::Function(data) = &mut self.node_mut(func).kind {
            data.args = args;
        }
        self.data_mut().functions.push(func);
        trace!("added function @{name}");
        Ok(func)
    }

    /// Appends an empty block to `function`.
    pub fn append_block(&mut self, function: ValueId, name: &str) -> Result<ValueId> {
        ensure!(
            self.value(function).is_function(),
            "blocks can only be appended to functions"
        );
        let label = self.label_type();
        let block = self.push_value(
            label,
            name,
            ValueKind::Block(BlockData {
                parent: function,
                first: None,
                last: None,
            }),
        );
        if let ValueKind::Function(data) = &mut self.node_mut(function).kind {
            data.blocks.push(block);
        }
        Ok(block)
    }

    /// Adds a global variable without initializer (a declaration). The
    /// global's own type is a pointer to `value_type`.
    pub fn add_global(&mut self, name: &str, value_type: TypeId) -> ValueId {
        let name = self.unique_symbol(name);
        let ptr_ty = self.pointer_type(value_type);
        let global = self.push_value(
            ptr_ty,
            &name,
            ValueKind::Global(GlobalData {
                value_type,
                initializer: None,
                constant: false,
                attributes: RefCell::new(AttributeSet::new()),
                props: GlobalProps::default(),
            }),
        );
        self.data_mut().globals.push(global);
        trace!("added global @{name}");
        global
    }

    pub fn set_initializer(&mut self, global: ValueId, init: ValueId) -> Result<()> {
        let previous = match &self.node(global).kind {
            ValueKind::Global(data) => {
                ensure!(
                    self.node(init).ty == data.value_type,
                    "initializer type does not match the global's value type"
                );
                data.initializer
            }
            _ => bail!("only global variables have initializers"),
        };
        if let Some(old) = previous {
            self.remove_use(old, global, 0);
        }
        if let ValueKind::Global(data) = &mut self.node_mut(global).kind {
            data.initializer = Some(init);
        }
        self.add_use(init, global, 0);
        Ok(())
    }

    pub fn set_global_constant(&mut self, global: ValueId, constant: bool) {
        if let ValueKind::Global(data) = &mut self.node_mut(global).kind {
            data.constant = constant;
        }
    }

    pub fn set_debug_loc(&mut self, inst: ValueId, loc: Option<DebugLoc>) {
        if let Some(data) = self.instruction_mut(inst) {
            data.debug_loc = loc;
        }
    }

    /// Replaces operand `index` of `inst`, keeping both use-lists current.
    pub fn set_operand(&mut self, inst: ValueId, index: usize, value: ValueId) -> Result<()> {
        let old = match self.value(inst).operand_ids().get(index) {
            Some(&old) => old,
            None => bail!("instruction has no operand {index}"),
        };
        self.remove_use(old, inst, index as u32);
        if let Some(data) = self.instruction_mut(inst) {
            data.operands[index] = value;
        }
        self.add_use(value, inst, index as u32);
        Ok(())
    }
}
