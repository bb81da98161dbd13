//! Value nodes and the borrowed [`ValueRef`] view.
//!
//! Every value (argument, block, instruction, function, global variable,
//! constant) is a boxed [`ValueNode`] in the module's arena. A node carries a
//! back-pointer to its module so a bare node pointer is enough to rebuild a
//! full view of the graph around it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;

use crate::attributes::{AttrIndex, AttrKind, Attribute, AttributeList, AttributeSet};
use crate::linkage::{DllStorageClass, Linkage, Visibility};
use crate::module::ModuleData;
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::types::{Idx, TypeId, TypeRef};

/// Marker type for value-arena indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueTag;

/// Index into the module's value arena.
pub type ValueId = Idx<ValueTag>;

/// One operand slot of `user` that refers to some value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: ValueId,
    pub operand_no: u32,
}

/// Source location attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl DebugLoc {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// Payload of a constant. Floats are stored as `f64` bits so constants can
/// be uniqued by hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(u64),
    Float { bits: u64 },
    Null,
    Undef,
}

impl Constant {
    pub fn float(value: f64) -> Self {
        Constant::Float {
            bits: value.to_bits(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Constant::Float { bits } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

/// Coarse classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    Argument,
    Block,
    Instruction,
    Function,
    Global,
    Constant,
}

/// Linkage, visibility and DLL storage class shared by functions and globals.
#[derive(Debug, Default)]
pub(crate) struct GlobalProps {
    pub(crate) linkage: Cell<Linkage>,
    pub(crate) visibility: Cell<Visibility>,
    pub(crate) storage: Cell<DllStorageClass>,
}

#[derive(Debug)]
pub(crate) struct ArgumentData {
    pub(crate) parent: ValueId,
    pub(crate) arg_no: u32,
}

#[derive(Debug)]
pub(crate) struct BlockData {
    pub(crate) parent: ValueId,
    pub(crate) first: Option<ValueId>,
    pub(crate) last: Option<ValueId>,
}

/// Opcode-specific data that does not fit in the operand list.
#[derive(Debug)]
pub(crate) enum InstDetail {
    None,
    ICmp(IntPredicate),
    FCmp(FloatPredicate),
    /// Allocated type.
    Alloca(TypeId),
    /// Source element type.
    Gep(TypeId),
    /// Incoming blocks, parallel to the operands.
    Phi(Vec<ValueId>),
    /// Call or invoke: callee function type and call-site attributes.
    Call {
        fn_type: TypeId,
        attributes: RefCell<AttributeList>,
    },
}

#[derive(Debug)]
pub(crate) struct InstructionData {
    pub(crate) opcode: Opcode,
    pub(crate) parent: ValueId,
    pub(crate) prev: Option<ValueId>,
    pub(crate) next: Option<ValueId>,
    pub(crate) operands: Vec<ValueId>,
    pub(crate) detail: InstDetail,
    pub(crate) debug_loc: Option<DebugLoc>,
}

#[derive(Debug)]
pub(crate) struct FunctionData {
    pub(crate) fn_type: TypeId,
    pub(crate) args: Vec<ValueId>,
    pub(crate) blocks: Vec<ValueId>,
    pub(crate) attributes: RefCell<AttributeList>,
    pub(crate) props: GlobalProps,
}

#[derive(Debug)]
pub(crate) struct GlobalData {
    pub(crate) value_type: TypeId,
    pub(crate) initializer: Option<ValueId>,
    pub(crate) constant: bool,
    pub(crate) attributes: RefCell<AttributeSet>,
    pub(crate) props: GlobalProps,
}

#[derive(Debug)]
pub(crate) enum ValueKind {
    Argument(ArgumentData),
    Block(BlockData),
    Instruction(InstructionData),
    Function(FunctionData),
    Global(GlobalData),
    Constant(Constant),
}

/// One entry of the value arena.
#[derive(Debug)]
pub struct ValueNode {
    pub(crate) owner: *const ModuleData,
    pub(crate) id: ValueId,
    pub(crate) ty: TypeId,
    pub(crate) name: RefCell<String>,
    /// Most recent use first.
    pub(crate) uses: Vec<Use>,
    pub(crate) kind: ValueKind,
}

/// Borrowed view of a value, valid as long as the module is borrowed.
#[derive(Clone, Copy)]
pub struct ValueRef<'m> {
    module: &'m ModuleData,
    id: ValueId,
}

impl<'m> ValueRef<'m> {
    pub(crate) fn new(module: &'m ModuleData, id: ValueId) -> Self {
        Self { module, id }
    }

    /// Rebuilds a borrowed view from a node pointer produced by [`ValueRef::as_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`ValueRef::as_raw`] on a module that is still alive
    /// for `'m`, and that module must not be mutably borrowed during `'m`.
    pub unsafe fn from_raw(ptr: *const ValueNode) -> ValueRef<'m> {
        let node = &*ptr;
        ValueRef {
            module: &*node.owner,
            id: node.id,
        }
    }

    /// Stable address of the underlying node.
    pub fn as_raw(&self) -> *const ValueNode {
        self.node() as *const ValueNode
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    /// The module this value belongs to.
    pub fn module(&self) -> &'m ModuleData {
        self.module
    }

    pub(crate) fn node(&self) -> &'m ValueNode {
        self.module.node(self.id)
    }

    fn value(&self, id: ValueId) -> ValueRef<'m> {
        ValueRef::new(self.module, id)
    }

    pub fn category(&self) -> ValueCategory {
        match &self.node().kind {
            ValueKind::Argument(_) => ValueCategory::Argument,
            ValueKind::Block(_) => ValueCategory::Block,
            ValueKind::Instruction(_) => ValueCategory::Instruction,
            ValueKind::Function(_) => ValueCategory::Function,
            ValueKind::Global(_) => ValueCategory::Global,
            ValueKind::Constant(_) => ValueCategory::Constant,
        }
    }

    pub fn is_argument(&self) -> bool {
        self.category() == ValueCategory::Argument
    }

    pub fn is_block(&self) -> bool {
        self.category() == ValueCategory::Block
    }

    pub fn is_instruction(&self) -> bool {
        self.category() == ValueCategory::Instruction
    }

    pub fn is_function(&self) -> bool {
        self.category() == ValueCategory::Function
    }

    pub fn is_global_variable(&self) -> bool {
        self.category() == ValueCategory::Global
    }

    /// Functions and global variables.
    pub fn is_global_value(&self) -> bool {
        matches!(
            self.category(),
            ValueCategory::Function | ValueCategory::Global
        )
    }

    pub fn is_constant(&self) -> bool {
        self.category() == ValueCategory::Constant
    }

    pub fn name(&self) -> String {
        self.node().name.borrow().clone()
    }

    pub fn has_name(&self) -> bool {
        !self.node().name.borrow().is_empty()
    }

    pub fn set_name(&self, name: &str) {
        *self.node().name.borrow_mut() = name.to_string();
    }

    pub fn ty(&self) -> TypeRef<'m> {
        self.module.ty(self.node().ty)
    }

    // ---- instructions ----

    pub(crate) fn instruction_data(&self) -> Option<&'m InstructionData> {
        match &self.node().kind {
            ValueKind::Instruction(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.instruction_data().map(|inst| inst.opcode)
    }

    /// Opcode name, empty for values that are not instructions.
    pub fn opcode_name(&self) -> &'static str {
        self.opcode().map_or("", Opcode::name)
    }

    /// `self` as an instruction, `None` when it is some other kind of value.
    pub fn as_instruction(&self) -> Option<ValueRef<'m>> {
        self.is_instruction().then_some(*self)
    }

    pub fn operand_ids(&self) -> &'m [ValueId] {
        self.instruction_data()
            .map_or(&[], |inst| inst.operands.as_slice())
    }

    pub fn num_operands(&self) -> usize {
        self.operand_ids().len()
    }

    pub fn operand(&self, index: usize) -> Option<ValueRef<'m>> {
        self.operand_ids().get(index).map(|&id| self.value(id))
    }

    pub fn next_instruction(&self) -> Option<ValueRef<'m>> {
        let next = self.instruction_data()?.next?;
        Some(self.value(next))
    }

    pub fn prev_instruction(&self) -> Option<ValueRef<'m>> {
        let prev = self.instruction_data()?.prev?;
        Some(self.value(prev))
    }

    pub fn int_predicate(&self) -> Option<IntPredicate> {
        match self.instruction_data()?.detail {
            InstDetail::ICmp(pred) => Some(pred),
            _ => None,
        }
    }

    pub fn float_predicate(&self) -> Option<FloatPredicate> {
        match self.instruction_data()?.detail {
            InstDetail::FCmp(pred) => Some(pred),
            _ => None,
        }
    }

    /// Allocated type of an `alloca`.
    pub fn allocated_type(&self) -> Option<TypeRef<'m>> {
        match self.instruction_data()?.detail {
            InstDetail::Alloca(ty) => Some(self.module.ty(ty)),
            _ => None,
        }
    }

    /// Source element type of a `getelementptr`.
    pub fn source_element_type(&self) -> Option<TypeRef<'m>> {
        match self.instruction_data()?.detail {
            InstDetail::Gep(ty) => Some(self.module.ty(ty)),
            _ => None,
        }
    }

    /// Incoming blocks of a `phi`, parallel to its operands.
    pub fn incoming_blocks(&self) -> &'m [ValueId] {
        match self.instruction_data().map(|inst| &inst.detail) {
            Some(InstDetail::Phi(blocks)) => blocks,
            _ => &[],
        }
    }

    /// Function type of the callee of a `call` or `invoke`.
    pub fn called_function_type(&self) -> Option<TypeRef<'m>> {
        match &self.instruction_data()?.detail {
            InstDetail::Call { fn_type, .. } => Some(self.module.ty(*fn_type)),
            _ => None,
        }
    }

    /// Callee of a `call` or `invoke` (always the last operand).
    pub fn called_value(&self) -> Option<ValueRef<'m>> {
        self.called_function_type()?;
        let callee = *self.operand_ids().last()?;
        Some(self.value(callee))
    }

    pub fn debug_loc(&self) -> Option<&'m DebugLoc> {
        self.instruction_data()?.debug_loc.as_ref()
    }

    /// File of the attached debug location, empty when there is none.
    pub fn debug_filename(&self) -> &'m str {
        self.debug_loc().map_or("", |loc| loc.file.as_str())
    }

    /// Line of the attached debug location, -1 when there is none.
    pub fn debug_line(&self) -> i64 {
        self.debug_loc().map_or(-1, |loc| i64::from(loc.line))
    }

    // ---- blocks, arguments, parents ----

    /// Enclosing block of an instruction, enclosing function of a block or
    /// argument.
    pub fn parent(&self) -> Option<ValueRef<'m>> {
        let parent = match &self.node().kind {
            ValueKind::Argument(arg) => arg.parent,
            ValueKind::Block(block) => block.parent,
            ValueKind::Instruction(inst) => inst.parent,
            _ => return None,
        };
        Some(self.value(parent))
    }

    pub fn arg_no(&self) -> Option<u32> {
        match &self.node().kind {
            ValueKind::Argument(arg) => Some(arg.arg_no),
            _ => None,
        }
    }

    pub fn first_instruction(&self) -> Option<ValueRef<'m>> {
        match &self.node().kind {
            ValueKind::Block(block) => block.first.map(|id| self.value(id)),
            _ => None,
        }
    }

    pub fn last_instruction(&self) -> Option<ValueRef<'m>> {
        match &self.node().kind {
            ValueKind::Block(block) => block.last.map(|id| self.value(id)),
            _ => None,
        }
    }

    /// Last instruction of a block when it is a terminator.
    pub fn terminator(&self) -> Option<ValueRef<'m>> {
        self.last_instruction()
            .filter(|inst| inst.opcode().is_some_and(Opcode::is_terminator))
    }

    pub(crate) fn function_data(&self) -> Option<&'m FunctionData> {
        match &self.node().kind {
            ValueKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub(crate) fn global_data(&self) -> Option<&'m GlobalData> {
        match &self.node().kind {
            ValueKind::Global(global) => Some(global),
            _ => None,
        }
    }

    pub fn block_ids(&self) -> &'m [ValueId] {
        self.function_data()
            .map_or(&[], |func| func.blocks.as_slice())
    }

    pub fn argument_ids(&self) -> &'m [ValueId] {
        self.function_data().map_or(&[], |func| func.args.as_slice())
    }

    pub fn entry_block(&self) -> Option<ValueRef<'m>> {
        self.block_ids().first().map(|&id| self.value(id))
    }

    pub fn function_type(&self) -> Option<TypeRef<'m>> {
        self.function_data().map(|func| self.module.ty(func.fn_type))
    }

    /// Functions without a body and globals without an initializer.
    pub fn is_declaration(&self) -> bool {
        match &self.node().kind {
            ValueKind::Function(func) => func.blocks.is_empty(),
            ValueKind::Global(global) => global.initializer.is_none(),
            _ => false,
        }
    }

    pub fn value_type(&self) -> Option<TypeRef<'m>> {
        self.global_data().map(|g| self.module.ty(g.value_type))
    }

    pub fn initializer(&self) -> Option<ValueRef<'m>> {
        let init = self.global_data()?.initializer?;
        Some(self.value(init))
    }

    pub fn is_global_constant(&self) -> bool {
        self.global_data().is_some_and(|g| g.constant)
    }

    // ---- uses ----

    pub fn uses(&self) -> &'m [Use] {
        &self.node().uses
    }

    pub fn users(&self) -> impl Iterator<Item = ValueRef<'m>> + 'm {
        let module = self.module;
        self.uses()
            .iter()
            .map(move |u| ValueRef::new(module, u.user))
    }

    // ---- constants ----

    pub fn constant(&self) -> Option<Constant> {
        match &self.node().kind {
            ValueKind::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Zero-extended value of an integer constant.
    pub fn const_int_value(&self) -> Option<u64> {
        match self.constant()? {
            Constant::Int(bits) => Some(bits),
            _ => None,
        }
    }

    // ---- linkage ----

    fn props(&self) -> Option<&'m GlobalProps> {
        match &self.node().kind {
            ValueKind::Function(func) => Some(&func.props),
            ValueKind::Global(global) => Some(&global.props),
            _ => None,
        }
    }

    /// Linkage of a global value; external for anything else.
    pub fn linkage(&self) -> Linkage {
        self.props().map_or_else(Linkage::default, |p| p.linkage.get())
    }

    /// Sets the linkage; ignored for values that are not global values.
    pub fn set_linkage(&self, linkage: Linkage) {
        if let Some(props) = self.props() {
            props.linkage.set(linkage);
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.props()
            .map_or_else(Visibility::default, |p| p.visibility.get())
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(props) = self.props() {
            props.visibility.set(visibility);
        }
    }

    pub fn dll_storage_class(&self) -> DllStorageClass {
        self.props()
            .map_or_else(DllStorageClass::default, |p| p.storage.get())
    }

    pub fn set_dll_storage_class(&self, storage: DllStorageClass) {
        if let Some(props) = self.props() {
            props.storage.set(storage);
        }
    }

    // ---- attributes ----

    /// Attribute list of a function or of a `call`/`invoke` site.
    pub fn attribute_list(&self) -> Option<&'m RefCell<AttributeList>> {
        match &self.node().kind {
            ValueKind::Function(func) => Some(&func.attributes),
            ValueKind::Instruction(InstructionData {
                detail: InstDetail::Call { attributes, .. },
                ..
            }) => Some(attributes),
            _ => None,
        }
    }

    /// Attribute set of a global variable.
    pub fn global_attributes(&self) -> Option<&'m RefCell<AttributeSet>> {
        self.global_data().map(|g| &g.attributes)
    }

    /// Attribute list of the enclosing function plus the slot of an argument.
    pub fn argument_attributes(&self) -> Option<(&'m RefCell<AttributeList>, AttrIndex)> {
        let arg_no = self.arg_no()?;
        let list = self.parent()?.attribute_list()?;
        Some((list, AttrIndex::Param(arg_no)))
    }

    /// Adds an attribute to a function or call site. Returns false when the
    /// value carries no attribute list.
    pub fn add_attribute(&self, index: AttrIndex, attr: Attribute) -> bool {
        match self.attribute_list() {
            Some(list) => {
                list.borrow_mut().add(index, attr);
                true
            }
            None => false,
        }
    }

    pub fn add_function_attribute(&self, kind: AttrKind) -> bool {
        self.add_attribute(AttrIndex::Function, Attribute::from_kind(kind, 0))
    }

    /// Adds an attribute to a global variable. Returns false for other values.
    pub fn add_global_attribute(&self, attr: Attribute) -> bool {
        match self.global_attributes() {
            Some(set) => {
                set.borrow_mut().add(attr);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for ValueRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.module, other.module) && self.id == other.id
    }
}

impl Eq for ValueRef<'_> {}

impl fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ValueRef({} {:?} {:?})",
            self.id.as_usize(),
            self.category(),
            self.node().name.borrow()
        )
    }
}

impl ValueRef<'_> {
    /// How the value reads when used as an operand, type included.
    pub fn as_operand(&self) -> String {
        crate::printer::operand_reference(*self)
    }
}

impl fmt::Display for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::printer::write_value(f, *self)
    }
}
