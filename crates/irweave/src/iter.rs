//! Adapter instantiations, one per traversable collection kind.
//!
//! Each constructor captures the owner's current range and returns a fused
//! iterator whose elements borrow the module. Owners of the wrong kind get an
//! empty range.

use std::cell::RefCell;

use irweave_ir::{
    AttrIndex, Attribute, AttributeList, AttributeSet, ModuleData, TypeId, TypeRef, Use, ValueId,
    ValueRef,
};

use crate::adapter::{Adapter, Indexed, Traversal};

/// Blocks, arguments, operands, module functions and module globals.
pub type ValuesIter<'m> = Adapter<Indexed<'m, &'m ModuleData, ValueId, ValueRef<'m>>>;
pub type BlocksIter<'m> = ValuesIter<'m>;
pub type ArgumentsIter<'m> = ValuesIter<'m>;
pub type OperandsIter<'m> = ValuesIter<'m>;
pub type FunctionsIter<'m> = ValuesIter<'m>;
pub type GlobalsIter<'m> = ValuesIter<'m>;
/// Users of a value, in use-list order.
pub type UsesIter<'m> = Adapter<Indexed<'m, &'m ModuleData, Use, ValueRef<'m>>>;
pub type ElementsIter<'m> = Adapter<Indexed<'m, &'m ModuleData, TypeId, TypeRef<'m>>>;
pub type InstructionsIter<'m> = Adapter<Linked<'m>>;
pub type AttributeListIter<'m> = Adapter<FlattenedAttributes<'m>>;
pub type AttributeSetIter<'m> = Adapter<SlotAttributes<'m>>;

fn value_at<'m>(module: &'m ModuleData, id: &'m ValueId) -> Option<ValueRef<'m>> {
    Some(module.value(*id))
}

fn user_of<'m>(module: &'m ModuleData, use_: &'m Use) -> Option<ValueRef<'m>> {
    Some(module.value(use_.user))
}

fn type_at<'m>(module: &'m ModuleData, id: &'m TypeId) -> Option<TypeRef<'m>> {
    Some(module.ty(*id))
}

pub fn blocks(function: ValueRef<'_>) -> BlocksIter<'_> {
    Indexed::adapter(function.module(), function.block_ids(), value_at)
}

pub fn arguments(function: ValueRef<'_>) -> ArgumentsIter<'_> {
    Indexed::adapter(function.module(), function.argument_ids(), value_at)
}

/// Referents of an instruction's operands, in operand order.
pub fn operands(instruction: ValueRef<'_>) -> OperandsIter<'_> {
    Indexed::adapter(instruction.module(), instruction.operand_ids(), value_at)
}

/// Users of `value`, most recent use first.
pub fn uses(value: ValueRef<'_>) -> UsesIter<'_> {
    Indexed::adapter(value.module(), value.uses(), user_of)
}

/// Member types of a struct; `None` for every other type.
pub fn elements(ty: TypeRef<'_>) -> Option<ElementsIter<'_>> {
    let members = ty.struct_elements()?;
    Some(Indexed::adapter(ty.module(), members, type_at))
}

pub fn functions(module: &ModuleData) -> FunctionsIter<'_> {
    Indexed::adapter(module, module.functions(), value_at)
}

pub fn globals(module: &ModuleData) -> GlobalsIter<'_> {
    Indexed::adapter(module, module.globals(), value_at)
}

/// Walks a block's intrusive instruction list. `None` is the end sentinel.
pub struct Linked<'m> {
    module: &'m ModuleData,
}

impl<'m> Traversal for Linked<'m> {
    type Position = Option<ValueId>;
    type Item = ValueRef<'m>;

    fn element(&self, at: Option<ValueId>) -> Option<ValueRef<'m>> {
        at.map(|id| self.module.value(id))
    }

    fn successor(&self, at: Option<ValueId>) -> Option<ValueId> {
        let current = self.module.value(at?);
        current.next_instruction().map(|next| next.id())
    }
}

pub fn instructions(block: ValueRef<'_>) -> InstructionsIter<'_> {
    let first = block.first_instruction().map(|inst| inst.id());
    Adapter::new(
        Linked {
            module: block.module(),
        },
        first,
        None,
    )
}

/// Every attribute of an [`AttributeList`] as one flat sequence: function
/// slot, return slot, then parameter slots. Positions are `(slot, index)`;
/// empty slots are never visited.
pub struct FlattenedAttributes<'m> {
    list: Option<&'m RefCell<AttributeList>>,
    end_slot: usize,
}

impl FlattenedAttributes<'_> {
    fn end(&self) -> (usize, usize) {
        (self.end_slot, 0)
    }
}

impl Traversal for FlattenedAttributes<'_> {
    type Position = (usize, usize);
    type Item = String;

    fn element(&self, at: (usize, usize)) -> Option<String> {
        let list = self.list?.borrow();
        list.at(at).map(Attribute::as_string)
    }

    fn successor(&self, (slot, index): (usize, usize)) -> (usize, usize) {
        let Some(list) = self.list else {
            return self.end();
        };
        let list = list.borrow();
        let slot_len = list.slot(slot).map_or(0, AttributeSet::len);
        if index + 1 < slot_len {
            return (slot, index + 1);
        }
        match list.first_position_from(slot + 1) {
            Some(next) if next.0 < self.end_slot => next,
            _ => self.end(),
        }
    }
}

fn flattened(list: Option<&RefCell<AttributeList>>) -> AttributeListIter<'_> {
    let (begin, end_slot) = match list {
        Some(cell) => {
            let borrowed = cell.borrow();
            let end_slot = borrowed.slot_count();
            let begin = borrowed.first_position_from(0).unwrap_or((end_slot, 0));
            (begin, end_slot)
        }
        None => ((0, 0), 0),
    };
    Adapter::new(FlattenedAttributes { list, end_slot }, begin, (end_slot, 0))
}

/// Attribute text of a function's whole attribute list.
pub fn function_attributes(function: ValueRef<'_>) -> AttributeListIter<'_> {
    flattened(function.attribute_list().filter(|_| function.is_function()))
}

/// Attribute text of a `call` or `invoke` site's attribute list.
pub fn call_site_attributes(call: ValueRef<'_>) -> AttributeListIter<'_> {
    flattened(call.attribute_list().filter(|_| call.is_instruction()))
}

/// Where an attribute set lives: one slot of a list, or a global's own set.
#[derive(Clone, Copy)]
pub enum SetSource<'m> {
    Slot(&'m RefCell<AttributeList>, AttrIndex),
    Own(&'m RefCell<AttributeSet>),
    Empty,
}

pub struct SlotAttributes<'m> {
    source: SetSource<'m>,
}

impl SlotAttributes<'_> {
    fn with_set<R>(&self, f: impl FnOnce(&AttributeSet) -> R) -> Option<R> {
        match self.source {
            SetSource::Slot(list, index) => list.borrow().get(index).map(f),
            SetSource::Own(set) => Some(f(&set.borrow())),
            SetSource::Empty => None,
        }
    }
}

impl Traversal for SlotAttributes<'_> {
    type Position = usize;
    type Item = String;

    fn element(&self, at: usize) -> Option<String> {
        self.with_set(|set| set.get(at).map(Attribute::as_string))
            .flatten()
    }

    fn successor(&self, at: usize) -> usize {
        at + 1
    }
}

fn slot_attributes(source: SetSource<'_>) -> AttributeSetIter<'_> {
    let traversal = SlotAttributes { source };
    let end = traversal.with_set(AttributeSet::len).unwrap_or(0);
    Adapter::new(traversal, 0, end)
}

/// Attribute text of one function parameter.
pub fn argument_attributes(argument: ValueRef<'_>) -> AttributeSetIter<'_> {
    let source = match argument.argument_attributes() {
        Some((list, index)) => SetSource::Slot(list, index),
        None => SetSource::Empty,
    };
    slot_attributes(source)
}

/// Attribute text of a global variable.
pub fn global_attributes(global: ValueRef<'_>) -> AttributeSetIter<'_> {
    let source = match global.global_attributes() {
        Some(set) => SetSource::Own(set),
        None => SetSource::Empty,
    };
    slot_attributes(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irweave_ir::{AttrKind, Builder, Module};

    /// `i32 @f(i32 %x, i32 %y)` whose body adds the arguments twice.
    fn sample() -> Module {
        let mut module = Module::new("sample");
        let i32_ty = module.int_type(32);
        let fn_ty = module.function_type(i32_ty, &[i32_ty, i32_ty], false);
        let f = module.add_function("f", fn_ty).unwrap();
        let entry = module.append_block(f, "entry").unwrap();
        let exit = module.append_block(f, "exit").unwrap();
        let args = module.value(f).argument_ids().to_vec();
        module.value(args[0]).set_name("x");
        module.value(args[1]).set_name("y");

        let mut b = Builder::at_end(&mut module, entry);
        let sum = b.add(args[0], args[1], "sum").unwrap();
        let again = b.add(sum, args[0], "again").unwrap();
        b.br(exit).unwrap();
        b.position_at_end(exit);
        b.ret(again).unwrap();
        module
    }

    fn names<'m>(values: impl Iterator<Item = ValueRef<'m>>) -> Vec<String> {
        values.map(|v| v.name()).collect()
    }

    #[test]
    fn blocks_arguments_and_instructions() {
        let module = sample();
        let f = module.get_function("f").unwrap();

        assert_eq!(names(blocks(f)), vec!["entry", "exit"]);
        assert_eq!(names(arguments(f)), vec!["x", "y"]);

        let entry = blocks(f).next().unwrap();
        let opcodes: Vec<_> = instructions(entry).map(|i| i.opcode_name()).collect();
        assert_eq!(opcodes, vec!["add", "add", "br"]);
    }

    #[test]
    fn operands_yield_referents() {
        let module = sample();
        let f = module.get_function("f").unwrap();
        let entry = f.entry_block().unwrap();
        let again = instructions(entry).nth(1).unwrap();
        assert_eq!(names(operands(again)), vec!["sum", "x"]);

        let mut it = operands(again);
        it.by_ref().count();
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn uses_are_most_recent_first() {
        let module = sample();
        let f = module.get_function("f").unwrap();
        let x = arguments(f).next().unwrap();
        assert_eq!(names(uses(x)), vec!["again", "sum"]);
    }

    #[test]
    fn elements_only_for_structs() {
        let mut module = Module::new("m");
        let i8_ty = module.int_type(8);
        let f32_ty = module.float_type();
        let pair = module.struct_type(&[i8_ty, f32_ty], false);

        let members: Vec<_> = elements(module.ty(pair)).unwrap().map(|t| t.id()).collect();
        assert_eq!(members, vec![i8_ty, f32_ty]);
        assert!(elements(module.ty(i8_ty)).is_none());
    }

    #[test]
    fn function_attribute_list_is_flattened_in_slot_order() {
        let module = sample();
        let f = module.get_function("f").unwrap();
        assert_eq!(function_attributes(f).count(), 0);

        f.add_attribute(AttrIndex::Param(1), Attribute::Enum(AttrKind::NoCapture));
        f.add_attribute(AttrIndex::Function, Attribute::Enum(AttrKind::NoUnwind));
        f.add_attribute(AttrIndex::Function, Attribute::Enum(AttrKind::Cold));
        f.add_attribute(AttrIndex::Return, Attribute::Enum(AttrKind::ZExt));

        let text: Vec<_> = function_attributes(f).collect();
        assert_eq!(text, vec!["cold", "nounwind", "zeroext", "nocapture"]);

        let y = arguments(f).nth(1).unwrap();
        assert_eq!(argument_attributes(y).collect::<Vec<_>>(), vec!["nocapture"]);
        let x = arguments(f).next().unwrap();
        assert_eq!(argument_attributes(x).count(), 0);
    }

    #[test]
    fn attribute_range_is_captured_at_creation() {
        let module = sample();
        let f = module.get_function("f").unwrap();
        f.add_attribute(AttrIndex::Function, Attribute::Enum(AttrKind::NoUnwind));

        let mut it = function_attributes(f);
        // A slot added after creation lies beyond the captured end.
        f.add_attribute(AttrIndex::Param(0), Attribute::Enum(AttrKind::NoAlias));
        assert_eq!(it.next().as_deref(), Some("nounwind"));
        assert_eq!(it.next(), None);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn global_attributes_and_wrong_owner_kinds() {
        let mut module = sample();
        let i32_ty = module.int_type(32);
        let g = module.add_global("g", i32_ty);
        let global = module.value(g);
        global.add_global_attribute(Attribute::string("section", "data"));
        assert_eq!(
            global_attributes(global).collect::<Vec<_>>(),
            vec!["\"section\"=\"data\""]
        );

        // Owners of the wrong kind produce empty ranges.
        assert_eq!(blocks(global).count(), 0);
        assert_eq!(function_attributes(global).count(), 0);
        assert_eq!(argument_attributes(global).count(), 0);
    }

    #[test]
    fn module_functions_and_globals() {
        let mut module = sample();
        let i32_ty = module.int_type(32);
        module.add_global("a", i32_ty);
        module.add_global("b", i32_ty);
        assert_eq!(names(functions(&module)), vec!["f"]);
        assert_eq!(names(globals(&module)), vec!["a", "b"]);
    }
}
