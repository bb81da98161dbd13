//! Textual IR rendering behind the `Display` impls of modules, values and
//! types.
//!
//! Unnamed locals are numbered per function (arguments, then blocks and
//! instruction results in layout order), the same way they would be read
//! back.

use std::collections::HashMap;
use std::fmt::{self, Write};

use crate::attributes::{AttributeList, AttributeSet};
use crate::module::ModuleData;
use crate::opcode::Opcode;
use crate::types::{StructBody, TypeId, TypeKind};
use crate::value::{Constant, ValueCategory, ValueId, ValueRef};

fn is_plain_ident(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '$' | '.' | '_' | '-'))
}

fn write_ident(out: &mut dyn Write, sigil: char, name: &str) -> fmt::Result {
    if is_plain_ident(name) {
        write!(out, "{sigil}{name}")
    } else {
        write!(out, "{sigil}\"{}\"", name.escape_default())
    }
}

pub(crate) fn write_type(out: &mut dyn Write, module: &ModuleData, id: TypeId) -> fmt::Result {
    match &module.type_node(id).kind {
        TypeKind::Void => out.write_str("void"),
        TypeKind::Label => out.write_str("label"),
        TypeKind::Integer(bits) => write!(out, "i{bits}"),
        TypeKind::Float => out.write_str("float"),
        TypeKind::Double => out.write_str("double"),
        TypeKind::Pointer(pointee) => {
            write_type(out, module, *pointee)?;
            out.write_str("*")
        }
        TypeKind::Struct(StructBody {
            name: Some(name), ..
        }) => write_ident(out, '%', name),
        TypeKind::Struct(body) => write_struct_body(out, module, body),
        TypeKind::Array { element, len } => {
            write!(out, "[{len} x ")?;
            write_type(out, module, *element)?;
            out.write_str("]")
        }
        TypeKind::Vector { element, len } => {
            write!(out, "<{len} x ")?;
            write_type(out, module, *element)?;
            out.write_str(">")
        }
        TypeKind::Function {
            ret,
            params,
            var_arg,
        } => {
            write_type(out, module, *ret)?;
            out.write_str(" (")?;
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_type(out, module, *param)?;
            }
            if *var_arg {
                out.write_str(if params.is_empty() { "..." } else { ", ..." })?;
            }
            out.write_str(")")
        }
    }
}

fn write_struct_body(out: &mut dyn Write, module: &ModuleData, body: &StructBody) -> fmt::Result {
    if body.opaque {
        return out.write_str("opaque");
    }
    if body.packed {
        out.write_str("<")?;
    }
    if body.elements.is_empty() {
        out.write_str("{}")?;
    } else {
        out.write_str("{ ")?;
        for (i, element) in body.elements.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            write_type(out, module, *element)?;
        }
        out.write_str(" }")?;
    }
    if body.packed {
        out.write_str(">")?;
    }
    Ok(())
}

/// Function owning `value`, if it lives inside one.
fn enclosing_function(value: ValueRef<'_>) -> Option<ValueRef<'_>> {
    match value.category() {
        ValueCategory::Function => Some(value),
        ValueCategory::Argument | ValueCategory::Block => value.parent(),
        ValueCategory::Instruction => value.parent()?.parent(),
        _ => None,
    }
}

struct Printer<'m> {
    module: &'m ModuleData,
    slots: HashMap<ValueId, u32>,
}

impl<'m> Printer<'m> {
    fn new(module: &'m ModuleData) -> Self {
        Self {
            module,
            slots: HashMap::new(),
        }
    }

    /// Printer with local slots numbered for the function around `value`.
    fn around(value: ValueRef<'m>) -> Self {
        let mut printer = Self::new(value.module());
        if let Some(func) = enclosing_function(value) {
            printer.number_locals(func);
        }
        printer
    }

    fn number_locals(&mut self, func: ValueRef<'m>) {
        self.slots.clear();
        let mut next = 0;
        let mut assign = |value: ValueRef<'m>, slots: &mut HashMap<ValueId, u32>| {
            if !value.has_name() && !value.ty().is_void() {
                slots.insert(value.id(), next);
                next += 1;
            }
        };
        for &arg in func.argument_ids() {
            assign(self.module.value(arg), &mut self.slots);
        }
        for &block in func.block_ids() {
            let block = self.module.value(block);
            assign(block, &mut self.slots);
            let mut cur = block.first_instruction();
            while let Some(inst) = cur {
                assign(inst, &mut self.slots);
                cur = inst.next_instruction();
            }
        }
    }

    fn ty(&self, out: &mut dyn Write, id: TypeId) -> fmt::Result {
        write_type(out, self.module, id)
    }

    fn local(&self, out: &mut dyn Write, value: ValueRef<'m>) -> fmt::Result {
        if value.has_name() {
            write_ident(out, '%', &value.name())
        } else {
            match self.slots.get(&value.id()) {
                Some(slot) => write!(out, "%{slot}"),
                None => out.write_str("%<badref>"),
            }
        }
    }

    fn constant(
        &self,
        out: &mut dyn Write,
        value: ValueRef<'m>,
        constant: Constant,
    ) -> fmt::Result {
        let ty = value.ty();
        match constant {
            Constant::Int(bits) => match ty.int_width() {
                Some(1) => out.write_str(if bits & 1 == 1 { "true" } else { "false" }),
                Some(width) if width < 64 => {
                    let shift = 64 - width;
                    write!(out, "{}", ((bits << shift) as i64) >> shift)
                }
                _ => write!(out, "{}", bits as i64),
            },
            Constant::Float { bits } => write!(out, "{:?}", f64::from_bits(bits)),
            Constant::Null if ty.is_pointer() => out.write_str("null"),
            Constant::Null if ty.int_width().is_some() => out.write_str("0"),
            Constant::Null if ty.is_floating_point() => out.write_str("0.0"),
            Constant::Null => out.write_str("zeroinitializer"),
            Constant::Undef => out.write_str("undef"),
        }
    }

    /// Operand reference without its type.
    fn operand(&self, out: &mut dyn Write, id: ValueId) -> fmt::Result {
        let value = self.module.value(id);
        match value.category() {
            ValueCategory::Function | ValueCategory::Global => {
                write_ident(out, '@', &value.name())
            }
            ValueCategory::Constant => match value.constant() {
                Some(c) => self.constant(out, value, c),
                None => Ok(()),
            },
            _ => self.local(out, value),
        }
    }

    /// Operand reference preceded by its type.
    fn typed_operand(&self, out: &mut dyn Write, id: ValueId) -> fmt::Result {
        self.ty(out, self.module.node(id).ty)?;
        out.write_str(" ")?;
        self.operand(out, id)
    }

    fn typed_operands(&self, out: &mut dyn Write, ids: &[ValueId]) -> fmt::Result {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.typed_operand(out, id)?;
        }
        Ok(())
    }

    fn attrs_prefix(&self, out: &mut dyn Write, set: Option<&AttributeSet>) -> fmt::Result {
        match set {
            Some(set) if !set.is_empty() => write!(out, "{set} "),
            _ => Ok(()),
        }
    }

    fn attrs_suffix(&self, out: &mut dyn Write, set: Option<&AttributeSet>) -> fmt::Result {
        match set {
            Some(set) if !set.is_empty() => write!(out, " {set}"),
            _ => Ok(()),
        }
    }

    fn call_arguments(
        &self,
        out: &mut dyn Write,
        args: &[ValueId],
        attrs: &AttributeList,
    ) -> fmt::Result {
        out.write_str("(")?;
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.ty(out, self.module.node(arg).ty)?;
            out.write_str(" ")?;
            self.attrs_prefix(out, attrs.param_attributes(i as u32))?;
            self.operand(out, arg)?;
        }
        out.write_str(")")
    }

    fn instruction(&self, out: &mut dyn Write, inst: ValueRef<'m>) -> fmt::Result {
        let Some(opcode) = inst.opcode() else {
            return Ok(());
        };
        let ops = inst.operand_ids();
        let result_ty = inst.ty();

        out.write_str("  ")?;
        if !result_ty.is_void() {
            self.local(out, inst)?;
            out.write_str(" = ")?;
        }

        match opcode {
            Opcode::Ret if ops.is_empty() => out.write_str("ret void")?,
            Opcode::Ret => {
                out.write_str("ret ")?;
                self.typed_operand(out, ops[0])?;
            }
            Opcode::Br => {
                out.write_str("br ")?;
                self.typed_operands(out, ops)?;
            }
            Opcode::Switch => {
                out.write_str("switch ")?;
                self.typed_operands(out, &ops[..2.min(ops.len())])?;
                out.write_str(" [")?;
                for case in ops.get(2..).unwrap_or_default().chunks(2) {
                    out.write_str("\n    ")?;
                    self.typed_operands(out, case)?;
                }
                out.write_str("\n  ]")?;
            }
            Opcode::Call | Opcode::Invoke => {
                let attrs = inst
                    .attribute_list()
                    .map(|list| list.borrow().clone())
                    .unwrap_or_default();
                let trailing = if opcode == Opcode::Invoke { 3 } else { 1 };
                let split = ops.len().saturating_sub(trailing);
                let (args, rest) = ops.split_at(split);

                out.write_str(opcode.name())?;
                out.write_str(" ")?;
                self.attrs_prefix(out, attrs.return_attributes())?;
                self.ty(out, result_ty.id())?;
                out.write_str(" ")?;
                if let Some(&callee) = rest.last() {
                    self.operand(out, callee)?;
                }
                self.call_arguments(out, args, &attrs)?;
                self.attrs_suffix(out, attrs.function_attributes())?;
                if opcode == Opcode::Invoke && rest.len() == 3 {
                    out.write_str("\n          to ")?;
                    self.typed_operand(out, rest[0])?;
                    out.write_str(" unwind ")?;
                    self.typed_operand(out, rest[1])?;
                }
            }
            Opcode::Alloca => {
                out.write_str("alloca ")?;
                if let Some(allocated) = inst.allocated_type() {
                    self.ty(out, allocated.id())?;
                }
            }
            Opcode::Load => {
                out.write_str("load ")?;
                self.ty(out, result_ty.id())?;
                out.write_str(", ")?;
                self.typed_operands(out, ops)?;
            }
            Opcode::GetElementPtr => {
                out.write_str("getelementptr ")?;
                if let Some(source) = inst.source_element_type() {
                    self.ty(out, source.id())?;
                    out.write_str(", ")?;
                }
                self.typed_operands(out, ops)?;
            }
            Opcode::ICmp | Opcode::FCmp => {
                let pred = inst
                    .int_predicate()
                    .map(|p| p.name())
                    .or_else(|| inst.float_predicate().map(|p| p.name()))
                    .unwrap_or_default();
                write!(out, "{} {pred} ", opcode.name())?;
                self.binary_operands(out, ops)?;
            }
            Opcode::Phi => {
                out.write_str("phi ")?;
                self.ty(out, result_ty.id())?;
                for (i, (&value, &block)) in ops.iter().zip(inst.incoming_blocks()).enumerate() {
                    out.write_str(if i == 0 { " [ " } else { ", [ " })?;
                    self.operand(out, value)?;
                    out.write_str(", ")?;
                    self.operand(out, block)?;
                    out.write_str(" ]")?;
                }
            }
            op if op.is_cast() => {
                write!(out, "{} ", op.name())?;
                self.typed_operands(out, ops)?;
                out.write_str(" to ")?;
                self.ty(out, result_ty.id())?;
            }
            op if op.is_binary() => {
                write!(out, "{} ", op.name())?;
                self.binary_operands(out, ops)?;
            }
            op => {
                // fneg, store, select, unreachable
                out.write_str(op.name())?;
                if !ops.is_empty() {
                    out.write_str(" ")?;
                    self.typed_operands(out, ops)?;
                }
            }
        }

        if let Some(loc) = inst.debug_loc() {
            write!(out, " ; {}:{}:{}", loc.file, loc.line, loc.column)?;
        }
        Ok(())
    }

    /// `ty lhs, rhs` with the type printed once.
    fn binary_operands(&self, out: &mut dyn Write, ops: &[ValueId]) -> fmt::Result {
        if let [lhs, rhs] = ops {
            self.typed_operand(out, *lhs)?;
            out.write_str(", ")?;
            self.operand(out, *rhs)?;
        }
        Ok(())
    }

    fn block_label(&self, out: &mut dyn Write, block: ValueRef<'m>) -> fmt::Result {
        if block.has_name() {
            let name = block.name();
            if is_plain_ident(&name) {
                out.write_str(&name)
            } else {
                write!(out, "\"{}\"", name.escape_default())
            }
        } else {
            match self.slots.get(&block.id()) {
                Some(slot) => write!(out, "{slot}"),
                None => out.write_str("<badref>"),
            }
        }
    }

    fn block(&self, out: &mut dyn Write, block: ValueRef<'m>) -> fmt::Result {
        self.block_label(out, block)?;
        out.write_str(":\n")?;
        let mut cur = block.first_instruction();
        while let Some(inst) = cur {
            self.instruction(out, inst)?;
            out.write_str("\n")?;
            cur = inst.next_instruction();
        }
        Ok(())
    }

    fn linkage_keywords(&self, out: &mut dyn Write, value: ValueRef<'m>) -> fmt::Result {
        for keyword in [
            value.linkage().keyword(),
            value.visibility().keyword(),
            value.dll_storage_class().keyword(),
        ] {
            if !keyword.is_empty() {
                write!(out, "{keyword} ")?;
            }
        }
        Ok(())
    }

    fn function(&self, out: &mut dyn Write, func: ValueRef<'m>) -> fmt::Result {
        let Some(fn_type) = func.function_type() else {
            return Ok(());
        };
        let declaration = func.is_declaration();
        let attrs = func
            .attribute_list()
            .map(|list| list.borrow().clone())
            .unwrap_or_default();

        out.write_str(if declaration { "declare " } else { "define " })?;
        self.linkage_keywords(out, func)?;
        self.attrs_prefix(out, attrs.return_attributes())?;
        if let Some(ret) = fn_type.return_type() {
            self.ty(out, ret.id())?;
        }
        out.write_str(" ")?;
        write_ident(out, '@', &func.name())?;
        out.write_str("(")?;
        let params = fn_type.param_types();
        for (i, &param) in params.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.ty(out, param)?;
            if let Some(set) = attrs.param_attributes(i as u32).filter(|s| !s.is_empty()) {
                write!(out, " {set}")?;
            }
            if !declaration {
                if let Some(&arg) = func.argument_ids().get(i) {
                    out.write_str(" ")?;
                    self.local(out, self.module.value(arg))?;
                }
            }
        }
        if let TypeKind::Function { var_arg: true, .. } = fn_type.kind() {
            out.write_str(if params.is_empty() { "..." } else { ", ..." })?;
        }
        out.write_str(")")?;
        self.attrs_suffix(out, attrs.function_attributes())?;

        if declaration {
            return out.write_str("\n");
        }
        out.write_str(" {\n")?;
        for (i, &block) in func.block_ids().iter().enumerate() {
            if i > 0 {
                out.write_str("\n")?;
            }
            self.block(out, self.module.value(block))?;
        }
        out.write_str("}\n")
    }

    fn global(&self, out: &mut dyn Write, global: ValueRef<'m>) -> fmt::Result {
        write_ident(out, '@', &global.name())?;
        out.write_str(" = ")?;
        let init = global.initializer();
        if init.is_none() && global.linkage() == crate::Linkage::External {
            out.write_str("external ")?;
        }
        self.linkage_keywords(out, global)?;
        out.write_str(if global.is_global_constant() {
            "constant "
        } else {
            "global "
        })?;
        if let Some(value_type) = global.value_type() {
            self.ty(out, value_type.id())?;
        }
        if let Some(init) = init {
            out.write_str(" ")?;
            self.operand(out, init.id())?;
        }
        Ok(())
    }
}

pub(crate) fn write_value(out: &mut dyn Write, value: ValueRef<'_>) -> fmt::Result {
    let printer = Printer::around(value);
    match value.category() {
        ValueCategory::Instruction => printer.instruction(out, value),
        ValueCategory::Block => printer.block(out, value),
        ValueCategory::Function => printer.function(out, value),
        ValueCategory::Global => printer.global(out, value),
        ValueCategory::Argument | ValueCategory::Constant => {
            printer.typed_operand(out, value.id())
        }
    }
}

/// Label of a block as it appears in branch targets (`%entry`, `%3`).
pub(crate) fn block_reference(block: ValueRef<'_>) -> String {
    let printer = Printer::around(block);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = printer.local(&mut out, block);
    out
}

/// Typed operand reference (`i32 %x`, `i32 7`, `label %entry`).
pub(crate) fn operand_reference(value: ValueRef<'_>) -> String {
    let printer = Printer::around(value);
    let mut out = String::new();
    let _ = printer.typed_operand(&mut out, value.id());
    out
}

pub(crate) fn write_module(out: &mut dyn Write, module: &ModuleData) -> fmt::Result {
    writeln!(out, "; ModuleID = '{}'", module.name())?;
    if !module.source_filename().is_empty() {
        writeln!(
            out,
            "source_filename = \"{}\"",
            module.source_filename().escape_default()
        )?;
    }

    let structs = module.named_struct_types();
    if !structs.is_empty() {
        out.write_str("\n")?;
        for ty in structs {
            write_ident(out, '%', ty.name())?;
            out.write_str(" = type ")?;
            if let TypeKind::Struct(body) = ty.kind() {
                write_struct_body(out, module, body)?;
            }
            out.write_str("\n")?;
        }
    }

    if !module.globals().is_empty() {
        out.write_str("\n")?;
        let printer = Printer::new(module);
        for &global in module.globals() {
            printer.global(out, module.value(global))?;
            out.write_str("\n")?;
        }
    }

    let mut printer = Printer::new(module);
    for &func in module.functions() {
        out.write_str("\n")?;
        let func = module.value(func);
        printer.number_locals(func);
        printer.function(out, func)?;
    }
    Ok(())
}
