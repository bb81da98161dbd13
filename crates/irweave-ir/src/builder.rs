//! Instruction builder.
//!
//! A [`Builder`] borrows the module mutably, keeps an insertion point and an
//! optional current debug location, and emits typed instructions. Every
//! operand it records is registered on the referent's use-list.

use std::cell::RefCell;

use anyhow::{bail, ensure, Context, Result};

use crate::attributes::AttributeList;
use crate::module::Module;
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::types::{TypeId, TypeKind};
use crate::value::{DebugLoc, InstDetail, InstructionData, ValueId, ValueKind};

/// Where the next instruction goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Append to the end of a block.
    End(ValueId),
    /// Insert before an existing instruction.
    Before(ValueId),
}

pub struct Builder<'m> {
    module: &'m mut Module,
    point: Option<InsertPoint>,
    debug_loc: Option<DebugLoc>,
}

macro_rules! binop_helpers {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> Result<ValueId> {
                self.binop(Opcode::$op, lhs, rhs, name)
            }
        )*
    };
}

macro_rules! cast_helpers {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: ValueId, dest: TypeId, name: &str) -> Result<ValueId> {
                self.cast(Opcode::$op, value, dest, name)
            }
        )*
    };
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            point: None,
            debug_loc: None,
        }
    }

    pub fn at_end(module: &'m mut Module, block: ValueId) -> Self {
        let mut builder = Self::new(module);
        builder.point = Some(InsertPoint::End(block));
        builder
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.point
    }

    pub fn set_insert_point(&mut self, point: Option<InsertPoint>) {
        self.point = point;
    }

    /// Block the next instruction will land in.
    pub fn block(&self) -> Option<ValueId> {
        match self.point? {
            InsertPoint::End(block) => Some(block),
            InsertPoint::Before(inst) => self.module.value(inst).parent().map(|b| b.id()),
        }
    }

    pub fn position_at_end(&mut self, block: ValueId) {
        self.point = Some(InsertPoint::End(block));
    }

    pub fn position_at_start(&mut self, block: ValueId) {
        self.point = Some(match self.module.value(block).first_instruction() {
            Some(first) => InsertPoint::Before(first.id()),
            None => InsertPoint::End(block),
        });
    }

    pub fn position_before(&mut self, inst: ValueId) {
        self.point = Some(InsertPoint::Before(inst));
    }

    pub fn position_after(&mut self, inst: ValueId) {
        let inst = self.module.value(inst);
        self.point = match (inst.next_instruction(), inst.parent()) {
            (Some(next), _) => Some(InsertPoint::Before(next.id())),
            (None, Some(block)) => Some(InsertPoint::End(block.id())),
            (None, None) => None,
        };
    }

    /// Debug location attached to every instruction emitted from now on.
    pub fn set_debug_loc(&mut self, loc: Option<DebugLoc>) {
        self.debug_loc = loc;
    }

    fn type_of(&self, value: ValueId) -> TypeId {
        self.module.node(value).ty
    }

    fn insert(
        &mut self,
        opcode: Opcode,
        ty: TypeId,
        name: &str,
        operands: Vec<ValueId>,
        detail: InstDetail,
    ) -> Result<ValueId> {
        let point = self.point.context("builder has no insertion point")?;
        let (block, prev, next) = match point {
            InsertPoint::End(block) => {
                let last = match &self.module.node(block).kind {
                    ValueKind::Block(data) => data.last,
                    _ => bail!("insertion point is not a block"),
                };
                (block, last, None)
            }
            InsertPoint::Before(inst) => match &self.module.node(inst).kind {
                ValueKind::Instruction(data) => (data.parent, data.prev, Some(inst)),
                _ => bail!("insertion point is not an instruction"),
            },
        };

        // Void results carry no name.
        let name = if self.module.ty(ty).is_void() { "" } else { name };
        let id = self.module.push_value(
            ty,
            name,
            ValueKind::Instruction(InstructionData {
                opcode,
                parent: block,
                prev,
                next,
                operands: operands.clone(),
                detail,
                debug_loc: self.debug_loc.clone(),
            }),
        );

        match prev {
            Some(prev) => {
                if let Some(data) = self.module.instruction_mut(prev) {
                    data.next = Some(id);
                }
            }
            None => {
                if let Some(data) = self.module.block_mut(block) {
                    data.first = Some(id);
                }
            }
        }
        match next {
            Some(next) => {
                if let Some(data) = self.module.instruction_mut(next) {
                    data.prev = Some(id);
                }
            }
            None => {
                if let Some(data) = self.module.block_mut(block) {
                    data.last = Some(id);
                }
            }
        }

        for (operand_no, operand) in operands.into_iter().enumerate() {
            self.module.add_use(operand, id, operand_no as u32);
        }
        Ok(id)
    }

    // ---- arithmetic ----

    pub fn binop(&mut self, op: Opcode, lhs: ValueId, rhs: ValueId, name: &str) -> Result<ValueId> {
        ensure!(op.is_binary(), "{} is not a binary opcode", op.name());
        let ty = self.type_of(lhs);
        ensure!(
            ty == self.type_of(rhs),
            "operands of {} must have the same type",
            op.name()
        );
        let operand_ty = self.module.ty(ty).scalar_type();
        if op.is_float_binary() {
            ensure!(
                operand_ty.is_floating_point(),
                "{} needs floating point operands",
                op.name()
            );
        } else {
            ensure!(
                operand_ty.int_width().is_some(),
                "{} needs integer operands",
                op.name()
            );
        }
        self.insert(op, ty, name, vec![lhs, rhs], InstDetail::None)
    }

    binop_helpers! {
        add => Add, sub => Sub, mul => Mul,
        sdiv => SDiv, udiv => UDiv, srem => SRem, urem => URem,
        shl => Shl, lshr => LShr, ashr => AShr,
        and => And, or => Or, xor => Xor,
        fadd => FAdd, fsub => FSub, fmul => FMul, fdiv => FDiv, frem => FRem,
    }

    pub fn fneg(&mut self, value: ValueId, name: &str) -> Result<ValueId> {
        let ty = self.type_of(value);
        ensure!(
            self.module.ty(ty).scalar_type().is_floating_point(),
            "fneg needs a floating point operand"
        );
        self.insert(Opcode::FNeg, ty, name, vec![value], InstDetail::None)
    }

    pub fn icmp(
        &mut self,
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> Result<ValueId> {
        ensure!(
            self.type_of(lhs) == self.type_of(rhs),
            "icmp operands must have the same type"
        );
        let i1 = self.module.int_type(1);
        self.insert(Opcode::ICmp, i1, name, vec![lhs, rhs], InstDetail::ICmp(pred))
    }

    pub fn fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> Result<ValueId> {
        ensure!(
            self.type_of(lhs) == self.type_of(rhs),
            "fcmp operands must have the same type"
        );
        let i1 = self.module.int_type(1);
        self.insert(Opcode::FCmp, i1, name, vec![lhs, rhs], InstDetail::FCmp(pred))
    }

    pub fn cast(
        &mut self,
        op: Opcode,
        value: ValueId,
        dest: TypeId,
        name: &str,
    ) -> Result<ValueId> {
        ensure!(op.is_cast(), "{} is not a cast opcode", op.name());
        self.insert(op, dest, name, vec![value], InstDetail::None)
    }

    cast_helpers! {
        trunc => Trunc, zext => ZExt, sext => SExt,
        fptoui => FPToUI, fptosi => FPToSI, uitofp => UIToFP, sitofp => SIToFP,
        fptrunc => FPTrunc, fpext => FPExt,
        ptrtoint => PtrToInt, inttoptr => IntToPtr, bitcast => BitCast,
    }

    pub fn select(
        &mut self,
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
        name: &str,
    ) -> Result<ValueId> {
        let ty = self.type_of(then_value);
        ensure!(
            ty == self.type_of(else_value),
            "select arms must have the same type"
        );
        self.insert(
            Opcode::Select,
            ty,
            name,
            vec![cond, then_value, else_value],
            InstDetail::None,
        )
    }

    // ---- memory ----

    pub fn alloca(&mut self, ty: TypeId, name: &str) -> Result<ValueId> {
        let ptr = self.module.pointer_type(ty);
        self.insert(Opcode::Alloca, ptr, name, Vec::new(), InstDetail::Alloca(ty))
    }

    fn pointee(&self, ptr: ValueId) -> Result<TypeId> {
        match self.module.ty(self.type_of(ptr)).element_type() {
            Some(pointee) => Ok(pointee.id()),
            None => bail!("expected a pointer operand"),
        }
    }

    pub fn load(&mut self, ptr: ValueId, name: &str) -> Result<ValueId> {
        let ty = self.pointee(ptr)?;
        self.insert(Opcode::Load, ty, name, vec![ptr], InstDetail::None)
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> Result<ValueId> {
        let pointee = self.pointee(ptr)?;
        ensure!(
            pointee == self.type_of(value),
            "stored value does not match the pointee type"
        );
        let void = self.module.void_type();
        self.insert(Opcode::Store, void, "", vec![value, ptr], InstDetail::None)
    }

    /// `getelementptr`: the first index steps over the pointer, each further
    /// index steps into the aggregate. Struct indices must be integer
    /// constants.
    pub fn gep(&mut self, ptr: ValueId, indices: &[ValueId], name: &str) -> Result<ValueId> {
        let source = self.pointee(ptr)?;
        let mut current = source;
        for &index in indices.iter().skip(1) {
            current = match self.module.ty(current).kind() {
                TypeKind::Struct(body) => {
                    let field = self
                        .module
                        .value(index)
                        .const_int_value()
                        .context("struct indices must be integer constants")?;
                    *body
                        .elements
                        .get(field as usize)
                        .with_context(|| format!("struct has no field {field}"))?
                }
                TypeKind::Array { element, .. } | TypeKind::Vector { element, .. } => *element,
                other => bail!("cannot index into {other:?}"),
            };
        }
        let result = self.module.pointer_type(current);
        let mut operands = vec![ptr];
        operands.extend_from_slice(indices);
        self.insert(
            Opcode::GetElementPtr,
            result,
            name,
            operands,
            InstDetail::Gep(source),
        )
    }

    // ---- phi ----

    pub fn phi(&mut self, ty: TypeId, name: &str) -> Result<ValueId> {
        self.insert(Opcode::Phi, ty, name, Vec::new(), InstDetail::Phi(Vec::new()))
    }

    pub fn add_incoming(&mut self, phi: ValueId, value: ValueId, block: ValueId) -> Result<()> {
        let operand_no = {
            let data = self
                .module
                .instruction_mut(phi)
                .context("add_incoming needs an instruction")?;
            let InstDetail::Phi(blocks) = &mut data.detail else {
                bail!("add_incoming needs a phi");
            };
            blocks.push(block);
            data.operands.push(value);
            data.operands.len() - 1
        };
        self.module.add_use(value, phi, operand_no as u32);
        Ok(())
    }

    // ---- calls ----

    fn callee_type(&self, callee: ValueId) -> Result<(TypeId, TypeId)> {
        let pointee = self.pointee(callee)?;
        match self.module.ty(pointee).kind() {
            TypeKind::Function { ret, .. } => Ok((pointee, *ret)),
            other => bail!("callee is not a function pointer: {other:?}"),
        }
    }

    fn check_args(&self, fn_type: TypeId, args: &[ValueId]) -> Result<()> {
        let TypeKind::Function {
            params, var_arg, ..
        } = self.module.ty(fn_type).kind()
        else {
            bail!("not a function type");
        };
        ensure!(
            args.len() == params.len() || (*var_arg && args.len() > params.len()),
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        );
        for (i, (&arg, &param)) in args.iter().zip(params).enumerate() {
            ensure!(self.type_of(arg) == param, "argument {i} has the wrong type");
        }
        Ok(())
    }

    /// Operands are the arguments followed by the callee.
    pub fn call(&mut self, callee: ValueId, args: &[ValueId], name: &str) -> Result<ValueId> {
        let (fn_type, ret) = self.callee_type(callee)?;
        self.check_args(fn_type, args)?;
        let mut operands = args.to_vec();
        operands.push(callee);
        self.insert(
            Opcode::Call,
            ret,
            name,
            operands,
            InstDetail::Call {
                fn_type,
                attributes: RefCell::new(AttributeList::new()),
            },
        )
    }

    /// Operands are the arguments, the normal destination, the unwind
    /// destination, then the callee.
    pub fn invoke(
        &mut self,
        callee: ValueId,
        args: &[ValueId],
        normal: ValueId,
        unwind: ValueId,
        name: &str,
    ) -> Result<ValueId> {
        let (fn_type, ret) = self.callee_type(callee)?;
        self.check_args(fn_type, args)?;
        let mut operands = args.to_vec();
        operands.extend([normal, unwind, callee]);
        self.insert(
            Opcode::Invoke,
            ret,
            name,
            operands,
            InstDetail::Call {
                fn_type,
                attributes: RefCell::new(AttributeList::new()),
            },
        )
    }

    // ---- terminators ----

    pub fn ret(&mut self, value: ValueId) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(Opcode::Ret, void, "", vec![value], InstDetail::None)
    }

    pub fn ret_void(&mut self) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(Opcode::Ret, void, "", Vec::new(), InstDetail::None)
    }

    pub fn br(&mut self, target: ValueId) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(Opcode::Br, void, "", vec![target], InstDetail::None)
    }

    pub fn cbranch(
        &mut self,
        cond: ValueId,
        then_block: ValueId,
        else_block: ValueId,
    ) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(
            Opcode::Br,
            void,
            "",
            vec![cond, then_block, else_block],
            InstDetail::None,
        )
    }

    /// `switch` with no cases yet; see [`Builder::add_case`].
    pub fn switch(&mut self, value: ValueId, default: ValueId) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(Opcode::Switch, void, "", vec![value, default], InstDetail::None)
    }

    pub fn add_case(&mut self, switch: ValueId, value: ValueId, dest: ValueId) -> Result<()> {
        let first = {
            let data = self
                .module
                .instruction_mut(switch)
                .context("add_case needs an instruction")?;
            ensure!(data.opcode == Opcode::Switch, "add_case needs a switch");
            data.operands.extend([value, dest]);
            data.operands.len() - 2
        };
        self.module.add_use(value, switch, first as u32);
        self.module.add_use(dest, switch, first as u32 + 1);
        Ok(())
    }

    pub fn unreachable(&mut self) -> Result<ValueId> {
        let void = self.module.void_type();
        self.insert(Opcode::Unreachable, void, "", Vec::new(), InstDetail::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_with_entry(module: &mut Module) -> (ValueId, ValueId) {
        let i32_ty = module.int_type(32);
        let fn_ty = module.function_type(i32_ty, &[i32_ty, i32_ty], false);
        let f = module.add_function("f", fn_ty).unwrap();
        let entry = module.append_block(f, "entry").unwrap();
        (f, entry)
    }

    fn instruction_names(module: &Module, block: ValueId) -> Vec<String> {
        let mut names = Vec::new();
        let mut cur = module.value(block).first_instruction();
        while let Some(inst) = cur {
            names.push(inst.name());
            cur = inst.next_instruction();
        }
        names
    }

    #[test]
    fn binop_registers_uses_most_recent_first() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let args = module.value(f).argument_ids().to_vec();

        let mut b = Builder::at_end(&mut module, entry);
        let sum = b.add(args[0], args[1], "sum").unwrap();
        let twice = b.add(sum, args[0], "twice").unwrap();
        b.ret(twice).unwrap();

        let a0 = module.value(args[0]);
        let users: Vec<_> = a0.users().map(|u| u.id()).collect();
        assert_eq!(users, vec![twice, sum]);
        assert_eq!(a0.uses()[0].operand_no, 1);
        assert_eq!(module.value(sum).opcode(), Some(Opcode::Add));
    }

    #[test]
    fn position_before_and_after() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let args = module.value(f).argument_ids().to_vec();

        let mut b = Builder::at_end(&mut module, entry);
        let first = b.add(args[0], args[1], "first").unwrap();
        let last = b.ret(first).unwrap();
        b.position_before(last);
        b.mul(first, first, "middle").unwrap();
        b.position_after(first);
        b.sub(first, first, "second").unwrap();
        b.position_at_start(entry);
        b.xor(args[0], args[0], "zeroth").unwrap();

        assert_eq!(
            instruction_names(&module, entry),
            vec!["zeroth", "first", "second", "middle", ""]
        );
        let entry_ref = module.value(entry);
        assert_eq!(entry_ref.terminator().map(|t| t.id()), Some(last));
    }

    #[test]
    fn type_errors_are_reported() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let args = module.value(f).argument_ids().to_vec();
        let f32_ty = module.float_type();
        let half = module.const_float(f32_ty, 0.5);

        let mut b = Builder::at_end(&mut module, entry);
        assert!(b.add(args[0], half, "bad").is_err());
        assert!(b.fadd(args[0], args[1], "bad").is_err());
        assert!(b.load(args[0], "bad").is_err());
        assert!(b.call(args[0], &[], "bad").is_err());
    }

    #[test]
    fn memory_and_gep() {
        let mut module = Module::new("m");
        let (_, entry) = function_with_entry(&mut module);
        let i32_ty = module.int_type(32);
        let f64_ty = module.double_type();
        let pair = module.struct_type(&[i32_ty, f64_ty], false);
        let zero = module.const_int(i32_ty, 0);
        let one = module.const_int(i32_ty, 1);

        let mut b = Builder::at_end(&mut module, entry);
        let slot = b.alloca(pair, "slot").unwrap();
        let field = b.gep(slot, &[zero, one], "field").unwrap();
        let loaded = b.load(field, "v").unwrap();

        assert_eq!(module.value(loaded).ty().id(), f64_ty);
        assert_eq!(module.value(field).source_element_type().map(|t| t.id()), Some(pair));
        assert_eq!(module.value(slot).allocated_type().map(|t| t.id()), Some(pair));
    }

    #[test]
    fn phi_and_switch_operands() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let left = module.append_block(f, "left").unwrap();
        let join = module.append_block(f, "join").unwrap();
        let args = module.value(f).argument_ids().to_vec();
        let i32_ty = module.int_type(32);
        let three = module.const_int(i32_ty, 3);

        let mut b = Builder::at_end(&mut module, entry);
        let sw = b.switch(args[0], join).unwrap();
        b.add_case(sw, three, left).unwrap();
        b.position_at_end(left);
        b.br(join).unwrap();
        b.position_at_end(join);
        let phi = b.phi(i32_ty, "merged").unwrap();
        b.add_incoming(phi, args[0], entry).unwrap();
        b.add_incoming(phi, args[1], left).unwrap();

        let sw_ref = module.value(sw);
        assert_eq!(sw_ref.operand_ids(), &[args[0], join, three, left]);
        let phi_ref = module.value(phi);
        assert_eq!(phi_ref.operand_ids(), &[args[0], args[1]]);
        assert_eq!(phi_ref.incoming_blocks(), &[entry, left]);
        assert_eq!(module.value(left).uses()[0].operand_no, 3);
    }

    #[test]
    fn debug_location_sticks_to_emitted_instructions() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let args = module.value(f).argument_ids().to_vec();

        let mut b = Builder::at_end(&mut module, entry);
        let plain = b.add(args[0], args[1], "plain").unwrap();
        b.set_debug_loc(Some(DebugLoc::new("main.c", 12, 3)));
        let located = b.add(plain, args[1], "located").unwrap();

        assert_eq!(module.value(plain).debug_filename(), "");
        assert_eq!(module.value(plain).debug_line(), -1);
        assert_eq!(module.value(located).debug_filename(), "main.c");
        assert_eq!(module.value(located).debug_line(), 12);
    }

    #[test]
    fn call_and_invoke_operand_order() {
        let mut module = Module::new("m");
        let (f, entry) = function_with_entry(&mut module);
        let ok = module.append_block(f, "ok").unwrap();
        let err = module.append_block(f, "err").unwrap();
        let args = module.value(f).argument_ids().to_vec();

        let mut b = Builder::at_end(&mut module, entry);
        let call = b.call(f, &[args[0], args[1]], "r").unwrap();
        let invoke = b.invoke(f, &[call, call], ok, err, "r2").unwrap();

        assert_eq!(module.value(call).operand_ids(), &[args[0], args[1], f]);
        assert_eq!(module.value(invoke).operand_ids(), &[call, call, ok, err, f]);
        assert_eq!(module.value(invoke).called_value().map(|v| v.id()), Some(f));
        assert!(module.value(call).attribute_list().is_some());
    }
}
