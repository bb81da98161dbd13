//! Operator lowering: one Wasm operator at a time onto IR instructions.

use anyhow::{bail, ensure, Context, Result};
use irweave_ir::{
    AttrIndex, AttrKind, Attribute, FloatPredicate, IntPredicate, Opcode, TypeId, ValueId,
};
use wasmparser::{BlockType, BrTable, MemArg, Operator};

use super::function::{value_type, BranchTarget, FrameKind, FunctionTranslator};

/// Result type of a float conversion.
#[derive(Clone, Copy)]
enum Float {
    F32,
    F64,
}

impl FunctionTranslator<'_, '_> {
    pub(super) fn translate_operator(&mut self, op: &Operator) -> Result<()> {
        if let Some(depth) = self.dead {
            return self.skip_dead(op, depth);
        }

        match op {
            Operator::Nop => {}
            Operator::Unreachable => {
                self.builder.unreachable()?;
                self.enter_dead_code();
            }

            // Control flow
            Operator::Block { blockty } => self.block(blockty)?,
            Operator::Loop { blockty } => self.loop_(blockty)?,
            Operator::If { blockty } => self.if_(blockty)?,
            Operator::Else => self.else_()?,
            Operator::End => self.end()?,
            Operator::Br { relative_depth } => self.br(*relative_depth)?,
            Operator::BrIf { relative_depth } => self.br_if(*relative_depth)?,
            Operator::BrTable { targets } => self.br_table(targets)?,
            Operator::Return => {
                self.emit_return()?;
                self.enter_dead_code();
            }
            Operator::Call { function_index } => self.call(*function_index)?,

            // Parametric
            Operator::Drop => {
                self.pop()?;
            }
            Operator::Select | Operator::TypedSelect { .. } => {
                let cond = self.pop()?;
                let else_value = self.pop()?;
                let then_value = self.pop()?;
                let cond = self.truthy(cond)?;
                let value = self.builder.select(cond, then_value, else_value, "")?;
                self.push(value);
            }

            // Variables
            Operator::LocalGet { local_index } => {
                let slot = self.local(*local_index)?;
                let value = self.builder.load(slot, "")?;
                self.push(value);
            }
            Operator::LocalSet { local_index } => {
                let slot = self.local(*local_index)?;
                let value = self.pop()?;
                self.builder.store(value, slot)?;
            }
            Operator::LocalTee { local_index } => {
                let slot = self.local(*local_index)?;
                let value = self.peek()?;
                self.builder.store(value, slot)?;
            }
            Operator::GlobalGet { global_index } => {
                let global = self.global(*global_index)?;
                let value = self.builder.load(global, "")?;
                self.push(value);
            }
            Operator::GlobalSet { global_index } => {
                let global = self.global(*global_index)?;
                let value = self.pop()?;
                self.builder.store(value, global)?;
            }

            // Memory
            Operator::I32Load { memarg } => self.load(memarg, 32, None)?,
            Operator::I64Load { memarg } => self.load(memarg, 64, None)?,
            Operator::F32Load { memarg } => {
                let ty = self.module_mut().float_type();
                self.load_typed(memarg, ty)?;
            }
            Operator::F64Load { memarg } => {
                let ty = self.module_mut().double_type();
                self.load_typed(memarg, ty)?;
            }
            Operator::I32Load8S { memarg } => self.load(memarg, 32, Some((8, true)))?,
            Operator::I32Load8U { memarg } => self.load(memarg, 32, Some((8, false)))?,
            Operator::I32Load16S { memarg } => self.load(memarg, 32, Some((16, true)))?,
            Operator::I32Load16U { memarg } => self.load(memarg, 32, Some((16, false)))?,
            Operator::I64Load8S { memarg } => self.load(memarg, 64, Some((8, true)))?,
            Operator::I64Load8U { memarg } => self.load(memarg, 64, Some((8, false)))?,
            Operator::I64Load16S { memarg } => self.load(memarg, 64, Some((16, true)))?,
            Operator::I64Load16U { memarg } => self.load(memarg, 64, Some((16, false)))?,
            Operator::I64Load32S { memarg } => self.load(memarg, 64, Some((32, true)))?,
            Operator::I64Load32U { memarg } => self.load(memarg, 64, Some((32, false)))?,
            Operator::I32Store { memarg }
            | Operator::I64Store { memarg }
            | Operator::F32Store { memarg }
            | Operator::F64Store { memarg } => self.store(memarg, None)?,
            Operator::I32Store8 { memarg } | Operator::I64Store8 { memarg } => {
                self.store(memarg, Some(8))?
            }
            Operator::I32Store16 { memarg } | Operator::I64Store16 { memarg } => {
                self.store(memarg, Some(16))?
            }
            Operator::I64Store32 { memarg } => self.store(memarg, Some(32))?,
            Operator::MemorySize { mem } => {
                ensure!(*mem == 0, "only memory 0 is supported");
                let i32_ty = self.int_type(32);
                let size = self.intrinsic("llvm.wasm.memory.size.i32", i32_ty, &[i32_ty], false)?;
                let index = self.int(32, 0);
                let value = self.builder.call(size, &[index], "")?;
                self.push(value);
            }
            Operator::MemoryGrow { mem } => {
                ensure!(*mem == 0, "only memory 0 is supported");
                let delta = self.pop()?;
                let i32_ty = self.int_type(32);
                let grow =
                    self.intrinsic("llvm.wasm.memory.grow.i32", i32_ty, &[i32_ty, i32_ty], false)?;
                let index = self.int(32, 0);
                let value = self.builder.call(grow, &[index, delta], "")?;
                self.push(value);
            }

            // Constants
            Operator::I32Const { value } => {
                let value = self.int(32, u64::from(*value as u32));
                self.push(value);
            }
            Operator::I64Const { value } => {
                let value = self.int(64, *value as u64);
                self.push(value);
            }
            Operator::F32Const { value } => {
                let ty = self.module_mut().float_type();
                let value = self
                    .module_mut()
                    .const_float(ty, f64::from(f32::from_bits(value.bits())));
                self.push(value);
            }
            Operator::F64Const { value } => {
                let ty = self.module_mut().double_type();
                let value = self.module_mut().const_float(ty, f64::from_bits(value.bits()));
                self.push(value);
            }

            // Integer comparisons
            Operator::I32Eqz | Operator::I64Eqz => {
                let value = self.pop()?;
                let zero = self.zero(self.type_of(value))?;
                let cond = self.builder.icmp(IntPredicate::Eq, value, zero, "")?;
                self.push_bool(cond)?;
            }
            Operator::I32Eq | Operator::I64Eq => self.icmp(IntPredicate::Eq)?,
            Operator::I32Ne | Operator::I64Ne => self.icmp(IntPredicate::Ne)?,
            Operator::I32LtS | Operator::I64LtS => self.icmp(IntPredicate::Slt)?,
            Operator::I32LtU | Operator::I64LtU => self.icmp(IntPredicate::Ult)?,
            Operator::I32GtS | Operator::I64GtS => self.icmp(IntPredicate::Sgt)?,
            Operator::I32GtU | Operator::I64GtU => self.icmp(IntPredicate::Ugt)?,
            Operator::I32LeS | Operator::I64LeS => self.icmp(IntPredicate::Sle)?,
            Operator::I32LeU | Operator::I64LeU => self.icmp(IntPredicate::Ule)?,
            Operator::I32GeS | Operator::I64GeS => self.icmp(IntPredicate::Sge)?,
            Operator::I32GeU | Operator::I64GeU => self.icmp(IntPredicate::Uge)?,

            // Float comparisons
            Operator::F32Eq | Operator::F64Eq => self.fcmp(FloatPredicate::Oeq)?,
            Operator::F32Ne | Operator::F64Ne => self.fcmp(FloatPredicate::Une)?,
            Operator::F32Lt | Operator::F64Lt => self.fcmp(FloatPredicate::Olt)?,
            Operator::F32Gt | Operator::F64Gt => self.fcmp(FloatPredicate::Ogt)?,
            Operator::F32Le | Operator::F64Le => self.fcmp(FloatPredicate::Ole)?,
            Operator::F32Ge | Operator::F64Ge => self.fcmp(FloatPredicate::Oge)?,

            // Integer arithmetic
            Operator::I32Add | Operator::I64Add => self.binop(Opcode::Add)?,
            Operator::I32Sub | Operator::I64Sub => self.binop(Opcode::Sub)?,
            Operator::I32Mul | Operator::I64Mul => self.binop(Opcode::Mul)?,
            Operator::I32DivS | Operator::I64DivS => self.binop(Opcode::SDiv)?,
            Operator::I32DivU | Operator::I64DivU => self.binop(Opcode::UDiv)?,
            Operator::I32RemS | Operator::I64RemS => self.binop(Opcode::SRem)?,
            Operator::I32RemU | Operator::I64RemU => self.binop(Opcode::URem)?,
            Operator::I32And | Operator::I64And => self.binop(Opcode::And)?,
            Operator::I32Or | Operator::I64Or => self.binop(Opcode::Or)?,
            Operator::I32Xor | Operator::I64Xor => self.binop(Opcode::Xor)?,
            Operator::I32Shl | Operator::I64Shl => self.shift(Opcode::Shl)?,
            Operator::I32ShrS | Operator::I64ShrS => self.shift(Opcode::AShr)?,
            Operator::I32ShrU | Operator::I64ShrU => self.shift(Opcode::LShr)?,
            Operator::I32Rotl | Operator::I64Rotl => self.rotate("fshl")?,
            Operator::I32Rotr | Operator::I64Rotr => self.rotate("fshr")?,
            Operator::I32Clz | Operator::I64Clz => self.count_zeros("ctlz")?,
            Operator::I32Ctz | Operator::I64Ctz => self.count_zeros("cttz")?,
            Operator::I32Popcnt | Operator::I64Popcnt => self.unary_intrinsic("ctpop")?,

            // Float arithmetic
            Operator::F32Add | Operator::F64Add => self.binop(Opcode::FAdd)?,
            Operator::F32Sub | Operator::F64Sub => self.binop(Opcode::FSub)?,
            Operator::F32Mul | Operator::F64Mul => self.binop(Opcode::FMul)?,
            Operator::F32Div | Operator::F64Div => self.binop(Opcode::FDiv)?,
            Operator::F32Min | Operator::F64Min => self.binary_intrinsic("minimum")?,
            Operator::F32Max | Operator::F64Max => self.binary_intrinsic("maximum")?,
            Operator::F32Copysign | Operator::F64Copysign => self.binary_intrinsic("copysign")?,
            Operator::F32Abs | Operator::F64Abs => self.unary_intrinsic("fabs")?,
            Operator::F32Ceil | Operator::F64Ceil => self.unary_intrinsic("ceil")?,
            Operator::F32Floor | Operator::F64Floor => self.unary_intrinsic("floor")?,
            Operator::F32Trunc | Operator::F64Trunc => self.unary_intrinsic("trunc")?,
            Operator::F32Nearest | Operator::F64Nearest => self.unary_intrinsic("nearbyint")?,
            Operator::F32Sqrt | Operator::F64Sqrt => self.unary_intrinsic("sqrt")?,
            Operator::F32Neg | Operator::F64Neg => {
                let value = self.pop()?;
                let value = self.builder.fneg(value, "")?;
                self.push(value);
            }

            // Conversions
            Operator::I32WrapI64 => self.int_cast(Opcode::Trunc, 32)?,
            Operator::I64ExtendI32S => self.int_cast(Opcode::SExt, 64)?,
            Operator::I64ExtendI32U => self.int_cast(Opcode::ZExt, 64)?,
            Operator::I32TruncF32S | Operator::I32TruncF64S => self.int_cast(Opcode::FPToSI, 32)?,
            Operator::I32TruncF32U | Operator::I32TruncF64U => self.int_cast(Opcode::FPToUI, 32)?,
            Operator::I64TruncF32S | Operator::I64TruncF64S => self.int_cast(Opcode::FPToSI, 64)?,
            Operator::I64TruncF32U | Operator::I64TruncF64U => self.int_cast(Opcode::FPToUI, 64)?,
            Operator::F32ConvertI32S | Operator::F32ConvertI64S => {
                self.float_cast(Opcode::SIToFP, Float::F32)?
            }
            Operator::F32ConvertI32U | Operator::F32ConvertI64U => {
                self.float_cast(Opcode::UIToFP, Float::F32)?
            }
            Operator::F64ConvertI32S | Operator::F64ConvertI64S => {
                self.float_cast(Opcode::SIToFP, Float::F64)?
            }
            Operator::F64ConvertI32U | Operator::F64ConvertI64U => {
                self.float_cast(Opcode::UIToFP, Float::F64)?
            }
            Operator::F32DemoteF64 => self.float_cast(Opcode::FPTrunc, Float::F32)?,
            Operator::F64PromoteF32 => self.float_cast(Opcode::FPExt, Float::F64)?,
            Operator::I32ReinterpretF32 => self.int_cast(Opcode::BitCast, 32)?,
            Operator::I64ReinterpretF64 => self.int_cast(Opcode::BitCast, 64)?,
            Operator::F32ReinterpretI32 => self.float_cast(Opcode::BitCast, Float::F32)?,
            Operator::F64ReinterpretI64 => self.float_cast(Opcode::BitCast, Float::F64)?,
            Operator::I32Extend8S | Operator::I64Extend8S => self.sign_extend_from(8)?,
            Operator::I32Extend16S | Operator::I64Extend16S => self.sign_extend_from(16)?,
            Operator::I64Extend32S => self.sign_extend_from(32)?,

            other => bail!("operator {other:?} has no IR mapping"),
        }
        Ok(())
    }

    /// Inside unreachable code only nesting matters; the `else`/`end` that
    /// closes the dead region is translated normally.
    fn skip_dead(&mut self, op: &Operator, depth: u32) -> Result<()> {
        match op {
            Operator::Block { .. } | Operator::Loop { .. } | Operator::If { .. } => {
                self.dead = Some(depth + 1);
            }
            Operator::Else if depth == 0 => return self.else_(),
            Operator::End if depth == 0 => return self.end(),
            Operator::End => self.dead = Some(depth - 1),
            _ => {}
        }
        Ok(())
    }

    fn block_result(&mut self, blockty: &BlockType) -> Result<Option<TypeId>> {
        match blockty {
            BlockType::Empty => Ok(None),
            BlockType::Type(ty) => value_type(self.module_mut(), *ty).map(Some),
            BlockType::FuncType(_) => bail!("multi-value blocks are not supported"),
        }
    }

    fn block(&mut self, blockty: &BlockType) -> Result<()> {
        let result = self.block_result(blockty)?;
        let n = self.new_label();
        let end = self.new_block(&format!("block{n}"))?;
        self.push_frame(FrameKind::Block, end, end, None, result, &format!("block{n}"))
    }

    fn loop_(&mut self, blockty: &BlockType) -> Result<()> {
        let result = self.block_result(blockty)?;
        let n = self.new_label();
        let header = self.new_block(&format!("loop{n}"))?;
        let end = self.new_block(&format!("loop{n}.end"))?;
        self.builder.br(header)?;
        self.builder.position_at_end(header);
        self.push_frame(FrameKind::Loop, header, end, None, result, &format!("loop{n}"))
    }

    fn if_(&mut self, blockty: &BlockType) -> Result<()> {
        let result = self.block_result(blockty)?;
        let cond = self.pop()?;
        let cond = self.truthy(cond)?;
        let n = self.new_label();
        let then_block = self.new_block(&format!("if{n}.then"))?;
        let else_block = self.new_block(&format!("if{n}.else"))?;
        let end = self.new_block(&format!("if{n}.end"))?;
        self.builder.cbranch(cond, then_block, else_block)?;
        self.builder.position_at_end(then_block);
        self.push_frame(FrameKind::If, end, end, Some(else_block), result, &format!("if{n}"))
    }

    /// Leaves the innermost frame through its `end` block, storing the
    /// frame result first.
    fn fall_through(&mut self, end: ValueId, result: Option<ValueId>) -> Result<()> {
        if let Some(slot) = result {
            let value = self.pop()?;
            self.builder.store(value, slot)?;
        }
        self.builder.br(end)?;
        Ok(())
    }

    fn else_(&mut self) -> Result<()> {
        let reachable = self.dead.is_none();
        self.dead = None;
        let frame = self.frames.last().context("`else` outside of any block")?;
        ensure!(frame.kind == FrameKind::If, "`else` without a matching `if`");
        let (end, result, height) = (frame.end, frame.result, frame.height);
        let else_block = frame.else_block.context("`if` has no else arm")?;

        if reachable {
            self.fall_through(end, result)?;
        }
        self.stack.truncate(height);
        self.builder.position_at_end(else_block);
        if let Some(frame) = self.frames.last_mut() {
            frame.kind = FrameKind::Else;
            frame.else_block = None;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let reachable = self.dead.is_none();
        self.dead = None;

        let Some(frame) = self.frames.last() else {
            if reachable {
                self.emit_return()?;
            }
            self.finished = true;
            return Ok(());
        };
        let (end, result, height, else_block) =
            (frame.end, frame.result, frame.height, frame.else_block);

        if reachable {
            self.fall_through(end, result)?;
        }
        // An `if` without `else` falls straight through its else arm.
        if let Some(else_block) = else_block {
            self.builder.position_at_end(else_block);
            self.builder.br(end)?;
        }
        self.frames.pop();
        self.stack.truncate(height);
        self.builder.position_at_end(end);
        if let Some(slot) = result {
            let value = self.builder.load(slot, "")?;
            self.push(value);
        }
        Ok(())
    }

    fn br(&mut self, depth: u32) -> Result<()> {
        match self.branch_target(depth)? {
            BranchTarget::Block { block, result } => {
                self.store_result(result)?;
                self.builder.br(block)?;
            }
            BranchTarget::Return => self.emit_return()?,
        }
        self.enter_dead_code();
        Ok(())
    }

    fn br_if(&mut self, depth: u32) -> Result<()> {
        let cond = self.pop()?;
        let cond = self.truthy(cond)?;
        let n = self.new_label();
        let target = match self.branch_target(depth)? {
            BranchTarget::Block { block, result } => {
                self.store_result(result)?;
                block
            }
            BranchTarget::Return => self.return_block(&format!("br{n}.ret"))?,
        };
        let cont = self.new_block(&format!("br{n}.cont"))?;
        self.builder.cbranch(cond, target, cont)?;
        self.builder.position_at_end(cont);
        Ok(())
    }

    fn br_table(&mut self, table: &BrTable) -> Result<()> {
        let index = self.pop()?;
        let n = self.new_label();
        let depths = table
            .targets()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read br_table targets")?;

        let mut return_block = None;
        let mut stored = Vec::new();
        let mut resolve = |this: &mut Self, depth: u32| -> Result<ValueId> {
            match this.branch_target(depth)? {
                BranchTarget::Block { block, result } => {
                    if let Some(slot) = result.filter(|slot| !stored.contains(slot)) {
                        this.store_result(Some(slot))?;
                        stored.push(slot);
                    }
                    Ok(block)
                }
                BranchTarget::Return => match return_block {
                    Some(block) => Ok(block),
                    None => {
                        let block = this.return_block(&format!("br_table{n}.ret"))?;
                        return_block = Some(block);
                        Ok(block)
                    }
                },
            }
        };

        let default = resolve(self, table.default())?;
        let cases = depths
            .into_iter()
            .map(|depth| resolve(self, depth))
            .collect::<Result<Vec<_>>>()?;

        let switch = self.builder.switch(index, default)?;
        for (i, dest) in cases.into_iter().enumerate() {
            let value = self.int(32, i as u64);
            self.builder.add_case(switch, value, dest)?;
        }
        self.enter_dead_code();
        Ok(())
    }

    fn call(&mut self, function_index: u32) -> Result<()> {
        let callee = self
            .env
            .functions
            .get(function_index as usize)
            .copied()
            .with_context(|| format!("function index {function_index} out of range"))?;
        let arity = self.module().value(callee).argument_ids().len();
        let floor = self.frames.last().map_or(0, |frame| frame.height);
        let split = self
            .stack
            .len()
            .checked_sub(arity)
            .filter(|&split| split >= floor)
            .context("operand stack underflow")?;
        let args = self.stack.split_off(split);

        let call = self.builder.call(callee, &args, "")?;
        if self.env.nounwind_imports && (function_index as usize) < self.env.imported_functions {
            self.module()
                .value(call)
                .add_attribute(AttrIndex::Function, Attribute::Enum(AttrKind::NoUnwind));
        }
        if !self.module().value(call).ty().is_void() {
            self.push(call);
        }
        Ok(())
    }

    // ---- numeric helpers ----

    fn push_bool(&mut self, cond: ValueId) -> Result<()> {
        let i32_ty = self.int_type(32);
        let value = self.builder.zext(cond, i32_ty, "")?;
        self.push(value);
        Ok(())
    }

    fn icmp(&mut self, pred: IntPredicate) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let cond = self.builder.icmp(pred, lhs, rhs, "")?;
        self.push_bool(cond)
    }

    fn fcmp(&mut self, pred: FloatPredicate) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let cond = self.builder.fcmp(pred, lhs, rhs, "")?;
        self.push_bool(cond)
    }

    fn binop(&mut self, op: Opcode) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let value = self.builder.binop(op, lhs, rhs, "")?;
        self.push(value);
        Ok(())
    }

    /// Shift counts are taken modulo the bit width.
    fn shift(&mut self, op: Opcode) -> Result<()> {
        let count = self.pop()?;
        let lhs = self.pop()?;
        let bits = self.int_width(lhs)?;
        let mask = self.int(bits, u64::from(bits - 1));
        let count = self.builder.and(count, mask, "")?;
        let value = self.builder.binop(op, lhs, count, "")?;
        self.push(value);
        Ok(())
    }

    fn int_width(&self, value: ValueId) -> Result<u32> {
        self.module()
            .value(value)
            .ty()
            .int_width()
            .context("expected an integer operand")
    }

    fn rotate(&mut self, funnel: &str) -> Result<()> {
        let count = self.pop()?;
        let value = self.pop()?;
        let ty = self.type_of(value);
        let name = format!("llvm.{funnel}.{}", self.suffix(ty)?);
        let intrinsic = self.intrinsic(&name, ty, &[ty, ty, ty], true)?;
        let result = self.builder.call(intrinsic, &[value, value, count], "")?;
        self.push(result);
        Ok(())
    }

    /// `ctlz`/`cttz` with a defined result for zero input.
    fn count_zeros(&mut self, base: &str) -> Result<()> {
        let value = self.pop()?;
        let ty = self.type_of(value);
        let i1 = self.int_type(1);
        let name = format!("llvm.{base}.{}", self.suffix(ty)?);
        let intrinsic = self.intrinsic(&name, ty, &[ty, i1], true)?;
        let zero_is_poison = self.int(1, 0);
        let result = self.builder.call(intrinsic, &[value, zero_is_poison], "")?;
        self.push(result);
        Ok(())
    }

    fn unary_intrinsic(&mut self, base: &str) -> Result<()> {
        let value = self.pop()?;
        let ty = self.type_of(value);
        let name = format!("llvm.{base}.{}", self.suffix(ty)?);
        let intrinsic = self.intrinsic(&name, ty, &[ty], true)?;
        let result = self.builder.call(intrinsic, &[value], "")?;
        self.push(result);
        Ok(())
    }

    fn binary_intrinsic(&mut self, base: &str) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let ty = self.type_of(lhs);
        let name = format!("llvm.{base}.{}", self.suffix(ty)?);
        let intrinsic = self.intrinsic(&name, ty, &[ty, ty], true)?;
        let result = self.builder.call(intrinsic, &[lhs, rhs], "")?;
        self.push(result);
        Ok(())
    }

    fn int_cast(&mut self, op: Opcode, bits: u32) -> Result<()> {
        let value = self.pop()?;
        let ty = self.int_type(bits);
        let value = self.builder.cast(op, value, ty, "")?;
        self.push(value);
        Ok(())
    }

    fn float_cast(&mut self, op: Opcode, float: Float) -> Result<()> {
        let value = self.pop()?;
        let ty = match float {
            Float::F32 => self.module_mut().float_type(),
            Float::F64 => self.module_mut().double_type(),
        };
        let value = self.builder.cast(op, value, ty, "")?;
        self.push(value);
        Ok(())
    }

    /// Sign-extends the low `bits` of the stack top in place.
    fn sign_extend_from(&mut self, bits: u32) -> Result<()> {
        let value = self.pop()?;
        let ty = self.type_of(value);
        let narrow = self.int_type(bits);
        let narrow = self.builder.trunc(value, narrow, "")?;
        let value = self.builder.sext(narrow, ty, "")?;
        self.push(value);
        Ok(())
    }

    // ---- linear memory ----

    /// Pointer to the accessed bytes, typed as `access*`.
    fn address(&mut self, memarg: &MemArg, access: TypeId) -> Result<ValueId> {
        ensure!(memarg.memory == 0, "only memory 0 is supported");
        let memory = self
            .env
            .memory
            .context("memory access in a module without linear memory")?;
        let mut addr = self.pop()?;
        if memarg.offset != 0 {
            let offset =
                u32::try_from(memarg.offset).context("memory offset does not fit in 32 bits")?;
            let offset = self.int(32, u64::from(offset));
            addr = self.builder.add(addr, offset, "")?;
        }
        let zero = self.int(32, 0);
        let byte = self.builder.gep(memory, &[zero, addr], "")?;
        if self.module().value(byte).ty().element_type().map(|ty| ty.id()) == Some(access) {
            return Ok(byte);
        }
        let ptr_ty = self.module_mut().pointer_type(access);
        self.builder.bitcast(byte, ptr_ty, "")
    }

    fn load_typed(&mut self, memarg: &MemArg, ty: TypeId) -> Result<()> {
        let ptr = self.address(memarg, ty)?;
        let value = self.builder.load(ptr, "")?;
        self.push(value);
        Ok(())
    }

    /// Integer load of `bits`, optionally reading a narrower `(width,
    /// signed)` field and extending it.
    fn load(&mut self, memarg: &MemArg, bits: u32, narrow: Option<(u32, bool)>) -> Result<()> {
        let ty = self.int_type(bits);
        let Some((width, signed)) = narrow else {
            return self.load_typed(memarg, ty);
        };
        let narrow_ty = self.int_type(width);
        let ptr = self.address(memarg, narrow_ty)?;
        let value = self.builder.load(ptr, "")?;
        let value = if signed {
            self.builder.sext(value, ty, "")?
        } else {
            self.builder.zext(value, ty, "")?
        };
        self.push(value);
        Ok(())
    }

    /// Stores the stack top, truncated to `width` bits when given.
    fn store(&mut self, memarg: &MemArg, width: Option<u32>) -> Result<()> {
        let mut value = self.pop()?;
        if let Some(width) = width {
            let narrow = self.int_type(width);
            value = self.builder.trunc(value, narrow, "")?;
        }
        let ty = self.type_of(value);
        let ptr = self.address(memarg, ty)?;
        self.builder.store(value, ptr)?;
        Ok(())
    }
}
