//! Per-function translation state.
//!
//! A [`FunctionTranslator`] walks one function body and emits IR through a
//! [`Builder`]. Wasm locals live in entry-block `alloca` slots; the operand
//! stack holds SSA values. Structured control flow is tracked with a frame
//! stack, and a block's result travels through a dedicated slot so no phi
//! nodes are needed.

use anyhow::{bail, ensure, Context, Result};
use irweave_ir::{AttrKind, Builder, DebugLoc, IntPredicate, Module, TypeId, TypeKind, ValueId};
use log::trace;
use wasmparser::ValType;

use super::parser::FunctionCode;

/// Module-wide lookups shared by every function body.
pub(super) struct ModuleEnv {
    /// Function index space: imports first, then definitions.
    pub functions: Vec<ValueId>,
    pub imported_functions: usize,
    /// Global index space.
    pub globals: Vec<ValueId>,
    /// `[0 x i8]` global standing in for linear memory 0.
    pub memory: Option<ValueId>,
    pub nounwind_imports: bool,
    /// Set when instructions carry their byte offset as a debug location.
    pub debug_file: Option<String>,
}

/// Maps a Wasm value type onto the IR type table.
pub(super) fn value_type(module: &mut Module, ty: ValType) -> Result<TypeId> {
    Ok(match ty {
        ValType::I32 => module.int_type(32),
        ValType::I64 => module.int_type(64),
        ValType::F32 => module.float_type(),
        ValType::F64 => module.double_type(),
        other => bail!("unsupported value type {other:?}"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameKind {
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
pub(super) struct Frame {
    pub kind: FrameKind,
    /// Where a branch to this frame lands: the header for loops, `end`
    /// otherwise.
    pub target: ValueId,
    /// Where control continues after `end`.
    pub end: ValueId,
    /// Else arm of an `if` that has not seen `else` yet.
    pub else_block: Option<ValueId>,
    pub result: Option<ValueId>,
    /// Operand stack height on entry.
    pub height: usize,
}

/// Where a branch goes.
pub(super) enum BranchTarget {
    Block {
        block: ValueId,
        result: Option<ValueId>,
    },
    /// A branch out of the function body returns.
    Return,
}

pub(super) struct FunctionTranslator<'e, 'm> {
    pub builder: Builder<'m>,
    pub env: &'e ModuleEnv,
    pub function: ValueId,
    entry: ValueId,
    last_alloca: Option<ValueId>,
    pub result: Option<TypeId>,
    pub locals: Vec<ValueId>,
    pub stack: Vec<ValueId>,
    pub frames: Vec<Frame>,
    /// Nesting depth inside unreachable code; `None` while reachable.
    pub dead: Option<u32>,
    pub finished: bool,
    labels: u32,
}

impl<'e, 'm> FunctionTranslator<'e, 'm> {
    fn new(module: &'m mut Module, env: &'e ModuleEnv, function: ValueId) -> Result<Self> {
        let fn_ty = module
            .value(function)
            .function_type()
            .context("translation target is not a function")?;
        let result = fn_ty.return_type().filter(|ty| !ty.is_void()).map(|ty| ty.id());
        let entry = module.append_block(function, "entry")?;
        Ok(Self {
            builder: Builder::at_end(module, entry),
            env,
            function,
            entry,
            last_alloca: None,
            result,
            locals: Vec::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            dead: None,
            finished: false,
            labels: 0,
        })
    }

    /// Spills parameters into slots and zero-initializes declared locals.
    fn prologue(&mut self, declared: &[TypeId]) -> Result<()> {
        let args = self.module().value(self.function).argument_ids().to_vec();
        for arg in args {
            let ty = self.type_of(arg);
            let slot = self.alloca(ty, &format!("local{}", self.locals.len()))?;
            self.builder.store(arg, slot)?;
            self.locals.push(slot);
        }
        for &ty in declared {
            let slot = self.alloca(ty, &format!("local{}", self.locals.len()))?;
            let zero = self.zero(ty)?;
            self.builder.store(zero, slot)?;
            self.locals.push(slot);
        }
        Ok(())
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.builder.module_mut()
    }

    pub fn type_of(&self, value: ValueId) -> TypeId {
        self.module().value(value).ty().id()
    }

    pub fn int_type(&mut self, bits: u32) -> TypeId {
        self.module_mut().int_type(bits)
    }

    pub fn int(&mut self, bits: u32, value: u64) -> ValueId {
        let ty = self.int_type(bits);
        self.module_mut().const_int(ty, value)
    }

    pub fn zero(&mut self, ty: TypeId) -> Result<ValueId> {
        let ty_ref = self.module().ty(ty);
        if ty_ref.int_width().is_some() {
            Ok(self.module_mut().const_int(ty, 0))
        } else if ty_ref.is_floating_point() {
            Ok(self.module_mut().const_float(ty, 0.0))
        } else {
            bail!("no zero value for {}", ty_ref)
        }
    }

    /// Emits an `alloca` at the top of the entry block and returns to the
    /// current insertion point.
    pub fn alloca(&mut self, ty: TypeId, name: &str) -> Result<ValueId> {
        let resume = self.builder.insert_point();
        match self.last_alloca {
            Some(last) => self.builder.position_after(last),
            None => self.builder.position_at_start(self.entry),
        }
        let slot = self.builder.alloca(ty, name);
        self.builder.set_insert_point(resume);
        let slot = slot?;
        self.last_alloca = Some(slot);
        Ok(slot)
    }

    pub fn new_label(&mut self) -> u32 {
        self.labels += 1;
        self.labels
    }

    pub fn new_block(&mut self, name: &str) -> Result<ValueId> {
        let function = self.function;
        self.module_mut().append_block(function, name)
    }

    pub fn push(&mut self, value: ValueId) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<ValueId> {
        let floor = self.frames.last().map_or(0, |frame| frame.height);
        ensure!(self.stack.len() > floor, "operand stack underflow");
        self.stack.pop().context("operand stack underflow")
    }

    pub fn peek(&self) -> Result<ValueId> {
        self.stack.last().copied().context("operand stack is empty")
    }

    pub fn local(&self, index: u32) -> Result<ValueId> {
        self.locals
            .get(index as usize)
            .copied()
            .with_context(|| format!("local index {index} out of range"))
    }

    pub fn global(&self, index: u32) -> Result<ValueId> {
        self.env
            .globals
            .get(index as usize)
            .copied()
            .with_context(|| format!("global index {index} out of range"))
    }

    /// `value != 0` as an `i1`.
    pub fn truthy(&mut self, value: ValueId) -> Result<ValueId> {
        let zero = self.zero(self.type_of(value))?;
        self.builder.icmp(IntPredicate::Ne, value, zero, "")
    }

    /// Declares an intrinsic on first use.
    pub fn intrinsic(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[TypeId],
        pure: bool,
    ) -> Result<ValueId> {
        if let Some(existing) = self.module().get_function(name) {
            return Ok(existing.id());
        }
        let module = self.module_mut();
        let fn_ty = module.function_type(ret, params, false);
        let function = module.add_function(name, fn_ty)?;
        let function_ref = module.value(function);
        function_ref.add_function_attribute(AttrKind::NoUnwind);
        if pure {
            function_ref.add_function_attribute(AttrKind::ReadNone);
        }
        trace!("declared intrinsic @{name}");
        Ok(function)
    }

    /// Overload suffix of a scalar type (`i32`, `f64`, ...).
    pub fn suffix(&self, ty: TypeId) -> Result<&'static str> {
        Ok(match self.module().ty(ty).kind() {
            TypeKind::Integer(32) => "i32",
            TypeKind::Integer(64) => "i64",
            TypeKind::Float => "f32",
            TypeKind::Double => "f64",
            other => bail!("no intrinsic overload for {other:?}"),
        })
    }

    /// Emits `ret` for the function's result (taken from the stack top) or
    /// `ret void`.
    pub fn emit_return(&mut self) -> Result<()> {
        match self.result {
            Some(_) => {
                let value = self.peek()?;
                self.builder.ret(value)?;
            }
            None => {
                self.builder.ret_void()?;
            }
        }
        Ok(())
    }

    /// Builds a block that only returns, for conditional branches out of
    /// the function body. The insertion point is left unchanged.
    pub fn return_block(&mut self, name: &str) -> Result<ValueId> {
        let block = self.new_block(name)?;
        let resume = self.builder.insert_point();
        self.builder.position_at_end(block);
        let emitted = self.emit_return();
        self.builder.set_insert_point(resume);
        emitted?;
        Ok(block)
    }

    pub fn branch_target(&self, depth: u32) -> Result<BranchTarget> {
        let depth = depth as usize;
        if depth == self.frames.len() {
            return Ok(BranchTarget::Return);
        }
        let frame = self
            .frames
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.frames.get(i))
            .with_context(|| {
                format!("branch depth {depth} exceeds control depth {}", self.frames.len())
            })?;
        Ok(match frame.kind {
            FrameKind::Loop => BranchTarget::Block {
                block: frame.target,
                result: None,
            },
            _ => BranchTarget::Block {
                block: frame.end,
                result: frame.result,
            },
        })
    }

    /// Copies the stack top into a frame's result slot, if it has one.
    pub fn store_result(&mut self, slot: Option<ValueId>) -> Result<()> {
        if let Some(slot) = slot {
            let value = self.peek()?;
            self.builder.store(value, slot)?;
        }
        Ok(())
    }

    pub fn push_frame(
        &mut self,
        kind: FrameKind,
        target: ValueId,
        end: ValueId,
        else_block: Option<ValueId>,
        result_ty: Option<TypeId>,
        name: &str,
    ) -> Result<()> {
        let result = match result_ty {
            Some(ty) => Some(self.alloca(ty, &format!("{name}.result"))?),
            None => None,
        };
        self.frames.push(Frame {
            kind,
            target,
            end,
            else_block,
            result,
            height: self.stack.len(),
        });
        Ok(())
    }

    /// Marks the rest of the current block as unreachable.
    pub fn enter_dead_code(&mut self) {
        self.dead = Some(0);
    }
}

/// Translates one function body into `function`.
pub(super) fn translate_function(
    module: &mut Module,
    env: &ModuleEnv,
    function: ValueId,
    code: &FunctionCode<'_>,
) -> Result<()> {
    let mut declared = Vec::new();
    for entry in code.body.get_locals_reader()? {
        let (count, ty) = entry?;
        let ty = value_type(module, ty)?;
        declared.extend(std::iter::repeat(ty).take(count as usize));
    }

    let mut translator = FunctionTranslator::new(module, env, function)?;
    translator.prologue(&declared)?;

    let mut reader = code.body.get_operators_reader()?;
    while !reader.eof() {
        let offset = reader.original_position();
        let op = reader
            .read()
            .with_context(|| format!("failed to decode operator at offset {offset:#x}"))?;
        if let Some(file) = &env.debug_file {
            translator
                .builder
                .set_debug_loc(Some(DebugLoc::new(file.clone(), 1, offset as u32)));
        }
        trace!("{offset:#x}: {op:?}");
        translator
            .translate_operator(&op)
            .with_context(|| format!("at offset {offset:#x}"))?;
    }
    ensure!(translator.finished, "function body is missing its final `end`");
    Ok(())
}
