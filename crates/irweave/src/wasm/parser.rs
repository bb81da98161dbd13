//! Section-level view of a WebAssembly binary.
//!
//! The binary is validated as a whole first, so the lowering pass can trust
//! operand types and stack heights. Code bodies are not decoded here; each
//! [`FunctionCode`] keeps the `wasmparser` body borrowed from the input and
//! the translator reads its locals and operators when it gets to it.

use anyhow::{bail, Context, Result};
use wasmparser::{
    CompositeInnerType, ConstExpr, ExternalKind, FuncType, FunctionBody, MemoryType, Operator,
    Parser, Payload, TypeRef, ValType, Validator,
};

/// Constant initializer of a global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub ty: ValType,
    pub mutable: bool,
    pub init: InitValue,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// Signature, as a type section index.
    Function(u32),
    Global { ty: ValType, mutable: bool },
    /// Limits land in [`ParsedModule::memory`].
    Memory,
}

#[derive(Debug, Clone)]
pub struct Import<'a> {
    pub module: &'a str,
    pub field: &'a str,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub struct Export<'a> {
    pub name: &'a str,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A function defined in the code section, still undecoded.
#[derive(Clone)]
pub struct FunctionCode<'a> {
    pub type_idx: u32,
    pub body: FunctionBody<'a>,
}

/// Everything the lowering pass reads, borrowed from the input bytes.
#[derive(Default)]
pub struct ParsedModule<'a> {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import<'a>>,
    pub functions: Vec<FunctionCode<'a>>,
    /// Memory 0, imported or defined.
    pub memory: Option<MemoryType>,
    pub globals: Vec<GlobalDef>,
    pub exports: Vec<Export<'a>>,
    /// Imported functions come first in the function index space.
    pub num_imported_functions: u32,
    /// Imported globals come first in the global index space.
    pub num_imported_globals: u32,
    /// Function section entries, matched up with code entries in order.
    declared: Vec<u32>,
}

impl<'a> ParsedModule<'a> {
    /// First export name of the function at `func_idx`.
    pub fn func_export_name(&self, func_idx: u32) -> Option<&'a str> {
        self.exported(ExternalKind::Func, func_idx).map(|export| export.name)
    }

    pub fn is_global_exported(&self, global_idx: u32) -> bool {
        self.exported(ExternalKind::Global, global_idx).is_some()
    }

    fn exported(&self, kind: ExternalKind, index: u32) -> Option<&Export<'a>> {
        self.exports
            .iter()
            .find(|export| export.kind == kind && export.index == index)
    }

    fn read_payload(&mut self, payload: Payload<'a>) -> Result<()> {
        match payload {
            Payload::TypeSection(reader) => {
                for group in reader {
                    for sub_type in group?.into_types() {
                        let CompositeInnerType::Func(func) = sub_type.composite_type.inner else {
                            bail!("type section holds a non-function type");
                        };
                        self.types.push(func);
                    }
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    self.read_import(import?)?;
                }
            }
            Payload::FunctionSection(reader) => {
                for type_idx in reader {
                    self.declared.push(type_idx?);
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    self.add_memory(memory?)?;
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    let index = self.num_imported_globals as usize + self.globals.len();
                    self.globals.push(GlobalDef {
                        ty: global.ty.content_type,
                        mutable: global.ty.mutable,
                        init: constant(&global.init_expr)
                            .with_context(|| format!("initializer of global {index}"))?,
                    });
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    self.exports.push(Export {
                        name: export.name,
                        kind: export.kind,
                        index: export.index,
                    });
                }
            }
            Payload::CodeSectionEntry(body) => {
                let Some(&type_idx) = self.declared.get(self.functions.len()) else {
                    bail!("code entry {} has no function declaration", self.functions.len());
                };
                self.functions.push(FunctionCode { type_idx, body });
            }
            _ => {}
        }
        Ok(())
    }

    /// Records `memory` as memory 0 unless one was seen already.
    fn add_memory(&mut self, memory: MemoryType) -> Result<()> {
        if memory.memory64 {
            bail!("64-bit linear memory is not supported");
        }
        if self.memory.is_none() {
            self.memory = Some(memory);
        }
        Ok(())
    }

    fn read_import(&mut self, import: wasmparser::Import<'a>) -> Result<()> {
        let kind = match import.ty {
            TypeRef::Func(type_idx) => {
                self.num_imported_functions += 1;
                ImportKind::Function(type_idx)
            }
            TypeRef::Global(global) => {
                self.num_imported_globals += 1;
                ImportKind::Global {
                    ty: global.content_type,
                    mutable: global.mutable,
                }
            }
            TypeRef::Memory(memory) => {
                self.add_memory(memory)?;
                ImportKind::Memory
            }
            TypeRef::Table(_) => {
                log::warn!("table import {}.{} is not lowered", import.module, import.name);
                return Ok(());
            }
            other => bail!("cannot import {other:?} as {}.{}", import.module, import.name),
        };
        self.imports.push(Import {
            module: import.module,
            field: import.name,
            kind,
        });
        Ok(())
    }
}

/// Value of a one-operator constant expression.
fn constant(expr: &ConstExpr<'_>) -> Result<InitValue> {
    let op = expr.get_operators_reader().read()?;
    Ok(match op {
        Operator::I32Const { value } => InitValue::I32(value),
        Operator::I64Const { value } => InitValue::I64(value),
        Operator::F32Const { value } => InitValue::F32(f32::from_bits(value.bits())),
        Operator::F64Const { value } => InitValue::F64(f64::from_bits(value.bits())),
        other => bail!("unsupported const expression operator: {other:?}"),
    })
}

/// Validates `wasm` and collects its sections.
pub fn parse_wasm(wasm: &[u8]) -> Result<ParsedModule<'_>> {
    Validator::new().validate_all(wasm)?;

    let mut module = ParsedModule::default();
    for payload in Parser::new(0).parse_all(wasm) {
        module.read_payload(payload?)?;
    }
    if module.functions.len() != module.declared.len() {
        bail!(
            "{} functions declared but {} bodies present",
            module.declared.len(),
            module.functions.len()
        );
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module() {
        let wasm = wat::parse_str("(module)").unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert!(module.types.is_empty());
        assert!(module.functions.is_empty());
        assert!(module.memory.is_none());
    }

    #[test]
    fn bodies_stay_undecoded() {
        let wasm = wat::parse_str(
            r#"(module
                (func (param i32) (result i32) (local i64 i64) (local f32)
                    local.get 0))"#,
        )
        .unwrap();
        let module = parse_wasm(&wasm).unwrap();
        let code = &module.functions[0];
        assert_eq!(code.type_idx, 0);

        let locals: Vec<(u32, ValType)> = code
            .body
            .get_locals_reader()
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(locals, [(2, ValType::I64), (1, ValType::F32)]);
        assert!(code.body.range().start > 0);
    }

    #[test]
    fn memory_and_global_initializers() {
        let wasm = wat::parse_str(
            r#"(module
                (memory 2 10)
                (global (mut i32) (i32.const -1))
                (global f64 (f64.const 1.5)))"#,
        )
        .unwrap();
        let module = parse_wasm(&wasm).unwrap();
        let memory = module.memory.unwrap();
        assert_eq!((memory.initial, memory.maximum), (2, Some(10)));
        assert!(module.globals[0].mutable);
        assert_eq!(module.globals[0].init, InitValue::I32(-1));
        assert!(!module.globals[1].mutable);
        assert_eq!(module.globals[1].init, InitValue::F64(1.5));
    }

    #[test]
    fn imported_memory_keeps_its_limits() {
        let wasm = wat::parse_str(r#"(module (import "host" "memory" (memory 3 8)))"#).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert!(matches!(module.imports[0].kind, ImportKind::Memory));
        let memory = module.memory.unwrap();
        assert_eq!((memory.initial, memory.maximum), (3, Some(8)));
    }

    #[test]
    fn imports_shift_the_index_spaces() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "print" (func (param i32)))
                (import "env" "counter" (global i32))
                (import "env" "read" (func (result i32)))
                (func (result i32) i32.const 99)
                (export "ninety_nine" (func 2))
                (export "counter" (global 0)))"#,
        )
        .unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.imports.len(), 3);
        assert_eq!((module.imports[2].module, module.imports[2].field), ("env", "read"));
        assert_eq!(module.num_imported_functions, 2);
        assert_eq!(module.num_imported_globals, 1);
        assert!(matches!(
            module.imports[1].kind,
            ImportKind::Global { ty: ValType::I32, mutable: false }
        ));
        assert_eq!(module.func_export_name(2), Some("ninety_nine"));
        assert_eq!(module.func_export_name(0), None);
        assert!(module.is_global_exported(0));
    }

    #[test]
    fn global_get_initializer_is_rejected() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "base" (global i32))
                (global i32 (global.get 0)))"#,
        )
        .unwrap();
        let Err(err) = parse_wasm(&wasm) else {
            panic!("a global.get initializer was accepted");
        };
        let message = format!("{err:#}");
        assert!(message.contains("initializer of global 1"), "{message}");
        assert!(message.contains("GlobalGet"), "{message}");
    }

    #[test]
    fn invalid_module_fails_validation() {
        let wasm = wat::parse_str(r#"(module (func (result i32) i64.const 1))"#).unwrap();
        assert!(parse_wasm(&wasm).is_err());
    }
}
