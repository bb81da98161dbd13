//! WebAssembly importer.
//!
//! Turns a Wasm binary into an irweave module: imports become declarations,
//! defined functions and globals become definitions, linear memory becomes a
//! byte-array global, and each function body is lowered operator by
//! operator (see [`translate`]).

mod function;
mod parser;
mod translate;

use anyhow::{bail, Context, Result};
use irweave_ir::{AttrIndex, AttrKind, Attribute, Linkage, Module, TypeId, ValueId};
use log::{debug, warn};
use wasmparser::{ExternalKind, FuncType};

use crate::LoadOptions;
use function::{translate_function, value_type, ModuleEnv};
use parser::{ImportKind, InitValue, ParsedModule};

pub(crate) use parser::parse_wasm;

fn signature(module: &mut Module, ty: &FuncType) -> Result<TypeId> {
    let params = ty
        .params()
        .iter()
        .map(|&param| value_type(module, param))
        .collect::<Result<Vec<_>>>()?;
    let ret = match ty.results() {
        [] => module.void_type(),
        [single] => value_type(module, *single)?,
        _ => bail!("multi-value results are not supported"),
    };
    Ok(module.function_type(ret, &params, false))
}

/// Names arguments `p0`, `p1`, ...
fn name_parameters(module: &Module, function: ValueId) {
    for (i, &arg) in module.value(function).argument_ids().iter().enumerate() {
        module.value(arg).set_name(&format!("p{i}"));
    }
}

/// Builds the module from a parsed binary.
pub(crate) fn lower(parsed: &ParsedModule<'_>, options: &LoadOptions) -> Result<Module> {
    let mut module = Module::new(options.module_name.as_str());
    module.set_source_filename(options.source_filename.as_str());

    let signatures = parsed
        .types
        .iter()
        .map(|ty| signature(&mut module, ty))
        .collect::<Result<Vec<_>>>()?;
    let signature_of = |type_idx: u32| {
        signatures
            .get(type_idx as usize)
            .copied()
            .with_context(|| format!("type index {type_idx} out of range"))
    };

    let mut env = ModuleEnv {
        functions: Vec::new(),
        imported_functions: parsed.num_imported_functions as usize,
        globals: Vec::new(),
        memory: None,
        nounwind_imports: options.nounwind_imports,
        debug_file: options.debug_offsets.then(|| options.source_filename.clone()),
    };

    let imported_memory = parsed
        .imports
        .iter()
        .any(|import| matches!(import.kind, ImportKind::Memory));
    if let Some(limits) = &parsed.memory {
        debug!(
            "linear memory ({}): {} pages, maximum {:?}",
            if imported_memory { "imported" } else { "defined" },
            limits.initial,
            limits.maximum
        );
        let i8_ty = module.int_type(8);
        let bytes = module.array_type(i8_ty, 0);
        let memory = module.add_global("memory", bytes);
        if !imported_memory {
            let zero = module.const_null(bytes);
            module.set_initializer(memory, zero)?;
        }
        env.memory = Some(memory);
    }

    for import in &parsed.imports {
        let symbol = format!("{}.{}", import.module, import.field);
        match &import.kind {
            ImportKind::Function(type_idx) => {
                let function = module.add_function(&symbol, signature_of(*type_idx)?)?;
                name_parameters(&module, function);
                let function_ref = module.value(function);
                function_ref.add_attribute(
                    AttrIndex::Function,
                    Attribute::string("wasm-import-module", import.module),
                );
                function_ref.add_attribute(
                    AttrIndex::Function,
                    Attribute::string("wasm-import-name", import.field),
                );
                if options.nounwind_imports {
                    function_ref.add_function_attribute(AttrKind::NoUnwind);
                }
                env.functions.push(function);
            }
            ImportKind::Global { ty, mutable } => {
                let ty = value_type(&mut module, *ty)?;
                let global = module.add_global(&symbol, ty);
                module.set_global_constant(global, !mutable);
                env.globals.push(global);
            }
            ImportKind::Memory => {}
        }
    }

    // Declare every defined function before lowering bodies so calls can
    // reach forward.
    for (i, body) in parsed.functions.iter().enumerate() {
        let index = parsed.num_imported_functions + i as u32;
        let export = parsed.func_export_name(index);
        let name = export.map_or_else(|| format!("func_{index}"), str::to_string);
        let function = module.add_function(&name, signature_of(body.type_idx)?)?;
        name_parameters(&module, function);
        let function_ref = module.value(function);
        match export {
            Some(export) => {
                function_ref.add_attribute(
                    AttrIndex::Function,
                    Attribute::string("wasm-export-name", export),
                );
            }
            None if options.internalize => function_ref.set_linkage(Linkage::Internal),
            None => {}
        }
        env.functions.push(function);
    }

    for (i, global) in parsed.globals.iter().enumerate() {
        let index = parsed.num_imported_globals + i as u32;
        let ty = value_type(&mut module, global.ty)?;
        let variable = module.add_global(&format!("global_{index}"), ty);
        let init = match global.init {
            InitValue::I32(v) => module.const_int(ty, u64::from(v as u32)),
            InitValue::I64(v) => module.const_int(ty, v as u64),
            InitValue::F32(v) => module.const_float(ty, f64::from(v)),
            InitValue::F64(v) => module.const_float(ty, v),
        };
        module.set_initializer(variable, init)?;
        module.set_global_constant(variable, !global.mutable);
        if options.internalize && !parsed.is_global_exported(index) {
            module.value(variable).set_linkage(Linkage::Internal);
        }
        env.globals.push(variable);
    }

    for export in &parsed.exports {
        if export.kind == ExternalKind::Func && export.index as usize >= env.functions.len() {
            warn!("export '{}' names unknown function {}", export.name, export.index);
        }
    }

    for (i, body) in parsed.functions.iter().enumerate() {
        let index = env.imported_functions + i;
        let function = env.functions[index];
        debug!("lowering function {index} as @{}", module.value(function).name());
        translate_function(&mut module, &env, function, body)
            .with_context(|| format!("failed to translate function {index}"))?;
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irweave_ir::{Linkage, Opcode};

    fn import(wat_text: &str) -> Module {
        import_with(wat_text, &LoadOptions::default())
    }

    fn import_with(wat_text: &str, options: &LoadOptions) -> Module {
        let wasm = wat::parse_str(wat_text).unwrap();
        lower(&parse_wasm(&wasm).unwrap(), options).unwrap()
    }

    fn opcodes(module: &Module, function: &str) -> Vec<Opcode> {
        let function = module.get_function(function).unwrap();
        let mut opcodes = Vec::new();
        for &block in function.block_ids() {
            let mut inst = module.value(block).first_instruction();
            while let Some(current) = inst {
                opcodes.extend(current.opcode());
                inst = current.next_instruction();
            }
        }
        opcodes
    }

    #[test]
    fn exported_function_keeps_its_name() {
        let module = import(
            r#"(module
                (func (export "add") (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add))"#,
        );
        let add = module.get_function("add").unwrap();
        assert_eq!(add.linkage(), Linkage::External);
        let args: Vec<String> =
            add.argument_ids().iter().map(|&a| module.value(a).name()).collect();
        assert_eq!(args, ["p0", "p1"]);
        assert!(opcodes(&module, "add").contains(&Opcode::Add));
        assert!(module.to_string().contains("\"wasm-export-name\"=\"add\""));
    }

    #[test]
    fn private_functions_are_internalized() {
        let source = r#"(module (func (result i32) i32.const 1))"#;
        let module = import(source);
        assert_eq!(module.get_function("func_0").unwrap().linkage(), Linkage::Internal);

        let options = LoadOptions {
            internalize: false,
            ..LoadOptions::default()
        };
        let module = import_with(source, &options);
        assert_eq!(module.get_function("func_0").unwrap().linkage(), Linkage::External);
    }

    #[test]
    fn imports_become_declarations() {
        let module = import(
            r#"(module
                (import "env" "log" (func $log (param i32)))
                (import "env" "base" (global i32))
                (func (export "run")
                    global.get 0
                    call $log))"#,
        );
        let log = module.get_function("env.log").unwrap();
        assert!(log.is_declaration());
        let text = module.to_string();
        assert!(text.contains("\"wasm-import-module\"=\"env\""), "{text}");
        assert!(text.contains("\"wasm-import-name\"=\"log\""), "{text}");
        assert!(module.get_global("env.base").unwrap().is_declaration());
        assert!(opcodes(&module, "run").contains(&Opcode::Call));
    }

    #[test]
    fn globals_and_memory() {
        let module = import(
            r#"(module
                (memory 1)
                (global $g (mut i32) (i32.const 7))
                (global (export "limit") i64 (i64.const -1))
                (func (export "poke") (param i32)
                    local.get 0
                    global.get $g
                    i32.store offset=4))"#,
        );
        let g = module.get_global("global_0").unwrap();
        assert_eq!(g.initializer().unwrap().const_int_value(), Some(7));
        assert!(!g.is_global_constant());
        assert_eq!(g.linkage(), Linkage::Internal);
        let limit = module.get_global("global_1").unwrap();
        assert!(limit.is_global_constant());
        assert_eq!(limit.linkage(), Linkage::External);

        assert!(module.get_global("memory").is_some());
        let ops = opcodes(&module, "poke");
        assert!(ops.contains(&Opcode::GetElementPtr));
        assert!(ops.contains(&Opcode::BitCast));
        assert_eq!(ops.last(), Some(&Opcode::Ret));
    }

    #[test]
    fn structured_control_flow() {
        let module = import(
            r#"(module
                (func (export "count") (param i32) (result i32) (local i32)
                    block
                        loop
                            local.get 0
                            i32.eqz
                            br_if 1
                            local.get 1
                            i32.const 1
                            i32.add
                            local.set 1
                            local.get 0
                            i32.const 1
                            i32.sub
                            local.set 0
                            br 0
                        end
                    end
                    local.get 1
                    if (result i32)
                        local.get 1
                    else
                        i32.const -1
                    end))"#,
        );
        let count = module.get_function("count").unwrap();
        let names: Vec<String> =
            count.block_ids().iter().map(|&b| module.value(b).name()).collect();
        assert_eq!(names[0], "entry");
        assert!(names.iter().any(|n| n.starts_with("loop")));
        assert!(names.iter().any(|n| n.ends_with(".then")));
        for &block in count.block_ids() {
            assert!(
                module.value(block).terminator().is_some(),
                "block {} is not terminated",
                module.value(block).name()
            );
        }
    }

    #[test]
    fn br_table_lowers_to_switch() {
        let module = import(
            r#"(module
                (func (export "pick") (param i32)
                    block
                        block
                            local.get 0
                            br_table 0 1 2
                        end
                        nop
                    end))"#,
        );
        let ops = opcodes(&module, "pick");
        assert!(ops.contains(&Opcode::Switch));
        assert!(ops.iter().filter(|&&op| op == Opcode::Ret).count() >= 2);
    }

    #[test]
    fn intrinsics_are_declared_once() {
        let module = import(
            r#"(module
                (func (export "bits") (param i32) (result i32)
                    local.get 0
                    i32.popcnt
                    local.get 0
                    i32.popcnt
                    i32.add
                    memory.size
                    drop)
                (memory 1))"#,
        );
        let ctpop = module.get_function("llvm.ctpop.i32").unwrap();
        assert_eq!(ctpop.uses().len(), 2);
        assert!(module.get_function("llvm.wasm.memory.size.i32").is_some());
        assert!(module.get_function("llvm.ctpop.i32.1").is_none());
    }

    #[test]
    fn debug_offsets_tag_instructions() {
        let options = LoadOptions {
            source_filename: "prog.wasm".to_string(),
            debug_offsets: true,
            ..LoadOptions::default()
        };
        let module = import_with(
            r#"(module (func (export "one") (result i32) i32.const 1))"#,
            &options,
        );
        let one = module.get_function("one").unwrap();
        let ret = one.entry_block().unwrap().terminator().unwrap();
        assert_eq!(ret.debug_filename(), "prog.wasm");
        assert_eq!(ret.debug_line(), 1);
    }

    #[test]
    fn unsupported_operator_is_named() {
        let wasm = wat::parse_str(
            r#"(module
                (table 1 funcref)
                (type $t (func))
                (func (export "indirect") i32.const 0 call_indirect (type $t)))"#,
        )
        .unwrap();
        let err = lower(&parse_wasm(&wasm).unwrap(), &LoadOptions::default()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("CallIndirect"), "{message}");
    }
}
