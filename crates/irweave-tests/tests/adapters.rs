//! Iterator adapter behavior as seen from a foreign caller.

use anyhow::{Context, Result};
use irweave::ffi::iterators::*;
use irweave::ffi::types::irweave_type_is_struct;
use irweave::ffi::values::{
    irweave_get_constant_int_value, irweave_get_opcode_name, irweave_get_value_name,
    irweave_is_constant, irweave_type_of,
};
use irweave::ir::{AttrIndex, AttrKind, Attribute, Builder, Module};
use irweave_tests::*;

fn opcode(value: irweave::ffi::ValueHandle) -> String {
    take_string(unsafe { irweave_get_opcode_name(value) }).unwrap_or_default()
}

fn name(value: irweave::ffi::ValueHandle) -> String {
    take_string(unsafe { irweave_get_value_name(value) }).unwrap_or_default()
}

#[test]
fn module_ranges_come_in_declaration_order() -> Result<()> {
    let module = LoadedModule::parse(fixtures::ARITH)?;
    let names: Vec<String> = functions(&module).into_iter().map(name).collect();
    assert_eq!(names, ["madd", "scaled", "widen", "mix", "llvm.copysign.f64", "llvm.sqrt.f64"]);

    let globals: Vec<String> = globals(&module).into_iter().map(name).collect();
    assert_eq!(globals, ["global_0", "global_1"]);
    Ok(())
}

#[test]
fn every_kind_can_be_disposed_right_after_creation() -> Result<()> {
    let module = LoadedModule::parse(fixtures::CONTROL)?;
    let function = module.function("sum_to");
    let block = unsafe { blocks(function) }[0];
    let inst = unsafe { instructions(block) }[0];
    let arg = unsafe { arguments(function) }[0];
    unsafe {
        irweave_dispose_functions_iter(irweave_functions_iter(module.handle()));
        irweave_dispose_globals_iter(irweave_globals_iter(module.handle()));
        irweave_dispose_blocks_iter(irweave_blocks_iter(function));
        irweave_dispose_arguments_iter(irweave_arguments_iter(function));
        irweave_dispose_instructions_iter(irweave_instructions_iter(block));
        irweave_dispose_operands_iter(irweave_operands_iter(inst));
        irweave_dispose_uses_iter(irweave_uses_iter(inst));
        irweave_dispose_elements_iter(irweave_elements_iter(irweave_type_of(inst)));
        irweave_dispose_attribute_list_iter(irweave_function_attributes_iter(function));
        irweave_dispose_attribute_set_iter(irweave_argument_attributes_iter(arg));
    }
    Ok(())
}

#[test]
fn null_owners_give_null_handles_and_sentinels() {
    unsafe {
        assert!(irweave_blocks_iter(std::ptr::null()).is_null());
        assert!(irweave_functions_iter(std::ptr::null()).is_null());
        assert!(irweave_blocks_iter_next(std::ptr::null_mut()).is_null());
        assert!(irweave_attribute_list_iter_next(std::ptr::null_mut()).is_null());
        irweave_dispose_uses_iter(std::ptr::null_mut());
    }
}

#[test]
fn struct_elements_of_a_non_struct_are_null() -> Result<()> {
    let module = LoadedModule::parse(fixtures::MEMORY)?;
    let memory = module.global("memory");
    let ty = unsafe { irweave_type_of(memory) };
    assert!(!unsafe { irweave_type_is_struct(ty) });
    let it = unsafe { irweave_elements_iter(ty) };
    assert!(it.is_null());
    assert!(unsafe { irweave_elements_iter_next(it) }.is_null());
    unsafe { irweave_dispose_elements_iter(it) };
    Ok(())
}

#[test]
fn struct_elements_in_member_order() {
    let mut module = Module::new("structs");
    let i8_ty = module.int_type(8);
    let i64_ty = module.int_type(64);
    let f32_ty = module.float_type();
    let header = module.named_struct("Header");
    module.set_struct_body(header, &[i8_ty, i64_ty, f32_ty], true).unwrap();

    let members = unsafe { elements(module.ty(header).as_raw()) };
    let expected: Vec<_> = [i8_ty, i64_ty, f32_ty].iter().map(|&t| module.ty(t).as_raw()).collect();
    assert_eq!(members, expected);
}

#[test]
fn operands_come_back_as_referents() -> Result<()> {
    let module = LoadedModule::parse(fixtures::CONTROL)?;
    let clamp = module.function("clamp");
    let select = unsafe { all_instructions(clamp) }
        .into_iter()
        .find(|&inst| opcode(inst) == "select")
        .context("no select in clamp")?;

    let ops = unsafe { operands(select) };
    assert_eq!(ops.len(), 3);
    assert_eq!(opcode(ops[0]), "icmp");
    assert_eq!(opcode(ops[1]), "load");
    assert!(unsafe { irweave_is_constant(ops[2]) });
    assert_eq!(unsafe { irweave_get_constant_int_value(ops[2]) }, 255);
    Ok(())
}

#[test]
fn uses_follow_use_list_order() -> Result<()> {
    let module = LoadedModule::parse(fixtures::CONTROL)?;
    let clamp = module.function("clamp");
    let all = unsafe { all_instructions(clamp) };
    let slot = *all.first().context("empty function")?;
    assert_eq!(opcode(slot), "alloca");

    // Users in emission order, then compare against the adapter, which
    // reports the most recent use first.
    let mut emitted: Vec<_> = all
        .iter()
        .copied()
        .filter(|&inst| unsafe { operands(inst) }.contains(&slot))
        .collect();
    emitted.reverse();
    let users = unsafe { uses(slot) };
    assert_eq!(users, emitted);
    assert_eq!(users.iter().map(|&u| opcode(u)).last().as_deref(), Some("store"));
    assert!(users.len() >= 3);
    Ok(())
}

#[test]
fn attribute_strings_outlive_their_iterator() -> Result<()> {
    let module = LoadedModule::parse(fixtures::IMPORTS)?;
    let log = module.function("host.log");
    // `drain_strings` disposes the iterator before the strings are read.
    let attrs = unsafe {
        drain_strings(
            irweave_function_attributes_iter(log),
            irweave_attribute_list_iter_next,
            irweave_dispose_attribute_list_iter,
        )
    };
    // Enum attributes sort ahead of string attributes within a slot.
    assert_eq!(
        attrs,
        [
            "nounwind",
            "\"wasm-import-module\"=\"host\"",
            "\"wasm-import-name\"=\"log\"",
        ]
    );
    Ok(())
}

#[test]
fn call_site_attributes_of_import_calls() -> Result<()> {
    let module = LoadedModule::parse(fixtures::IMPORTS)?;
    let now = module.function("host.now");
    let call = *unsafe { uses(now) }.first().context("host.now is never called")?;
    assert_eq!(opcode(call), "call");
    let attrs = unsafe {
        drain_strings(
            irweave_call_attributes_iter(call),
            irweave_attribute_list_iter_next,
            irweave_dispose_attribute_list_iter,
        )
    };
    assert_eq!(attrs, ["nounwind"]);
    Ok(())
}

#[test]
fn argument_and_global_attribute_sets() {
    let mut module = Module::new("attrs");
    let i8_ty = module.int_type(8);
    let ptr = module.pointer_type(i8_ty);
    let void = module.void_type();
    let fn_ty = module.function_type(void, &[ptr, ptr], false);
    let f = module.add_function("copy", fn_ty).unwrap();
    let f_ref = module.value(f);
    f_ref.add_attribute(AttrIndex::Param(0), Attribute::Enum(AttrKind::NoAlias));
    f_ref.add_attribute(AttrIndex::Param(0), Attribute::Enum(AttrKind::NoCapture));
    let args = f_ref.argument_ids().to_vec();

    let table = module.add_global("table", i8_ty);
    module
        .value(table)
        .add_global_attribute(Attribute::string("section", ".rodata"));

    let first = module.value(args[0]).as_raw();
    let second = module.value(args[1]).as_raw();
    unsafe {
        let attrs = drain_strings(
            irweave_argument_attributes_iter(first),
            irweave_attribute_set_iter_next,
            irweave_dispose_attribute_set_iter,
        );
        assert_eq!(attrs, ["noalias", "nocapture"]);

        let none = drain_strings(
            irweave_argument_attributes_iter(second),
            irweave_attribute_set_iter_next,
            irweave_dispose_attribute_set_iter,
        );
        assert!(none.is_empty());

        let global = drain_strings(
            irweave_global_attributes_iter(module.value(table).as_raw()),
            irweave_attribute_set_iter_next,
            irweave_dispose_attribute_set_iter,
        );
        assert_eq!(global, ["\"section\"=\".rodata\""]);
    }
}

#[test]
fn invoke_attributes_cover_every_slot() {
    let mut module = Module::new("invoke");
    let i32_ty = module.int_type(32);
    let fn_ty = module.function_type(i32_ty, &[i32_ty], false);
    let callee = module.add_function("may_throw", fn_ty).unwrap();
    let caller = module.add_function("caller", fn_ty).unwrap();
    let entry = module.append_block(caller, "entry").unwrap();
    let ok = module.append_block(caller, "ok").unwrap();
    let lpad = module.append_block(caller, "lpad").unwrap();
    let arg = module.value(caller).argument_ids()[0];

    let mut b = Builder::at_end(&mut module, entry);
    let inv = b.invoke(callee, &[arg], ok, lpad, "r").unwrap();
    b.position_at_end(ok);
    b.ret(inv).unwrap();
    b.position_at_end(lpad);
    b.unreachable().unwrap();

    let inv_ref = module.value(inv);
    inv_ref.add_attribute(AttrIndex::Function, Attribute::Enum(AttrKind::NoReturn));
    inv_ref.add_attribute(AttrIndex::Return, Attribute::Enum(AttrKind::ZExt));
    inv_ref.add_attribute(AttrIndex::Param(0), Attribute::Enum(AttrKind::InReg));

    let attrs = unsafe {
        drain_strings(
            irweave_invoke_attributes_iter(inv_ref.as_raw()),
            irweave_attribute_list_iter_next,
            irweave_dispose_attribute_list_iter,
        )
    };
    assert_eq!(attrs, ["noreturn", "zeroext", "inreg"]);
}

#[test]
fn ranges_are_captured_at_creation() -> Result<()> {
    let module = LoadedModule::parse(fixtures::ARITH)?;
    let madd = module.function("madd");
    let before = unsafe { arguments(madd) };
    assert_eq!(before.len(), 3);

    // Renaming elements mid-walk does not disturb the cursor.
    let it = unsafe { irweave_arguments_iter(madd) };
    let first = unsafe { irweave_arguments_iter_next(it) };
    let renamed = c"lhs";
    unsafe { irweave::ffi::values::irweave_set_value_name(first, renamed.as_ptr()) };
    let rest = unsafe { drain(it, irweave_arguments_iter_next, irweave_dispose_arguments_iter) };
    assert_eq!(rest, &before[1..]);
    assert_eq!(name(first), "lhs");
    Ok(())
}
