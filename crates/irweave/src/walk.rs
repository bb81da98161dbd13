//! Structural walk of a module, driven entirely by the adapter layer.
//!
//! Prints one indented line per function, argument, block, instruction,
//! operand list and user list. This is what the `irweave` CLI shows.

use std::fmt::{self, Write};

use irweave_ir::{ModuleData, ValueRef};

use crate::iter;

/// Extra detail beyond the structural skeleton.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Print function, call-site, argument and global attributes.
    pub attributes: bool,
}

fn linkage(value: ValueRef<'_>) -> &'static str {
    match value.linkage().keyword() {
        "" => "external",
        keyword => keyword,
    }
}

fn join(items: impl Iterator<Item = String>) -> Option<String> {
    let items: Vec<String> = items.collect();
    (!items.is_empty()).then(|| items.join(" "))
}

fn write_attributes(
    out: &mut dyn Write,
    indent: &str,
    items: impl Iterator<Item = String>,
) -> fmt::Result {
    match join(items) {
        Some(text) => writeln!(out, "{indent}attributes: {text}"),
        None => Ok(()),
    }
}

fn write_users(out: &mut dyn Write, indent: &str, value: ValueRef<'_>) -> fmt::Result {
    let users: Vec<&str> = iter::uses(value).map(|user| user.opcode_name()).collect();
    if users.is_empty() {
        return Ok(());
    }
    writeln!(out, "{indent}users: {}", users.join(", "))
}

pub fn write_module(out: &mut dyn Write, module: &ModuleData, options: WalkOptions) -> fmt::Result {
    writeln!(out, "module {}", module.name())?;
    if !module.source_filename().is_empty() {
        writeln!(out, "source {}", module.source_filename())?;
    }
    for global in iter::globals(module) {
        write!(out, "global @{}", global.name())?;
        if let Some(ty) = global.value_type() {
            write!(out, " : {ty}")?;
        }
        write!(out, " {}", linkage(global))?;
        if global.is_global_constant() {
            out.write_str(" constant")?;
        }
        if let Some(init) = global.initializer() {
            write!(out, " = {}", init.as_operand())?;
        }
        out.write_str("\n")?;
        if options.attributes {
            write_attributes(out, "  ", iter::global_attributes(global))?;
        }
        write_users(out, "  ", global)?;
    }
    for function in iter::functions(module) {
        write_function(out, function, options)?;
    }
    Ok(())
}

pub fn write_function(
    out: &mut dyn Write,
    function: ValueRef<'_>,
    options: WalkOptions,
) -> fmt::Result {
    write!(out, "function @{}", function.name())?;
    if let Some(ty) = function.function_type() {
        write!(out, " : {ty}")?;
    }
    let kind = if function.is_declaration() { "declaration" } else { "definition" };
    writeln!(out, " {} {kind}", linkage(function))?;
    if options.attributes {
        write_attributes(out, "  ", iter::function_attributes(function))?;
    }

    for argument in iter::arguments(function) {
        writeln!(out, "  argument {}", argument.as_operand())?;
        if options.attributes {
            write_attributes(out, "    ", iter::argument_attributes(argument))?;
        }
        write_users(out, "    ", argument)?;
    }

    for block in iter::blocks(function) {
        writeln!(out, "  block {}", block.as_operand())?;
        for inst in iter::instructions(block) {
            writeln!(out, "    {}", inst.to_string().trim_start())?;
            if let Some(operands) = join(iter::operands(inst).map(|op| op.as_operand())) {
                writeln!(out, "      operands: {operands}")?;
            }
            if options.attributes && inst.called_value().is_some() {
                write_attributes(out, "      ", iter::call_site_attributes(inst))?;
            }
            write_users(out, "      ", inst)?;
        }
    }
    Ok(())
}

pub fn walk_module(module: &ModuleData, options: WalkOptions) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module, options);
    out
}

pub fn walk_function(function: ValueRef<'_>, options: WalkOptions) -> String {
    let mut out = String::new();
    let _ = write_function(&mut out, function, options);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use irweave_ir::{AttrKind, Attribute, Builder, Module};

    fn sample() -> Module {
        let mut module = Module::new("walk");
        let i32_ty = module.int_type(32);
        let counter = module.add_global("counter", i32_ty);
        let zero = module.const_int(i32_ty, 0);
        module.set_initializer(counter, zero).unwrap();
        module
            .value(counter)
            .add_global_attribute(Attribute::string("section", "bss"));

        let fn_ty = module.function_type(i32_ty, &[i32_ty], false);
        let f = module.add_function("bump", fn_ty).unwrap();
        module.value(f).add_function_attribute(AttrKind::NoUnwind);
        let arg = module.value(f).argument_ids()[0];
        module.value(arg).set_name("by");
        let entry = module.append_block(f, "entry").unwrap();

        let mut b = Builder::at_end(&mut module, entry);
        let old = b.load(counter, "old").unwrap();
        let new = b.add(old, arg, "new").unwrap();
        b.store(new, counter).unwrap();
        b.ret(new).unwrap();
        module
    }

    #[test]
    fn walk_lists_structure() {
        let module = sample();
        let text = walk_module(&module, WalkOptions::default());
        assert!(text.starts_with("module walk\n"), "{text}");
        assert!(text.contains("global @counter : i32 external = i32 0"), "{text}");
        assert!(text.contains("function @bump : i32 (i32) external definition"), "{text}");
        assert!(text.contains("  argument i32 %by\n    users: add\n"), "{text}");
        assert!(text.contains("  block label %entry\n"), "{text}");
        let expected = "    %new = add i32 %old, %by\n      operands: i32 %old i32 %by\n";
        assert!(text.contains(expected), "{text}");
        assert!(!text.contains("attributes:"), "{text}");
    }

    #[test]
    fn users_follow_use_list_order() {
        let module = sample();
        let text = walk_module(&module, WalkOptions::default());
        // Most recent use first: the store was emitted after the load.
        assert!(text.contains("  users: store, load\n"), "{text}");
    }

    #[test]
    fn attributes_on_request() {
        let module = sample();
        let options = WalkOptions { attributes: true };
        let text = walk_module(&module, options);
        assert!(text.contains("  attributes: \"section\"=\"bss\"\n"), "{text}");
        assert!(text.contains("  attributes: nounwind\n"), "{text}");

        let bump = module.get_function("bump").unwrap();
        let single = walk_function(bump, options);
        assert!(single.starts_with("function @bump"));
        assert!(!single.contains("global"));
    }
}
