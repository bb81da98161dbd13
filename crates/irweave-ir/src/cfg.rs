//! Graphviz rendering of a function's control-flow graph.

use std::fmt::Write;

use crate::opcode::Opcode;
use crate::value::ValueRef;

/// Escapes text for a DOT record label; each line is left-justified.
fn escape_record(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\l"),
            '{' | '}' | '<' | '>' | '|' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Successor blocks of a terminator, with the port label of each edge.
fn successors<'m>(terminator: ValueRef<'m>) -> Vec<(String, ValueRef<'m>)> {
    let module = terminator.module();
    let targets: Vec<ValueRef<'m>> = terminator
        .operand_ids()
        .iter()
        .map(|&id| module.value(id))
        .filter(|v| v.is_block())
        .collect();

    match terminator.opcode() {
        Some(Opcode::Br) if targets.len() == 2 => targets
            .into_iter()
            .zip(["T", "F"])
            .map(|(block, port)| (port.to_string(), block))
            .collect(),
        Some(Opcode::Switch) => {
            let cases = terminator.operand_ids().get(2..).unwrap_or_default();
            let mut labels = vec!["def".to_string()];
            labels.extend(cases.chunks(2).map(|case| {
                module
                    .value(case[0])
                    .const_int_value()
                    .map_or_else(|| "?".to_string(), |v| v.to_string())
            }));
            labels.into_iter().zip(targets).collect()
        }
        _ => targets
            .into_iter()
            .enumerate()
            .map(|(i, block)| (i.to_string(), block))
            .collect(),
    }
}

/// DOT text for `function`'s CFG. Nodes hold the block label, plus the
/// block's instructions when `show_inst` is set. Declarations (and values
/// that are not functions) produce an empty graph.
pub fn write_cfg(function: ValueRef<'_>, show_inst: bool) -> String {
    let module = function.module();
    let name = function.name();
    let mut out = String::new();

    let _ = writeln!(out, "digraph \"CFG for '{name}' function\" {{");
    let _ = writeln!(out, "\tlabel=\"CFG for '{name}' function\";");
    let _ = writeln!(out);

    for &block_id in function.block_ids() {
        let block = module.value(block_id);
        let text = if show_inst {
            block.to_string()
        } else {
            crate::printer::block_reference(block)
        };
        let edges = block.terminator().map(successors).unwrap_or_default();
        let ports = if edges.len() > 1 {
            let cells: Vec<String> = edges
                .iter()
                .enumerate()
                .map(|(i, (port, _))| format!("<s{i}>{}", escape_record(port)))
                .collect();
            format!("|{{{}}}", cells.join("|"))
        } else {
            String::new()
        };

        let _ = writeln!(
            out,
            "\tNode{} [shape=record,label=\"{{{}{}}}\"];",
            block_id.as_usize(),
            escape_record(&text),
            ports
        );
        for (i, (_, target)) in edges.iter().enumerate() {
            if edges.len() > 1 {
                let _ = writeln!(
                    out,
                    "\tNode{}:s{i} -> Node{};",
                    block_id.as_usize(),
                    target.id().as_usize()
                );
            } else {
                let _ = writeln!(
                    out,
                    "\tNode{} -> Node{};",
                    block_id.as_usize(),
                    target.id().as_usize()
                );
            }
        }
    }
    out.push_str("}\n");
    out
}
